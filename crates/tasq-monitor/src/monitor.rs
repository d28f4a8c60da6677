//! The monitor orchestrates one queue: a sampling loop feeding the scale
//! policy, and a provisioning loop acting on its suggestions. The loops run
//! concurrently and share only the policy's internal history.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tasq_client::{ClientError, QueueClient, QueueStat};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::policy::ScalePolicy;
use crate::provider::WorkerProvider;

/// The slice of the queue API the monitor needs. A seam for tests; the real
/// implementation is [`QueueClient`].
#[async_trait]
pub trait StatSource: Send + Sync {
    async fn queue_stat(&self, queue: &str) -> Result<QueueStat, ClientError>;
}

#[async_trait]
impl StatSource for QueueClient {
    async fn queue_stat(&self, queue: &str) -> Result<QueueStat, ClientError> {
        self.get_queue_stat(queue).await
    }
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub queue: String,
    /// How often to ask the policy for a suggestion and act on it.
    pub interval: Duration,
}

pub struct Monitor<S> {
    client: S,
    policy: Arc<dyn ScalePolicy>,
    provider: Arc<dyn WorkerProvider>,
    options: MonitorOptions,
}

impl<S: StatSource> Monitor<S> {
    pub fn new(
        client: S,
        policy: Arc<dyn ScalePolicy>,
        provider: Arc<dyn WorkerProvider>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            client,
            policy,
            provider,
            options,
        }
    }

    /// Run both loops until cancelled. A sampling transport error is fatal
    /// and propagates; the retry policy for an unreachable server belongs
    /// to the operator wrapping this call.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ClientError> {
        info!(queue = %self.options.queue, "monitor started");

        tokio::select! {
            result = self.sample_loop() => result,
            result = self.provision_loop() => result,
            _ = cancel.cancelled() => {
                info!(queue = %self.options.queue, "monitor cancelled");
                Ok(())
            }
        }
    }

    async fn sample_loop(&self) -> Result<(), ClientError> {
        loop {
            let stat = self.client.queue_stat(&self.options.queue).await?;
            debug!(
                queue = %stat.queue,
                total = stat.message_total,
                available = stat.message_available,
                "sampled queue stat"
            );
            self.policy.sample(stat);

            tokio::time::sleep(self.policy.sample_interval()).await;
        }
    }

    async fn provision_loop(&self) -> Result<(), ClientError> {
        loop {
            match self.policy.suggest() {
                Some(target) => {
                    info!(queue = %self.options.queue, target, "policy suggestion");
                    let achieved = self.provider.provide(&self.options.queue, target).await;
                    info!(queue = %self.options.queue, achieved, "provider result");
                }
                None => debug!(queue = %self.options.queue, "no scale suggestion"),
            }

            tokio::time::sleep(self.options.interval).await;
        }
    }
}
