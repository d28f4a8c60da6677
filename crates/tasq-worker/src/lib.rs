//! Consumer worker: drives one queue, claiming a message under a lease,
//! keeping the lease alive while a caller-supplied processing function runs,
//! and resolving the message from the outcome.
//!
//! Per claimed message two activities run concurrently: the foreground
//! processing future and a background renewal timer firing at 3/4 of the
//! lease. The timer's lifetime is scoped to the claim: a guard aborts it on
//! every exit path before the message is resolved, so a renewal can never
//! fire after resolution.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tasq_client::{ClientError, QueueClient, QueueMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The slice of the queue API a worker needs. A seam for tests; the real
/// implementation is [`QueueClient`].
#[async_trait]
pub trait QueueApi: Send + Sync {
    async fn wait_for_message(
        &self,
        queue: &str,
        lease: Option<i64>,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<QueueMessage, ClientError>;

    async fn extend_message_lease(
        &self,
        queue: &str,
        id: u64,
        receipt: &str,
        lease: Option<i64>,
    ) -> Result<(), ClientError>;

    async fn return_message(&self, queue: &str, id: u64, receipt: &str)
        -> Result<(), ClientError>;

    async fn delete_message(&self, queue: &str, id: u64, receipt: &str)
        -> Result<(), ClientError>;
}

#[async_trait]
impl QueueApi for QueueClient {
    async fn wait_for_message(
        &self,
        queue: &str,
        lease: Option<i64>,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<QueueMessage, ClientError> {
        QueueClient::wait_for_message(self, queue, lease, poll_interval, cancel).await
    }

    async fn extend_message_lease(
        &self,
        queue: &str,
        id: u64,
        receipt: &str,
        lease: Option<i64>,
    ) -> Result<(), ClientError> {
        QueueClient::extend_message_lease(self, queue, id, receipt, lease).await
    }

    async fn return_message(
        &self,
        queue: &str,
        id: u64,
        receipt: &str,
    ) -> Result<(), ClientError> {
        QueueClient::return_message(self, queue, id, receipt).await
    }

    async fn delete_message(
        &self,
        queue: &str,
        id: u64,
        receipt: &str,
    ) -> Result<(), ClientError> {
        QueueClient::delete_message(self, queue, id, receipt).await
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub queue: String,
    /// Lease requested on every claim, in seconds.
    pub lease_secs: i64,
    /// How often to re-poll an empty queue.
    pub poll_interval: Duration,
}

impl WorkerOptions {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            lease_secs: 10,
            poll_interval: tasq_client::DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Waiting/claiming failed with something other than cancellation.
    /// Retry policy for these is deliberately left to the caller.
    #[error("error while waiting for a message: {0}")]
    Wait(#[source] ClientError),

    /// The processing function failed. The message was returned to the
    /// queue before this error propagated.
    #[error("message processing failed: {0}")]
    Processing(#[source] BoxError),
}

/// Aborts the renewal task when dropped, on every exit path.
struct RenewalGuard {
    handle: tokio::task::JoinHandle<()>,
}

impl RenewalGuard {
    fn spawn<C>(client: C, queue: String, id: u64, receipt: String, lease_secs: i64) -> Self
    where
        C: QueueApi + Clone + 'static,
    {
        let period = Duration::from_secs_f64(lease_secs as f64 * 3.0 / 4.0);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticks = tokio::time::interval_at(start, period);
            loop {
                ticks.tick().await;
                // A failed renewal is not fatal: the next tick retries, and
                // if the lease truly lapses first the message becomes
                // contestable, an accepted race under at-least-once
                // delivery.
                if let Err(e) = client
                    .extend_message_lease(&queue, id, &receipt, Some(lease_secs))
                    .await
                {
                    warn!(%queue, id, error = %e, "failed to extend message lease");
                } else {
                    debug!(%queue, id, "lease extended");
                }
            }
        });
        Self { handle }
    }
}

impl Drop for RenewalGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The worker loop: Idle → Claiming → Leased(renewing) → Resolving → Idle,
/// with cancellation reachable from any state.
pub struct Worker<C> {
    client: C,
    options: WorkerOptions,
}

impl<C> Worker<C>
where
    C: QueueApi + Clone + 'static,
{
    pub fn new(client: C, options: WorkerOptions) -> Self {
        Self { client, options }
    }

    /// Run until cancelled. `process` is invoked once per claimed message
    /// with a cancellation signal; its outcome decides delete vs return.
    ///
    /// Exits `Ok` on cancellation. Any other wait failure, or a processing
    /// failure, propagates after the in-flight message has been resolved.
    pub async fn run<F, Fut>(
        &self,
        process: F,
        cancel: CancellationToken,
    ) -> Result<(), WorkerError>
    where
        F: Fn(QueueMessage, CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), BoxError>>,
    {
        loop {
            let message = match self
                .client
                .wait_for_message(
                    &self.options.queue,
                    Some(self.options.lease_secs),
                    self.options.poll_interval,
                    &cancel,
                )
                .await
            {
                Ok(message) => message,
                Err(ClientError::Cancelled) => {
                    info!(queue = %self.options.queue, "worker cancelled while waiting");
                    return Ok(());
                }
                Err(e) => return Err(WorkerError::Wait(e)),
            };

            debug!(
                queue = %self.options.queue,
                id = message.id,
                requeue_count = message.requeue_count,
                "received message"
            );

            let cancelled = self.handle_message(message, &process, &cancel).await?;
            if cancelled {
                info!(queue = %self.options.queue, "worker cancelled during processing");
                return Ok(());
            }
        }
    }

    /// Process one claimed message to resolution. Returns `true` when the
    /// exit was a cancellation.
    async fn handle_message<F, Fut>(
        &self,
        message: QueueMessage,
        process: &F,
        cancel: &CancellationToken,
    ) -> Result<bool, WorkerError>
    where
        F: Fn(QueueMessage, CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), BoxError>>,
    {
        let id = message.id;
        let receipt = message.receipt.clone();
        let queue = self.options.queue.clone();

        let renewal = RenewalGuard::spawn(
            self.client.clone(),
            queue.clone(),
            id,
            receipt.clone(),
            self.options.lease_secs,
        );

        let outcome = tokio::select! {
            result = process(message, cancel.clone()) => Some(result),
            _ = cancel.cancelled() => None,
        };

        // Stop renewing before resolving, so the timer can never revive a
        // lease we are about to release.
        drop(renewal);

        match outcome {
            Some(Ok(())) => {
                self.resolve(self.client.delete_message(&queue, id, &receipt).await, id);
                Ok(false)
            }
            None => {
                self.resolve(self.client.return_message(&queue, id, &receipt).await, id);
                Ok(true)
            }
            Some(Err(e)) => {
                self.resolve(self.client.return_message(&queue, id, &receipt).await, id);
                // A processing function that noticed the cancellation itself
                // reports an error; that is still a clean shutdown, not a
                // failure to propagate.
                if cancel.is_cancelled() {
                    Ok(true)
                } else {
                    Err(WorkerError::Processing(e))
                }
            }
        }
    }

    /// Resolution calls may themselves be rejected when the lease expired
    /// mid-flight; the message is already redelivered to someone else, so
    /// the rejection is swallowed.
    fn resolve(&self, result: Result<(), ClientError>, id: u64) {
        if let Err(e) = result {
            warn!(queue = %self.options.queue, id, error = %e, "message resolution rejected");
        }
    }
}
