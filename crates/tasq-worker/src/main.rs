use std::path::Path;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tasq_client::QueueClient;
use tasq_worker::{BoxError, Worker, WorkerOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "tasq-worker", about = "tasq consumer worker")]
struct Cli {
    /// Server endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Queue to consume
    #[arg(long)]
    queue: Option<String>,

    /// Lease seconds requested on each claim
    #[arg(long)]
    lease: Option<i64>,

    /// Simulated processing time per message, in milliseconds
    #[arg(long)]
    process_ms: Option<u64>,
}

/// Worker configuration, deserializable from TOML and overridable per-flag.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct WorkerConfig {
    endpoint: String,
    queue: String,
    lease_secs: i64,
    poll_interval_ms: u64,
    /// Simulated processing time for the demo processing function.
    process_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7711".to_string(),
            queue: "default".to_string(),
            lease_secs: 10,
            poll_interval_ms: 2_000,
            process_ms: 1_000,
        }
    }
}

fn load_config() -> WorkerConfig {
    let paths = ["tasq-worker.toml", "/etc/tasq/tasq-worker.toml"];

    for path in &paths {
        if Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => {
                        info!(path, "loaded configuration");
                        return config;
                    }
                    Err(e) => {
                        eprintln!("error parsing {path}: {e}");
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("error reading {path}: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    WorkerConfig::default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tasq_core::telemetry::init_tracing();

    let cli = Cli::parse();
    let mut config = load_config();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(queue) = cli.queue {
        config.queue = queue;
    }
    if let Some(lease) = cli.lease {
        config.lease_secs = lease;
    }
    if let Some(process_ms) = cli.process_ms {
        config.process_ms = process_ms;
    }

    let client = QueueClient::new(&config.endpoint)?;
    let options = WorkerOptions {
        queue: config.queue.clone(),
        lease_secs: config.lease_secs,
        poll_interval: Duration::from_millis(config.poll_interval_ms),
    };
    let worker = Worker::new(client, options);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal");
                cancel.cancel();
            }
        }
    });

    info!(queue = %config.queue, "worker started");

    let process_ms = config.process_ms;
    worker
        .run(
            move |message, cancel| async move {
                info!(id = message.id, content = %message.content, "processing message");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(process_ms)) => Ok(()),
                    _ = cancel.cancelled() => Err::<(), BoxError>("cancelled".into()),
                }
            },
            cancel,
        )
        .await?;

    info!("worker stopped");
    Ok(())
}
