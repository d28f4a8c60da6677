use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tasq_client::QueueClient;
use tasq_monitor::{
    FixedScalePolicy, FixedScalePolicyOptions, Monitor, MonitorOptions, ProcessWorkerProvider,
    ProcessWorkerProviderOptions,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "tasq-monitor", about = "tasq autoscaling monitor")]
struct Cli {
    /// Server endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Queue to monitor
    #[arg(long)]
    queue: Option<String>,
}

/// Monitor configuration, deserializable from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct MonitorConfig {
    endpoint: String,
    queue: String,
    /// Seconds between suggestion/provisioning passes.
    interval_secs: u64,
    policy: FixedScalePolicyOptions,
    provider: ProcessWorkerProviderOptions,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7711".to_string(),
            queue: "default".to_string(),
            interval_secs: 15,
            policy: FixedScalePolicyOptions::default(),
            provider: ProcessWorkerProviderOptions {
                command: "tasq-worker".to_string(),
                args: vec![],
            },
        }
    }
}

fn load_config() -> MonitorConfig {
    let paths = ["tasq-monitor.toml", "/etc/tasq/tasq-monitor.toml"];

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

    MonitorConfig::default()
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

    if let Err(e) = config.policy.validate() {
        eprintln!("invalid policy configuration: {e}");
        std::process::exit(1);
    }

    let client = QueueClient::new(&config.endpoint)?;
    let policy = Arc::new(FixedScalePolicy::new(config.policy.clone()));
    let provider = Arc::new(ProcessWorkerProvider::new(config.provider.clone())?);

    let monitor = Monitor::new(
        client,
        policy,
        provider,
        MonitorOptions {
            queue: config.queue.clone(),
            interval: Duration::from_secs(config.interval_secs),
        },
    );

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

    monitor.run(cancel).await?;

    info!("monitor stopped");
    Ok(())
}
