//! lcode-hub
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                       HUB                            │
//!   TCP client    │  ┌──────────┐   ┌────────────┐                        │
//!  ───────────────┼─▶│ listener │──▶│ classifier │── ">2" ─▶ handshake    │
//!                 │  └──────────┘   └─────┬──────┘          registry     │
//!                 │                       ├─── "0" ──▶ session server    │
//!                 │                       │            └▶ supervisor      │
//!                 │                       ▼                               │
//!                 │                 ┌──────────┐   ┌───────────────────┐  │
//!                 │                 │   http   │──▶│ session directory │  │
//!                 │                 │  server  │   │  → WebDAV handler │  │
//!                 │                 └──────────┘   └───────────────────┘  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use lcode_hub::config::{load_config, validate_config, ConfigError, HubConfig};
use lcode_hub::dav::UnavailableDavFactory;
use lcode_hub::http::hub_version;
use lcode_hub::lifecycle::{probe_running, signals, Shutdown};
use lcode_hub::net::{Classifier, Listener};
use lcode_hub::observability::{logging, metrics};
use lcode_hub::Hub;

#[derive(Debug, Parser)]
#[command(name = "lcode-hub", version, about = "Connection hub for lcode remote shells")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:4349.
    #[arg(long)]
    addr: Option<String>,

    /// Regex whose first capture group is the logical host.
    #[arg(long = "host-finder")]
    host_finder: Option<String>,

    /// Seconds a leader waits for its report connection.
    #[arg(long)]
    timeout: Option<u64>,

    /// Log level or filter directive.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<HubConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => HubConfig::default(),
        };

        if let Some(addr) = &self.addr {
            config.listener.bind_address = addr.clone();
        }
        if let Some(pattern) = &self.host_finder {
            config.sessions.host_pattern = pattern.clone();
        }
        if let Some(timeout) = self.timeout {
            config.handshake.timeout_secs = timeout;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = %hub_version(), "lcode-hub starting");

    match probe_running(&config.listener.bind_address).await {
        Ok(()) => return Ok(()),
        Err(e) => tracing::debug!(error = %e, "No running hub to reuse"),
    }

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(
        address = %local_addr,
        max_connections = config.listener.max_connections,
        grace_period_ms = config.classifier.grace_period_ms,
        handshake_timeout_secs = config.handshake.timeout_secs,
        host_pattern = %config.sessions.host_pattern,
        "Listening for connections"
    );

    let hub = Arc::new(Hub::new(&config, local_addr.port(), Arc::new(UnavailableDavFactory))?);
    let classifier = Classifier::from_config(&config.classifier);

    let shutdown = Arc::new(Shutdown::new());
    let signal = Arc::clone(&shutdown);
    tokio::spawn(async move { signals::shutdown_on_signal(&signal).await });

    hub.serve(listener, classifier, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
