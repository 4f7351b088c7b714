//! OpenRelay Edge - Main Entry Point

use relay_edge::{config::DEFAULT_CONFIG_PATH, EdgeConfig, OpenRelay};
use std::io;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("OpenRelay Edge v{}", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

    let config = match EdgeConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            tracing::error!(path = %config_path, error = %e, "invalid config");
            return Err(e.into());
        }
        Err(e) => {
            tracing::warn!(path = %config_path, error = %e, "config not readable, using defaults");
            EdgeConfig::default()
        }
    };

    let relay = OpenRelay::new(config)?;

    // Ctrl-C drains and stops the emitter
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => tracing::error!(error = %e, "cannot listen for interrupt, shutting down"),
        }
        let _ = cancel_tx.send(true);
    });

    relay.run(cancel_rx).await?;

    Ok(())
}
