//! OpenRelay Edge - traffic record relay appliance
//!
//! Wires file-backed inputs and outputs to the dispatch engine and runs it
//! until cancelled.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      OPENRELAY EDGE                          │
//! │                                                              │
//! │   relay.json ──► EdgeConfig                                  │
//! │                     │                                        │
//! │   ┌─────────────┐   ▼   ┌────────────────┐  ┌─────────────┐  │
//! │   │ FileInput * │──────►│    Emitter     │─►│ FileOutput *│  │
//! │   └─────────────┘       │ filter, router │  └─────────────┘  │
//! │                         └───────▲────────┘                   │
//! │                                 │                            │
//! │                   Ctrl-C ──► cancel                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod plugins;

use relay_common::RelayError;
use relay_dataplane::{Emitter, EmitterError, EmitterStatsSnapshot, Output};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

pub use config::{EdgeConfig, InputConfig, OutputConfig};
pub use plugins::{FileInput, FileOutput, PAYLOAD_SEPARATOR};

/// Edge error types
#[derive(Debug, Error)]
pub enum EdgeError {
    /// Configuration rejected
    #[error("config error: {0}")]
    Config(#[from] RelayError),
    /// Plugin could not be opened
    #[error("cannot open {name}: {source}")]
    Plugin {
        /// Plugin name from the config
        name: String,
        /// Open failure
        #[source]
        source: std::io::Error,
    },
    /// Emitter could not start
    #[error(transparent)]
    Emitter(#[from] EmitterError),
}

/// Relay appliance
pub struct OpenRelay {
    config: EdgeConfig,
}

impl OpenRelay {
    /// Create relay from validated config
    pub fn new(config: EdgeConfig) -> Result<Self, EdgeError> {
        config.emitter.validate()?;
        Ok(Self { config })
    }

    /// Open every configured plugin and assemble the emitter
    pub async fn build(&self) -> Result<Emitter, EdgeError> {
        let mut emitter = Emitter::new(&self.config.emitter)?;

        for input in &self.config.inputs {
            let plugin = FileInput::open(&input.name, &input.path)
                .await
                .map_err(|source| EdgeError::Plugin { name: input.name.clone(), source })?;
            tracing::info!(input = %input.name, path = %input.path.display(), "input opened");
            emitter = emitter.with_input(plugin);
        }

        for output in &self.config.outputs {
            let plugin = FileOutput::open(&output.name, &output.path)
                .await
                .map_err(|source| EdgeError::Plugin { name: output.name.clone(), source })?;
            tracing::info!(output = %output.name, path = %output.path.display(), "output opened");
            emitter = emitter.with_output(Arc::new(plugin) as Arc<dyn Output>);
        }

        if emitter.output_count() == 0 {
            tracing::warn!("no outputs configured, records will be discarded");
        }
        if emitter.input_count() == 0 {
            tracing::warn!("no inputs configured, relay idles until interrupted");
        }
        tracing::info!(policy = ?emitter.policy(), "relay assembled");

        Ok(emitter)
    }

    /// Run until `cancel` fires, then drain and return final counters
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> Result<EmitterStatsSnapshot, EdgeError> {
        let handle = self.build().await?.start(cancel)?;
        let stats = handle.wait().await;

        tracing::info!(
            received = stats.received,
            forwarded = stats.forwarded,
            filtered = stats.filtered,
            malformed = stats.malformed,
            write_failures = stats.write_failures,
            "relay finished"
        );
        Ok(stats)
    }
}
