//! Edge Configuration

use relay_dataplane::EmitterConfig;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Default config location when `CONFIG_PATH` is unset
pub const DEFAULT_CONFIG_PATH: &str = "/etc/openrelay/relay.json";

/// Relay appliance configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Record sources
    pub inputs: Vec<InputConfig>,
    /// Record sinks
    pub outputs: Vec<OutputConfig>,
    /// Dispatch engine settings
    pub emitter: EmitterConfig,
}

impl EdgeConfig {
    /// Load from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Save to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

/// File input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Name used in logs
    pub name: String,
    /// Separator-delimited record file
    pub path: PathBuf,
}

/// File output. Appends to an existing file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Name used in logs and write errors
    pub name: String,
    /// File records are appended to
    pub path: PathBuf,
}
