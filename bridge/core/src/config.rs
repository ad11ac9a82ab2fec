use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Directory name used under the home directory when nothing else is configured.
pub const DEFAULT_DIR_NAME: &str = ".filebridge";

/// Shared bridge settings, loadable from a JSON file.
///
/// Missing keys fall back to the defaults, so a file only needs the values it
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory holding `command.json` and `response.json`.
    pub base_dir: PathBuf,
    /// Controller polling cadence.
    pub poll_interval_ms: u64,
    /// Controller wait budget per exchange.
    pub timeout_secs: u64,
    /// Pause between seeing a response file and reading it.
    pub grace_ms: u64,
    /// Cadence of the executor's own trigger loop (`bridged watch`).
    pub trigger_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            poll_interval_ms: 1_000,
            timeout_secs: 120,
            grace_ms: 500,
            trigger_interval_ms: 1_000,
        }
    }
}

impl BridgeConfig {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Load from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Controller polling cadence.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Controller wait budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Grace pause before decoding a response.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Executor trigger cadence.
    pub fn trigger_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_interval_ms.max(1))
    }
}

/// `~/.filebridge`, or `./.filebridge` when no home directory is known.
pub fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}
