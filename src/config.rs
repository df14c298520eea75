//! `stagelat.toml` configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use stage_ingest::sink::DEFAULT_SUFFIX;
use stage_ingest::DEFAULT_POLL_INTERVAL;

/// Tunables for a listen run. Connection parameters are not stored here;
/// they come from flags or the environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    /// Directory the per-run CSV trail is written into.
    #[serde(default = "ListenConfig::default_output_dir")]
    pub output_dir: PathBuf,
    /// Appended to the run's start timestamp to form the trail file name.
    #[serde(default = "ListenConfig::default_file_suffix")]
    pub file_suffix: String,
    /// Upper bound on how long a read blocks before shutdown is re-checked.
    #[serde(default = "ListenConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Extra attempts for a failed trail append before it is logged and skipped.
    #[serde(default = "ListenConfig::default_persist_retries")]
    pub persist_retries: u32,
    /// Suppress the per-record console report.
    #[serde(default)]
    pub quiet: bool,
}

impl ListenConfig {
    fn default_output_dir() -> PathBuf { PathBuf::from(".") }
    fn default_file_suffix() -> String { DEFAULT_SUFFIX.into() }
    fn default_poll_interval_ms() -> u64 { DEFAULT_POLL_INTERVAL.as_millis() as u64 }
    fn default_persist_retries() -> u32 { 1 }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Load `path`, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
            file_suffix: Self::default_file_suffix(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            persist_retries: Self::default_persist_retries(),
            quiet: false,
        }
    }
}
