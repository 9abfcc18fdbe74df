//! Coordination limits and tunables.
//!
//! Loaded from `~/.quorum/quorum.toml` when present; every field has a
//! default so an empty or missing file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use crate::{qlog_debug, Error, Result};

fn default_max_concurrent_agents() -> usize {
    4
}

fn default_max_block_secs() -> u64 {
    300
}

fn default_lock_timeout_secs() -> u64 {
    60
}

fn default_max_locks_per_agent() -> usize {
    1
}

fn default_max_dependencies_per_scope() -> usize {
    16
}

fn default_history_capacity() -> usize {
    256
}

/// Limits consumed by the coordination core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Max agents simultaneously Working while holding a lock.
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,
    /// Seconds an agent may stay Blocked before being flagged.
    #[serde(default = "default_max_block_secs")]
    pub max_block_secs: u64,
    /// Seconds before an unrefreshed lock is eligible for reclamation.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// When true, a safety violation rolls back the triggering operation.
    #[serde(default)]
    pub strict_validation: bool,
    /// Max scopes one agent may hold locks on at once.
    #[serde(default = "default_max_locks_per_agent")]
    pub max_locks_per_agent: usize,
    /// Max dependencies a single scope may declare.
    #[serde(default = "default_max_dependencies_per_scope")]
    pub max_dependencies_per_scope: usize,
    /// Capacity of the lock-event and violation history rings.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Override for the sweep interval; None means `lock_timeout / 2`.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_max_concurrent_agents(),
            max_block_secs: default_max_block_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            strict_validation: false,
            max_locks_per_agent: default_max_locks_per_agent(),
            max_dependencies_per_scope: default_max_dependencies_per_scope(),
            history_capacity: default_history_capacity(),
            sweep_interval_secs: None,
        }
    }
}

impl CoordinationConfig {
    pub fn quorum_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".quorum"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::quorum_dir()?.join("quorum.toml"))
    }

    /// Maximum tolerated block time.
    pub fn max_block_time(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_block_secs as i64)
    }

    /// Lock time-to-live.
    pub fn lock_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_timeout_secs as i64)
    }

    /// Interval between background sweeps: the configured override, or
    /// half the lock timeout (never below one second).
    pub fn sweep_interval(&self) -> StdDuration {
        let secs = self
            .sweep_interval_secs
            .unwrap_or_else(|| (self.lock_timeout_secs / 2).max(1));
        StdDuration::from_secs(secs.max(1))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        qlog_debug!("CoordinationConfig::load path={}", path.display());
        Self::load_from(&path)
    }

    /// Load from an explicit path; a missing file yields the defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            qlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        qlog_debug!(
            "Config loaded: max_concurrent_agents={} lock_timeout_secs={} strict={}",
            config.max_concurrent_agents,
            config.lock_timeout_secs,
            config.strict_validation
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::quorum_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        qlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
