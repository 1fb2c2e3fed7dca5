//! Global configuration loaded from `~/.config/dlq/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the scheduler, retry policy, and persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqConfig {
    /// Hard cap on simultaneously active (queued/downloading/extracting) tasks.
    pub max_concurrent_downloads: usize,
    /// Maximum attempts (including the first) before a task is marked failed.
    pub max_retry_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub retry_base_delay_ms: u64,
    /// Upper bound on backoff delay in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Debounce window for queue-state snapshots, in milliseconds.
    pub persist_debounce_ms: u64,
    /// Connect timeout for Transport requests, in seconds.
    pub connect_timeout_secs: u64,
    /// Bound on a stalled connection (no bytes received) before it is treated
    /// as a connectivity failure, in seconds.
    pub stall_timeout_secs: u64,
    /// Root directory under which `downloads/{tmp,completed,resume}` and
    /// `state/` live.
    pub base_dir: PathBuf,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            max_retry_attempts: 3,
            retry_base_delay_ms: 2_000,
            retry_max_delay_ms: 60_000,
            persist_debounce_ms: 1_000,
            connect_timeout_secs: 30,
            stall_timeout_secs: 30,
            base_dir: default_base_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl DlqConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.base_dir.join("downloads")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.downloads_dir().join("tmp")
    }

    pub fn completed_dir(&self) -> PathBuf {
        self.downloads_dir().join("completed")
    }

    pub fn resume_dir(&self) -> PathBuf {
        self.downloads_dir().join("resume")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join("state")
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir().join("download_queue.json")
    }
}

fn default_base_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlq")?;
    Ok(xdg_dirs.get_state_home())
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DlqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DlqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: DlqConfig = toml::from_str(&data)?;
    Ok(cfg)
}
