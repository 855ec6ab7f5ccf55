//! Monitor configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/blockfeed/monitor.toml`
//! - Windows: `%APPDATA%/blockfeed/monitor.toml`
//!
//! Durations are in milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use blockfeed_protocol::constants::{
    DEFAULT_API_URL, DEFAULT_WS_URL, RECONNECT_BASE_DELAY, RECONNECT_MAX_ATTEMPTS,
    RECONNECT_MAX_DELAY, WS_PING_PERIOD, WS_READ_DEADLINE,
};
use blockfeed_realtime::{FeedConfig, ReconnectConfig};

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Upstream WebSocket endpoint.
    pub ws_url: String,

    /// REST base used by the polling fallback.
    pub api_url: String,

    /// Recent blocks kept in the view.
    pub history: usize,

    pub poll_interval_ms: u64,
    pub summary_interval_ms: u64,

    pub reconnect_base_ms: u64,
    pub reconnect_max_attempts: u32,
    /// Ceiling for a single reconnect delay.
    pub reconnect_max_delay_ms: u64,

    pub ping_period_ms: u64,
    pub read_deadline_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.into(),
            api_url: DEFAULT_API_URL.into(),
            history: 15,
            poll_interval_ms: 60_000,
            summary_interval_ms: 30_000,
            reconnect_base_ms: RECONNECT_BASE_DELAY.as_millis() as u64,
            reconnect_max_attempts: RECONNECT_MAX_ATTEMPTS,
            reconnect_max_delay_ms: RECONNECT_MAX_DELAY.as_millis() as u64,
            ping_period_ms: WS_PING_PERIOD.as_millis() as u64,
            read_deadline_ms: WS_READ_DEADLINE.as_millis() as u64,
        }
    }
}

impl MonitorConfig {
    /// Loads from the default location, creating it with defaults if absent.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads from `path`, creating it with defaults if absent.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: MonitorConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = MonitorConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Recent blocks to keep; at least one.
    pub fn history(&self) -> usize {
        self.history.max(1)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_millis(self.summary_interval_ms.max(1))
    }

    /// Settings for the realtime service; anything not in the file keeps its
    /// default.
    pub fn to_feed_config(&self) -> FeedConfig {
        FeedConfig {
            url: self.ws_url.clone(),
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(self.reconnect_base_ms),
                max_attempts: self.reconnect_max_attempts,
                max_delay: Duration::from_millis(
                    self.reconnect_max_delay_ms.max(self.reconnect_base_ms),
                ),
                ..ReconnectConfig::default()
            },
            ping_period: Duration::from_millis(self.ping_period_ms.max(1)),
            read_deadline: Duration::from_millis(self.read_deadline_ms.max(1)),
            ..FeedConfig::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("blockfeed")
            .join("monitor.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("blockfeed").join("monitor.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/blockfeed/monitor.toml"))
    }
}
