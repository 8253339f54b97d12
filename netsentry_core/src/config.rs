// Session configuration: tuned timing constants and backend location
use crate::error::{SentryError, SentryResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration, stored as TOML under `~/.netsentry/config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the HTTP bridge (ignored in demo mode)
    pub backend_url: String,
    /// How often the HTTP bridge long-polls for push signals
    pub signal_poll_ms: u64,
    /// Log file for the terminal UI (defaults to `~/.netsentry/netsentry.log`)
    pub log_file: Option<PathBuf>,
    pub dashboard: DashboardConfig,
    pub search: SearchConfig,
    pub notifications: NotificationConfig,
}

/// Dashboard polling and chart shaping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Fixed auto-update period when auto-update is on
    pub auto_update_interval_ms: u64,
    /// Minimum spacing between push-triggered refreshes
    pub push_throttle_ms: u64,
    /// Debounce applied to `updateNetworkLog` pushes
    pub push_debounce_ms: u64,
    /// Visible alerts in the feed
    pub max_alerts: usize,
    /// Entries kept by the bar charts
    pub top_entries: usize,
    /// Timeline length above which downsampling kicks in
    pub timeline_threshold: usize,
    /// Approximate point count after downsampling
    pub timeline_target_points: usize,
    /// Entries kept by the alert time-format cache
    pub time_cache_entries: usize,
}

/// Search overlay tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub debounce_ms: u64,
    /// Terms shorter than this reset highlighting instead of searching
    pub min_term_len: usize,
}

/// Toast and overlay timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub toast_ms: u64,
    /// Delay between a 100% progress signal and the overlay closing
    pub progress_close_grace_ms: u64,
    pub line_highlight_ms: u64,
    pub card_highlight_ms: u64,
    /// How long a background job may go without progress before a waiting
    /// command gives up on it
    pub job_stall_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8765".to_string(),
            signal_poll_ms: 250,
            log_file: None,
            dashboard: DashboardConfig::default(),
            search: SearchConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            auto_update_interval_ms: 5000,
            push_throttle_ms: 2000,
            push_debounce_ms: 500,
            max_alerts: 15,
            top_entries: 8,
            timeline_threshold: 60,
            timeline_target_points: 50,
            time_cache_entries: 100,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            min_term_len: 2,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            toast_ms: 5000,
            progress_close_grace_ms: 1000,
            line_highlight_ms: 3000,
            card_highlight_ms: 1000,
            job_stall_ms: 120_000,
        }
    }
}

impl Config {
    /// `~/.netsentry`
    pub fn base_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".netsentry"))
    }

    /// `~/.netsentry/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        Self::base_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> SentryResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location, falling back to defaults
    /// when no file exists. A file that exists but fails to parse is an error.
    pub fn load_or_default(path: Option<&Path>) -> SentryResult<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        match candidate {
            Some(p) if p.exists() => {
                log::debug!("loading config from {}", p.display());
                Self::load(&p)
            }
            Some(p) if path.is_some() => Err(SentryError::NotFound(format!(
                "config file {}",
                p.display()
            ))),
            _ => Ok(Self::default()),
        }
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> SentryResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> SentryResult<()> {
        if self.search.min_term_len == 0 {
            return Err(SentryError::Config(
                "search.min_term_len must be at least 1".to_string(),
            ));
        }
        if self.dashboard.timeline_target_points == 0 {
            return Err(SentryError::Config(
                "dashboard.timeline_target_points must be positive".to_string(),
            ));
        }
        if self.dashboard.top_entries == 0 || self.dashboard.max_alerts == 0 {
            return Err(SentryError::Config(
                "dashboard.top_entries and dashboard.max_alerts must be positive".to_string(),
            ));
        }
        if self.notifications.job_stall_ms == 0 {
            return Err(SentryError::Config(
                "notifications.job_stall_ms must be positive".to_string(),
            ));
        }
        if self.dashboard.auto_update_interval_ms == 0 {
            return Err(SentryError::Config(
                "dashboard.auto_update_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn signal_poll_interval(&self) -> Duration {
        Duration::from_millis(self.signal_poll_ms)
    }

    /// Effective log file path
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .clone()
            .or_else(|| Self::base_dir().map(|dir| dir.join("netsentry.log")))
    }
}

impl DashboardConfig {
    pub fn auto_update_interval(&self) -> Duration {
        Duration::from_millis(self.auto_update_interval_ms)
    }

    pub fn push_throttle(&self) -> Duration {
        Duration::from_millis(self.push_throttle_ms)
    }

    pub fn push_debounce(&self) -> Duration {
        Duration::from_millis(self.push_debounce_ms)
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl NotificationConfig {
    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_ms)
    }

    pub fn progress_close_grace(&self) -> Duration {
        Duration::from_millis(self.progress_close_grace_ms)
    }

    pub fn line_highlight(&self) -> Duration {
        Duration::from_millis(self.line_highlight_ms)
    }

    pub fn card_highlight(&self) -> Duration {
        Duration::from_millis(self.card_highlight_ms)
    }

    pub fn job_stall(&self) -> Duration {
        Duration::from_millis(self.job_stall_ms)
    }
}
