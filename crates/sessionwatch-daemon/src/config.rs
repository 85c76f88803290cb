//! Daemon configuration.

use anyhow::Result;
use serde::Deserialize;
use sessionwatch_core::MonitorConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_projects_dir")]
    pub projects_dir: PathBuf,
    #[serde(default = "default_signals_dir")]
    pub signals_dir: PathBuf,
    #[serde(default = "default_transcript_debounce_ms")]
    pub transcript_debounce_ms: u64,
    #[serde(default = "default_signal_debounce_ms")]
    pub signal_debounce_ms: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,
    #[serde(default = "default_git_cache_ttl_secs")]
    pub git_cache_ttl_secs: u64,
    /// Sessions quiet for longer than this are published as idle.
    #[serde(default = "default_idle_after_secs")]
    pub idle_after_secs: u64,
    /// Skip transcripts older than this at startup. `0` scans everything.
    #[serde(default = "default_initial_scan_max_age_hours")]
    pub initial_scan_max_age_hours: Option<u64>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn claude_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
}

fn default_projects_dir() -> PathBuf {
    claude_dir().join("projects")
}

fn default_signals_dir() -> PathBuf {
    claude_dir().join("session-signals")
}

fn default_transcript_debounce_ms() -> u64 {
    200
}

fn default_signal_debounce_ms() -> u64 {
    500
}

fn default_sweep_interval_secs() -> u64 {
    10
}

fn default_stale_threshold_secs() -> u64 {
    15
}

fn default_git_cache_ttl_secs() -> u64 {
    5
}

fn default_idle_after_secs() -> u64 {
    300
}

fn default_initial_scan_max_age_hours() -> Option<u64> {
    Some(24)
}

fn default_event_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            projects_dir: default_projects_dir(),
            signals_dir: default_signals_dir(),
            transcript_debounce_ms: default_transcript_debounce_ms(),
            signal_debounce_ms: default_signal_debounce_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stale_threshold_secs: default_stale_threshold_secs(),
            git_cache_ttl_secs: default_git_cache_ttl_secs(),
            idle_after_secs: default_idle_after_secs(),
            initial_scan_max_age_hours: default_initial_scan_max_age_hours(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }

    pub fn idle_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_after_secs as i64)
    }

    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            projects_dir: self.projects_dir.clone(),
            signals_dir: self.signals_dir.clone(),
            transcript_debounce: Duration::from_millis(self.transcript_debounce_ms),
            signal_debounce: Duration::from_millis(self.signal_debounce_ms),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            stale_threshold: Duration::from_secs(self.stale_threshold_secs),
            git_cache_ttl: Duration::from_secs(self.git_cache_ttl_secs),
            initial_scan_max_age: self
                .initial_scan_max_age_hours
                .filter(|hours| *hours > 0)
                .map(|hours| Duration::from_secs(hours * 60 * 60)),
            event_capacity: self.event_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessionwatch.toml");
        std::fs::write(
            &path,
            "signals_dir = \"/tmp/signals\"\nstale_threshold_secs = 30\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.signals_dir, PathBuf::from("/tmp/signals"));
        assert_eq!(config.stale_threshold_secs, 30);
        assert_eq!(config.signal_debounce_ms, 500);
        assert_eq!(config.initial_scan_max_age_hours, Some(24));
        assert!(config.projects_dir.ends_with(".claude/projects"));
    }

    #[test]
    fn test_monitor_config_conversion() {
        let config = Config {
            sweep_interval_secs: 0,
            initial_scan_max_age_hours: None,
            ..Config::default()
        };
        let monitor = config.to_monitor_config();
        assert_eq!(monitor.transcript_debounce, Duration::from_millis(200));
        assert_eq!(monitor.stale_threshold, Duration::from_secs(15));
        assert_eq!(monitor.sweep_interval, Duration::from_secs(1));
        assert_eq!(monitor.initial_scan_max_age, None);
        assert_eq!(config.idle_after(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "stale_threshold_secs = \"soon\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
