//! Runtime configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or none at all) yields a working setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between successive refresh passes of one session.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Milliseconds between cancellation/presence checks while waiting.
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
    /// Seconds before the target start time at which a session gives up.
    #[serde(default = "default_cutoff_lead_secs")]
    pub cutoff_lead_secs: u64,
    /// Grace period granted when the computed cutoff is already in the past,
    /// so the worker still performs at least one refresh pass.
    #[serde(default = "default_min_grace_secs")]
    pub min_grace_secs: u64,
    /// Run browser instances headless.
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_refresh_interval_secs() -> u64 {
    610
}

fn default_poll_interval_millis() -> u64 {
    1000
}

fn default_cutoff_lead_secs() -> u64 {
    300
}

fn default_min_grace_secs() -> u64 {
    5
}

fn default_headless() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            poll_interval_millis: default_poll_interval_millis(),
            cutoff_lead_secs: default_cutoff_lead_secs(),
            min_grace_secs: default_min_grace_secs(),
            headless: default_headless(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis.max(1))
    }

    pub fn cutoff_lead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cutoff_lead_secs as i64)
    }

    pub fn min_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.min_grace_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_for_missing_fields() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.refresh_interval_secs, 610);
        assert_eq!(config.poll_interval_millis, 1000);
        assert_eq!(config.cutoff_lead_secs, 300);
        assert_eq!(config.min_grace_secs, 5);
        assert!(config.headless);
    }

    #[test]
    fn overrides_are_honoured() {
        let config: Config =
            toml::from_str("refresh_interval_secs = 30\nheadless = false\n").unwrap();
        assert_eq!(config.refresh_interval_secs, 30);
        assert!(!config.headless);
        // untouched fields keep their defaults
        assert_eq!(config.cutoff_lead_secs, 300);
    }

    #[test]
    fn load_reads_a_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_millis = 50").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn poll_interval_never_zero() {
        let config = Config {
            poll_interval_millis: 0,
            ..Config::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
