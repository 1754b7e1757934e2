//! Railwatch configuration system.
//!
//! Values come from `~/.railwatch/config.toml` (every field optional) and are
//! then overridden by environment variables. `validate` decides what is fatal.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RailwatchError, Result};
use crate::types::normalize_station_code;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RailwatchConfig {
    /// Poll interval in milliseconds. Required; must be positive.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub global: GlobalTargetConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl RailwatchConfig {
    /// Load from `path` if it exists, otherwise start from defaults.
    /// Environment overrides are applied either way.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RailwatchError::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| RailwatchError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get("POLL_INTERVAL_MS") {
            let parsed = raw.trim().parse::<u64>().map_err(|_| {
                RailwatchError::Config(format!(
                    "POLL_INTERVAL_MS must be a positive integer, got: {raw}"
                ))
            })?;
            self.poll_interval_ms = Some(parsed);
        }
        if let Some(v) = get("STATION_CRS") {
            self.global.station_crs = Some(v);
        }
        if let Some(v) = get("SLACK_CHANNEL_ID") {
            self.global.channel_id = Some(v);
        }
        if let Some(v) = get("SLACK_BOT_TOKEN") {
            self.slack.bot_token = v;
        }
        if let Some(v) = get("SLACK_TEAM_ID") {
            self.slack.team_id = v;
        }
        if let Some(v) = get("NATIONAL_RAIL_API_KEY") {
            self.feed.api_key = v;
        }
        if let Some(v) = get("NATIONAL_RAIL_API_URL") {
            self.feed.api_url = v;
        }
        if let Some(v) = get("RAILWATCH_DB_PATH") {
            self.ledger.db_path = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log.level = v;
        }
        Ok(())
    }

    /// Reject configurations the poller cannot start with.
    /// Slack credentials are only required when messages are really sent.
    pub fn validate(&self, dry_run: bool) -> Result<()> {
        self.poll_interval()?;

        if self.feed.api_url.trim().is_empty() {
            return Err(RailwatchError::Config(
                "feed.api_url (NATIONAL_RAIL_API_URL) is missing".into(),
            ));
        }
        if !dry_run && self.slack.bot_token.trim().is_empty() {
            return Err(RailwatchError::Config(
                "slack.bot_token (SLACK_BOT_TOKEN) is missing".into(),
            ));
        }
        match self.ledger.backend.as_str() {
            "sqlite" | "memory" => {}
            other => {
                return Err(RailwatchError::Config(format!(
                    "ledger.backend must be \"sqlite\" or \"memory\", got: {other}"
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        match self.poll_interval_ms {
            Some(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            Some(ms) => Err(RailwatchError::Config(format!(
                "poll_interval_ms must be a positive integer, got: {ms}"
            ))),
            None => Err(RailwatchError::Config(
                "poll_interval_ms (POLL_INTERVAL_MS) is missing".into(),
            )),
        }
    }

    /// The global (channel, station) pair, if both halves are configured.
    pub fn global_target(&self) -> Option<(String, String)> {
        let channel = self.global.channel_id.as_deref().map(str::trim).unwrap_or("");
        let station = self.global.station_crs.as_deref().map(str::trim).unwrap_or("");
        match (channel.is_empty(), station.is_empty()) {
            (false, false) => Some((channel.to_string(), normalize_station_code(station))),
            (true, true) => None,
            _ => {
                tracing::warn!(
                    "Global monitoring needs both STATION_CRS and SLACK_CHANNEL_ID; skipping it"
                );
                None
            }
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Railwatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".railwatch")
    }

    /// Ledger database path with `~` expanded.
    pub fn db_path(&self) -> PathBuf {
        expand_path(&self.ledger.db_path)
    }
}

pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String { "info".into() }
fn default_log_format() -> String { "pretty".into() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// The statically configured station/channel pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalTargetConfig {
    #[serde(default)]
    pub station_crs: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// Slack Web API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_slack_api_base() -> String { "https://slack.com/api".into() }
fn default_http_timeout() -> u64 { 10 }

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            team_id: String::new(),
            api_base: default_slack_api_base(),
            timeout_secs: default_http_timeout(),
        }
    }
}

/// Incident feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_stations_url")]
    pub stations_url: String,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

fn default_stations_url() -> String {
    "https://raw.githubusercontent.com/davwheat/uk-railway-stations/main/stations.json".into()
}
fn default_feed_timeout() -> u64 { 30 }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            stations_url: default_stations_url(),
            timeout_secs: default_feed_timeout(),
        }
    }
}

/// Delivery ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// "sqlite" or "memory".
    #[serde(default = "default_ledger_backend")]
    pub backend: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_ledger_backend() -> String { "sqlite".into() }
fn default_db_path() -> String { "~/.railwatch/railwatch.db".into() }

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: default_ledger_backend(),
            db_path: default_db_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn valid() -> RailwatchConfig {
        let mut config = RailwatchConfig::default();
        config
            .apply_env(env(&[
                ("POLL_INTERVAL_MS", "300000"),
                ("NATIONAL_RAIL_API_URL", "http://api"),
                ("SLACK_BOT_TOKEN", "xoxb-test"),
            ]))
            .unwrap();
        config
    }

    #[test]
    fn test_default_config() {
        let config = RailwatchConfig::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.ledger.backend, "sqlite");
        assert_eq!(config.slack.api_base, "https://slack.com/api");
        assert!(config.poll_interval_ms.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            poll_interval_ms = 60000

            [global]
            station_crs = "wat"
            channel_id = "C123"

            [feed]
            api_url = "https://feed.example/nsi"

            [ledger]
            backend = "memory"
        "#;

        let config: RailwatchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.poll_interval().unwrap(), Duration::from_millis(60000));
        assert_eq!(config.global_target(), Some(("C123".into(), "WAT".into())));
        assert_eq!(config.ledger.backend, "memory");
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_env_overrides_and_validates() {
        let config = valid();
        assert_eq!(config.poll_interval_ms, Some(300000));
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_non_numeric_interval_is_fatal() {
        let mut config = RailwatchConfig::default();
        let err = config
            .apply_env(env(&[("POLL_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("POLL_INTERVAL_MS"));
    }

    #[test]
    fn test_zero_or_missing_interval_is_rejected() {
        let mut config = valid();
        config.poll_interval_ms = Some(0);
        assert!(config.validate(false).is_err());
        config.poll_interval_ms = None;
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_missing_bot_token_only_matters_when_sending() {
        let mut config = valid();
        config.slack.bot_token.clear();
        assert!(config.validate(false).is_err());
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_unknown_ledger_backend_rejected() {
        let mut config = valid();
        config.ledger.backend = "firestore".into();
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_half_configured_global_target_is_skipped() {
        let mut config = valid();
        config.global.station_crs = Some("WAT".into());
        assert_eq!(config.global_target(), None);
        config.global.channel_id = Some("C123".into());
        assert_eq!(config.global_target(), Some(("C123".into(), "WAT".into())));
    }

    #[test]
    fn test_home_dir() {
        let home = RailwatchConfig::home_dir();
        assert!(home.to_string_lossy().contains("railwatch"));
        assert!(RailwatchConfig::default_path().ends_with("config.toml"));
    }
}
