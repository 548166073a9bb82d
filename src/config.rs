//! Configuration file parser for `courtfeed.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged, since they are usually typos.
use crate::bverfg::{DECISION_FEED_URL, SENATE_DECISIONS_URL};
use crate::feed::{ChangePolicy, FeedOptions};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RSS feed of published decisions.
    pub decision_feed_url: String,

    /// Seconds between two polls of the decision feed.
    pub refresh_interval_secs: u64,

    /// Upper bound for a single fetch, in seconds.
    pub fetch_timeout_secs: u64,

    /// `"digest"` or `"timestamp"`.
    pub change_policy: ChangePolicy,

    /// Page listing announced senate decisions.
    pub announcements_url: String,

    /// Local hour (0-23) of the daily outlook. Unset disables it.
    pub outlook_hour: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            decision_feed_url: DECISION_FEED_URL.to_string(),
            refresh_interval_secs: 5,
            fetch_timeout_secs: 10,
            change_policy: ChangePolicy::Digest,
            announcements_url: SENATE_DECISIONS_URL.to_string(),
            outlook_hour: Some(7),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "decision_feed_url",
        "refresh_interval_secs",
        "fetch_timeout_secs",
        "change_policy",
        "announcements_url",
        "outlook_hour",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Bad URLs, zero interval or timeout, hour > 23 → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            feed = %config.decision_feed_url,
            policy = ?config.change_policy,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates TOML content. Blank content yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("decision_feed_url", &self.decision_feed_url)?;
        validate_http_url("announcements_url", &self.announcements_url)?;

        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "refresh_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "fetch_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(hour) = self.outlook_hour {
            if hour > 23 {
                return Err(ConfigError::Invalid {
                    key: "outlook_hour",
                    reason: format!("{} is not an hour of the day", hour),
                });
            }
        }
        Ok(())
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            policy: self.change_policy,
        }
    }
}

fn validate_http_url(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::Invalid {
            key,
            reason: format!("unsupported scheme {} (only http/https allowed)", scheme),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
