//! Configuration file parser for ~/.config/feedreader/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which has no feeds. Unknown keys are accepted by serde and logged as
//! warnings so typos are noticed. Every feed URL is validated at load time.
use crate::util::FeedUrl;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Also covers feed URLs that fail validation.
    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A setting parsed but has a value that cannot work.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration. Only the `[feedreader]` table is read.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feedreader: FeedReaderConfig,
}

/// The `[feedreader]` table.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedReaderConfig {
    /// Feeds to poll, one manager each. Each keeps its configured spelling,
    /// which is what subscribers see as `feed_url`.
    #[serde(deserialize_with = "deserialize_urls")]
    pub urls: Vec<FeedUrl>,

    /// Per-request timeout for feed fetches, in seconds. Must be non-zero.
    pub request_timeout_secs: u64,

    /// Largest feed body that will be downloaded, in bytes. Must be non-zero.
    pub max_feed_size_bytes: usize,

    /// How many events a slow bus subscriber may lag behind before losing some.
    ///
    /// Startup fetches every feed back to back and publishes each entry in it,
    /// so this should exceed the total entry count of all configured feeds;
    /// a subscriber that falls further behind loses the oldest events.
    pub event_bus_capacity: usize,
}

impl Default for FeedReaderConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            request_timeout_secs: 30,
            max_feed_size_bytes: crate::feed::DEFAULT_MAX_FEED_SIZE,
            event_bus_capacity: crate::bus::DEFAULT_CAPACITY,
        }
    }
}

fn deserialize_urls<'de, D>(deserializer: D) -> Result<Vec<FeedUrl>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|s| {
            FeedUrl::parse(s)
                .map_err(|e| serde::de::Error::custom(format!("invalid feed URL '{s}': {e}")))
        })
        .collect()
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_TOP_LEVEL_KEYS: [&'static str; 1] = ["feedreader"];
    const KNOWN_FEEDREADER_KEYS: [&'static str; 4] = [
        "urls",
        "request_timeout_secs",
        "max_feed_size_bytes",
        "event_bus_capacity",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML or an invalid feed URL → `Err(ConfigError::Parse)`
    /// - Zero timeout, size limit or bus capacity → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading
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
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feedreader.urls.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from TOML text. Blank text yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw, &Self::KNOWN_TOP_LEVEL_KEYS, None);
            if let Some(toml::Value::Table(section)) = raw.get("feedreader") {
                warn_unknown_keys(section, &Self::KNOWN_FEEDREADER_KEYS, Some("feedreader"));
            }
        }

        let config: Config = toml::from_str(content)?;
        config.feedreader.validate()?;
        Ok(config)
    }
}

impl FeedReaderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("request_timeout_secs", self.request_timeout_secs == 0),
            ("max_feed_size_bytes", self.max_feed_size_bytes == 0),
            ("event_bus_capacity", self.event_bus_capacity == 0),
        ];
        for (key, is_zero) in nonzero {
            if is_zero {
                return Err(ConfigError::Invalid(format!(
                    "feedreader.{key} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

fn warn_unknown_keys(table: &toml::Table, known: &[&str], section: Option<&str>) {
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            tracing::warn!(key = %key, section = section.unwrap_or(""), "Unknown key in config file, ignoring");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
