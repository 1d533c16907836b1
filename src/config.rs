//! Configuration file parser for ~/.config/sitewatch/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning for each so
//! typos do not go unnoticed.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{ManagerSettings, DEFAULT_MAX_SITEMAP_BYTES, DEFAULT_USER_AGENT};

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
    /// SQLite file backing the key-value store. `None` uses the config directory.
    pub database_path: Option<PathBuf>,

    /// User-Agent header sent with every sitemap request.
    pub user_agent: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted sitemap body, compressed or not.
    pub max_sitemap_bytes: usize,

    /// Pause between feeds during a check pass, in milliseconds.
    pub feed_delay_ms: u64,

    /// Pause between child sitemaps of an index, in milliseconds.
    pub child_delay_ms: u64,

    /// How many levels of nested sitemap indexes are expanded.
    pub max_index_depth: usize,

    /// Minutes between passes in `watch` mode. 0 = run a single pass.
    pub watch_interval_minutes: u64,

    /// Default log filter when RUST_LOG is not set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            max_sitemap_bytes: DEFAULT_MAX_SITEMAP_BYTES,
            feed_delay_ms: 2000,
            child_delay_ms: 1000,
            max_index_depth: 3,
            watch_interval_minutes: 60,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "database_path",
        "user_agent",
        "request_timeout_secs",
        "max_sitemap_bytes",
        "feed_delay_ms",
        "child_delay_ms",
        "max_index_depth",
        "watch_interval_minutes",
        "log_level",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
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
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn feed_delay(&self) -> Duration {
        Duration::from_millis(self.feed_delay_ms)
    }

    /// `None` when watch mode should run a single pass.
    pub fn watch_interval(&self) -> Option<Duration> {
        (self.watch_interval_minutes > 0)
            .then(|| Duration::from_secs(self.watch_interval_minutes.saturating_mul(60)))
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            child_delay: Duration::from_millis(self.child_delay_ms),
            max_index_depth: self.max_index_depth,
            max_sitemap_bytes: self.max_sitemap_bytes,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
