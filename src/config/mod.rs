//! Configuration management for fairway.
//!
//! Configuration is read from `~/.config/fairway/config.toml` at startup
//! (or the path given with `--config`). If the file doesn't exist, a default
//! configuration with comments is created. Missing fields use defaults.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::allocator::AllocatorConfig;
use crate::classifier::RetryConfig;
use crate::history::HistoryConfig;
use crate::monitor::MonitorConfig;
use crate::pipeline::PipelineConfig;

/// Where content, ledgers and discovery lists live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the date buckets (default: "golf_content")
    pub content_dir: PathBuf,
    /// Ledgers, lock and number cache (default: same as content_dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Directory scanned for `deep_urls_*.txt` (default: ".")
    pub url_list_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("golf_content"),
            state_dir: None,
            url_list_dir: PathBuf::from("."),
        }
    }
}

impl PathsConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.content_dir.clone())
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub history: HistoryConfig,
    pub allocator: AllocatorConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from `path`.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::create_default_config(path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Write the configuration back to `path`. Comments are not preserved.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        crate::store::write_atomic(path, content.as_bytes()).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })
    }

    /// Persist new monitor thresholds into the file at `path`.
    pub fn set_thresholds(
        path: &Path,
        warning: Option<usize>,
        critical: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        if let Some(warning) = warning {
            config.monitor.warning_threshold = warning;
        }
        if let Some(critical) = critical {
            config.monitor.critical_threshold = critical;
        }
        config.validate()?;
        config.save_to(path)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.warning_threshold > self.monitor.critical_threshold {
            return Err(ConfigError::Invalid(format!(
                "monitor.warning_threshold ({}) exceeds monitor.critical_threshold ({})",
                self.monitor.warning_threshold, self.monitor.critical_threshold
            )));
        }
        if self.pipeline.workers == 0 {
            return Err(ConfigError::Invalid("pipeline.workers must be at least 1".into()));
        }
        Ok(())
    }

    /// Get the default config file path: `~/.config/fairway/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("fairway").join("config.toml"))
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# fairway configuration
#
# Relative paths are resolved against the working directory.

[paths]
# Date buckets (YYYY-MM-DD) with rendered articles and article_urls.json
content_dir = "golf_content"

# failed_articles.json, master_history_database.json and the number lock.
# Defaults to content_dir.
# state_dir = "golf_content"

# Directory scanned for deep_urls_*.txt discovery lists
url_list_dir = "."

[history]
# Artifacts at or below this size (bytes) do not count as processed
min_artifact_size = 1024

# Seconds before the processed-URL index is rebuilt
cache_ttl_secs = 300

# Soft cap on indexed URLs; the oldest 10% are evicted above it
max_entries = 10000

[allocator]
# Lock polling interval (milliseconds)
poll_interval_ms = 50

# A lock file older than this (seconds) is treated as abandoned
stale_lock_secs = 5

# Give up waiting for the lock after this many seconds
lock_wait_timeout_secs = 30

# Trust the cached article number for this many seconds
cache_ttl_secs = 300

[retry]
# Attempts before a retryable failure becomes permanent
max_retries = 3

# Days without an attempt before an unclassified failure is stale
stale_after_days = 7

# Seconds before a URL stuck in "processing" is picked up again
processing_lease_secs = 3600

[pipeline]
# Concurrent fetch/write workers
workers = 5

# Minimum visible text length (characters) for an article
min_content_length = 200

# Per-request timeout (seconds)
request_timeout_secs = 30

[monitor]
# Seconds between queue checks
interval_secs = 300

# Pending URL counts for warning / critical state
warning_threshold = 50
critical_threshold = 200

# Run the failure filter automatically when the queue is critical
auto_clean = false
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
