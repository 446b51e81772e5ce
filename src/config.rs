//! Configuration
//!
//! Defaults, then an optional JSON file, then environment overrides.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Graph `$batch` accepts at most this many sub-requests
pub const MAX_BATCH_LIMIT: usize = 20;

/// Upper bound for concurrently in-flight batches
pub const MAX_CONCURRENT_BATCHES: usize = 4;

/// Longest rate-limit wait honoured, whatever the server or config asks for
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Default Graph endpoint (Intune assignment APIs live on beta)
pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/beta";

/// Tuning for the bulk operation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sub-requests per batch
    pub batch_limit: usize,
    /// Retries for transient failures, per item
    pub retry_limit: u32,
    /// Wait applied when a 429 carries no `Retry-After`
    pub default_retry_after_secs: u64,
    /// Delay between the last write and the verification refresh
    pub post_submit_settle_secs: u64,
    /// Batches allowed in flight at once
    pub max_concurrent_batches: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_limit: MAX_BATCH_LIMIT,
            retry_limit: 3,
            default_retry_after_secs: 10,
            post_submit_settle_secs: 2,
            max_concurrent_batches: 1,
        }
    }
}

impl EngineConfig {
    /// `default_retry_after_secs` as a duration
    pub const fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }

    /// `post_submit_settle_secs` as a duration
    pub const fn post_submit_settle(&self) -> Duration {
        Duration::from_secs(self.post_submit_settle_secs)
    }

    /// Reject values the remote API or the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BATCH_LIMIT).contains(&self.batch_limit) {
            return Err(Error::Config(format!(
                "batch_limit must be between 1 and {MAX_BATCH_LIMIT}, got {}",
                self.batch_limit
            )));
        }
        if self.default_retry_after() > MAX_RETRY_AFTER {
            return Err(Error::Config(format!(
                "default_retry_after_secs must be at most {}, got {}",
                MAX_RETRY_AFTER.as_secs(),
                self.default_retry_after_secs
            )));
        }
        if !(1..=MAX_CONCURRENT_BATCHES).contains(&self.max_concurrent_batches) {
            return Err(Error::Config(format!(
                "max_concurrent_batches must be between 1 and {MAX_CONCURRENT_BATCHES}, got {}",
                self.max_concurrent_batches
            )));
        }
        Ok(())
    }
}

/// Full configuration for the CLI and the Graph transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Graph base URL, without trailing slash
    pub graph_base_url: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Engine tuning
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graph_base_url: DEFAULT_GRAPH_URL.to_string(),
            request_timeout_secs: 30,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location (`<config dir>/bulk-assign/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bulk-assign").join("config.json"))
    }

    /// Load configuration
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `BULK_ASSIGN_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("BULK_ASSIGN_GRAPH_URL") {
            self.graph_base_url = url;
        }
        if let Some(v) = env_number("BULK_ASSIGN_BATCH_LIMIT")? {
            self.engine.batch_limit = v;
        }
        if let Some(v) = env_number("BULK_ASSIGN_RETRY_LIMIT")? {
            self.engine.retry_limit = v;
        }
        if let Some(v) = env_number("BULK_ASSIGN_CONCURRENCY")? {
            self.engine.max_concurrent_batches = v;
        }
        Ok(())
    }

    /// Validate the base URL and the engine settings
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.graph_base_url)?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(Error::Config(format!(
                "graph_base_url must be http(s), got {}",
                url.scheme()
            )));
        }
        self.engine.validate()
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.graph_base_url.trim_end_matches('/')
    }

    /// `request_timeout_secs` as a duration
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} must be a number, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}
