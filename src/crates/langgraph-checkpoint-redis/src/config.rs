//! Saver configuration
//!
//! [`RedisSaverConfig`] is a plain serde struct. Every field has a default, so
//! a TOML file only needs the values it changes:
//!
//! ```toml
//! url = "redis://cache.internal:6379/2"
//! ttl_seconds = 3600
//! unknown_type_policy = "lenient"
//! ```
//!
//! Environment variables override file values when applied with
//! [`RedisSaverConfig::apply_env`]:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CHECKPOINT_REDIS_URL` | `url` |
//! | `CHECKPOINT_TTL_SECONDS` | `ttl_seconds` |
//! | `CHECKPOINT_SCAN_COUNT` | `scan_count` |
//! | `CHECKPOINT_UNKNOWN_TYPE_POLICY` | `unknown_type_policy` |

use langgraph_checkpoint::{CheckpointCodec, CheckpointError, Result, UnknownTypePolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_REDIS_URL: &str = "CHECKPOINT_REDIS_URL";
pub const ENV_TTL_SECONDS: &str = "CHECKPOINT_TTL_SECONDS";
pub const ENV_SCAN_COUNT: &str = "CHECKPOINT_SCAN_COUNT";
pub const ENV_UNKNOWN_TYPE_POLICY: &str = "CHECKPOINT_UNKNOWN_TYPE_POLICY";

/// Configuration for [`RedisCheckpointSaver`](crate::RedisCheckpointSaver)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisSaverConfig {
    /// Redis connection URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Sliding expiry applied on every write and every `get_tuple`
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// `COUNT` hint per `SCAN` page during `list`
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,

    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Pool wait/connect timeout
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// What to do with values the codec cannot represent
    #[serde(default)]
    pub unknown_type_policy: UnknownTypePolicy,

    /// Retry with JSON when bincode cannot encode a record
    #[serde(default = "default_true")]
    pub json_fallback: bool,

    /// Optional cap on bincode payload size; larger records take the JSON path
    #[serde(default)]
    pub max_binary_size: Option<u64>,

    /// Whether `list` also refreshes the TTL of the checkpoints it yields
    #[serde(default)]
    pub refresh_ttl_on_list: bool,
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_ttl_seconds() -> u64 {
    86_400
}

fn default_scan_count() -> usize {
    100
}

fn default_max_connections() -> usize {
    16
}

fn default_connection_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl Default for RedisSaverConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            ttl_seconds: default_ttl_seconds(),
            scan_count: default_scan_count(),
            max_connections: default_max_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            unknown_type_policy: UnknownTypePolicy::default(),
            json_fallback: default_true(),
            max_binary_size: None,
            refresh_ttl_on_list: false,
        }
    }
}

impl RedisSaverConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    pub fn with_unknown_type_policy(mut self, policy: UnknownTypePolicy) -> Self {
        self.unknown_type_policy = policy;
        self
    }

    pub fn with_json_fallback(mut self, enabled: bool) -> Self {
        self.json_fallback = enabled;
        self
    }

    pub fn with_max_binary_size(mut self, limit: u64) -> Self {
        self.max_binary_size = Some(limit);
        self
    }

    pub fn with_refresh_ttl_on_list(mut self, enabled: bool) -> Self {
        self.refresh_ttl_on_list = enabled;
        self
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CheckpointError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub async fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CheckpointError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Overlay `CHECKPOINT_*` environment variables
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup`, which maps variable names to values
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_REDIS_URL) {
            self.url = url;
        }
        if let Some(raw) = lookup(ENV_TTL_SECONDS) {
            self.ttl_seconds = parse_env(ENV_TTL_SECONDS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SCAN_COUNT) {
            self.scan_count = parse_env(ENV_SCAN_COUNT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_UNKNOWN_TYPE_POLICY) {
            self.unknown_type_policy = raw.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the saver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(CheckpointError::Config("url must not be empty".to_string()));
        }
        if self.ttl_seconds == 0 {
            return Err(CheckpointError::Config(
                "ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.scan_count == 0 {
            return Err(CheckpointError::Config(
                "scan_count must be greater than 0".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(CheckpointError::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Codec configured from the policy and fallback settings
    pub fn codec(&self) -> CheckpointCodec {
        let codec = CheckpointCodec::new(self.unknown_type_policy).with_json_fallback(self.json_fallback);
        match self.max_binary_size {
            Some(limit) => codec.with_binary_limit(limit),
            None => codec,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| CheckpointError::Config(format!("{}={:?}: {}", name, raw, e)))
}
