//! Multi-level cache configuration
//!
//! Precedence: defaults, then the optional file, then `SHELFCACHE__*`
//! environment variables (e.g. `SHELFCACHE__MAX_SIZE_MB=64`).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use shelfcache::{EvictionPolicy, L1Config};

use crate::error::ConfigError;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SHELFCACHE";

const DEFAULT_MAX_SIZE_MB: u64 = 100;
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_L1_TTL_SECS: u64 = 300;
const DEFAULT_L2_TTL_SECS: u64 = 3600;
const DEFAULT_PROMOTION_THRESHOLD: u32 = 3;

/// Construction-time options of a [`MultiLevelCache`](crate::MultiLevelCache)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// L1 size limit in megabytes
    pub max_size_mb: u64,
    /// L1 entry limit
    pub max_entries: usize,
    /// L1 eviction policy
    pub eviction_policy: EvictionPolicy,
    /// TTL for direct L1 inserts without one; `None` disables expiry
    pub default_ttl_secs: Option<u64>,
    /// TTL of values written into L1 by the multi-level cache
    pub l1_ttl_secs: u64,
    /// TTL of values written into L2
    pub l2_ttl_secs: u64,
    /// L2 hits needed before a value is copied into L1
    pub promotion_threshold: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_entries: DEFAULT_MAX_ENTRIES,
            eviction_policy: EvictionPolicy::default(),
            default_ttl_secs: Some(DEFAULT_TTL_SECS),
            l1_ttl_secs: DEFAULT_L1_TTL_SECS,
            l2_ttl_secs: DEFAULT_L2_TTL_SECS,
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
        }
    }
}

impl CacheConfig {
    /// Load from an optional file plus `SHELFCACHE__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, ENV_PREFIX)
    }

    /// Load with a custom environment prefix
    pub fn load_with(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config: CacheConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no cache can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size_mb == 0 {
            return Err(ConfigError::invalid("max_size_mb", "must be greater than zero"));
        }
        if self.promotion_threshold == 0 {
            return Err(ConfigError::invalid("promotion_threshold", "must be at least 1"));
        }
        if self.l1_ttl_secs == 0 {
            return Err(ConfigError::invalid("l1_ttl_secs", "must be greater than zero"));
        }
        if self.l2_ttl_secs == 0 {
            return Err(ConfigError::invalid("l2_ttl_secs", "must be greater than zero"));
        }
        if self.default_ttl_secs == Some(0) {
            return Err(ConfigError::invalid(
                "default_ttl_secs",
                "must be greater than zero or unset",
            ));
        }
        Ok(())
    }

    /// Settings for the L1 engine
    pub fn l1_config(&self) -> L1Config {
        L1Config::default()
            .with_max_size_mb(self.max_size_mb)
            .with_max_entries(self.max_entries)
            .with_policy(self.eviction_policy)
            .with_default_ttl(self.default_ttl())
    }

    /// Default L1 TTL
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// TTL of L1 writes
    pub fn l1_ttl(&self) -> Duration {
        Duration::from_secs(self.l1_ttl_secs)
    }

    /// TTL of L2 writes
    pub fn l2_ttl(&self) -> Duration {
        Duration::from_secs(self.l2_ttl_secs)
    }
}
