//! L1 cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::eviction::EvictionPolicy;

const DEFAULT_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Capacity limits, eviction policy and default TTL of an L1 cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct L1Config {
    /// Upper bound on the sum of entry sizes
    pub max_size_bytes: u64,
    /// Upper bound on the number of entries; zero disables caching
    pub max_entries: usize,
    /// Victim selection rule
    pub eviction_policy: EvictionPolicy,
    /// TTL applied when `set` is called without one
    pub default_ttl: Option<Duration>,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            max_entries: DEFAULT_MAX_ENTRIES,
            eviction_policy: EvictionPolicy::default(),
            default_ttl: Some(DEFAULT_TTL),
        }
    }
}

impl L1Config {
    /// Set the size limit in megabytes (MiB)
    pub fn with_max_size_mb(mut self, mb: u64) -> Self {
        self.max_size_bytes = mb.saturating_mul(1024 * 1024);
        self
    }

    /// Set the size limit in bytes
    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set the entry limit
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the eviction policy
    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Set the default TTL (`None` keeps entries until evicted)
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }
}
