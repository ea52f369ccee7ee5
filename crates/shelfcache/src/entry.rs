//! Cache entry: a value plus the metadata eviction needs

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::size::EstimateSize;

/// A cached value with timestamps, TTL and access bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Key the entry is stored under
    pub key: String,
    /// Cached value
    pub value: V,
    /// Insertion time
    pub created_at: Instant,
    /// Time of the most recent read hit (insertion time until then)
    pub last_accessed: Instant,
    /// Number of read hits
    pub access_count: u64,
    /// Time-to-live measured from `created_at`
    pub ttl: Option<Duration>,
    /// Estimated size, always at least one byte
    pub size_bytes: usize,
    /// Free-form annotations (origin of the value, etc.)
    pub metadata: HashMap<String, Value>,
}

impl<V: EstimateSize> CacheEntry<V> {
    /// Create an entry stamped with the current time
    pub fn new(key: impl Into<String>, value: V, ttl: Option<Duration>) -> Self {
        Self::new_at(key, value, ttl, Instant::now())
    }

    /// Create an entry stamped with `now`
    pub fn new_at(key: impl Into<String>, value: V, ttl: Option<Duration>, now: Instant) -> Self {
        let size_bytes = value.estimate_size().max(1);
        Self {
            key: key.into(),
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl,
            size_bytes,
            metadata: HashMap::new(),
        }
    }
}

impl<V> CacheEntry<V> {
    /// Attach metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// True if the TTL has elapsed
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// True if the TTL has elapsed at `now`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => self.age_at(now) > ttl,
            None => false,
        }
    }

    /// Record a read hit
    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    /// Record a read hit at `now`
    pub fn touch_at(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count += 1;
    }

    /// Time since insertion
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Time since the last read hit
    pub fn idle_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_accessed)
    }
}
