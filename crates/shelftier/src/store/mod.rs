//! Backing (L2) key-value stores
//!
//! [`MultiLevelCache`](crate::MultiLevelCache) only talks to L2 through
//! [`L2Store`]; any shared key-value store that can implement these six
//! operations will do.

mod glob;
mod memory;
pub mod resp;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use glob::glob_match;
pub use memory::MemoryStore;
pub use resp::RespStore;

/// Contract of a shared second-level store
#[async_trait]
pub trait L2Store: Send + Sync {
    /// Fetch a value, `None` if absent or expired
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store a value that expires after `ttl`
    async fn set_with_ttl(&self, key: &str, ttl: Duration, value: Vec<u8>) -> StoreResult<()>;

    /// Remove a key (absent keys are not an error)
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Remove every key
    async fn flush_all(&self) -> StoreResult<()>;

    /// Keys matching a glob pattern (`*`, `?`)
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Free-form server information
    async fn info(&self) -> StoreResult<HashMap<String, String>>;
}

/// Whole seconds for an expiry, rounded up and at least one
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}
