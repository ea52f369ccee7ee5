//! # shelftier
//!
//! Multi-level cache built on [`shelfcache`]: a bounded in-process L1 in
//! front of a shared key-value store (L2).
//!
//! ## Architecture
//! - **MultiLevelCache**: L1, then L2, then an optional fallback; hot L2
//!   values are promoted into L1
//! - **L2 stores**: any [`L2Store`]; [`MemoryStore`] in process,
//!   [`RespStore`] for Redis-compatible servers
//! - **Warming**: named generators run concurrently by [`WarmingCoordinator`]
//!
//! The cache never fails a caller. Backing store, codec and fallback errors
//! are logged with `tracing`, counted in [`TierStats`] and degrade to a miss
//! or a failed write.

#![warn(missing_docs)]

mod config;
mod error;
mod key;
mod multi_level;
mod report;
mod stats;
pub mod store;
mod warming;

pub use config::{CacheConfig, ENV_PREFIX};
pub use error::{CacheError, ConfigError, ErrorKind, StoreError, StoreResult};
pub use key::{normalize_key, warming_signature, MAX_KEY_LEN};
pub use multi_level::{
    fallback, CacheValue, Fallback, MultiLevelCache, MultiLevelCacheBuilder, MAX_TRACKED_SIGNATURES,
    ORIGIN_METADATA_KEY,
};
pub use report::{ComprehensiveStats, L2Report, PromotionReport, SignatureCount, WarmingSummary};
pub use stats::{TierStats, TierStatsSnapshot};
pub use store::{L2Store, MemoryStore, RespStore};
pub use warming::{Priority, WarmingCoordinator, WarmingGenerator, WarmingReport};

pub use shelfcache::{CacheStats, EfficiencyReport, EvictionPolicy, L1Cache, L1Config};
