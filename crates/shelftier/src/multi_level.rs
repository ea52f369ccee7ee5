//! MultiLevelCache: L1 in front of a shared L2 store
//!
//! Reads go L1, then L2, then an optional fallback computation whose result
//! is written through to both levels. L2 values are copied into L1 once a key
//! has been read from L2 `promotion_threshold` times.
//!
//! No operation here returns an error. Store, codec and fallback failures are
//! logged, counted in [`TierStats`] and turned into a miss or a failed write.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shelfcache::{EstimateSize, L1Cache};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, ConfigError};
use crate::key::{normalize_key, warming_signature};
use crate::report::{
    ComprehensiveStats, L2Report, PromotionReport, SignatureCount, WarmingSummary,
};
use crate::stats::{TierStats, TierStatsSnapshot};
use crate::store::L2Store;
use crate::warming::{WarmingCoordinator, WarmingReport};

/// Distinct warming signatures remembered; new ones are ignored past this
pub const MAX_TRACKED_SIGNATURES: usize = 1024;

const TOP_SIGNATURES: usize = 10;

/// Metadata key recording how an L1 entry got there
pub const ORIGIN_METADATA_KEY: &str = "origin";

/// Values storable in a [`MultiLevelCache`]
pub trait CacheValue:
    Clone + EstimateSize + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> CacheValue for T where
    T: Clone + EstimateSize + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Computes a value on a miss at both levels
pub type Fallback<V> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<Option<V>>> + Send>;

/// Box an async closure as a [`Fallback`]
pub fn fallback<V, F, Fut>(f: F) -> Fallback<V>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Option<V>>> + Send + 'static,
{
    Box::new(move || f().boxed())
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    Set,
    Promotion,
    Fallback,
}

impl Origin {
    fn metadata(self) -> HashMap<String, Value> {
        let name = match self {
            Origin::Set => "set",
            Origin::Promotion => "promotion",
            Origin::Fallback => "fallback",
        };
        HashMap::from([(ORIGIN_METADATA_KEY.to_string(), Value::from(name))])
    }
}

struct Inner<V> {
    l1: L1Cache<V>,
    l2: Option<Arc<dyn L2Store>>,
    l1_ttl: Duration,
    l2_ttl: Duration,
    promotion_threshold: u32,
    /// L2 hits per key since its last promotion
    promotions: Mutex<HashMap<String, u32, RandomState>>,
    signatures: Mutex<HashMap<String, u64, RandomState>>,
    stats: TierStats,
    warming: Arc<WarmingCoordinator<V>>,
}

/// Two-level cache handle; clones share the same state
pub struct MultiLevelCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for MultiLevelCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Assembles a [`MultiLevelCache`]
pub struct MultiLevelCacheBuilder<V> {
    config: CacheConfig,
    l2: Option<Arc<dyn L2Store>>,
    warming: Option<Arc<WarmingCoordinator<V>>>,
}

impl<V: CacheValue> MultiLevelCacheBuilder<V> {
    /// Attach an L2 store
    pub fn with_l2(mut self, store: Arc<dyn L2Store>) -> Self {
        self.l2 = Some(store);
        self
    }

    /// Use a prepared warming coordinator instead of an empty one
    pub fn with_warming(mut self, coordinator: WarmingCoordinator<V>) -> Self {
        self.warming = Some(Arc::new(coordinator));
        self
    }

    /// Validate the configuration and build the cache
    pub fn build(self) -> Result<MultiLevelCache<V>, ConfigError> {
        self.config.validate()?;

        let inner = Inner {
            l1: L1Cache::new(self.config.l1_config()),
            l2: self.l2,
            l1_ttl: self.config.l1_ttl(),
            l2_ttl: self.config.l2_ttl(),
            promotion_threshold: self.config.promotion_threshold,
            promotions: Mutex::new(HashMap::with_hasher(RandomState::new())),
            signatures: Mutex::new(HashMap::with_hasher(RandomState::new())),
            stats: TierStats::new(),
            warming: self.warming.unwrap_or_default(),
        };
        Ok(MultiLevelCache {
            inner: Arc::new(inner),
        })
    }
}

impl<V: CacheValue> MultiLevelCache<V> {
    /// Start building a cache from `config`
    pub fn builder(config: CacheConfig) -> MultiLevelCacheBuilder<V> {
        MultiLevelCacheBuilder {
            config,
            l2: None,
            warming: None,
        }
    }

    /// L1-only cache with an empty warming registry
    pub fn from_config(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Look a key up in L1, then L2, then compute it with `fallback`
    pub async fn get(&self, key: &str, fallback: Option<Fallback<V>>) -> Option<V> {
        let started = Instant::now();
        let key = normalize_key(key);
        let inner = &self.inner;

        if let Some(value) = inner.l1.get(&key) {
            inner.stats.record_l1_hit(started.elapsed());
            return Some(value);
        }

        match self.fetch_l2(&key).await {
            Ok(Some(value)) => {
                self.count_l2_hit(&key, &value);
                inner.stats.record_l2_hit(started.elapsed());
                return Some(value);
            }
            Ok(None) => {}
            Err(err) => self.recover(&key, "get", &err),
        }

        let Some(fallback) = fallback else {
            inner.stats.record_miss(started.elapsed());
            return None;
        };

        let computed = fallback().await;
        inner.stats.record_miss(started.elapsed());
        match computed {
            Ok(Some(value)) => {
                inner.stats.record_fallback();
                self.write(key, value.clone(), None, None, Origin::Fallback).await;
                Some(value)
            }
            Ok(None) => None,
            Err(err) => {
                self.recover(&key, "fallback", &CacheError::Fallback(err));
                None
            }
        }
    }

    /// Write a value to L1 and, if configured, L2
    ///
    /// TTLs default to the configured `l1_ttl` / `l2_ttl`. True only if L1
    /// accepted the value and L2 is absent or acknowledged the write.
    pub async fn set(&self, key: &str, value: V, l1_ttl: Option<Duration>, l2_ttl: Option<Duration>) -> bool {
        self.write(normalize_key(key), value, l1_ttl, l2_ttl, Origin::Set)
            .await
    }

    /// Remove a key from both levels
    ///
    /// True unless the L2 delete failed; deleting an absent key succeeds.
    pub async fn delete(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.inner.promotions.lock().remove(&key);
        self.inner.l1.delete(&key);

        let Some(l2) = &self.inner.l2 else {
            return true;
        };
        match l2.delete(&key).await {
            Ok(()) => true,
            Err(err) => {
                self.recover(&key, "delete", &err.into());
                false
            }
        }
    }

    /// Empty both levels and drop promotion state
    ///
    /// Flushes the whole L2 store, including keys written by other caches.
    pub async fn clear_all(&self) -> bool {
        self.inner.promotions.lock().clear();
        let l1_cleared = self.inner.l1.clear();

        let Some(l2) = &self.inner.l2 else {
            return l1_cleared;
        };
        match l2.flush_all().await {
            Ok(()) => l1_cleared,
            Err(err) => {
                self.recover("*", "clear_all", &err.into());
                false
            }
        }
    }

    /// Check L1, then L2, without counting a lookup or promoting
    pub async fn exists(&self, key: &str) -> bool {
        let key = normalize_key(key);
        if self.inner.l1.exists(&key) {
            return true;
        }

        let Some(l2) = &self.inner.l2 else {
            return false;
        };
        match l2.get(&key).await {
            Ok(found) => found.is_some(),
            Err(err) => {
                self.recover(&key, "exists", &err.into());
                false
            }
        }
    }

    /// Run warming patterns through the attached coordinator
    pub async fn warm_cache(&self, patterns: HashMap<String, Value>) -> WarmingReport {
        let warming = Arc::clone(&self.inner.warming);
        warming.warm(self, patterns).await
    }

    /// Statistics of both levels plus promotion and warming bookkeeping
    ///
    /// An unreachable L2 is reported as unavailable.
    pub async fn comprehensive_stats(&self) -> ComprehensiveStats {
        let inner = &self.inner;

        let l2 = match &inner.l2 {
            None => L2Report::not_configured(),
            Some(l2) => match l2.info().await {
                Ok(info) => L2Report::available(info),
                Err(err) => {
                    warn!(error = %err, "l2 introspection failed");
                    L2Report::unavailable(&err)
                }
            },
        };

        let promotion = {
            let promotions = inner.promotions.lock();
            PromotionReport {
                threshold: inner.promotion_threshold,
                tracked_keys: promotions.len(),
                pending_hits: promotions.values().map(|&hits| u64::from(hits)).sum(),
            }
        };

        let warming = WarmingSummary {
            registered_patterns: inner.warming.registered(),
            in_flight: inner.warming.in_flight(),
            top_signatures: self.top_signatures(),
        };

        ComprehensiveStats {
            l1: inner.l1.stats(),
            l1_efficiency: inner.l1.efficiency(),
            l2,
            tier: inner.stats.snapshot(),
            promotion,
            warming,
        }
    }

    /// Two-level counters
    pub fn stats(&self) -> TierStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// The L1 engine
    pub fn l1(&self) -> &L1Cache<V> {
        &self.inner.l1
    }

    /// The warming coordinator
    pub fn warming(&self) -> &WarmingCoordinator<V> {
        &self.inner.warming
    }

    /// Check if an L2 store is attached
    pub fn has_l2(&self) -> bool {
        self.inner.l2.is_some()
    }

    async fn fetch_l2(&self, key: &str) -> Result<Option<V>, CacheError> {
        let Some(l2) = &self.inner.l2 else {
            return Ok(None);
        };
        match l2.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        key: String,
        value: V,
        l1_ttl: Option<Duration>,
        l2_ttl: Option<Duration>,
        origin: Origin,
    ) -> bool {
        let inner = &self.inner;
        self.record_signature(&key);
        inner.promotions.lock().remove(&key);

        let l2_ok = match &inner.l2 {
            None => true,
            Some(l2) => {
                let written = match serde_json::to_vec(&value) {
                    Ok(bytes) => l2
                        .set_with_ttl(&key, l2_ttl.unwrap_or(inner.l2_ttl), bytes)
                        .await
                        .map_err(CacheError::from),
                    Err(err) => Err(CacheError::from(err)),
                };
                match written {
                    Ok(()) => true,
                    Err(err) => {
                        self.recover(&key, "set", &err);
                        false
                    }
                }
            }
        };

        let l1_ok = inner.l1.set_with_metadata(
            key,
            value,
            Some(l1_ttl.unwrap_or(inner.l1_ttl)),
            origin.metadata(),
        );

        let ok = l1_ok && l2_ok;
        inner.stats.record_set(ok);
        ok
    }

    fn count_l2_hit(&self, key: &str, value: &V) {
        let inner = &self.inner;
        let promote = {
            let mut promotions = inner.promotions.lock();
            let hits = promotions.entry(key.to_owned()).or_insert(0);
            *hits += 1;
            if *hits >= inner.promotion_threshold {
                promotions.remove(key);
                true
            } else {
                false
            }
        };

        if promote
            && inner.l1.set_with_metadata(
                key,
                value.clone(),
                Some(inner.l1_ttl),
                Origin::Promotion.metadata(),
            )
        {
            inner.stats.record_promotion();
            debug!(key, threshold = inner.promotion_threshold, "promoted l2 value into l1");
        }
    }

    fn record_signature(&self, key: &str) {
        let Some(signature) = warming_signature(key) else {
            return;
        };
        let mut signatures = self.inner.signatures.lock();
        if let Some(count) = signatures.get_mut(&signature) {
            *count += 1;
        } else if signatures.len() < MAX_TRACKED_SIGNATURES {
            signatures.insert(signature, 1);
        }
    }

    fn top_signatures(&self) -> Vec<SignatureCount> {
        let mut top: Vec<SignatureCount> = self
            .inner
            .signatures
            .lock()
            .iter()
            .map(|(signature, &count)| SignatureCount {
                signature: signature.clone(),
                count,
            })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.signature.cmp(&b.signature)));
        top.truncate(TOP_SIGNATURES);
        top
    }

    fn recover(&self, key: &str, operation: &'static str, err: &CacheError) {
        self.inner.stats.record_error(err.kind());
        warn!(key, operation, error = %err, "cache operation degraded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> CacheConfig {
        CacheConfig {
            promotion_threshold: 3,
            ..CacheConfig::default()
        }
    }

    fn two_level(store: &Arc<MemoryStore>) -> MultiLevelCache<Value> {
        MultiLevelCache::builder(config())
            .with_l2(store.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let cache = two_level(&store);

        assert!(cache.set("Book 1 Details", Value::from("dune"), None, None).await);
        assert_eq!(cache.get("book_1_details", None).await, Some(Value::from("dune")));
        assert_eq!(store.get("book_1_details").await.unwrap(), Some(b"\"dune\"".to_vec()));
        assert_eq!(cache.stats().l1_hits, 1);
        assert_eq!(
            cache.l1().metadata("book_1_details").unwrap()[ORIGIN_METADATA_KEY],
            Value::from("set")
        );
    }

    #[tokio::test]
    async fn test_never_set_is_miss() {
        let cache = MultiLevelCache::<Value>::from_config(config()).unwrap();
        assert_eq!(cache.get("nothing", None).await, None);
        assert_eq!(cache.stats().misses, 1);
        assert!(!cache.exists("nothing").await);
    }

    #[tokio::test]
    async fn test_promotion_resets_counter() {
        let store = Arc::new(MemoryStore::new());
        let cache = two_level(&store);
        store
            .set_with_ttl("k", Duration::from_secs(60), b"7".to_vec())
            .await
            .unwrap();

        for _ in 0..2 {
            assert_eq!(cache.get("k", None).await, Some(Value::from(7)));
            assert!(!cache.l1().exists("k"));
        }
        assert_eq!(cache.get("k", None).await, Some(Value::from(7)));
        assert!(cache.l1().exists("k"));

        let stats = cache.comprehensive_stats().await;
        assert_eq!(stats.tier.promotions, 1);
        assert_eq!(stats.tier.l2_hits, 3);
        assert_eq!(stats.promotion.tracked_keys, 0);
        assert_eq!(
            cache.l1().metadata("k").unwrap()[ORIGIN_METADATA_KEY],
            Value::from("promotion")
        );
    }

    #[tokio::test]
    async fn test_fallback_invoked_once() {
        let cache = MultiLevelCache::<Value>::from_config(config()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let value = cache
                .get(
                    "x",
                    Some(fallback(move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>(Some(Value::from(42)))
                    })),
                )
                .await;
            assert_eq!(value, Some(Value::from(42)));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.fallback_computations, 1);
        assert_eq!(stats.l1_hits, 1);
    }

    #[tokio::test]
    async fn test_undecodable_l2_payload_is_miss() {
        let store = Arc::new(MemoryStore::new());
        let cache = MultiLevelCache::<u64>::builder(config())
            .with_l2(store.clone())
            .build()
            .unwrap();
        store
            .set_with_ttl("n", Duration::from_secs(60), b"not json".to_vec())
            .await
            .unwrap();

        assert_eq!(cache.get("n", None).await, None);
        assert_eq!(cache.stats().codec_errors, 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear_all() {
        let store = Arc::new(MemoryStore::new());
        let cache = two_level(&store);

        cache.set("a", Value::from(1), None, None).await;
        cache.set("b", Value::from(2), None, None).await;

        assert!(cache.delete("a").await);
        assert!(!cache.exists("a").await);
        assert!(cache.exists("b").await);

        assert!(cache.clear_all().await);
        assert!(cache.l1().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_signatures_in_stats() {
        let cache = MultiLevelCache::<Value>::from_config(config()).unwrap();
        for id in 0..3 {
            cache.set(&format!("book_{id}_details"), Value::Null, None, None).await;
        }
        cache.set("user_1_recommendations", Value::Null, None, None).await;
        cache.set("plain", Value::Null, None, None).await;

        let stats = cache.comprehensive_stats().await;
        assert!(!stats.l2.configured);
        assert_eq!(
            stats.warming.top_signatures,
            vec![
                SignatureCount {
                    signature: "book_details".to_string(),
                    count: 3
                },
                SignatureCount {
                    signature: "user_recommendations".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CacheConfig {
            max_size_mb: 0,
            ..CacheConfig::default()
        };
        assert!(MultiLevelCache::<Value>::from_config(config).is_err());
    }
}
