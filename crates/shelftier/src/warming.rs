//! Pattern-driven cache warming
//!
//! A warming pattern is a named generator turning JSON parameters into
//! key/value pairs. [`WarmingCoordinator::warm`] runs one task per requested
//! pattern and writes each pair through [`MultiLevelCache::set`], pausing
//! between writes according to the pattern's priority.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use anyhow::{anyhow, Context};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::{AbortHandle, Id, JoinSet};
use tracing::{debug, info, warn};

use crate::multi_level::{CacheValue, MultiLevelCache};

/// Turns pattern parameters into the entries to pre-populate
pub type WarmingGenerator<V> = Arc<dyn Fn(&Value) -> anyhow::Result<Vec<(String, V)>> + Send + Sync>;

/// Pacing of writes within one pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// No pause between writes
    High,
    /// 100ms between writes
    #[default]
    Medium,
    /// 500ms between writes
    Low,
}

impl Priority {
    /// Read `params["priority"]`; missing or unknown values mean medium
    pub fn from_params(params: &Value) -> Self {
        match params.get("priority").and_then(Value::as_str) {
            Some(name) if name.eq_ignore_ascii_case("high") => Priority::High,
            Some(name) if name.eq_ignore_ascii_case("low") => Priority::Low,
            _ => Priority::Medium,
        }
    }

    /// Pause between consecutive writes
    pub fn delay(self) -> Duration {
        match self {
            Priority::High => Duration::ZERO,
            Priority::Medium => Duration::from_millis(100),
            Priority::Low => Duration::from_millis(500),
        }
    }
}

/// Outcome of one [`WarmingCoordinator::warm`] call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmingReport {
    /// Patterns asked for
    pub requested: usize,
    /// Patterns whose every write succeeded
    pub succeeded: usize,
    /// Names of unknown, failed, panicked or cancelled patterns, sorted
    pub failed: Vec<String>,
    /// Entries written across all patterns
    pub keys_written: usize,
}

struct InFlight {
    pattern: String,
    handle: AbortHandle,
}

type Registry = Arc<Mutex<HashMap<Id, InFlight, RandomState>>>;

/// Removes a `warm` call's tasks from the registry, including when the
/// call is dropped before its tasks finish
struct RegistryGuard {
    registry: Registry,
    ids: Vec<Id>,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        for id in &self.ids {
            registry.remove(id);
        }
    }
}

struct PatternOutcome {
    written: usize,
    result: anyhow::Result<()>,
}

/// Registry of warming patterns plus the tasks currently running them
pub struct WarmingCoordinator<V> {
    generators: RwLock<HashMap<String, WarmingGenerator<V>, RandomState>>,
    in_flight: Registry,
}

impl<V> Default for WarmingCoordinator<V> {
    fn default() -> Self {
        Self {
            generators: RwLock::new(HashMap::with_hasher(RandomState::new())),
            in_flight: Arc::new(Mutex::new(HashMap::with_hasher(RandomState::new()))),
        }
    }
}

impl<V> WarmingCoordinator<V> {
    /// Coordinator with no patterns
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a pattern
    pub fn register<F>(&self, name: impl Into<String>, generator: F)
    where
        F: Fn(&Value) -> anyhow::Result<Vec<(String, V)>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(pattern = %name, "registered warming pattern");
        self.generators.write().insert(name, Arc::new(generator));
    }

    /// Remove a pattern; true if it was registered
    pub fn unregister(&self, name: &str) -> bool {
        self.generators.write().remove(name).is_some()
    }

    /// Registered pattern names, sorted
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generators.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of pattern tasks currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Names of the patterns currently running, sorted
    pub fn in_flight_patterns(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .in_flight
            .lock()
            .values()
            .map(|task| task.pattern.clone())
            .collect();
        names.sort();
        names
    }

    /// Abort every running pattern task; returns how many were signalled
    ///
    /// Writes already issued are not rolled back.
    pub fn cancel_all(&self) -> usize {
        let registry = self.in_flight.lock();
        for task in registry.values() {
            task.handle.abort();
        }
        registry.len()
    }

    fn generator(&self, name: &str) -> Option<WarmingGenerator<V>> {
        self.generators.read().get(name).cloned()
    }
}

impl<V: CacheValue> WarmingCoordinator<V> {
    /// Run the requested patterns concurrently and wait for all of them
    pub async fn warm(&self, cache: &MultiLevelCache<V>, patterns: HashMap<String, Value>) -> WarmingReport {
        let mut report = WarmingReport {
            requested: patterns.len(),
            ..WarmingReport::default()
        };

        let mut patterns: Vec<(String, Value)> = patterns.into_iter().collect();
        patterns.sort_by(|a, b| a.0.cmp(&b.0));

        let mut tasks = JoinSet::new();
        let mut names: HashMap<Id, String> = HashMap::new();
        let mut guard = RegistryGuard {
            registry: Arc::clone(&self.in_flight),
            ids: Vec::with_capacity(patterns.len()),
        };

        for (name, params) in patterns {
            let Some(generator) = self.generator(&name) else {
                warn!(pattern = %name, "unknown warming pattern");
                report.failed.push(name);
                continue;
            };

            let cache = cache.clone();
            let handle = tasks.spawn(run_pattern(cache, generator, params));
            let id = handle.id();
            self.in_flight.lock().insert(
                id,
                InFlight {
                    pattern: name.clone(),
                    handle,
                },
            );
            guard.ids.push(id);
            names.insert(id, name);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, Ok(outcome)),
                Err(err) => (err.id(), Err(err)),
            };
            self.in_flight.lock().remove(&id);
            let name = names.remove(&id).unwrap_or_default();

            match outcome {
                Ok(PatternOutcome { written, result }) => {
                    report.keys_written += written;
                    match result {
                        Ok(()) => report.succeeded += 1,
                        Err(err) => {
                            warn!(pattern = %name, written, error = %format!("{err:#}"), "warming pattern failed");
                            report.failed.push(name);
                        }
                    }
                }
                Err(err) => {
                    warn!(pattern = %name, cancelled = err.is_cancelled(), "warming task did not complete");
                    report.failed.push(name);
                }
            }
        }
        drop(guard);

        report.failed.sort();
        info!(
            requested = report.requested,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            keys_written = report.keys_written,
            "cache warming finished"
        );
        report
    }
}

async fn run_pattern<V: CacheValue>(
    cache: MultiLevelCache<V>,
    generator: WarmingGenerator<V>,
    params: Value,
) -> PatternOutcome {
    let entries = match generator(&params) {
        Ok(entries) => entries,
        Err(err) => {
            return PatternOutcome {
                written: 0,
                result: Err(err),
            }
        }
    };

    let delay = Priority::from_params(&params).delay();
    let mut written = 0;
    let mut failed_keys = Vec::new();

    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if cache.set(&key, value, None, None).await {
            written += 1;
        } else {
            failed_keys.push(key);
        }
    }

    let result = if failed_keys.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("failed to write {}", failed_keys.join(", ")))
    };
    PatternOutcome { written, result }
}

impl WarmingCoordinator<Value> {
    /// Coordinator preloaded with `popular_books` and `user_recommendations`
    pub fn with_builtin_patterns() -> Self {
        let coordinator = Self::new();
        coordinator.register("popular_books", popular_books);
        coordinator.register("user_recommendations", user_recommendations);
        coordinator
    }
}

/// `{"book_ids": [..]}` → `book_{id}_details`
fn popular_books(params: &Value) -> anyhow::Result<Vec<(String, Value)>> {
    let ids = id_list(params, "book_ids")?;
    Ok(ids
        .into_iter()
        .map(|(id, raw)| (format!("book_{id}_details"), json!({ "book_id": raw, "warmed": true })))
        .collect())
}

/// `{"user_ids": [..]}` → `user_{id}_recommendations`
fn user_recommendations(params: &Value) -> anyhow::Result<Vec<(String, Value)>> {
    let ids = id_list(params, "user_ids")?;
    Ok(ids
        .into_iter()
        .map(|(id, raw)| {
            (
                format!("user_{id}_recommendations"),
                json!({ "user_id": raw, "recommendations": [], "warmed": true }),
            )
        })
        .collect())
}

/// Ids under `field` as (key fragment, original JSON value)
fn id_list(params: &Value, field: &str) -> anyhow::Result<Vec<(String, Value)>> {
    let ids = params
        .get(field)
        .and_then(Value::as_array)
        .with_context(|| format!("`{field}` must be an array"))?;

    ids.iter()
        .map(|id| match id {
            Value::String(s) => Ok((s.clone(), id.clone())),
            Value::Number(n) => Ok((n.to_string(), id.clone())),
            other => Err(anyhow!("unsupported id {other} in `{field}`")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_from_params() {
        assert_eq!(Priority::from_params(&json!({"priority": "high"})), Priority::High);
        assert_eq!(Priority::from_params(&json!({"priority": "LOW"})), Priority::Low);
        assert_eq!(Priority::from_params(&json!({"priority": "urgent"})), Priority::Medium);
        assert_eq!(Priority::from_params(&json!({})), Priority::Medium);
        assert_eq!(Priority::High.delay(), Duration::ZERO);
        assert_eq!(Priority::Low.delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_popular_books_generator() {
        let entries = popular_books(&json!({"book_ids": [1, "2"]})).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "book_1_details");
        assert_eq!(entries[0].1, json!({"book_id": 1, "warmed": true}));
        assert_eq!(entries[1].0, "book_2_details");

        assert!(popular_books(&json!({"priority": "high"})).is_err());
        assert!(popular_books(&json!({"book_ids": [null]})).is_err());
    }

    #[test]
    fn test_user_recommendations_generator() {
        let entries = user_recommendations(&json!({"user_ids": [7]})).unwrap();
        assert_eq!(entries[0].0, "user_7_recommendations");
        assert_eq!(entries[0].1["user_id"], json!(7));
    }

    #[test]
    fn test_registry() {
        let coordinator = WarmingCoordinator::<Value>::with_builtin_patterns();
        assert_eq!(coordinator.registered(), vec!["popular_books", "user_recommendations"]);

        coordinator.register("trending", |_: &Value| Ok(Vec::new()));
        assert_eq!(coordinator.registered().len(), 3);
        assert!(coordinator.unregister("trending"));
        assert!(!coordinator.unregister("trending"));

        assert_eq!(coordinator.in_flight(), 0);
        assert_eq!(coordinator.cancel_all(), 0);
    }
}
