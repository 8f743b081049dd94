//! Response cache with pluggable backends behind one get/set/clear contract.
//!
//! Key normalization is identical across all backends: strip to `[a-z0-9]`,
//! lowercase, prefix with `cache:{language}:` — so near-duplicate phrasings
//! that differ only in punctuation or case collide intentionally.
//!
//! Backend selection and remote-connection failure both fall back to the
//! in-process map; the cache is always available and degraded mode is logged
//! but never fatal. Callers must also tolerate a disabled (`None`) cache and
//! skip caching entirely.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::language::Language;
use crate::types::CachedAnswer;

pub mod dict;
pub mod memory;
pub mod remote;

pub use dict::DictCache;
pub use memory::MemoryCache;
pub use remote::RedisCache;

/// Normalize a query into its cache key: lowercase alphanumerics only,
/// prefixed by the language partition.
pub fn normalize_key(query: &str, language: Language) -> String {
    let normalized: String = query
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("cache:{}:{}", language.code(), normalized)
}

/// Shared hit/miss counters. The increment and the ratio recomputation happen
/// in a single critical section so concurrent sessions cannot lose updates or
/// observe a ratio inconsistent with the counters.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    inner: Mutex<MetricCounters>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MetricCounters {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        let mut counters = self.inner.lock();
        counters.hits += 1;
        counters.hit_ratio = counters.hits as f64 / (counters.hits + counters.misses) as f64;
    }

    pub fn record_miss(&self) {
        let mut counters = self.inner.lock();
        counters.misses += 1;
        counters.hit_ratio = counters.hits as f64 / (counters.hits + counters.misses) as f64;
    }

    pub fn snapshot(&self) -> MetricCounters {
        self.inner.lock().clone()
    }
}

/// Uniform contract all cache backends implement. `get` records hit/miss on
/// the shared metrics; keys passed in are raw query text, normalized inside.
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    async fn get(&self, query: &str, language: Language) -> Option<CachedAnswer>;
    async fn set(&self, query: &str, value: CachedAnswer, language: Language, ttl: Duration);
    async fn clear(&self);
    fn metrics(&self) -> Arc<CacheMetrics>;
}

/// Cache backend selector, captured at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Bounded in-process TTL map.
    Local,
    /// Remote key-value store (falls back to local on connection failure).
    Cloud,
    /// Plain unbounded in-process map, no TTL (dev/test use).
    Dict,
    /// No caching at all — callers receive `None` and skip caching.
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub mode: CacheMode,
    pub ttl_secs: u64,
    /// Entry bound for the local backend.
    pub capacity: usize,
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Local,
            ttl_secs: 3600,
            capacity: 1024,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Build a cache backend from config. `Cloud` mode that cannot reach the
/// remote store silently degrades to the local map (logged, never fatal);
/// `Disabled` yields `None`.
pub fn build_cache(config: &CacheConfig) -> Option<Arc<dyn CacheStrategy>> {
    let metrics = Arc::new(CacheMetrics::new());
    match config.mode {
        CacheMode::Disabled => None,
        CacheMode::Dict => Some(Arc::new(DictCache::new(metrics))),
        CacheMode::Local => Some(Arc::new(MemoryCache::new(config.capacity, metrics))),
        CacheMode::Cloud => match RedisCache::connect(&config.redis_url, metrics.clone()) {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Remote cache unavailable, falling back to in-process cache"
                );
                Some(Arc::new(MemoryCache::new(config.capacity, metrics)))
            }
        },
    }
}

static CACHE_INSTANCE: OnceCell<Option<Arc<dyn CacheStrategy>>> = OnceCell::new();

/// Process-wide cache instance, lazily constructed by the first caller.
/// Subsequent callers share the same instance regardless of the config they
/// pass. Prefer injecting the cache explicitly via `AdvisorServices`; this
/// accessor exists for deployments that genuinely share one cache per process.
pub fn shared_cache(config: &CacheConfig) -> Option<Arc<dyn CacheStrategy>> {
    CACHE_INSTANCE.get_or_init(|| build_cache(config)).clone()
}
