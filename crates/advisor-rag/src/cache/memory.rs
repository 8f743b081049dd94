//! Bounded in-process TTL cache — the default backend and the fallback when
//! the remote store is unreachable.

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{normalize_key, CacheMetrics, CacheStrategy};
use crate::language::Language;
use crate::types::CachedAnswer;

struct Entry {
    value: CachedAnswer,
    expires_at: Instant,
}

pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
    metrics: Arc<CacheMetrics>,
}

impl MemoryCache {
    pub fn new(capacity: usize, metrics: Arc<CacheMetrics>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            metrics,
        }
    }
}

#[async_trait]
impl CacheStrategy for MemoryCache {
    async fn get(&self, query: &str, language: Language) -> Option<CachedAnswer> {
        let key = normalize_key(query, language);
        let mut entries = self.entries.lock();

        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let value = entry.value.clone();
                drop(entries);
                self.metrics.record_hit();
                tracing::debug!(key = %key, "Cache hit (memory)");
                Some(value)
            }
            Some(_) => {
                // Expired: evict on read
                entries.pop(&key);
                drop(entries);
                self.metrics.record_miss();
                None
            }
            None => {
                drop(entries);
                self.metrics.record_miss();
                None
            }
        }
    }

    async fn set(&self, query: &str, value: CachedAnswer, language: Language, ttl: Duration) {
        let key = normalize_key(query, language);
        self.entries.lock().put(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn clear(&self) {
        self.entries.lock().clear();
    }

    fn metrics(&self) -> Arc<CacheMetrics> {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Program;

    fn answer(text: &str) -> CachedAnswer {
        CachedAnswer {
            text: text.to_string(),
            appointment_requested: false,
            relevant_programs: vec![Program::Emba],
        }
    }

    #[tokio::test]
    async fn test_normalized_keys_collide() {
        let cache = MemoryCache::new(16, Arc::new(CacheMetrics::new()));
        cache
            .set(
                "what does the emba cost",
                answer("CHF 75,000"),
                Language::English,
                Duration::from_secs(60),
            )
            .await;

        let hit = cache
            .get("What does the EMBA cost?!", Language::English)
            .await;
        assert_eq!(hit.unwrap().text, "CHF 75,000");
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new(16, Arc::new(CacheMetrics::new()));
        cache
            .set("q", answer("a"), Language::English, Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("q", Language::English).await.is_none());
    }

    #[tokio::test]
    async fn test_language_partitioning() {
        let cache = MemoryCache::new(16, Arc::new(CacheMetrics::new()));
        cache
            .set("fees", answer("en answer"), Language::English, Duration::from_secs(60))
            .await;
        assert!(cache.get("fees", Language::German).await.is_none());
        assert!(cache.get("fees", Language::English).await.is_some());
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let metrics = Arc::new(CacheMetrics::new());
        let cache = MemoryCache::new(16, metrics.clone());
        cache.get("missing", Language::English).await;
        cache
            .set("present", answer("x"), Language::English, Duration::from_secs(60))
            .await;
        cache.get("present", Language::English).await;

        let snap = metrics.snapshot();
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert!((snap.hit_ratio - 0.5).abs() < f64::EPSILON);
    }
}
