//! Plain unbounded map backend without TTL, for development and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{normalize_key, CacheMetrics, CacheStrategy};
use crate::language::Language;
use crate::types::CachedAnswer;

pub struct DictCache {
    entries: DashMap<String, CachedAnswer>,
    metrics: Arc<CacheMetrics>,
}

impl DictCache {
    pub fn new(metrics: Arc<CacheMetrics>) -> Self {
        Self {
            entries: DashMap::new(),
            metrics,
        }
    }
}

#[async_trait]
impl CacheStrategy for DictCache {
    async fn get(&self, query: &str, language: Language) -> Option<CachedAnswer> {
        let key = normalize_key(query, language);
        match self.entries.get(&key) {
            Some(entry) => {
                self.metrics.record_hit();
                Some(entry.value().clone())
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    async fn set(&self, query: &str, value: CachedAnswer, language: Language, _ttl: Duration) {
        self.entries.insert(normalize_key(query, language), value);
    }

    async fn clear(&self) {
        self.entries.clear();
    }

    fn metrics(&self) -> Arc<CacheMetrics> {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_clear() {
        let cache = DictCache::new(Arc::new(CacheMetrics::new()));
        let value = CachedAnswer {
            text: "answer".into(),
            appointment_requested: false,
            relevant_programs: vec![],
        };
        cache
            .set("query", value, Language::German, Duration::from_secs(1))
            .await;
        assert!(cache.get("query", Language::German).await.is_some());
        cache.clear().await;
        assert!(cache.get("query", Language::German).await.is_none());
    }
}
