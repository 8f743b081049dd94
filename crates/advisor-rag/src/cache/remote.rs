//! Redis-backed cache for deployments that share responses across processes.
//!
//! Values are stored as JSON with SETEX-style TTLs. Any per-call failure is
//! logged and treated as a miss or a no-op — the cache must never take a
//! conversation turn down with it.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

use super::{normalize_key, CacheMetrics, CacheStrategy};
use crate::language::Language;
use crate::types::CachedAnswer;

pub struct RedisCache {
    client: redis::Client,
    metrics: Arc<CacheMetrics>,
}

impl RedisCache {
    /// Validate the URL and construct the client. The actual TCP connection is
    /// established lazily per call; an invalid URL fails here so `build_cache`
    /// can fall back to the in-process backend.
    pub fn connect(url: &str, metrics: Arc<CacheMetrics>) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| anyhow::anyhow!("invalid redis url {}: {}", url, e))?;
        Ok(Self { client, metrics })
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "Redis connection failed, treating as cache miss");
                None
            }
        }
    }
}

#[async_trait]
impl CacheStrategy for RedisCache {
    async fn get(&self, query: &str, language: Language) -> Option<CachedAnswer> {
        let key = normalize_key(query, language);
        let Some(mut conn) = self.connection().await else {
            self.metrics.record_miss();
            return None;
        };

        let payload: Option<String> = match conn.get(&key).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis GET failed");
                None
            }
        };

        match payload.and_then(|p| serde_json::from_str::<CachedAnswer>(&p).ok()) {
            Some(value) => {
                self.metrics.record_hit();
                tracing::debug!(key = %key, "Cache hit (redis)");
                Some(value)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    async fn set(&self, query: &str, value: CachedAnswer, language: Language, ttl: Duration) {
        let key = normalize_key(query, language);
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let payload = match serde_json::to_string(&value) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode cache value");
                return;
            }
        };
        if let Err(e) = conn
            .set_ex::<_, _, ()>(&key, payload, ttl.as_secs())
            .await
        {
            tracing::warn!(key = %key, error = %e, "Redis SETEX failed");
        }
    }

    async fn clear(&self) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await {
            tracing::warn!(error = %e, "Redis FLUSHDB failed");
        }
    }

    fn metrics(&self) -> Arc<CacheMetrics> {
        self.metrics.clone()
    }
}
