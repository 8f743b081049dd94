//! In-process retrieval store with token-overlap ranking.
//!
//! Stands in for the external vector database in tests and local mode. The
//! ranking is lexical (weighted token overlap), not semantic — good enough to
//! exercise the retrieval contract and the agents' behavior on ranked hits.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::{RetrievalBackend, RowError};
use crate::language::Language;
use crate::types::{RetrievalChunk, RetrievalHit};

#[derive(Default)]
pub struct MemoryStore {
    // collection name -> chunk_id -> chunk
    collections: RwLock<HashMap<String, HashMap<String, RetrievalChunk>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokenize(text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(|t| t.to_string())
            .collect()
    }

    /// Weighted token overlap in [0, 1]: fraction of query tokens present in
    /// the chunk, discounted slightly for very short chunks.
    fn score(query_tokens: &HashSet<String>, chunk: &RetrievalChunk) -> f32 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        let chunk_tokens = Self::tokenize(&chunk.text);
        let overlap = query_tokens.intersection(&chunk_tokens).count();
        let base = overlap as f32 / query_tokens.len() as f32;
        if chunk_tokens.len() < 5 {
            base * 0.5
        } else {
            base
        }
    }
}

#[async_trait]
impl RetrievalBackend for MemoryStore {
    async fn query(
        &self,
        text: &str,
        language: Language,
        limit: usize,
        distance_threshold: f32,
    ) -> anyhow::Result<Vec<RetrievalHit>> {
        let query_tokens = Self::tokenize(text);
        let collections = self.collections.read();
        let Some(collection) = collections.get(&language.collection_name()) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<RetrievalHit> = collection
            .values()
            .map(|chunk| RetrievalHit {
                score: Self::score(&query_tokens, chunk),
                chunk: chunk.clone(),
            })
            .filter(|hit| hit.score >= distance_threshold && hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);

        tracing::debug!(
            collection = %language.collection_name(),
            results = hits.len(),
            "Memory store query"
        );
        Ok(hits)
    }

    async fn batch_import(
        &self,
        rows: Vec<RetrievalChunk>,
        language: Language,
    ) -> anyhow::Result<Vec<RowError>> {
        let mut errors = Vec::new();
        let mut collections = self.collections.write();
        let collection = collections
            .entry(language.collection_name())
            .or_default();

        for (index, row) in rows.into_iter().enumerate() {
            if row.text.trim().is_empty() {
                errors.push(RowError {
                    index,
                    message: "empty chunk text".to_string(),
                });
                continue;
            }
            collection.insert(row.chunk_id.clone(), row);
        }

        Ok(errors)
    }

    async fn existing_chunk_ids(&self, language: Language) -> anyhow::Result<HashSet<String>> {
        let collections = self.collections.read();
        Ok(collections
            .get(&language.collection_name())
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_chunks(&self, ids: &[String], language: Language) -> anyhow::Result<usize> {
        let mut collections = self.collections.write();
        let Some(collection) = collections.get_mut(&language.collection_name()) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            if collection.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn ensure_collection(&self, language: Language) -> anyhow::Result<()> {
        self.collections
            .write()
            .entry(language.collection_name())
            .or_default();
        Ok(())
    }

    async fn reset_collection(&self, language: Language) -> anyhow::Result<()> {
        self.collections
            .write()
            .insert(language.collection_name(), HashMap::new());
        Ok(())
    }
}
