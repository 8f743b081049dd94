//! Retrieval backend contract.
//!
//! The production vector database is an external collaborator; this crate
//! consumes it through `RetrievalBackend` and ships `MemoryStore` as the
//! in-process implementation used by tests and degraded/local deployments.
//!
//! Collections are partitioned per language (`chunks_de`, `chunks_en`);
//! ingestion writes and conversational reads against the same collection are
//! expected to interleave — eventual visibility is acceptable, synchronous
//! read-after-write is not guaranteed.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::language::Language;
use crate::types::{RetrievalChunk, RetrievalHit};

pub mod memory;

pub use memory::MemoryStore;

/// A per-row import failure. Row errors are collected and reported in
/// aggregate; they never abort the batch.
#[derive(Debug, Clone, thiserror::Error)]
#[error("row {index}: {message}")]
pub struct RowError {
    pub index: usize,
    pub message: String,
}

#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Ranked passage lookup within one language collection. Results below
    /// `distance_threshold` relevance are excluded.
    async fn query(
        &self,
        text: &str,
        language: Language,
        limit: usize,
        distance_threshold: f32,
    ) -> anyhow::Result<Vec<RetrievalHit>>;

    /// Batched write; returns per-row failures without aborting the batch.
    async fn batch_import(
        &self,
        rows: Vec<RetrievalChunk>,
        language: Language,
    ) -> anyhow::Result<Vec<RowError>>;

    /// All chunk ids currently present in the language collection — the
    /// deduplication baseline the import pipeline refreshes at construction.
    async fn existing_chunk_ids(&self, language: Language) -> anyhow::Result<HashSet<String>>;

    async fn delete_chunks(&self, ids: &[String], language: Language) -> anyhow::Result<usize>;

    /// Create the language collection if absent. Idempotent.
    async fn ensure_collection(&self, language: Language) -> anyhow::Result<()>;

    /// Drop and recreate the language collection. Destructive; only the
    /// import pipeline's explicit reset mode calls this.
    async fn reset_collection(&self, language: Language) -> anyhow::Result<()>;
}
