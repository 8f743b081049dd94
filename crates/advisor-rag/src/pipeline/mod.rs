//! Document ingestion: partition sources, chunk them, derive chunk
//! properties, and write deduplicated batches into the retrieval backend.
//!
//! Deduplication works off a baseline of chunk ids read once at pipeline
//! construction. A source whose chunks are all already present is skipped
//! unless an approval callback explicitly authorizes replacing it (delete
//! plus reinsert), which is how edited documents get refreshed.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::language::Language;
use crate::storage::{RetrievalBackend, RowError};
use crate::types::RetrievalChunk;

pub mod chunker;
pub mod extract;
pub mod partition;

pub use chunker::{ChunkerConfig, TitleChunker};
pub use extract::{ExtractorSet, PropertySchema};
pub use partition::{Element, ElementKind};

/// Per-source ingestion outcome, also handed to the progress callback.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub chunks: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// True when a fully-duplicate source was deleted and reinserted.
    pub replaced: bool,
    pub row_errors: Vec<RowError>,
}

/// Position within a multi-source run, reported alongside each source.
/// Single-source entry points report `1 / 1`.
#[derive(Debug, Clone, Copy)]
pub struct ImportProgress {
    pub completed: usize,
    pub total: usize,
}

impl ImportProgress {
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f32 * 100.0 / self.total as f32
        }
    }
}

/// Decides whether a fully-duplicate source may be replaced.
pub type ApprovalCallback = Arc<dyn Fn(&str) -> bool + Send + Sync>;
/// Invoked once per completed source with the report and the run position.
pub type ProgressCallback = Arc<dyn Fn(&SourceReport, ImportProgress) + Send + Sync>;

pub struct ImportPipeline {
    backend: Arc<dyn RetrievalBackend>,
    language: Language,
    chunker: TitleChunker,
    extractors: ExtractorSet,
    config: IngestConfig,
    existing: HashSet<String>,
    approval: Option<ApprovalCallback>,
    progress: Option<ProgressCallback>,
}

impl ImportPipeline {
    /// Prepare a pipeline for one language collection. `reset` drops and
    /// recreates the collection first, which also empties the dedup baseline
    /// so every chunk of the run is written.
    pub async fn new(
        backend: Arc<dyn RetrievalBackend>,
        language: Language,
        config: IngestConfig,
        schema: &PropertySchema,
        reset: bool,
    ) -> anyhow::Result<Self> {
        let extractors = ExtractorSet::compile(schema)?;

        let existing = if reset {
            tracing::warn!(
                collection = %language.collection_name(),
                "Resetting collection before import"
            );
            backend.reset_collection(language).await?;
            HashSet::new()
        } else {
            backend.ensure_collection(language).await?;
            backend.existing_chunk_ids(language).await?
        };
        tracing::info!(
            collection = %language.collection_name(),
            baseline = existing.len(),
            "Import pipeline ready"
        );

        let chunker = TitleChunker::new(ChunkerConfig {
            max_chars: config.max_chunk_chars,
            min_chars: config.min_chunk_chars,
        });

        Ok(Self {
            backend,
            language,
            chunker,
            extractors,
            config,
            existing,
            approval: None,
            progress: None,
        })
    }

    pub fn with_approval(mut self, approval: ApprovalCallback) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn ingest_file(&mut self, path: &Path) -> anyhow::Result<SourceReport> {
        let elements = partition::partition_file(path)?;
        self.ingest_elements(&path.display().to_string(), &elements)
            .await
    }

    pub async fn ingest_url(
        &mut self,
        url: &str,
        client: &reqwest::Client,
    ) -> anyhow::Result<SourceReport> {
        let elements = partition::partition_url(url, client).await?;
        self.ingest_elements(url, &elements).await
    }

    /// Ingest every supported file under `dir`, depth-first, in path order.
    /// The progress callback sees the run position, so percent-complete is
    /// exact across the whole directory.
    pub async fn ingest_directory(&mut self, dir: &Path) -> anyhow::Result<Vec<SourceReport>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md") | Some("json") | Some("pdf")
                )
            })
            .collect();
        paths.sort();

        let total = paths.len();
        let mut reports = Vec::with_capacity(total);
        for (i, path) in paths.into_iter().enumerate() {
            let elements = partition::partition_file(&path)?;
            let report = self
                .ingest_with_progress(
                    &path.display().to_string(),
                    &elements,
                    ImportProgress {
                        completed: i + 1,
                        total,
                    },
                )
                .await?;
            reports.push(report);
        }
        Ok(reports)
    }

    pub async fn ingest_elements(
        &mut self,
        source: &str,
        elements: &[Element],
    ) -> anyhow::Result<SourceReport> {
        self.ingest_with_progress(source, elements, ImportProgress { completed: 1, total: 1 })
            .await
    }

    async fn ingest_with_progress(
        &mut self,
        source: &str,
        elements: &[Element],
        progress: ImportProgress,
    ) -> anyhow::Result<SourceReport> {
        let document_id = Uuid::new_v4().to_string();
        let rows: Vec<RetrievalChunk> = self
            .chunker
            .chunk(elements)
            .into_iter()
            .map(|text| {
                let properties = self.extractors.extract(&text);
                if let Some(detected) = properties.language {
                    if detected != self.language {
                        tracing::warn!(
                            source,
                            expected = self.language.code(),
                            detected = detected.code(),
                            "Chunk language differs from target collection"
                        );
                    }
                }
                RetrievalChunk {
                    chunk_id: RetrievalChunk::compute_chunk_id(&text),
                    text,
                    source: source.to_string(),
                    document_id: document_id.clone(),
                    programs: properties.programs,
                    ingested_at: Utc::now(),
                }
            })
            .collect();

        let total = rows.len();
        let (fresh, duplicate): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .partition(|row| !self.existing.contains(&row.chunk_id));

        let mut report = SourceReport {
            source: source.to_string(),
            chunks: total,
            inserted: 0,
            duplicates: duplicate.len(),
            replaced: false,
            row_errors: Vec::new(),
        };

        let to_write = if fresh.is_empty() && !duplicate.is_empty() {
            // Fully-duplicate source: replace only with explicit approval
            let approved = self
                .approval
                .as_ref()
                .map(|approve| approve(source))
                .unwrap_or(false);
            if !approved {
                tracing::info!(source, chunks = total, "Source unchanged, skipping");
                self.report_progress(&report, progress);
                return Ok(report);
            }
            let ids: Vec<String> = duplicate.iter().map(|row| row.chunk_id.clone()).collect();
            let deleted = self.backend.delete_chunks(&ids, self.language).await?;
            tracing::info!(source, deleted, "Replacing fully-duplicate source");
            report.replaced = true;
            report.duplicates = 0;
            duplicate
        } else {
            fresh
        };

        report.row_errors = self.write_batches(&to_write).await?;
        report.inserted = to_write.len() - report.row_errors.len();

        let failed: HashSet<usize> = report.row_errors.iter().map(|e| e.index).collect();
        for (index, row) in to_write.iter().enumerate() {
            if !failed.contains(&index) {
                self.existing.insert(row.chunk_id.clone());
            }
        }

        tracing::info!(
            source,
            chunks = report.chunks,
            inserted = report.inserted,
            duplicates = report.duplicates,
            errors = report.row_errors.len(),
            "Source ingested"
        );
        self.report_progress(&report, progress);
        Ok(report)
    }

    /// Write rows in bounded-concurrency batches; row errors are remapped to
    /// source-level indexes and collected, never fatal.
    async fn write_batches(&self, rows: &[RetrievalChunk]) -> anyhow::Result<Vec<RowError>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<(usize, Vec<RetrievalChunk>)> = rows
            .chunks(self.config.batch_size)
            .enumerate()
            .map(|(i, batch)| (i * self.config.batch_size, batch.to_vec()))
            .collect();

        let results: Vec<anyhow::Result<Vec<RowError>>> = stream::iter(batches)
            .map(|(offset, batch)| {
                let backend = self.backend.clone();
                let language = self.language;
                async move {
                    let errors = backend.batch_import(batch, language).await?;
                    Ok(errors
                        .into_iter()
                        .map(|e| RowError {
                            index: offset + e.index,
                            message: e.message,
                        })
                        .collect())
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut row_errors = Vec::new();
        for result in results {
            row_errors.extend(result?);
        }
        row_errors.sort_by_key(|e| e.index);
        Ok(row_errors)
    }

    fn report_progress(&self, report: &SourceReport, progress: ImportProgress) {
        if let Some(callback) = &self.progress {
            callback(report, progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use parking_lot::Mutex;

    const FEES_DOC: &str = "# Fees\nTuition for the Executive MBA is CHF 75,000 and covers \
                            all learning materials, examination fees and campus access.";

    async fn pipeline(store: Arc<MemoryStore>, reset: bool) -> ImportPipeline {
        ImportPipeline::new(
            store,
            Language::English,
            IngestConfig::default(),
            &PropertySchema::with_defaults(),
            reset,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_writes_chunks_with_programs() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = pipeline(store.clone(), false).await;

        let report = pipeline
            .ingest_elements("fees.md", &partition::partition_text(FEES_DOC))
            .await
            .unwrap();

        assert_eq!(report.inserted, report.chunks);
        assert!(report.row_errors.is_empty());

        let ids = store
            .existing_chunk_ids(Language::English)
            .await
            .unwrap();
        assert_eq!(ids.len(), report.inserted);
    }

    #[tokio::test]
    async fn test_duplicate_source_skipped_without_approval() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = pipeline(store.clone(), false).await;
        let elements = partition::partition_text(FEES_DOC);

        let first = pipeline.ingest_elements("fees.md", &elements).await.unwrap();
        let second = pipeline.ingest_elements("fees.md", &elements).await.unwrap();

        assert!(first.inserted > 0);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, second.chunks);
        assert!(!second.replaced);
    }

    #[tokio::test]
    async fn test_duplicate_source_replaced_with_approval() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = pipeline(store.clone(), false)
            .await
            .with_approval(Arc::new(|_source| true));
        let elements = partition::partition_text(FEES_DOC);

        pipeline.ingest_elements("fees.md", &elements).await.unwrap();
        let before = store.existing_chunk_ids(Language::English).await.unwrap();

        let second = pipeline.ingest_elements("fees.md", &elements).await.unwrap();
        assert!(second.replaced);
        assert_eq!(second.inserted, second.chunks);

        let after = store.existing_chunk_ids(Language::English).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_dedup_baseline_survives_across_pipelines() {
        let store = Arc::new(MemoryStore::new());
        let elements = partition::partition_text(FEES_DOC);

        let mut first = pipeline(store.clone(), false).await;
        first.ingest_elements("fees.md", &elements).await.unwrap();

        // A new pipeline refreshes the baseline from the backend
        let mut second = pipeline(store.clone(), false).await;
        let report = second.ingest_elements("fees.md", &elements).await.unwrap();
        assert_eq!(report.inserted, 0);
    }

    #[tokio::test]
    async fn test_reset_bypasses_dedup() {
        let store = Arc::new(MemoryStore::new());
        let elements = partition::partition_text(FEES_DOC);

        let mut first = pipeline(store.clone(), false).await;
        first.ingest_elements("fees.md", &elements).await.unwrap();

        let mut resetting = pipeline(store.clone(), true).await;
        let report = resetting.ingest_elements("fees.md", &elements).await.unwrap();
        assert_eq!(report.inserted, report.chunks);
        assert!(!report.replaced);
    }

    #[tokio::test]
    async fn test_directory_ingestion_with_progress() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), FEES_DOC).unwrap();
        std::fs::write(
            dir.path().join("b.txt"),
            "# Admission\nFive years of professional experience are required for entry \
             to the International Executive MBA program.",
        )
        .unwrap();
        std::fs::write(dir.path().join("ignored.bin"), "binary").unwrap();

        let seen: Arc<Mutex<Vec<(String, f32)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let store = Arc::new(MemoryStore::new());
        let mut pipeline = pipeline(store, false).await.with_progress(Arc::new(
            move |report: &SourceReport, progress: ImportProgress| {
                seen_clone
                    .lock()
                    .push((report.source.clone(), progress.percent()));
            },
        ));

        let reports = pipeline.ingest_directory(dir.path()).await.unwrap();
        assert_eq!(reports.len(), 2);
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        let percents: Vec<f32> = seen.iter().map(|(_, pct)| *pct).collect();
        assert_eq!(percents, vec![50.0, 100.0]);
        assert!(reports.iter().all(|r| r.inserted > 0));
    }

    #[tokio::test]
    async fn test_single_source_progress_is_complete() {
        let seen: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let store = Arc::new(MemoryStore::new());
        let mut pipeline = pipeline(store, false).await.with_progress(Arc::new(
            move |_report: &SourceReport, progress: ImportProgress| {
                seen_clone.lock().push(progress.percent());
            },
        ));

        pipeline
            .ingest_elements("fees.md", &partition::partition_text(FEES_DOC))
            .await
            .unwrap();
        assert_eq!(*seen.lock(), vec![100.0]);
    }
}
