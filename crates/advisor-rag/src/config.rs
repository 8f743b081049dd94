//! Runtime configuration, loaded from JSON and validated before anything is
//! constructed from it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::language::Language;
use crate::llm::{GenerationConfig, ProviderKind, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AdvisorConfig {
    pub chat: ChatConfig,
    pub formatter: FormatterSettings,
    pub cache: CacheConfig,
    pub retrieval: RetrievalConfig,
    pub retry: RetrySettings,
    pub models: Vec<ModelConfig>,
    pub ingest: IngestConfig,
    /// Append-only JSONL file for profile snapshots; `None` disables the sink.
    pub profile_log_path: Option<PathBuf>,
}

/// Conversation behavior toggles and budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Greeting and pre-lock fallback language.
    pub default_language: Language,
    /// Pin the session language to the first user message.
    pub language_locking: bool,
    pub profile_extraction: bool,
    pub quality_scoring: bool,
    pub enable_chunking: bool,
    /// Upper bound on lead-agent tool rounds per turn.
    pub max_tool_iterations: usize,
    /// History messages included when building a model request; older turns
    /// are dropped from the request but kept in session state.
    pub max_retained_messages: usize,
    /// Write a profile snapshot every N user turns.
    pub profile_snapshot_interval: u32,
    pub tool_timeout_secs: u64,
    pub generation: GenerationConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_language: Language::German,
            language_locking: true,
            profile_extraction: true,
            quality_scoring: false,
            enable_chunking: true,
            max_tool_iterations: 6,
            max_retained_messages: 40,
            profile_snapshot_interval: 5,
            tool_timeout_secs: 45,
            generation: GenerationConfig::default(),
        }
    }
}

/// Serializable mirror of the formatter budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterSettings {
    pub lead_max_words: usize,
    pub sub_max_words: usize,
    pub boundary_window: usize,
}

impl Default for FormatterSettings {
    fn default() -> Self {
        let defaults = crate::formatter::FormatterConfig::default();
        Self {
            lead_max_words: defaults.lead_max_words,
            sub_max_words: defaults.sub_max_words,
            boundary_window: defaults.boundary_window,
        }
    }
}

impl FormatterSettings {
    pub fn to_formatter_config(&self) -> crate::formatter::FormatterConfig {
        crate::formatter::FormatterConfig {
            lead_max_words: self.lead_max_words,
            sub_max_words: self.sub_max_words,
            boundary_window: self.boundary_window,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Hits returned per retrieval call.
    pub limit: usize,
    /// Minimum relevance score for a hit to be returned.
    pub distance_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            distance_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// One entry in the model fallback chain; order is priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(flatten)]
    pub provider: ProviderKind,
    pub model: String,
    /// Environment variable holding the API key (never the key itself).
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_chunk_chars: usize,
    /// Fragments below this length are combined with their neighbor.
    pub min_chunk_chars: usize,
    /// Rows per storage write batch.
    pub batch_size: usize,
    /// Concurrent batch writes in flight.
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 1500,
            min_chunk_chars: 200,
            batch_size: 64,
            concurrency: 4,
        }
    }
}

impl AdvisorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chat.max_tool_iterations == 0 {
            anyhow::bail!("chat.max_tool_iterations must be at least 1");
        }
        if self.chat.max_retained_messages < 2 {
            anyhow::bail!("chat.max_retained_messages must be at least 2");
        }
        if self.chat.profile_snapshot_interval == 0 {
            anyhow::bail!("chat.profile_snapshot_interval must be at least 1");
        }
        if self.formatter.lead_max_words == 0 || self.formatter.sub_max_words == 0 {
            anyhow::bail!("formatter word budgets must be positive");
        }
        if self.formatter.boundary_window >= self.formatter.lead_max_words {
            anyhow::bail!("formatter.boundary_window must be smaller than the lead budget");
        }
        if self.retrieval.limit == 0 {
            anyhow::bail!("retrieval.limit must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.retrieval.distance_threshold) {
            anyhow::bail!("retrieval.distance_threshold must be within [0, 1]");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.ingest.batch_size == 0 || self.ingest.concurrency == 0 {
            anyhow::bail!("ingest.batch_size and ingest.concurrency must be positive");
        }
        if self.ingest.min_chunk_chars >= self.ingest.max_chunk_chars {
            anyhow::bail!("ingest.min_chunk_chars must be below ingest.max_chunk_chars");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        AdvisorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_invalid_budgets_rejected() {
        let mut config = AdvisorConfig::default();
        config.chat.max_tool_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = AdvisorConfig::default();
        config.formatter.boundary_window = config.formatter.lead_max_words;
        assert!(config.validate().is_err());

        let mut config = AdvisorConfig::default();
        config.ingest.min_chunk_chars = config.ingest.max_chunk_chars;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("advisor.json");

        let mut config = AdvisorConfig::default();
        config.chat.quality_scoring = true;
        config.retrieval.limit = 8;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = AdvisorConfig::from_file(&path).unwrap();
        assert!(loaded.chat.quality_scoring);
        assert_eq!(loaded.retrieval.limit, 8);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AdvisorConfig::from_file("/nonexistent/advisor.json").is_err());
    }
}
