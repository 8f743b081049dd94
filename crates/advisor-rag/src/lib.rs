//! Conversational advisor engine for a university's executive-education
//! portfolio.
//!
//! The crate is organized around one conversation orchestrator
//! ([`agent::AgentChain`]) and one document pipeline
//! ([`pipeline::ImportPipeline`]), both driven through injected services:
//! a fallback model chain, a retrieval backend, an optional response cache,
//! and a profile telemetry sink.

use std::sync::Arc;

pub mod agent;
pub mod cache;
pub mod config;
pub mod formatter;
pub mod input;
pub mod language;
pub mod llm;
pub mod pipeline;
pub mod profile;
pub mod quality;
pub mod scope;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use agent::AgentChain;
pub use cache::{build_cache, CacheConfig, CacheMode, CacheStrategy};
pub use config::AdvisorConfig;
pub use language::{detect_language, Language};
pub use llm::{HttpProvider, LlmProvider, ModelChain};
pub use pipeline::ImportPipeline;
pub use storage::{MemoryStore, RetrievalBackend};
pub use telemetry::{JsonlProfileSink, NoopProfileSink, ProfileSink};
pub use types::{Program, StructuredAgentResponse};

/// The injected collaborators an [`AgentChain`] session runs against.
/// Cloned per session; all members are shared handles.
#[derive(Clone)]
pub struct AdvisorServices {
    pub chain: Arc<ModelChain>,
    pub retrieval: Arc<dyn RetrievalBackend>,
    pub cache: Option<Arc<dyn CacheStrategy>>,
    pub profile_sink: Arc<dyn ProfileSink>,
}

impl AdvisorServices {
    /// Assemble services from configuration: the model fallback chain from
    /// the configured model list, the cache per its mode, and the JSONL
    /// profile sink when a log path is set.
    pub fn from_config(
        config: &AdvisorConfig,
        retrieval: Arc<dyn RetrievalBackend>,
    ) -> anyhow::Result<Self> {
        if config.models.is_empty() {
            anyhow::bail!("at least one model must be configured");
        }

        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::with_capacity(config.models.len());
        for model in &config.models {
            // Keyless providers (Ollama, some gateways) run without api_key_env
            let api_key = match &model.api_key_env {
                Some(var) => std::env::var(var)
                    .map_err(|_| anyhow::anyhow!("environment variable {} is not set", var))?,
                None => String::new(),
            };
            providers.push(Arc::new(HttpProvider::new(
                model.provider.clone(),
                api_key,
                model.model.clone(),
            )?));
        }

        let profile_sink: Arc<dyn ProfileSink> = match &config.profile_log_path {
            Some(path) => Arc::new(JsonlProfileSink::new(path.clone())),
            None => Arc::new(NoopProfileSink),
        };

        Ok(Self {
            chain: Arc::new(ModelChain::new(providers, config.retry.to_policy())),
            retrieval,
            cache: cache::build_cache(&config.cache),
            profile_sink,
        })
    }
}
