//! The per-session orchestrator.
//!
//! `AgentChain::ask` is the single entry point for a user turn. It runs the
//! fixed pipeline — input normalization, language locking, scope check, cache
//! lookup, lead tool loop, formatting, quality scoring, profile extraction,
//! cache write-back — and is total: every failure path degrades to a fixed
//! apologetic message instead of surfacing an error to the chat widget.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::prompts;
use crate::agent::sub_agent::{SubAgent, SubAgentTool};
use crate::agent::tools::{invoke_logged, RetrievalTool, ToolContext, ToolInput, ToolRegistry};
use crate::cache::{CacheStrategy, MetricCounters};
use crate::config::AdvisorConfig;
use crate::formatter::{self, AgentRole, FormatterConfig};
use crate::input::process_input;
use crate::language::{detect_language, Language};
use crate::llm::{ChatMessage, ChatResponse, GenerationConfig};
use crate::profile;
use crate::quality::QualityScorer;
use crate::scope::{self, ScopeCategory};
use crate::telemetry::ProfileSnapshot;
use crate::types::{CachedAnswer, ConversationState, Program, StructuredAgentResponse};
use crate::AdvisorServices;

const CONTINUE_PHRASES: &[&str] = &[
    "continue", "go on", "yes", "yes please", "weiter", "ja", "ja bitte", "bitte weiter",
];

pub struct AgentChain {
    services: AdvisorServices,
    config: AdvisorConfig,
    formatter: FormatterConfig,
    registry: ToolRegistry,
    quality: Option<QualityScorer>,
    state: ConversationState,
    history: Vec<ChatMessage>,
    /// Overflow text held back by the chunker, served on a continue request.
    pending_continuation: Option<String>,
}

impl AgentChain {
    /// Build a session. Fails fast on invalid configuration; a constructed
    /// chain never returns an error from `ask`.
    pub fn new(services: AdvisorServices, config: AdvisorConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let mut registry = ToolRegistry::new();
        for program in Program::all() {
            let retrieval: Arc<dyn crate::agent::tools::AgentTool> = Arc::new(RetrievalTool::new(
                services.retrieval.clone(),
                config.retrieval.limit,
                config.retrieval.distance_threshold,
            ));
            let sub = Arc::new(SubAgent::new(
                program,
                services.chain.clone(),
                retrieval,
                config.chat.generation.clone(),
                Duration::from_secs(config.chat.tool_timeout_secs),
            ));
            registry.register(Arc::new(SubAgentTool::new(sub)));
        }

        let quality = config
            .chat
            .quality_scoring
            .then(|| QualityScorer::new(services.chain.clone()));

        let greeting = prompts::greeting(config.chat.default_language);
        let formatter = config.formatter.to_formatter_config();

        Ok(Self {
            services,
            formatter,
            registry,
            quality,
            state: ConversationState::new(),
            history: vec![ChatMessage::assistant(greeting)],
            pending_continuation: None,
            config,
        })
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn greeting(&self) -> &str {
        self.history
            .first()
            .and_then(|m| m.content.as_deref())
            .unwrap_or_default()
    }

    pub fn cache_metrics(&self) -> Option<MetricCounters> {
        self.services.cache.as_ref().map(|c| c.metrics().snapshot())
    }

    fn current_language(&self) -> Language {
        self.state
            .locked_language
            .unwrap_or(self.config.chat.default_language)
    }

    /// Handle one user turn. Total: never returns an error.
    pub async fn ask(&mut self, raw: &str) -> StructuredAgentResponse {
        match self.run_turn(raw).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    session = %self.state.session_id,
                    error = %e,
                    "Turn failed, substituting apologetic response"
                );
                let language = self.current_language();
                let mut response = StructuredAgentResponse::new(
                    prompts::apologetic_message(language),
                    language,
                );
                response.confidence = 0.0;
                response.confidence_fallback = true;
                response
            }
        }
    }

    async fn run_turn(&mut self, raw: &str) -> anyhow::Result<StructuredAgentResponse> {
        let (processed, valid) = process_input(raw, &self.history);
        if !valid {
            // Invalid input never touches session state or history
            return Ok(StructuredAgentResponse::new(
                prompts::clarification_message(self.current_language()),
                self.current_language(),
            ));
        }

        let language = self.resolve_language(&processed);
        self.state.user_turns += 1;

        if let Some(response) = self.try_serve_continuation(&processed, language) {
            return Ok(response);
        }

        let category = scope::check_scope(&processed, language);
        if category != ScopeCategory::OnTopic {
            return Ok(self.handle_scope_violation(&processed, category, language));
        }
        self.state.scope_violations = 0;

        if let Some(cache) = &self.services.cache {
            if let Some(hit) = cache.get(&processed, language).await {
                tracing::info!(session = %self.state.session_id, "Cache hit, skipping model call");
                return Ok(self.finish_cached_turn(&processed, hit, language));
            }
        }

        let (text, consulted, budget_exhausted) = self.run_lead_loop(&processed, language).await?;

        let (primary, continuation) = formatter::format_response(
            &text,
            AgentRole::Lead,
            self.config.chat.enable_chunking,
            &self.formatter,
        );
        self.pending_continuation = continuation;

        let confidence = match &self.quality {
            Some(scorer) => scorer
                .score(&processed, &primary, language)
                .await
                .map(|s| s.overall())
                .unwrap_or(1.0),
            None => 1.0,
        };

        if self.config.chat.profile_extraction {
            let first_suggestion = self.extract_profile(&processed, &primary);
            self.maybe_snapshot(first_suggestion);
        }

        self.history.push(ChatMessage::user(processed.clone()));
        self.history.push(ChatMessage::assistant(primary.clone()));

        let should_cache = !consulted.is_empty() && self.pending_continuation.is_none();
        if should_cache {
            if let Some(cache) = &self.services.cache {
                cache
                    .set(
                        &processed,
                        CachedAnswer {
                            text: primary.clone(),
                            appointment_requested: self.state.handover_requested,
                            relevant_programs: consulted.clone(),
                        },
                        language,
                        Duration::from_secs(self.config.cache.ttl_secs),
                    )
                    .await;
            }
        }

        let mut response = StructuredAgentResponse::new(primary, language);
        response.confidence = confidence;
        response.max_turns_reached = budget_exhausted;
        response.appointment_requested = self.state.handover_requested;
        response.should_cache = should_cache;
        response.relevant_programs = consulted;
        Ok(response)
    }

    fn resolve_language(&mut self, text: &str) -> Language {
        if !self.config.chat.language_locking {
            return detect_language(text);
        }
        match self.state.locked_language {
            Some(language) => language,
            None => {
                let detected = detect_language(text);
                self.state.locked_language = Some(detected);
                tracing::info!(
                    session = %self.state.session_id,
                    language = detected.code(),
                    "Session language locked"
                );
                detected
            }
        }
    }

    /// Serve held-back overflow text when the user asks to continue.
    fn try_serve_continuation(
        &mut self,
        processed: &str,
        language: Language,
    ) -> Option<StructuredAgentResponse> {
        let lower = processed.trim().to_lowercase();
        let wants_more = CONTINUE_PHRASES.iter().any(|p| lower == *p);
        if !wants_more {
            return None;
        }
        let held = self.pending_continuation.take()?;

        let (primary, rest) = if self.config.chat.enable_chunking {
            formatter::chunk_response(
                &held,
                self.formatter.lead_max_words,
                self.formatter.boundary_window,
            )
        } else {
            (held, None)
        };
        self.pending_continuation = rest;

        self.history.push(ChatMessage::user(processed.to_string()));
        self.history.push(ChatMessage::assistant(primary.clone()));

        if self.config.chat.profile_extraction {
            self.maybe_snapshot(false);
        }
        Some(StructuredAgentResponse::new(primary, language))
    }

    fn handle_scope_violation(
        &mut self,
        processed: &str,
        category: ScopeCategory,
        language: Language,
    ) -> StructuredAgentResponse {
        self.state.scope_violations += 1;
        let (escalate, kind) = scope::should_escalate(category, self.state.scope_violations);

        let text = match (escalate, kind) {
            (true, Some(kind)) => {
                self.state.handover_requested = true;
                tracing::warn!(
                    session = %self.state.session_id,
                    violations = self.state.scope_violations,
                    "Escalating conversation to a human advisor"
                );
                scope::get_escalation_message(kind, language)
            }
            _ => scope::get_redirect_message(category, language),
        };

        self.history.push(ChatMessage::user(processed.to_string()));
        self.history.push(ChatMessage::assistant(text));

        if self.config.chat.profile_extraction {
            self.maybe_snapshot(false);
        }

        let mut response = StructuredAgentResponse::new(text, language);
        response.appointment_requested = escalate;
        response
    }

    fn finish_cached_turn(
        &mut self,
        processed: &str,
        hit: CachedAnswer,
        language: Language,
    ) -> StructuredAgentResponse {
        if self.config.chat.profile_extraction {
            let first_suggestion = self.extract_profile(processed, &hit.text);
            self.maybe_snapshot(first_suggestion);
        }
        self.history.push(ChatMessage::user(processed.to_string()));
        self.history.push(ChatMessage::assistant(hit.text.clone()));

        let mut response = StructuredAgentResponse::new(hit.text, language);
        response.appointment_requested = hit.appointment_requested || self.state.handover_requested;
        response.relevant_programs = hit.relevant_programs;
        response
    }

    /// Lead-agent tool loop. At most one specialist consultation per turn:
    /// after the first sub-agent round the tool list goes empty.
    async fn run_lead_loop(
        &mut self,
        processed: &str,
        language: Language,
    ) -> anyhow::Result<(String, Vec<Program>, bool)> {
        let mut messages = self.build_request(processed, language);
        let schemas = self.registry.schemas();
        let mut specialist_used = false;
        let mut consulted: Vec<Program> = Vec::new();
        let context = ToolContext {
            session_id: self.state.session_id,
            language,
        };
        let generation: &GenerationConfig = &self.config.chat.generation;
        let tool_timeout = Duration::from_secs(self.config.chat.tool_timeout_secs);

        for _ in 0..self.config.chat.max_tool_iterations {
            let tools = if specialist_used { &[][..] } else { &schemas[..] };
            let response = self
                .services
                .chain
                .chat(&messages, tools, generation)
                .await?;

            let calls = match response {
                ChatResponse::Content(text) => return Ok((text, consulted, false)),
                ChatResponse::ToolCalls(calls) => calls,
            };

            messages.push(ChatMessage::assistant_tool_calls(calls.clone()));
            for call in calls {
                let content = match self.registry.get(&call.name) {
                    Some(tool) => {
                        if let Some(program) = call
                            .name
                            .strip_prefix("ask_")
                            .and_then(Program::from_id)
                        {
                            if !consulted.contains(&program) {
                                consulted.push(program);
                            }
                        }
                        let parameters =
                            serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null);
                        match invoke_logged(
                            &tool,
                            ToolInput {
                                tool_id: call.name.clone(),
                                parameters,
                            },
                            context.clone(),
                            tool_timeout,
                        )
                        .await
                        {
                            Ok(output) => output.output,
                            Err(e) => format!("Tool error: {}", e),
                        }
                    }
                    None => format!("Unknown tool: {}", call.name),
                };
                messages.push(ChatMessage::tool_result(call.id, call.name, content));
            }
            specialist_used = true;
        }

        // Iteration budget spent: one last call with no tools forces an answer
        tracing::warn!(
            session = %self.state.session_id,
            "Tool iteration budget exhausted, forcing a final answer"
        );
        match self.services.chain.chat(&messages, &[], generation).await? {
            ChatResponse::Content(text) => Ok((text, consulted, true)),
            ChatResponse::ToolCalls(_) => {
                anyhow::bail!("model kept requesting tools after the iteration budget")
            }
        }
    }

    /// Assemble the model request: system prompts, the most recent history
    /// window, and the current user message.
    fn build_request(&self, processed: &str, language: Language) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system(prompts::lead_system_prompt(&Program::all())),
            ChatMessage::system(prompts::language_directive(language)),
        ];

        let window = self.config.chat.max_retained_messages;
        let start = self.history.len().saturating_sub(window);
        if start > 0 {
            tracing::debug!(
                session = %self.state.session_id,
                dropped = start,
                "History window exceeded, dropping oldest turns from request"
            );
        }
        messages.extend(self.history[start..].iter().cloned());
        messages.push(ChatMessage::user(processed));
        messages
    }

    /// Fold the turn's text into the session profile. Returns true when this
    /// turn produced the first program suggestion.
    fn extract_profile(&mut self, query: &str, response_text: &str) -> bool {
        let had_suggestion = self.state.suggested_program.is_some();
        let combined = format!("{} {}", query, response_text);
        profile::update_state_from_turn(&mut self.state, &combined);
        !had_suggestion && self.state.suggested_program.is_some()
    }

    /// Record a profile snapshot when forced or when the turn counter lands
    /// on the snapshot interval. Called on every counted user turn, so
    /// redirect and continuation turns keep the interval schedule.
    fn maybe_snapshot(&self, force: bool) {
        let interval_due =
            self.state.user_turns % self.config.chat.profile_snapshot_interval == 0;
        if !(force || interval_due) {
            return;
        }

        let snapshot = ProfileSnapshot {
            session_id: self.state.session_id,
            timestamp: Utc::now(),
            profile: self.state.profile.clone(),
            mentioned_programs: self.state.mentioned_programs.clone(),
            suggested_program: self.state.suggested_program,
            handover_requested: self.state.handover_requested,
            user_turns: self.state.user_turns,
        };
        if let Err(e) = self.services.profile_sink.record(&snapshot) {
            tracing::warn!(
                session = %self.state.session_id,
                error = %e,
                "Profile snapshot write failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheMetrics, DictCache};
    use crate::llm::{LlmError, LlmProvider, ModelChain, ModelInfo, ToolCall, ToolSchema};
    use crate::storage::{MemoryStore, RetrievalBackend};
    use crate::telemetry::{NoopProfileSink, ProfileSink};
    use crate::types::RetrievalChunk;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ScriptedProvider {
        script: Mutex<Vec<ChatResponse>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<ChatResponse>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSchema],
            _config: &GenerationConfig,
        ) -> Result<ChatResponse, LlmError> {
            *self.calls.lock() += 1;
            let mut script = self.script.lock();
            if script.is_empty() {
                return Err(LlmError::InvalidResponse("script exhausted".into()));
            }
            Ok(script.remove(0))
        }

        fn info(&self) -> ModelInfo {
            ModelInfo {
                provider: "test".into(),
                model: "scripted".into(),
            }
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for language in Language::all() {
            store
                .batch_import(
                    vec![RetrievalChunk {
                        chunk_id: RetrievalChunk::compute_chunk_id(&format!(
                            "fees {}",
                            language.code()
                        )),
                        text: "Die Studiengebühren für das Executive MBA Programm betragen \
                               CHF 75'000 inklusive Lehrmaterial."
                            .into(),
                        source: "gebuehren.md".into(),
                        document_id: "doc-fees".into(),
                        programs: vec![Program::Emba],
                        ingested_at: Utc::now(),
                    }],
                    language,
                )
                .await
                .unwrap();
        }
        store
    }

    fn services(
        provider: Arc<ScriptedProvider>,
        store: Arc<dyn RetrievalBackend>,
        cache: Option<Arc<dyn CacheStrategy>>,
    ) -> AdvisorServices {
        AdvisorServices {
            chain: Arc::new(ModelChain::single(provider)),
            retrieval: store,
            cache,
            profile_sink: Arc::new(NoopProfileSink),
        }
    }

    fn full_answer_script() -> Vec<ChatResponse> {
        vec![
            // Lead routes to the EMBA specialist
            ChatResponse::ToolCalls(vec![ToolCall {
                id: "call-1".into(),
                name: "ask_emba".into(),
                arguments: r#"{"question": "Was kostet das EMBA Programm?"}"#.into(),
            }]),
            // Specialist retrieves, then answers
            ChatResponse::ToolCalls(vec![ToolCall {
                id: "call-2".into(),
                name: "retrieve_context".into(),
                arguments: r#"{"query": "Studiengebühren EMBA"}"#.into(),
            }]),
            ChatResponse::Content(
                "Die Studiengebühren betragen CHF 75'000 inklusive Lehrmaterial.".into(),
            ),
            // Lead synthesizes the final answer
            ChatResponse::Content(
                "Das Executive MBA Programm kostet CHF 75'000, inklusive aller Lehrmaterialien."
                    .into(),
            ),
        ]
    }

    #[tokio::test]
    async fn test_german_fee_question_end_to_end() {
        let provider = Arc::new(ScriptedProvider::new(full_answer_script()));
        let store = seeded_store().await;
        let mut chain = AgentChain::new(
            services(provider, store, None),
            AdvisorConfig::default(),
        )
        .unwrap();

        let response = chain.ask("Was kostet das EMBA HSG Programm?").await;

        assert!(!response.confidence_fallback);
        assert!(!response.text.is_empty());
        assert!(response.text.contains("75'000"));
        assert!(!response.text.contains('|'));
        assert!(
            response.text.split_whitespace().count()
                <= AdvisorConfig::default().formatter.lead_max_words
                    + AdvisorConfig::default().formatter.boundary_window
        );
        assert_eq!(response.detected_language, Language::German);
        assert_eq!(response.relevant_programs, vec![Program::Emba]);
        assert!(response.should_cache);
        assert_eq!(chain.state().locked_language, Some(Language::German));
    }

    #[tokio::test]
    async fn test_empty_input_returns_clarification_without_state_change() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let store = seeded_store().await;
        let mut chain = AgentChain::new(
            services(provider.clone(), store, None),
            AdvisorConfig::default(),
        )
        .unwrap();

        let response = chain.ask("   ").await;
        assert_eq!(response.text, prompts::clarification_message(Language::German));
        assert_eq!(chain.state().user_turns, 0);
        assert_eq!(*provider.calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_off_topic_redirect_without_model_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let store = seeded_store().await;
        let mut chain = AgentChain::new(
            services(provider.clone(), store, None),
            AdvisorConfig::default(),
        )
        .unwrap();

        let first = chain.ask("What do you think about the weather today?").await;
        assert!(!first.appointment_requested);
        assert_eq!(*provider.calls.lock(), 0);
        assert_eq!(chain.state().scope_violations, 1);

        // Second consecutive off-topic turn escalates
        let second = chain.ask("Ok but who wins the football match?").await;
        assert!(second.appointment_requested);
        assert!(chain.state().handover_requested);
    }

    #[tokio::test]
    async fn test_financial_question_escalates_immediately() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let store = seeded_store().await;
        let mut chain = AgentChain::new(
            services(provider, store, None),
            AdvisorConfig::default(),
        )
        .unwrap();

        let response = chain.ask("Can you arrange a loan for the tuition?").await;
        assert!(response.appointment_requested);
        assert_eq!(chain.state().scope_violations, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_model() {
        let metrics = Arc::new(CacheMetrics::new());
        let cache: Arc<dyn CacheStrategy> = Arc::new(DictCache::new(metrics));
        cache
            .set(
                "Was kostet das EMBA?",
                CachedAnswer {
                    text: "Das EMBA kostet CHF 75'000.".into(),
                    appointment_requested: false,
                    relevant_programs: vec![Program::Emba],
                },
                Language::German,
                Duration::from_secs(60),
            )
            .await;

        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let store = seeded_store().await;
        let mut chain = AgentChain::new(
            services(provider.clone(), store, Some(cache)),
            AdvisorConfig::default(),
        )
        .unwrap();

        // Key normalization makes the punctuation variant collide
        let response = chain.ask("was kostet das emba").await;
        assert!(response.text.contains("75'000"));
        assert_eq!(*provider.calls.lock(), 0);
        assert_eq!(response.relevant_programs, vec![Program::Emba]);
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_apology() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let store = seeded_store().await;
        let mut chain = AgentChain::new(
            services(provider, store, None),
            AdvisorConfig::default(),
        )
        .unwrap();

        let response = chain.ask("Wie lange dauert das EMBA Programm?").await;
        assert!(response.confidence_fallback);
        assert_eq!(response.confidence, 0.0);
        assert_eq!(response.text, prompts::apologetic_message(Language::German));
    }

    #[tokio::test]
    async fn test_long_answer_chunked_and_continued() {
        let long_answer = "Das Programm umfasst viele Module. ".repeat(60);
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::Content(
            long_answer,
        )]));
        let store = seeded_store().await;
        let mut chain = AgentChain::new(
            services(provider, store, None),
            AdvisorConfig::default(),
        )
        .unwrap();

        let first = chain.ask("Welche Module hat das EMBA?").await;
        assert!(first.text.contains(formatter::CONTINUATION_PROMPT.trim()));

        let second = chain.ask("weiter").await;
        assert!(!second.text.is_empty());
        assert!(!second.confidence_fallback);
    }

    struct CountingSink {
        snapshots: std::sync::atomic::AtomicUsize,
    }

    impl ProfileSink for CountingSink {
        fn record(&self, _snapshot: &ProfileSnapshot) -> anyhow::Result<()> {
            self.snapshots
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_snapshot_interval_counts_redirect_turns() {
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::Content(
            "We offer weekend sessions on campus.".into(),
        )]));
        let store = seeded_store().await;
        let sink = Arc::new(CountingSink {
            snapshots: std::sync::atomic::AtomicUsize::new(0),
        });

        let mut config = AdvisorConfig::default();
        config.chat.profile_snapshot_interval = 2;

        let mut chain = AgentChain::new(
            AdvisorServices {
                chain: Arc::new(ModelChain::single(provider)),
                retrieval: store,
                cache: None,
                profile_sink: sink.clone(),
            },
            config,
        )
        .unwrap();

        // Turn 1: on-topic, no suggestion, interval not due
        chain.ask("Do you offer evening classes?").await;
        assert_eq!(sink.snapshots.load(std::sync::atomic::Ordering::SeqCst), 0);

        // Turn 2 is a redirect, but the interval still lands on it
        chain.ask("What do you think about the weather today?").await;
        assert_eq!(sink.snapshots.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_profile_extracted_from_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::Content(
            "Great background! The Executive MBA fits experienced leaders.".into(),
        )]));
        let store = seeded_store().await;
        let mut chain = AgentChain::new(
            services(provider, store, None),
            AdvisorConfig::default(),
        )
        .unwrap();

        chain
            .ask("I have 8 years of work experience and 3 years of leadership experience.")
            .await;
        assert_eq!(chain.state().profile.experience_years, Some(8));
        assert_eq!(chain.state().suggested_program, Some(Program::Emba));
    }
}
