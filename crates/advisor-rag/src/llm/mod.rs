//! LLM provider layer — message/tool types, the provider error taxonomy the
//! retry policy branches on, and the fallback model chain.
//!
//! Providers are dispatched through a single `LlmProvider` trait over a sealed
//! `ProviderKind`; retry/fallback is explicit `Result` handling in a loop, not
//! exception-driven control flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

pub mod http_provider;

pub use http_provider::HttpProvider;

/// A chat message with role, content, and optional tool call metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    /// Tool calls requested by the assistant (only present when role=Assistant)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is responding to (only present when role=Tool)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool (only present when role=Tool)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call emitted by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call (used to correlate with the tool result)
    pub id: String,
    pub name: String,
    /// JSON arguments string
    pub arguments: String,
}

/// Schema describing a tool the LLM can call (OpenAI-compatible format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters
    pub parameters: JsonValue,
}

/// The result of a chat completion — either text content or tool call requests.
#[derive(Debug, Clone)]
pub enum ChatResponse {
    Content(String),
    ToolCalls(Vec<ToolCall>),
}

/// Generation parameters, including the mandatory per-call timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

/// Typed provider errors. The retry policy branches on these: rate limits and
/// server errors are transient; a missing/unsupported model abandons the
/// current model immediately and moves to the next fallback.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    #[error("provider server error: {0}")]
    Server(String),
    #[error("model not found or unsupported: {0}")]
    NotFound(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Transient errors are retried up to the attempt budget; permanent ones
    /// abandon the model without retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Server(_) | Self::Timeout(_) | Self::Transport(_)
        )
    }
}

/// Sealed provider kinds, each dispatched through the same capability trait.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
    Custom { endpoint: String },
}

/// Static description of a configured model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
}

/// Core trait all providers implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One chat completion round-trip. Must respect `config.timeout_secs` and
    /// map provider failures onto the `LlmError` taxonomy.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        config: &GenerationConfig,
    ) -> Result<ChatResponse, LlmError>;

    fn info(&self) -> ModelInfo;
}

/// Bounded retry loop parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// An ordered degrade-gracefully chain of models: primary first, then
/// configured fallbacks. First-available policy, not a load balancer.
pub struct ModelChain {
    models: Vec<Arc<dyn LlmProvider>>,
    retry: RetryPolicy,
}

impl ModelChain {
    pub fn new(models: Vec<Arc<dyn LlmProvider>>, retry: RetryPolicy) -> Self {
        Self { models, retry }
    }

    pub fn single(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(vec![provider], RetryPolicy::default())
    }

    /// Run a chat completion against the chain.
    ///
    /// Each model gets up to `max_attempts` tries for transient errors;
    /// `NotFound` skips the remaining attempts and hands off to the next
    /// fallback immediately. Only after every fallback is exhausted does the
    /// call fail.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        config: &GenerationConfig,
    ) -> Result<ChatResponse, LlmError> {
        let mut last_error = LlmError::InvalidResponse("no models configured".into());

        for provider in &self.models {
            let info = provider.info();
            let mut attempt = 0u32;

            loop {
                attempt += 1;
                match provider.chat(messages, tools, config).await {
                    Ok(response) => {
                        if attempt > 1 {
                            tracing::info!(
                                model = %info.model,
                                attempt,
                                "Model call succeeded after retry"
                            );
                        }
                        return Ok(response);
                    }
                    Err(e) if matches!(e, LlmError::NotFound(_)) => {
                        tracing::warn!(
                            model = %info.model,
                            error = %e,
                            "Model unavailable, moving to next fallback"
                        );
                        last_error = e;
                        break;
                    }
                    Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                        tracing::warn!(
                            model = %info.model,
                            attempt,
                            max = self.retry.max_attempts,
                            error = %e,
                            "Transient model error, retrying"
                        );
                        tokio::time::sleep(self.retry.backoff * attempt).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            model = %info.model,
                            attempt,
                            error = %e,
                            "Model retries exhausted, moving to next fallback"
                        );
                        last_error = e;
                        break;
                    }
                }
            }
        }

        Err(last_error)
    }
}
