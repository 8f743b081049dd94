//! HTTP-backed LLM provider for the supported API families.
//!
//! OpenAI-compatible endpoints (OpenAI, Google's OpenAI-compat surface,
//! Ollama, custom gateways) share one code path; Anthropic has its own wire
//! format. HTTP failures are mapped onto the `LlmError` taxonomy so the
//! retry policy can branch on them.

use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;

use super::{
    ChatMessage, ChatResponse, ChatRole, GenerationConfig, LlmError, LlmProvider, ModelInfo,
    ProviderKind, ToolCall, ToolSchema,
};
use async_trait::async_trait;

pub struct HttpProvider {
    kind: ProviderKind,
    api_key: String,
    model: String,
    client: Client,
}

impl HttpProvider {
    pub fn new(kind: ProviderKind, api_key: String, model: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        tracing::info!(kind = ?kind, model = %model, "Creating HttpProvider");

        Ok(Self {
            kind,
            api_key,
            model,
            client,
        })
    }

    fn endpoint(&self) -> String {
        match &self.kind {
            ProviderKind::OpenAi => "https://api.openai.com/v1/chat/completions".to_string(),
            ProviderKind::Anthropic => "https://api.anthropic.com/v1/messages".to_string(),
            // Google exposes an OpenAI-compatible chat surface
            ProviderKind::Google => {
                "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                    .to_string()
            }
            ProviderKind::Ollama => "http://localhost:11434/v1/chat/completions".to_string(),
            ProviderKind::Custom { endpoint } => endpoint.clone(),
        }
    }

    fn map_status(status: StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            429 => LlmError::RateLimited(body),
            404 => LlmError::NotFound(body),
            500..=599 => LlmError::Server(format!("HTTP {}: {}", status, body)),
            // 400 with a model error message is how several providers report
            // unknown model names
            400 if body.contains("model") && body.contains("not") => LlmError::NotFound(body),
            _ => LlmError::InvalidResponse(format!("HTTP {}: {}", status, body)),
        }
    }

    fn map_transport(e: reqwest::Error, timeout_secs: u64) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(timeout_secs)
        } else {
            LlmError::Transport(e.to_string())
        }
    }

    fn format_openai_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                    ChatRole::Tool => "tool",
                };
                let mut obj = json!({ "role": role });
                if let Some(ref content) = m.content {
                    obj["content"] = json!(content);
                }
                if let Some(ref calls) = m.tool_calls {
                    obj["tool_calls"] = json!(calls
                        .iter()
                        .map(|tc| json!({
                            "id": tc.id,
                            "type": "function",
                            "function": { "name": tc.name, "arguments": tc.arguments }
                        }))
                        .collect::<Vec<_>>());
                }
                if let Some(ref id) = m.tool_call_id {
                    obj["tool_call_id"] = json!(id);
                }
                obj
            })
            .collect()
    }

    fn format_openai_tools(tools: &[ToolSchema]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    }
                })
            })
            .collect()
    }

    /// Anthropic takes the system prompt out-of-band and represents tool
    /// results as user-role content blocks. Multiple system messages are
    /// concatenated in order — callers send the role prompt and the language
    /// directive as separate messages and both must survive.
    fn format_anthropic_messages(
        messages: &[ChatMessage],
    ) -> (Option<String>, Vec<serde_json::Value>) {
        let mut system: Option<String> = None;
        let mut out = Vec::new();

        for m in messages {
            match m.role {
                ChatRole::System => {
                    if let Some(content) = &m.content {
                        match system.as_mut() {
                            Some(existing) => {
                                existing.push_str("\n\n");
                                existing.push_str(content);
                            }
                            None => system = Some(content.clone()),
                        }
                    }
                }
                ChatRole::User => {
                    out.push(json!({ "role": "user", "content": m.content.clone().unwrap_or_default() }));
                }
                ChatRole::Assistant => {
                    if let Some(ref calls) = m.tool_calls {
                        let blocks: Vec<_> = calls
                            .iter()
                            .map(|tc| {
                                let input: serde_json::Value =
                                    serde_json::from_str(&tc.arguments).unwrap_or(json!({}));
                                json!({ "type": "tool_use", "id": tc.id, "name": tc.name, "input": input })
                            })
                            .collect();
                        out.push(json!({ "role": "assistant", "content": blocks }));
                    } else {
                        out.push(json!({ "role": "assistant", "content": m.content.clone().unwrap_or_default() }));
                    }
                }
                ChatRole::Tool => {
                    out.push(json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                            "content": m.content.clone().unwrap_or_default()
                        }]
                    }));
                }
            }
        }

        (system, out)
    }

    fn format_anthropic_tools(tools: &[ToolSchema]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters
                })
            })
            .collect()
    }

    async fn openai_chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        config: &GenerationConfig,
    ) -> Result<ChatResponse, LlmError> {
        let mut request = json!({
            "model": self.model,
            "messages": Self::format_openai_messages(messages),
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "stream": false
        });

        if !tools.is_empty() {
            request["tools"] = json!(Self::format_openai_tools(tools));
            request["tool_choice"] = json!("auto");
        }

        let endpoint = self.endpoint();
        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::map_transport(e, config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("{} returned non-JSON: {}", endpoint, e)))?;

        let choice = &body["choices"][0]["message"];

        if let Some(tool_calls) = choice["tool_calls"].as_array() {
            let calls: Vec<ToolCall> = tool_calls
                .iter()
                .filter_map(|tc| {
                    Some(ToolCall {
                        id: tc["id"].as_str()?.to_string(),
                        name: tc["function"]["name"].as_str()?.to_string(),
                        arguments: tc["function"]["arguments"].as_str()?.to_string(),
                    })
                })
                .collect();
            if !calls.is_empty() {
                return Ok(ChatResponse::ToolCalls(calls));
            }
        }

        let content = choice["content"].as_str().unwrap_or("").to_string();
        Ok(ChatResponse::Content(content))
    }

    async fn anthropic_chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        config: &GenerationConfig,
    ) -> Result<ChatResponse, LlmError> {
        let (system_prompt, api_messages) = Self::format_anthropic_messages(messages);

        let mut request = json!({
            "model": self.model,
            "messages": api_messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature
        });

        if let Some(ref sys) = system_prompt {
            request["system"] = json!(sys);
        }
        if !tools.is_empty() {
            request["tools"] = json!(Self::format_anthropic_tools(tools));
        }

        let endpoint = self.endpoint();
        let response = self
            .client
            .post(&endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(Duration::from_secs(config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::map_transport(e, config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("{} returned non-JSON: {}", endpoint, e)))?;

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();

        if let Some(content) = body["content"].as_array() {
            for block in content {
                match block["type"].as_str() {
                    Some("text") => {
                        if let Some(text) = block["text"].as_str() {
                            text_parts.push(text.to_string());
                        }
                    }
                    Some("tool_use") => {
                        if let (Some(id), Some(name)) =
                            (block["id"].as_str(), block["name"].as_str())
                        {
                            let args = serde_json::to_string(&block["input"])
                                .unwrap_or_else(|_| "{}".to_string());
                            tool_calls.push(ToolCall {
                                id: id.to_string(),
                                name: name.to_string(),
                                arguments: args,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        if !tool_calls.is_empty() {
            Ok(ChatResponse::ToolCalls(tool_calls))
        } else {
            Ok(ChatResponse::Content(text_parts.join("")))
        }
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        config: &GenerationConfig,
    ) -> Result<ChatResponse, LlmError> {
        match &self.kind {
            ProviderKind::Anthropic => self.anthropic_chat(messages, tools, config).await,
            _ => self.openai_chat(messages, tools, config).await,
        }
    }

    fn info(&self) -> ModelInfo {
        let provider = match &self.kind {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Custom { .. } => "custom",
        };
        ModelInfo {
            provider: provider.to_string(),
            model: self.model.clone(),
        }
    }
}
