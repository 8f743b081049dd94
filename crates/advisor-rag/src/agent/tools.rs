//! Agent tools and the logging wrapper every invocation goes through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::language::Language;
use crate::llm::ToolSchema;
use crate::storage::RetrievalBackend;

/// Input for a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_id: String,
    pub parameters: serde_json::Value,
}

/// Result from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

/// Per-turn context passed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: Uuid,
    pub language: Language,
}

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, input: ToolInput, context: ToolContext) -> anyhow::Result<ToolOutput>;
}

/// Registry of tools available to one agent.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    pub fn get(&self, tool_id: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.get(tool_id).cloned()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.id().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}

/// Run a tool with entry/exit logging and a hard timeout.
///
/// Errors are logged here and then propagated — the calling agent decides how
/// to degrade. Callers must not re-log the same failure.
pub async fn invoke_logged(
    tool: &Arc<dyn AgentTool>,
    input: ToolInput,
    context: ToolContext,
    timeout: Duration,
) -> anyhow::Result<ToolOutput> {
    let tool_id = tool.id().to_string();
    tracing::info!(tool = %tool_id, session = %context.session_id, "Tool invocation start");
    let start = std::time::Instant::now();

    let result = match tokio::time::timeout(timeout, tool.execute(input, context)).await {
        Ok(inner) => inner,
        Err(_) => Err(anyhow::anyhow!(
            "tool '{}' timed out after {:?}",
            tool_id,
            timeout
        )),
    };

    match &result {
        Ok(output) => {
            tracing::info!(
                tool = %tool_id,
                success = output.success,
                duration_ms = start.elapsed().as_millis() as u64,
                "Tool invocation complete"
            );
        }
        Err(e) => {
            tracing::error!(
                tool = %tool_id,
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Tool invocation failed"
            );
        }
    }

    result
}

/// The single tool sub-agents get: ranked passage retrieval from the
/// session language's collection.
pub struct RetrievalTool {
    backend: Arc<dyn RetrievalBackend>,
    limit: usize,
    distance_threshold: f32,
}

impl RetrievalTool {
    pub const ID: &'static str = "retrieve_context";

    pub fn new(backend: Arc<dyn RetrievalBackend>, limit: usize, distance_threshold: f32) -> Self {
        Self {
            backend,
            limit,
            distance_threshold,
        }
    }
}

#[async_trait]
impl AgentTool for RetrievalTool {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Retrieve the most relevant program-document passages for a query. \
         Returns ranked text snippets with their sources."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: ToolInput, context: ToolContext) -> anyhow::Result<ToolOutput> {
        let query = input.parameters["query"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing query parameter"))?;

        let hits = self
            .backend
            .query(query, context.language, self.limit, self.distance_threshold)
            .await?;

        if hits.is_empty() {
            return Ok(ToolOutput {
                success: true,
                output: format!("No program documents found for query: '{}'", query),
                error: None,
            });
        }

        let output = hits
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                format!(
                    "[{}] (source: {}, score: {:.3})\n{}",
                    i + 1,
                    hit.chunk.source,
                    hit.score,
                    hit.chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n");

        Ok(ToolOutput {
            success: true,
            output,
            error: None,
        })
    }
}
