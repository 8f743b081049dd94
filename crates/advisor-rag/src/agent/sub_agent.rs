//! Per-program specialist agents.
//!
//! A sub-agent answers one question about exactly one program. It gets a
//! single tool (`retrieve_context`) and is allowed one retrieval: after the
//! first tool round the schema list goes empty, so the model has to answer
//! from what it already fetched.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::prompts;
use crate::agent::tools::{invoke_logged, AgentTool, ToolContext, ToolInput, ToolOutput};
use crate::language::Language;
use crate::llm::{ChatMessage, ChatResponse, GenerationConfig, ModelChain, ToolSchema};
use crate::types::Program;

const MAX_SUB_ITERATIONS: usize = 4;

pub struct SubAgent {
    program: Program,
    chain: Arc<ModelChain>,
    retrieval: Arc<dyn AgentTool>,
    generation: GenerationConfig,
    tool_timeout: Duration,
}

impl SubAgent {
    pub fn new(
        program: Program,
        chain: Arc<ModelChain>,
        retrieval: Arc<dyn AgentTool>,
        generation: GenerationConfig,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            program,
            chain,
            retrieval,
            generation,
            tool_timeout,
        }
    }

    pub fn program(&self) -> Program {
        self.program
    }

    /// Answer one question about this agent's program.
    pub async fn run(&self, question: &str, context: &ToolContext) -> anyhow::Result<String> {
        let mut messages = vec![
            ChatMessage::system(prompts::sub_system_prompt(self.program)),
            ChatMessage::system(prompts::language_directive(context.language)),
            ChatMessage::user(question),
        ];

        let schemas = vec![ToolSchema {
            name: self.retrieval.id().to_string(),
            description: self.retrieval.description().to_string(),
            parameters: self.retrieval.parameters_schema(),
        }];
        let mut retrieval_done = false;

        for _ in 0..MAX_SUB_ITERATIONS {
            let tools: &[ToolSchema] = if retrieval_done { &[] } else { &schemas };

            let response = self.chain.chat(&messages, tools, &self.generation).await?;

            match response {
                ChatResponse::Content(text) => return Ok(text),
                ChatResponse::ToolCalls(calls) => {
                    messages.push(ChatMessage::assistant_tool_calls(calls.clone()));
                    for call in calls {
                        let result = self.run_tool(&call.name, &call.arguments, context).await;
                        let content = match result {
                            Ok(output) => output.output,
                            Err(e) => format!("Tool error: {}", e),
                        };
                        messages.push(ChatMessage::tool_result(call.id, call.name, content));
                    }
                    retrieval_done = true;
                }
            }
        }

        anyhow::bail!(
            "specialist for {} produced no answer within {} rounds",
            self.program.display_name(),
            MAX_SUB_ITERATIONS
        )
    }

    async fn run_tool(
        &self,
        name: &str,
        arguments: &str,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        if name != self.retrieval.id() {
            anyhow::bail!("unknown tool requested: {}", name);
        }
        let parameters: serde_json::Value = serde_json::from_str(arguments)
            .map_err(|e| anyhow::anyhow!("malformed tool arguments: {}", e))?;
        invoke_logged(
            &self.retrieval,
            ToolInput {
                tool_id: name.to_string(),
                parameters,
            },
            context.clone(),
            self.tool_timeout,
        )
        .await
    }
}

/// Adapter exposing a sub-agent as a tool the lead agent can call.
pub struct SubAgentTool {
    id: String,
    description: String,
    agent: Arc<SubAgent>,
}

impl SubAgentTool {
    pub fn new(agent: Arc<SubAgent>) -> Self {
        let program = agent.program();
        Self {
            id: prompts::sub_agent_tool_id(program),
            description: format!(
                "Ask the {} specialist a question about that program \
                 (admission, curriculum, fees, schedule).",
                program.display_name()
            ),
            agent,
        }
    }
}

#[async_trait]
impl AgentTool for SubAgentTool {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The user's question, rephrased for the specialist"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, input: ToolInput, context: ToolContext) -> anyhow::Result<ToolOutput> {
        let question = input.parameters["question"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing question parameter"))?;

        let answer = self.agent.run(question, &context).await?;
        Ok(ToolOutput {
            success: true,
            output: answer,
            error: None,
        })
    }
}
