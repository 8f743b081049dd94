//! Agent hierarchy: a lead agent that answers directly or routes to
//! per-program sub-agents through tool calls, plus the orchestrator state
//! machine that drives each conversation turn.

pub mod chain;
pub mod prompts;
pub mod sub_agent;
pub mod tools;

pub use chain::AgentChain;
pub use sub_agent::SubAgent;
pub use tools::{AgentTool, RetrievalTool, ToolContext, ToolInput, ToolOutput, ToolRegistry};
