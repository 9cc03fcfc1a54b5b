//! Tool-calling agent runtime: a bounded `model_call -> (tool_calls)? ->
//! model_call` loop over a single Anthropic provider, used by intent
//! modules to turn a message plus context into a structured decision.

pub mod anthropic;
pub mod anthropic_stream;
pub mod prompt;
pub mod provider;
pub mod runtime;
pub mod stream;
pub mod thinking;
pub mod tools;

pub use anthropic::AnthropicProvider;
pub use prompt::SystemPrompt;
pub use provider::{
    ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, ToolCall, ToolChoice,
    ToolDefinition,
};
pub use runtime::AgentRuntime;
pub use thinking::ThinkingLevel;
pub use tools::{Tool, ToolResult};
