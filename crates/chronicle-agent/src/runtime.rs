use tracing::info;

use crate::prompt::SystemPrompt;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, ToolChoice};
use crate::tools::tool_loop;
use crate::tools::Tool;

/// Runs a single model through the bounded tool-calling loop: one provider,
/// one configured `max_turns` bound, reused across every call.
pub struct AgentRuntime {
    provider: Box<dyn LlmProvider>,
    model: String,
    max_turns: usize,
}

impl AgentRuntime {
    pub fn new(provider: Box<dyn LlmProvider>, model: String, max_turns: usize) -> Self {
        Self {
            provider,
            model,
            max_turns,
        }
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        &*self.provider
    }

    /// Run the tool loop to completion: `system_prompt` and `tools` are
    /// supplied by the caller (an intent module), `user_message` seeds the
    /// conversation, `tool_choice` optionally forces a specific tool on the
    /// first turn.
    pub async fn run(
        &self,
        system_prompt: &SystemPrompt,
        tools: &[Box<dyn Tool>],
        tool_choice: Option<ToolChoice>,
        user_message: &str,
    ) -> Result<ChatResponse, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            system: system_prompt.to_plain_text(),
            system_prompt: Some(system_prompt.clone()),
            messages: vec![Message {
                role: Role::User,
                content: user_message.to_string(),
            }],
            max_tokens: 4096,
            stream: false,
            thinking: None,
            tools: crate::tools::to_definitions(tools),
            tool_choice,
            raw_messages: None,
        };

        info!(
            model = %request.model, provider = %self.provider.name(), max_turns = self.max_turns,
            "running tool-calling loop"
        );

        tool_loop::run_tool_loop(&*self.provider, request, tools, self.max_turns).await
    }
}
