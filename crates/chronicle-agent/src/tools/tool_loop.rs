//! Tool execution loop — the core agentic behavior.
//!
//! Flow: prompt → LLM → if tool_use → execute tools → inject results → LLM → repeat.
//! Stops when: stop_reason is `end_turn`, `max_turns` is reached, or the
//! provider reports a stop reason other than `end_turn`/`tool_use`.

use tracing::{debug, info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};

use super::{Tool, ToolResult};

/// Run the full tool execution loop (non-streaming).
///
/// Starts from `initial_request`, which must have `messages` or
/// `raw_messages` set. Returns the final `ChatResponse` (the one with
/// `stop_reason == "end_turn"`).
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    initial_request: ChatRequest,
    tools: &[Box<dyn Tool>],
    max_turns: usize,
) -> Result<ChatResponse, ProviderError> {
    assert!(max_turns >= 1, "max_turns must be at least 1");

    // Build initial raw JSON message list from the structured messages.
    let mut raw_messages: Vec<serde_json::Value> =
        if let Some(ref raw) = initial_request.raw_messages {
            raw.clone()
        } else {
            initial_request
                .messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect()
        };

    let mut last_response: Option<ChatResponse> = None;

    for iteration in 0..max_turns {
        // Build the request for this iteration, injecting the full message history.
        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(iteration, "tool loop iteration");

        let response = provider.send(&req).await?;

        match response.stop_reason.as_str() {
            "end_turn" => {
                info!(iteration, "tool loop complete");
                return Ok(response);
            }
            "tool_use" => {}
            other => {
                return Err(ProviderError::UnexpectedStopReason(other.to_string()));
            }
        }

        // Build the assistant turn content block list.
        // It includes any text content plus the tool_use blocks.
        let mut assistant_content: Vec<serde_json::Value> = Vec::new();

        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({
                "type": "text",
                "text": response.content,
            }));
        }

        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }

        // Append the assistant message.
        raw_messages.push(serde_json::json!({
            "role": "assistant",
            "content": assistant_content,
        }));

        // Execute each tool call and collect results, in order.
        let mut tool_result_content: Vec<serde_json::Value> = Vec::new();

        for call in &response.tool_calls {
            let result = execute_tool(tools, call).await;
            tool_result_content.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": call.id,
                "content": result.content,
                "is_error": result.is_error,
            }));
        }

        // Append the user message containing all tool results.
        raw_messages.push(serde_json::json!({
            "role": "user",
            "content": tool_result_content,
        }));

        last_response = Some(response);
    }

    warn!(max_turns, "tool loop hit maximum turns");

    if let Some(resp) = last_response {
        Ok(resp)
    } else {
        Err(ProviderError::Parse(format!(
            "tool loop exceeded {max_turns} turns without a final response"
        )))
    }
}

/// Find and execute the named tool. Returns an error ToolResult if not found.
async fn execute_tool(tools: &[Box<dyn Tool>], call: &ToolCall) -> ToolResult {
    match tools.iter().find(|t| t.name() == call.name) {
        Some(tool) => {
            debug!(tool = %call.name, "executing tool");
            tool.execute(call.input.clone()).await
        }
        None => ToolResult::error(format!("unknown tool: {}", call.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, Role};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubProvider {
        responses: std::sync::Mutex<Vec<ChatResponse>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.remove(0))
        }
    }

    fn base_request() -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            system: "be helpful".to_string(),
            system_prompt: None,
            messages: vec![Message {
                role: Role::User,
                content: "hi".to_string(),
            }],
            max_tokens: 1024,
            stream: false,
            thinking: None,
            tools: vec![],
            tool_choice: None,
            raw_messages: None,
        }
    }

    fn end_turn_response() -> ChatResponse {
        ChatResponse {
            content: "done".to_string(),
            model: "test-model".to_string(),
            tokens_in: 1,
            tokens_out: 1,
            stop_reason: "end_turn".to_string(),
            tool_calls: vec![],
        }
    }

    #[tokio::test]
    async fn stops_immediately_on_end_turn() {
        let provider = StubProvider {
            responses: std::sync::Mutex::new(vec![end_turn_response()]),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let result = run_tool_loop(&provider, base_request(), &[], 5).await.unwrap();
        assert_eq!(result.content, "done");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unexpected_stop_reason_is_an_error() {
        let mut weird = end_turn_response();
        weird.stop_reason = "max_tokens".to_string();
        let provider = StubProvider {
            responses: std::sync::Mutex::new(vec![weird]),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let err = run_tool_loop(&provider, base_request(), &[], 5).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnexpectedStopReason(_)));
    }

    #[tokio::test]
    async fn hitting_max_turns_returns_last_response_instead_of_looping_forever() {
        let tool_use = ChatResponse {
            content: String::new(),
            model: "test-model".to_string(),
            tokens_in: 1,
            tokens_out: 1,
            stop_reason: "tool_use".to_string(),
            tool_calls: vec![crate::provider::ToolCall {
                id: "call_1".to_string(),
                name: "noop".to_string(),
                input: serde_json::json!({}),
            }],
        };
        let provider = StubProvider {
            responses: std::sync::Mutex::new(vec![tool_use.clone(), tool_use.clone(), tool_use]),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let result = run_tool_loop(&provider, base_request(), &[], 3).await.unwrap();
        assert_eq!(result.stop_reason, "tool_use");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
