use std::sync::Arc;

use async_trait::async_trait;
use chronicle_agent::AgentRuntime;
use chronicle_core::{IntentModule, ModuleInput, ModuleOutput};

use crate::context::IntentContext;
use crate::language::{self, LanguagePolicyCounters};
use crate::policy;
use crate::prompt;
use crate::tools::event_tools;

fn validate_event(action: &str, payload: &serde_json::Value) -> Result<(), String> {
    match action {
        "create" => {
            let has_title = payload.get("title").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty());
            let has_start = payload.get("start_time").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty());
            if !has_title || !has_start {
                return Err("create_event requires title and start_time".to_string());
            }
            Ok(())
        }
        "update" => {
            if payload.get("target_id").and_then(|v| v.as_i64()).is_none() {
                return Err("update_event requires target_id".to_string());
            }
            let has_patch = ["title", "start_time", "end_time", "location", "description"]
                .iter()
                .any(|f| payload.get(*f).and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty()));
            if !has_patch {
                return Err("update_event requires at least one changed field".to_string());
            }
            Ok(())
        }
        "delete" => {
            if payload.get("target_id").and_then(|v| v.as_i64()).is_none() {
                return Err("delete_event requires target_id".to_string());
            }
            Ok(())
        }
        other => Err(format!("unknown event action '{other}'")),
    }
}

fn text_fields(payload: &serde_json::Value) -> Vec<(&'static str, String)> {
    ["title", "description", "location"]
        .iter()
        .filter_map(|field| payload.get(*field).and_then(|v| v.as_str()).map(|s| (*field, s.to_string())))
        .collect()
}

/// Decides whether an inbound message warrants an event create/update/delete,
/// via a bounded tool-calling loop over [`AgentRuntime`], followed by the
/// zero/one/ambiguous extraction rule and a single retry if the model
/// answered in the wrong language.
pub struct EventModule {
    runtime: Arc<AgentRuntime>,
    language_counters: LanguagePolicyCounters,
}

impl EventModule {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self {
            runtime,
            language_counters: LanguagePolicyCounters::default(),
        }
    }
}

#[async_trait]
impl IntentModule for EventModule {
    fn kind(&self) -> &'static str {
        "event"
    }

    async fn run(&self, input: ModuleInput) -> Result<ModuleOutput, String> {
        let ctx = Arc::new(IntentContext::new(input.current.source_id, input.current.user_id));
        let tools = event_tools(ctx.clone());
        let system_prompt = prompt::build_system_prompt("event", &input.open_proposals);
        let user_message = prompt::build_user_message(&input);
        let threshold = policy::confidence_threshold(input.current.source_type);

        self.runtime
            .run(&system_prompt, &tools, None, &user_message)
            .await
            .map_err(|e| e.to_string())?;

        let mut output = policy::extract_result(ctx.take_calls(), threshold, validate_event);

        let target_lang = language::detect_language(&input.current.text);
        let retryable = target_lang.reliable && matches!(output.action.as_str(), "create" | "update");
        if retryable {
            let mismatched = language::mismatched_fields(&text_fields(&output.payload), &target_lang);
            if !mismatched.is_empty() {
                self.language_counters.record_retry_fired("event");
                let instruction = language::corrective_instruction(&target_lang, &mismatched);
                let retry_message = format!("{user_message}\n\n{instruction}");

                if self.runtime.run(&system_prompt, &tools, None, &retry_message).await.is_ok() {
                    let retry_output = policy::extract_result(ctx.take_calls(), threshold, validate_event);
                    let still_mismatched =
                        !language::mismatched_fields(&text_fields(&retry_output.payload), &target_lang).is_empty();
                    if still_mismatched {
                        self.language_counters.record_retry_still_mismatched("event");
                    }
                    output = retry_output;
                }
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_title_and_start_time() {
        assert!(validate_event("create", &serde_json::json!({"title": "x"})).is_err());
        assert!(validate_event(
            "create",
            &serde_json::json!({"title": "x", "start_time": "2026-01-01T00:00:00Z"})
        )
        .is_ok());
    }

    #[test]
    fn update_requires_target_id_and_a_patch_field() {
        assert!(validate_event("update", &serde_json::json!({"target_id": 1})).is_err());
        assert!(validate_event("update", &serde_json::json!({"target_id": 1, "title": "y"})).is_ok());
    }

    #[test]
    fn delete_requires_target_id() {
        assert!(validate_event("delete", &serde_json::json!({})).is_err());
        assert!(validate_event("delete", &serde_json::json!({"target_id": 1})).is_ok());
    }

    #[test]
    fn unknown_action_rejected() {
        assert!(validate_event("frobnicate", &serde_json::json!({})).is_err());
    }
}
