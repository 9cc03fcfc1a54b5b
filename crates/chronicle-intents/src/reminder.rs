use std::sync::Arc;

use async_trait::async_trait;
use chronicle_agent::AgentRuntime;
use chronicle_core::{IntentModule, ModuleInput, ModuleOutput};

use crate::context::IntentContext;
use crate::language::{self, LanguagePolicyCounters};
use crate::policy;
use crate::prompt;
use crate::tools::reminder_tools;

fn validate_reminder(action: &str, payload: &serde_json::Value) -> Result<(), String> {
    match action {
        "create" => {
            let has_title = payload.get("title").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty());
            let has_due = payload.get("due_date").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty());
            if !has_title || !has_due {
                return Err("create_reminder requires title and due_date".to_string());
            }
            Ok(())
        }
        "update" => {
            if payload.get("target_id").and_then(|v| v.as_i64()).is_none() {
                return Err("update_reminder requires target_id".to_string());
            }
            let has_patch = ["title", "due_date", "description"]
                .iter()
                .any(|f| payload.get(*f).and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty()));
            if !has_patch {
                return Err("update_reminder requires at least one changed field".to_string());
            }
            Ok(())
        }
        "delete" => {
            if payload.get("target_id").and_then(|v| v.as_i64()).is_none() {
                return Err("delete_reminder requires target_id".to_string());
            }
            Ok(())
        }
        other => Err(format!("unknown reminder action '{other}'")),
    }
}

fn text_fields(payload: &serde_json::Value) -> Vec<(&'static str, String)> {
    ["title", "description"]
        .iter()
        .filter_map(|field| payload.get(*field).and_then(|v| v.as_str()).map(|s| (*field, s.to_string())))
        .collect()
}

/// Decides whether an inbound message warrants a reminder create/update/
/// delete. Structurally identical to [`crate::event::EventModule`] but over
/// the reminder tool set and due_date instead of start_time.
pub struct ReminderModule {
    runtime: Arc<AgentRuntime>,
    language_counters: LanguagePolicyCounters,
}

impl ReminderModule {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self {
            runtime,
            language_counters: LanguagePolicyCounters::default(),
        }
    }
}

#[async_trait]
impl IntentModule for ReminderModule {
    fn kind(&self) -> &'static str {
        "reminder"
    }

    async fn run(&self, input: ModuleInput) -> Result<ModuleOutput, String> {
        let ctx = Arc::new(IntentContext::new(input.current.source_id, input.current.user_id));
        let tools = reminder_tools(ctx.clone());
        let system_prompt = prompt::build_system_prompt("reminder", &input.open_proposals);
        let user_message = prompt::build_user_message(&input);
        let threshold = policy::confidence_threshold(input.current.source_type);

        self.runtime
            .run(&system_prompt, &tools, None, &user_message)
            .await
            .map_err(|e| e.to_string())?;

        let mut output = policy::extract_result(ctx.take_calls(), threshold, validate_reminder);

        let target_lang = language::detect_language(&input.current.text);
        let retryable = target_lang.reliable && matches!(output.action.as_str(), "create" | "update");
        if retryable {
            let mismatched = language::mismatched_fields(&text_fields(&output.payload), &target_lang);
            if !mismatched.is_empty() {
                self.language_counters.record_retry_fired("reminder");
                let instruction = language::corrective_instruction(&target_lang, &mismatched);
                let retry_message = format!("{user_message}\n\n{instruction}");

                if self.runtime.run(&system_prompt, &tools, None, &retry_message).await.is_ok() {
                    let retry_output = policy::extract_result(ctx.take_calls(), threshold, validate_reminder);
                    let still_mismatched =
                        !language::mismatched_fields(&text_fields(&retry_output.payload), &target_lang).is_empty();
                    if still_mismatched {
                        self.language_counters.record_retry_still_mismatched("reminder");
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
    fn create_requires_title_and_due_date() {
        assert!(validate_reminder("create", &serde_json::json!({"title": "x"})).is_err());
        assert!(validate_reminder(
            "create",
            &serde_json::json!({"title": "x", "due_date": "2026-01-01T00:00:00Z"})
        )
        .is_ok());
    }

    #[test]
    fn delete_requires_target_id() {
        assert!(validate_reminder("delete", &serde_json::json!({})).is_err());
        assert!(validate_reminder("delete", &serde_json::json!({"target_id": 1})).is_ok());
    }
}
