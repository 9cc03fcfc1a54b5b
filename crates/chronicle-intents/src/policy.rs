use chronicle_core::{ModuleOutput, SourceType};

use crate::context::ActionCall;

pub const CHAT_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const EMAIL_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Email gets a lower bar: subject lines and quoted threads make confident
/// extraction harder than a live chat turn.
pub fn confidence_threshold(source_type: SourceType) -> f64 {
    match source_type {
        SourceType::Email => EMAIL_CONFIDENCE_THRESHOLD,
        _ => CHAT_CONFIDENCE_THRESHOLD,
    }
}

/// Applies the zero/one/ambiguous action-call extraction rule, then the
/// caller's field-validation rule, collapsing anything invalid into a
/// `"none"` output rather than ever erroring the run.
pub fn extract_result(
    calls: Vec<ActionCall>,
    threshold: f64,
    validate: impl Fn(&str, &serde_json::Value) -> Result<(), String>,
) -> ModuleOutput {
    match calls.len() {
        0 => ModuleOutput {
            action: "none".to_string(),
            payload: serde_json::json!({}),
            reasoning: "no action tool call".to_string(),
        },
        1 => {
            let call = calls.into_iter().next().expect("length checked above");
            if call.action == "none" {
                let reason = call
                    .payload
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("no action warranted")
                    .to_string();
                return ModuleOutput {
                    action: "none".to_string(),
                    payload: call.payload,
                    reasoning: reason,
                };
            }

            let confidence = call.payload.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let reasoning = call
                .payload
                .get("reasoning")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            if confidence < threshold {
                return ModuleOutput {
                    action: "none".to_string(),
                    payload: call.payload,
                    reasoning: format!("confidence {confidence:.2} below threshold {threshold:.2}"),
                };
            }

            if let Err(reason) = validate(&call.action, &call.payload) {
                return ModuleOutput {
                    action: "none".to_string(),
                    payload: call.payload,
                    reasoning: reason,
                };
            }

            ModuleOutput {
                action: call.action,
                payload: call.payload,
                reasoning,
            }
        }
        _ => ModuleOutput {
            action: "none".to_string(),
            payload: serde_json::json!({}),
            reasoning: "ambiguous: more than one action tool call".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_validate(_: &str, _: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }

    #[test]
    fn zero_calls_yields_none() {
        let out = extract_result(vec![], 0.7, ok_validate);
        assert_eq!(out.action, "none");
    }

    #[test]
    fn two_calls_yields_ambiguous_none() {
        let calls = vec![
            ActionCall { action: "create".into(), payload: serde_json::json!({"confidence": 0.9}) },
            ActionCall { action: "delete".into(), payload: serde_json::json!({"confidence": 0.9}) },
        ];
        let out = extract_result(calls, 0.7, ok_validate);
        assert_eq!(out.action, "none");
        assert!(out.reasoning.contains("ambiguous"));
    }

    #[test]
    fn low_confidence_single_call_yields_none() {
        let calls = vec![ActionCall {
            action: "create".into(),
            payload: serde_json::json!({"confidence": 0.3, "reasoning": "weak signal"}),
        }];
        let out = extract_result(calls, 0.7, ok_validate);
        assert_eq!(out.action, "none");
    }

    #[test]
    fn failing_validation_yields_none() {
        let calls = vec![ActionCall {
            action: "create".into(),
            payload: serde_json::json!({"confidence": 0.9, "reasoning": "ok"}),
        }];
        let out = extract_result(calls, 0.7, |_, _| Err("missing title".to_string()));
        assert_eq!(out.action, "none");
        assert_eq!(out.reasoning, "missing title");
    }

    #[test]
    fn valid_single_call_passes_through() {
        let calls = vec![ActionCall {
            action: "create".into(),
            payload: serde_json::json!({"confidence": 0.9, "reasoning": "clear ask", "title": "Dentist"}),
        }];
        let out = extract_result(calls, 0.7, ok_validate);
        assert_eq!(out.action, "create");
        assert_eq!(out.reasoning, "clear ask");
    }
}
