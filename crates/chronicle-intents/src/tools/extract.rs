//! Stateless extraction tools. Unlike the action tools these never touch
//! `IntentContext` — they hand the model a deterministic reading of a single
//! field so it doesn't have to parse dates or names itself.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{json, Value};

use chronicle_agent::tools::{Tool, ToolResult};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

fn parse_datetime(raw: &str) -> Option<(String, f64)> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some((dt.to_rfc3339(), 1.0));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some((naive.format("%Y-%m-%dT%H:%M:%S").to_string(), 0.8));
        }
    }
    None
}

/// Parses a free-text datetime phrase into RFC3339, falling back across a
/// small set of common formats before giving up.
pub struct ExtractDatetimeTool;

#[async_trait]
impl Tool for ExtractDatetimeTool {
    fn name(&self) -> &str {
        "extract_datetime"
    }

    fn description(&self) -> &str {
        "Parse a datetime phrase already resolved to an absolute calendar date \
         (no 'tomorrow' or 'next week' — resolve relative phrases yourself first) \
         into a normalized timestamp. Returns null if unparseable."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Absolute datetime, e.g. '2026-08-14T09:00:00' or '08/14/2026 09:00'."
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let text = match input.get("text").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::error("missing required field 'text'"),
        };
        match parse_datetime(text.trim()) {
            Some((datetime, confidence)) => {
                ToolResult::success(json!({ "datetime": datetime, "confidence": confidence }).to_string())
            }
            None => ToolResult::success(json!({ "datetime": null, "confidence": 0.0 }).to_string()),
        }
    }
}

/// Echoes a trimmed location string. Kept as a tool rather than inlined so
/// the model commits to a single location field instead of scattering it
/// across free text.
pub struct ExtractLocationTool;

#[async_trait]
impl Tool for ExtractLocationTool {
    fn name(&self) -> &str {
        "extract_location"
    }

    fn description(&self) -> &str {
        "Normalize a location phrase (trims whitespace, collapses to a single line)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Raw location phrase." }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let text = match input.get("text").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::error("missing required field 'text'"),
        };
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        ToolResult::success(json!({ "location": normalized }).to_string())
    }
}

fn looks_like_email(token: &str) -> bool {
    token.contains('@') && token.contains('.')
}

/// Splits a free-text attendee list on commas and "and", flagging which
/// tokens look like email addresses.
pub struct ExtractAttendeesTool;

#[async_trait]
impl Tool for ExtractAttendeesTool {
    fn name(&self) -> &str {
        "extract_attendees"
    }

    fn description(&self) -> &str {
        "Split a free-text list of attendees (comma and 'and' separated) into \
         individual names or email addresses."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Raw attendee list, e.g. 'Jane, Bob and sam@corp.com'." }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let text = match input.get("text").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::error("missing required field 'text'"),
        };

        let attendees: Vec<Value> = text
            .replace(" and ", ",")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|token| {
                json!({
                    "name": token,
                    "is_email": looks_like_email(token),
                })
            })
            .collect();

        ToolResult::success(json!({ "attendees": attendees }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_rfc3339() {
        let out = ExtractDatetimeTool
            .execute(json!({"text": "2026-08-14T09:00:00Z"}))
            .await;
        assert!(!out.is_error);
        let parsed: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(parsed["confidence"], 1.0);
    }

    #[tokio::test]
    async fn falls_back_to_common_format() {
        let out = ExtractDatetimeTool
            .execute(json!({"text": "08/14/2026 09:00"}))
            .await;
        let parsed: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(parsed["confidence"], 0.8);
    }

    #[tokio::test]
    async fn unparseable_returns_null_not_error() {
        let out = ExtractDatetimeTool.execute(json!({"text": "whenever"})).await;
        assert!(!out.is_error);
        let parsed: Value = serde_json::from_str(&out.content).unwrap();
        assert!(parsed["datetime"].is_null());
    }

    #[tokio::test]
    async fn splits_attendees_and_flags_emails() {
        let out = ExtractAttendeesTool
            .execute(json!({"text": "Jane, Bob and sam@corp.com"}))
            .await;
        let parsed: Value = serde_json::from_str(&out.content).unwrap();
        let attendees = parsed["attendees"].as_array().unwrap();
        assert_eq!(attendees.len(), 3);
        assert_eq!(attendees[2]["is_email"], true);
    }
}
