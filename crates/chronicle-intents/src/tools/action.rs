//! Action tools. Each one only records its call onto the shared
//! `IntentContext`; none of them touch persistence directly — the processor
//! that owns the module's output is the sole place that turns a recorded
//! call into a stored event or reminder. The tool *name* exposed to the
//! model is kind-specific (`create_event`, `create_reminder`, ...) but the
//! recorded action string is the bare `ActionType` tag (`create`, `update`,
//! `delete`, `none`) the processor already knows how to parse.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use chronicle_agent::tools::{Tool, ToolResult};

use crate::context::IntentContext;

/// Action tool for event create/update/delete. One instance per action, so
/// the model is forced to pick exactly one tool rather than an `action`
/// enum field on a single shared tool.
pub struct EventActionTool {
    ctx: Arc<IntentContext>,
    tool_name: &'static str,
    action_type: &'static str,
}

impl EventActionTool {
    pub fn create(ctx: Arc<IntentContext>) -> Self {
        Self { ctx, tool_name: "create_event", action_type: "create" }
    }

    pub fn update(ctx: Arc<IntentContext>) -> Self {
        Self { ctx, tool_name: "update_event", action_type: "update" }
    }

    pub fn delete(ctx: Arc<IntentContext>) -> Self {
        Self { ctx, tool_name: "delete_event", action_type: "delete" }
    }
}

#[async_trait]
impl Tool for EventActionTool {
    fn name(&self) -> &str {
        self.tool_name
    }

    fn description(&self) -> &str {
        match self.tool_name {
            "create_event" => {
                "Call this exactly once when the message clearly asks to schedule a new \
                 calendar event. Requires title and start_time; include confidence (0-1) \
                 and a short reasoning."
            }
            "update_event" => {
                "Call this exactly once when the message clearly asks to change an existing \
                 event from the open proposals list. Requires target_id; include only the \
                 fields that change, confidence (0-1), and a short reasoning."
            }
            "delete_event" => {
                "Call this exactly once when the message clearly asks to cancel or remove an \
                 existing event from the open proposals list. Requires target_id, confidence \
                 (0-1), and a short reasoning."
            }
            _ => unreachable!(),
        }
    }

    fn input_schema(&self) -> Value {
        match self.tool_name {
            "create_event" => json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "start_time": { "type": "string", "description": "RFC3339 timestamp." },
                    "end_time": { "type": "string", "description": "RFC3339 timestamp, optional." },
                    "location": { "type": "string" },
                    "description": { "type": "string" },
                    "attendees": { "type": "array", "items": { "type": "string" } },
                    "confidence": { "type": "number" },
                    "reasoning": { "type": "string" }
                },
                "required": ["title", "start_time", "confidence", "reasoning"]
            }),
            "update_event" => json!({
                "type": "object",
                "properties": {
                    "target_id": { "type": "integer" },
                    "title": { "type": "string" },
                    "start_time": { "type": "string" },
                    "end_time": { "type": "string" },
                    "location": { "type": "string" },
                    "description": { "type": "string" },
                    "confidence": { "type": "number" },
                    "reasoning": { "type": "string" }
                },
                "required": ["target_id", "confidence", "reasoning"]
            }),
            "delete_event" => json!({
                "type": "object",
                "properties": {
                    "target_id": { "type": "integer" },
                    "confidence": { "type": "number" },
                    "reasoning": { "type": "string" }
                },
                "required": ["target_id", "confidence", "reasoning"]
            }),
            _ => unreachable!(),
        }
    }

    async fn execute(&self, input: Value) -> ToolResult {
        self.ctx.record_action(self.action_type, input);
        ToolResult::success("recorded")
    }
}

/// Analogous to [`EventActionTool`] for reminders.
pub struct ReminderActionTool {
    ctx: Arc<IntentContext>,
    tool_name: &'static str,
    action_type: &'static str,
}

impl ReminderActionTool {
    pub fn create(ctx: Arc<IntentContext>) -> Self {
        Self { ctx, tool_name: "create_reminder", action_type: "create" }
    }

    pub fn update(ctx: Arc<IntentContext>) -> Self {
        Self { ctx, tool_name: "update_reminder", action_type: "update" }
    }

    pub fn delete(ctx: Arc<IntentContext>) -> Self {
        Self { ctx, tool_name: "delete_reminder", action_type: "delete" }
    }
}

#[async_trait]
impl Tool for ReminderActionTool {
    fn name(&self) -> &str {
        self.tool_name
    }

    fn description(&self) -> &str {
        match self.tool_name {
            "create_reminder" => {
                "Call this exactly once when the message clearly asks to be reminded of \
                 something. Requires title and due_date, confidence (0-1), and a short reasoning."
            }
            "update_reminder" => {
                "Call this exactly once when the message clearly asks to change an existing \
                 reminder from the open proposals list. Requires target_id; include only the \
                 fields that change, confidence (0-1), and a short reasoning."
            }
            "delete_reminder" => {
                "Call this exactly once when the message clearly asks to cancel an existing \
                 reminder from the open proposals list. Requires target_id, confidence (0-1), \
                 and a short reasoning."
            }
            _ => unreachable!(),
        }
    }

    fn input_schema(&self) -> Value {
        match self.tool_name {
            "create_reminder" => json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "due_date": { "type": "string", "description": "RFC3339 timestamp." },
                    "description": { "type": "string" },
                    "confidence": { "type": "number" },
                    "reasoning": { "type": "string" }
                },
                "required": ["title", "due_date", "confidence", "reasoning"]
            }),
            "update_reminder" => json!({
                "type": "object",
                "properties": {
                    "target_id": { "type": "integer" },
                    "title": { "type": "string" },
                    "due_date": { "type": "string" },
                    "description": { "type": "string" },
                    "confidence": { "type": "number" },
                    "reasoning": { "type": "string" }
                },
                "required": ["target_id", "confidence", "reasoning"]
            }),
            "delete_reminder" => json!({
                "type": "object",
                "properties": {
                    "target_id": { "type": "integer" },
                    "confidence": { "type": "number" },
                    "reasoning": { "type": "string" }
                },
                "required": ["target_id", "confidence", "reasoning"]
            }),
            _ => unreachable!(),
        }
    }

    async fn execute(&self, input: Value) -> ToolResult {
        self.ctx.record_action(self.action_type, input);
        ToolResult::success("recorded")
    }
}

/// Escape hatch: the model calls this when the message doesn't warrant
/// touching the calendar or reminder list at all.
pub struct NoActionTool {
    ctx: Arc<IntentContext>,
    tool_name: &'static str,
}

impl NoActionTool {
    pub fn event(ctx: Arc<IntentContext>) -> Self {
        Self { ctx, tool_name: "no_event_action" }
    }

    pub fn reminder(ctx: Arc<IntentContext>) -> Self {
        Self { ctx, tool_name: "no_reminder_action" }
    }
}

#[async_trait]
impl Tool for NoActionTool {
    fn name(&self) -> &str {
        self.tool_name
    }

    fn description(&self) -> &str {
        "Call this when nothing in the message warrants a calendar or reminder change."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string", "description": "Why no action is warranted." }
            },
            "required": ["reason"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        self.ctx.record_action("none", input);
        ToolResult::success("recorded")
    }
}
