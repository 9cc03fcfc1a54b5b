pub mod action;
pub mod extract;

use std::sync::Arc;

use chronicle_agent::tools::Tool;

use crate::context::IntentContext;
use action::{EventActionTool, NoActionTool, ReminderActionTool};
use extract::{ExtractAttendeesTool, ExtractDatetimeTool, ExtractLocationTool};

/// Full tool set offered to the event module's agent loop.
pub fn event_tools(ctx: Arc<IntentContext>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ExtractDatetimeTool),
        Box::new(ExtractLocationTool),
        Box::new(ExtractAttendeesTool),
        Box::new(EventActionTool::create(ctx.clone())),
        Box::new(EventActionTool::update(ctx.clone())),
        Box::new(EventActionTool::delete(ctx.clone())),
        Box::new(NoActionTool::event(ctx)),
    ]
}

/// Full tool set offered to the reminder module's agent loop.
pub fn reminder_tools(ctx: Arc<IntentContext>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ExtractDatetimeTool),
        Box::new(ReminderActionTool::create(ctx.clone())),
        Box::new(ReminderActionTool::update(ctx.clone())),
        Box::new(ReminderActionTool::delete(ctx.clone())),
        Box::new(NoActionTool::reminder(ctx)),
    ]
}
