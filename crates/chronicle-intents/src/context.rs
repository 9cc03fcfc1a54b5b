use std::sync::Mutex;

use chronicle_core::{ChannelId, UserId};

/// One action-tool invocation captured during a single module run.
#[derive(Debug, Clone)]
pub struct ActionCall {
    pub action: String,
    pub payload: serde_json::Value,
}

/// Shared state threaded through every tool for a single module invocation.
/// Identifies the channel/user the run is scoped to, and accumulates every
/// action-tool call so the module can apply the zero/one/ambiguous rule once
/// the agent loop finishes, following the corpus's `ReminderTool<C:
/// MessageContext>` generic-over-context shape.
pub struct IntentContext {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    calls: Mutex<Vec<ActionCall>>,
}

impl IntentContext {
    pub fn new(channel_id: ChannelId, user_id: UserId) -> Self {
        Self {
            channel_id,
            user_id,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn record_action(&self, action: &str, payload: serde_json::Value) {
        self.calls.lock().unwrap().push(ActionCall {
            action: action.to_string(),
            payload,
        });
    }

    pub fn take_calls(&self) -> Vec<ActionCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_in_order() {
        let ctx = IntentContext::new(ChannelId(1), UserId(1));
        ctx.record_action("create", serde_json::json!({"title": "a"}));
        ctx.record_action("none", serde_json::json!({"reason": "b"}));
        let calls = ctx.take_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].action, "create");
        assert_eq!(calls[1].action, "none");
        assert!(ctx.take_calls().is_empty());
    }
}
