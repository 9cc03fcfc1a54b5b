use chronicle_agent::SystemPrompt;
use chronicle_core::ModuleInput;

const EVENT_STATIC: &str = "You decide whether an inbound message warrants a calendar event \
change. You have exactly one action tool per outcome: create_event, update_event, \
delete_event, or no_event_action. Call exactly one of them, exactly once. Use \
extract_datetime, extract_location, and extract_attendees to normalize fields before \
calling the action tool. Always reply in the same language the sender used. Base \
update_event and delete_event on the open proposals listed below; their target_id must \
match one of the ids shown there.";

const REMINDER_STATIC: &str = "You decide whether an inbound message warrants a reminder \
change. You have exactly one action tool per outcome: create_reminder, update_reminder, \
delete_reminder, or no_reminder_action. Call exactly one of them, exactly once. Use \
extract_datetime to normalize due dates before calling the action tool. Always reply in \
the same language the sender used. Base update_reminder and delete_reminder on the open \
proposals listed below; their target_id must match one of the ids shown there.";

/// Builds the 3-tier prompt for a module run. The open-proposals listing goes
/// in the volatile tier since it changes on every call; the instruction text
/// is static so it's cached across calls for the same module.
pub fn build_system_prompt(kind: &str, open_proposals: &[serde_json::Value]) -> SystemPrompt {
    let static_tier = match kind {
        "event" => EVENT_STATIC,
        "reminder" => REMINDER_STATIC,
        other => unreachable!("unknown intent module kind: {other}"),
    };

    let mut prompt = SystemPrompt::new(static_tier);
    prompt.volatile_tier = if open_proposals.is_empty() {
        "Open proposals: none.".to_string()
    } else {
        format!(
            "Open proposals:\n{}",
            serde_json::to_string_pretty(open_proposals).unwrap_or_default()
        )
    };
    prompt
}

/// Renders bounded history plus the current message into the single user
/// turn the agent loop is seeded with.
pub fn build_user_message(input: &ModuleInput) -> String {
    let mut out = String::new();
    if !input.history.is_empty() {
        out.push_str("Recent channel history:\n");
        for msg in &input.history {
            out.push_str(&format!("[{}] {}: {}\n", msg.timestamp.to_rfc3339(), msg.sender_name, msg.text));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "Current message from {}: {}",
        input.current.sender_name, input.current.text
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_proposals_render_as_none() {
        let prompt = build_system_prompt("event", &[]);
        assert!(prompt.volatile_tier.contains("none"));
    }

    #[test]
    fn non_empty_proposals_render_as_json() {
        let proposals = vec![serde_json::json!({"id": 1, "title": "Standup"})];
        let prompt = build_system_prompt("reminder", &proposals);
        assert!(prompt.volatile_tier.contains("Standup"));
    }
}
