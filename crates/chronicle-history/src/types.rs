use chrono::{DateTime, Timelike, Utc};

use chronicle_core::{ActionType, ChannelId, Priority, ProposalStatus};

/// A single attendee on an event proposal, normalized for diffing against
/// the external calendar's attendee list.
#[derive(Debug, Clone, PartialEq)]
pub struct Attendee {
    pub email: String,
    pub display_name: Option<String>,
    pub optional: bool,
}

/// A locally stored candidate calendar event awaiting user confirmation.
#[derive(Debug, Clone)]
pub struct EventProposal {
    pub id: i64,
    pub user_id: i64,
    pub channel_id: ChannelId,
    pub title: String,
    pub description: Option<String>,
    pub status: ProposalStatus,
    pub action_type: ActionType,
    pub llm_reasoning: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub attendees: Vec<Attendee>,
    pub calendar_id: Option<String>,
    pub external_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A locally stored candidate reminder awaiting user confirmation.
#[derive(Debug, Clone)]
pub struct ReminderProposal {
    pub id: i64,
    pub user_id: i64,
    pub channel_id: ChannelId,
    pub title: String,
    pub description: Option<String>,
    pub status: ProposalStatus,
    pub action_type: ActionType,
    pub llm_reasoning: String,
    pub due_date: DateTime<Utc>,
    pub notify_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// Normalize a title for duplicate-suppression comparisons: lowercase, trimmed.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Truncate a timestamp to minute precision for duplicate-suppression comparisons.
pub fn normalize_instant(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normalize_title_trims_and_lowercases() {
        assert_eq!(normalize_title("  Dentist Appointment  "), "dentist appointment");
    }

    #[test]
    fn normalize_instant_truncates_seconds() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 10, 30, 45).unwrap();
        let truncated = normalize_instant(ts);
        assert_eq!(truncated.second(), 0);
        assert_eq!(truncated.minute(), 30);
    }
}
