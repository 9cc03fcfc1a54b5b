use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One attendee on a remote event, normalized the way the sync worker
/// compares them: lowercased email, optional display name, optional flag.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAttendee {
    pub email: String,
    pub display_name: Option<String>,
    pub optional: bool,
}

/// An event as the external calendar represents it.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Vec<RemoteAttendee>,
}

/// Fields needed to create or overwrite a remote event. Separate from
/// [`RemoteEvent`] since a create/update call has no `external_id` yet.
#[derive(Debug, Clone)]
pub struct RemoteEventDraft {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Vec<RemoteAttendee>,
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    /// Distinguishable not-found, so callers can fall back to another
    /// calendar id rather than treating every failure as fatal.
    #[error("event not found")]
    NotFound,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("calendar unavailable: {0}")]
    Unavailable(String),
}

/// Outbound contract to the external calendar service. `calendar_id` is
/// opaque to callers — `"primary"` is a reserved value meaning the user's
/// default calendar, per the convention every implementation is expected
/// to honor.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn list_events_in_range(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, CalendarError>;

    async fn get_event(&self, calendar_id: &str, external_id: &str) -> Result<RemoteEvent, CalendarError>;

    async fn create_event(&self, calendar_id: &str, draft: &RemoteEventDraft) -> Result<RemoteEvent, CalendarError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        external_id: &str,
        draft: &RemoteEventDraft,
    ) -> Result<RemoteEvent, CalendarError>;

    async fn delete_event(&self, calendar_id: &str, external_id: &str) -> Result<(), CalendarError>;
}
