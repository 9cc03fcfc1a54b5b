//! Per-user calendar reconciliation. Grounded on the corpus's
//! `SchedulerEngine::run`: one `tokio::select! { interval.tick() | shutdown.changed() }`
//! task per active user, each tick isolating every event's reconciliation so
//! one calendar-API error logs and `continue`s rather than aborting the tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use chronicle_accounts::{AccountRegistry, CalendarSettings, OAuthCredentials};
use chronicle_calendar::{CalendarClient, CalendarError, GoogleCalendarClient, GoogleCredentials};
use chronicle_core::{ChannelId, ProposalStatus, UserId};
use chronicle_history::{Attendee, EventProposal, EventProposalStore};

use crate::error::Result;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(30);
const LOOKBACK_DAYS: i64 = 30;
const LOOKAHEAD_DAYS: i64 = 365;

fn google_credentials(oauth: &OAuthCredentials) -> GoogleCredentials {
    GoogleCredentials {
        access_token: oauth.access_token.clone(),
        refresh_token: oauth.refresh_token.clone(),
        client_id: oauth.client_id.clone(),
        client_secret: oauth.client_secret.clone(),
        expiry_date: oauth.expiry_date,
    }
}

/// Drives the per-user reconciliation loop described in the ticking worker's
/// contract: skip on no OAuth/disabled sync, then reconcile every `synced`
/// local proposal and import any unlinked remote event.
pub struct CalendarSyncWorker {
    user_id: UserId,
    registry: Arc<AccountRegistry>,
    events: Arc<EventProposalStore>,
    poll_interval: Duration,
    initial_delay: Duration,
}

impl CalendarSyncWorker {
    pub fn new(
        user_id: UserId,
        registry: Arc<AccountRegistry>,
        events: Arc<EventProposalStore>,
        poll_interval: Duration,
        initial_delay: Duration,
    ) -> Self {
        Self {
            user_id,
            registry,
            events,
            poll_interval,
            initial_delay,
        }
    }

    /// Run until `shutdown` broadcasts `true`. `tokio::time::interval` fires
    /// immediately on construction, so the initial delay is a plain sleep
    /// raced against shutdown before the interval loop ever starts.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(user = %self.user_id, "calendar sync worker started");

        tokio::select! {
            _ = tokio::time::sleep(self.initial_delay) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }

        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(user = %self.user_id, error = %e, "calendar sync tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(user = %self.user_id, "calendar sync worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let settings = self.registry.calendar_settings(self.user_id)?;
        let Some(oauth) = settings.oauth.as_ref().filter(|_| settings.sync_enabled) else {
            debug!(user = %self.user_id, "calendar sync skipped: not authenticated or disabled");
            return Ok(());
        };
        let client = GoogleCalendarClient::new(google_credentials(oauth));
        reconcile(self.user_id, &settings, &self.events, &client).await
    }
}

/// One full reconciliation pass: existing synced events, then newly
/// discovered remote ones. Exposed standalone so it can be driven with a
/// stub `CalendarClient` in tests.
pub async fn reconcile(
    user_id: UserId,
    settings: &CalendarSettings,
    events: &EventProposalStore,
    client: &dyn CalendarClient,
) -> Result<()> {
    reconcile_synced(user_id, settings, events, client).await?;
    reconcile_new(user_id, settings, events, client).await?;
    Ok(())
}

async fn reconcile_synced(
    user_id: UserId,
    settings: &CalendarSettings,
    events: &EventProposalStore,
    client: &dyn CalendarClient,
) -> Result<()> {
    for local in events.list_synced_with_external_id(user_id.get())? {
        let external_id = match &local.external_event_id {
            Some(id) => id.clone(),
            None => continue,
        };
        if let Err(e) = reconcile_one_synced(settings, events, client, &local, &external_id).await {
            error!(user = %user_id, event_id = local.id, error = %e, "event reconciliation failed");
        }
    }
    Ok(())
}

async fn reconcile_one_synced(
    settings: &CalendarSettings,
    events: &EventProposalStore,
    client: &dyn CalendarClient,
    local: &EventProposal,
    external_id: &str,
) -> Result<()> {
    let mut found = None;
    for calendar_id in candidate_calendars(settings, local.calendar_id.as_deref()) {
        match client.get_event(&calendar_id, external_id).await {
            Ok(remote) => {
                found = Some(remote);
                break;
            }
            Err(CalendarError::NotFound) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let Some(remote) = found else {
        warn!(event_id = local.id, "event no longer on any candidate calendar, marking deleted");
        events.update_status(local.id, ProposalStatus::Deleted)?;
        return Ok(());
    };

    if remote.title != local.title
        || remote.description != local.description
        || remote.location != local.location
        || remote.start_time != local.start_time
        || remote.end_time != local.end_time
    {
        events.update_from_external(
            local.id,
            &remote.title,
            remote.description.as_deref(),
            remote.location.as_deref(),
            remote.start_time,
            remote.end_time,
        )?;
    }

    let remote_attendees: Vec<Attendee> = remote.attendees.iter().map(attendee_from_remote).collect();
    if normalize_attendees(&remote_attendees) != normalize_attendees(&local.attendees) {
        events.set_attendees(local.id, &remote_attendees)?;
    }

    Ok(())
}

async fn reconcile_new(
    user_id: UserId,
    settings: &CalendarSettings,
    events: &EventProposalStore,
    client: &dyn CalendarClient,
) -> Result<()> {
    let calendar_id = settings.resolve(None);
    let now = Utc::now();
    let from = now - ChronoDuration::days(LOOKBACK_DAYS);
    let to = now + ChronoDuration::days(LOOKAHEAD_DAYS);

    let remote_events = client.list_events_in_range(&calendar_id, from, to).await?;
    for remote in remote_events {
        if events.get_by_external_id(user_id.get(), &remote.external_id)?.is_some() {
            continue;
        }
        if let Err(e) = events.import_synced(
            user_id.get(),
            ChannelId::untracked(),
            &remote.title,
            remote.description.as_deref(),
            remote.location.as_deref(),
            remote.start_time,
            remote.end_time,
            &calendar_id,
            &remote.external_id,
        ) {
            error!(user = %user_id, external_id = %remote.external_id, error = %e, "failed to import remote event");
            continue;
        }
        if let Some(imported) = events.get_by_external_id(user_id.get(), &remote.external_id)? {
            let attendees: Vec<Attendee> = remote.attendees.iter().map(attendee_from_remote).collect();
            if let Err(e) = events.set_attendees(imported.id, &attendees) {
                error!(user = %user_id, event_id = imported.id, error = %e, "failed to set attendees on imported event");
            }
        }
    }
    Ok(())
}

/// Candidate calendar ids in fallback order, deduplicated: the event's own
/// recorded calendar, then the user's resolved default/primary.
fn candidate_calendars(settings: &CalendarSettings, recorded: Option<&str>) -> Vec<String> {
    let mut ids = Vec::with_capacity(2);
    if let Some(cid) = recorded {
        ids.push(cid.to_string());
    }
    let fallback = settings.resolve(None);
    if !ids.contains(&fallback) {
        ids.push(fallback);
    }
    ids
}

fn attendee_from_remote(remote: &chronicle_calendar::RemoteAttendee) -> Attendee {
    Attendee {
        email: remote.email.to_lowercase(),
        display_name: remote.display_name.clone(),
        optional: remote.optional,
    }
}

fn normalize_attendees(attendees: &[Attendee]) -> Vec<(String, Option<String>, bool)> {
    let mut normalized: Vec<_> = attendees
        .iter()
        .map(|a| (a.email.to_lowercase(), a.display_name.clone(), a.optional))
        .collect();
    normalized.sort();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use rusqlite::Connection;

    use chronicle_calendar::{RemoteEvent, RemoteEventDraft};
    use chronicle_core::UserId;

    struct StubClient {
        by_calendar: Mutex<HashMap<String, Vec<RemoteEvent>>>,
    }

    impl StubClient {
        fn new(by_calendar: HashMap<String, Vec<RemoteEvent>>) -> Self {
            Self {
                by_calendar: Mutex::new(by_calendar),
            }
        }
    }

    #[async_trait]
    impl CalendarClient for StubClient {
        async fn list_events_in_range(
            &self,
            calendar_id: &str,
            _from: chrono::DateTime<Utc>,
            _to: chrono::DateTime<Utc>,
        ) -> std::result::Result<Vec<RemoteEvent>, CalendarError> {
            Ok(self.by_calendar.lock().unwrap().get(calendar_id).cloned().unwrap_or_default())
        }

        async fn get_event(
            &self,
            calendar_id: &str,
            external_id: &str,
        ) -> std::result::Result<RemoteEvent, CalendarError> {
            self.by_calendar
                .lock()
                .unwrap()
                .get(calendar_id)
                .and_then(|evs| evs.iter().find(|e| e.external_id == external_id).cloned())
                .ok_or(CalendarError::NotFound)
        }

        async fn create_event(
            &self,
            _calendar_id: &str,
            _draft: &RemoteEventDraft,
        ) -> std::result::Result<RemoteEvent, CalendarError> {
            unimplemented!("not exercised by reconciliation tests")
        }

        async fn update_event(
            &self,
            _calendar_id: &str,
            _external_id: &str,
            _draft: &RemoteEventDraft,
        ) -> std::result::Result<RemoteEvent, CalendarError> {
            unimplemented!("not exercised by reconciliation tests")
        }

        async fn delete_event(&self, _calendar_id: &str, _external_id: &str) -> std::result::Result<(), CalendarError> {
            unimplemented!("not exercised by reconciliation tests")
        }
    }

    fn test_store() -> EventProposalStore {
        let conn = Connection::open_in_memory().unwrap();
        chronicle_history::init_db(&conn).unwrap();
        EventProposalStore::new(conn)
    }

    fn settings() -> CalendarSettings {
        CalendarSettings {
            user_id: UserId(1),
            default_calendar_id: None,
            sync_enabled: true,
            oauth: None,
        }
    }

    fn remote(external_id: &str, title: &str) -> RemoteEvent {
        RemoteEvent {
            external_id: external_id.to_string(),
            title: title.to_string(),
            description: None,
            location: None,
            start_time: Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap(),
            end_time: None,
            attendees: vec![],
        }
    }

    #[tokio::test]
    async fn missing_remote_event_marks_local_deleted() {
        let events = test_store();
        let id = events
            .create_pending(&chronicle_history::NewEventProposal {
                user_id: 1,
                channel_id: ChannelId(1),
                title: "Dentist".into(),
                description: None,
                action_type: chronicle_core::ActionType::Create,
                llm_reasoning: "test".into(),
                start_time: Utc::now(),
                end_time: None,
                location: None,
                attendees: vec![],
                calendar_id: Some("primary".into()),
            })
            .unwrap();
        events.update_status(id, ProposalStatus::Synced).unwrap();
        events.update_external_id(id, "ext-1").unwrap();

        let client = StubClient::new(HashMap::new());
        reconcile(UserId(1), &settings(), &events, &client).await.unwrap();

        let ev = events.get_by_id(id).unwrap().unwrap();
        assert_eq!(ev.status, ProposalStatus::Deleted);
    }

    #[tokio::test]
    async fn changed_remote_title_overwrites_local() {
        let events = test_store();
        let id = events
            .create_pending(&chronicle_history::NewEventProposal {
                user_id: 1,
                channel_id: ChannelId(1),
                title: "Old title".into(),
                description: None,
                action_type: chronicle_core::ActionType::Create,
                llm_reasoning: "test".into(),
                start_time: Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap(),
                end_time: None,
                location: None,
                attendees: vec![],
                calendar_id: Some("primary".into()),
            })
            .unwrap();
        events.update_status(id, ProposalStatus::Synced).unwrap();
        events.update_external_id(id, "ext-1").unwrap();

        let mut by_cal = HashMap::new();
        by_cal.insert("primary".to_string(), vec![remote("ext-1", "New title")]);
        let client = StubClient::new(by_cal);
        reconcile(UserId(1), &settings(), &events, &client).await.unwrap();

        let ev = events.get_by_id(id).unwrap().unwrap();
        assert_eq!(ev.title, "New title");
        assert_eq!(ev.status, ProposalStatus::Synced);
    }

    #[tokio::test]
    async fn unlinked_remote_event_is_imported() {
        let events = test_store();
        let mut by_cal = HashMap::new();
        by_cal.insert("primary".to_string(), vec![remote("ext-2", "New meeting")]);
        let client = StubClient::new(by_cal);

        reconcile(UserId(1), &settings(), &events, &client).await.unwrap();

        let imported = events.get_by_external_id(1, "ext-2").unwrap().unwrap();
        assert_eq!(imported.title, "New meeting");
        assert_eq!(imported.status, ProposalStatus::Synced);
        assert_eq!(imported.channel_id, ChannelId::untracked());
    }

    #[test]
    fn candidate_calendars_prefers_recorded_then_falls_back() {
        let mut s = settings();
        s.default_calendar_id = Some("user-default".into());
        assert_eq!(
            candidate_calendars(&s, Some("event-cal")),
            vec!["event-cal".to_string(), "user-default".to_string()]
        );
        assert_eq!(candidate_calendars(&s, None), vec!["user-default".to_string()]);
    }
}
