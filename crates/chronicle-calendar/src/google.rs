//! Google Calendar v3 client. OAuth token refresh mirrors the corpus's
//! `QwenOAuthProvider::ensure_token`: a fast read-lock check, a slow
//! write-lock refresh-and-persist path guarded by a 60s expiry margin.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::{CalendarClient, CalendarError, RemoteAttendee, RemoteEvent, RemoteEventDraft};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Refresh this far ahead of actual expiry so an in-flight request never
/// races a token going stale mid-call.
const EXPIRY_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub expiry_date: i64,
}

pub struct GoogleCalendarClient {
    client: reqwest::Client,
    credentials: Arc<RwLock<GoogleCredentials>>,
}

impl GoogleCalendarClient {
    pub fn new(credentials: GoogleCredentials) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self {
            client,
            credentials: Arc::new(RwLock::new(credentials)),
        }
    }

    async fn ensure_token(&self) -> Result<String, CalendarError> {
        let now = Utc::now().timestamp_millis();
        {
            let creds = self.credentials.read().await;
            if now + EXPIRY_MARGIN_MS < creds.expiry_date {
                return Ok(creds.access_token.clone());
            }
        }

        let mut creds = self.credentials.write().await;
        let now = Utc::now().timestamp_millis();
        if now + EXPIRY_MARGIN_MS < creds.expiry_date {
            return Ok(creds.access_token.clone());
        }

        info!("refreshing Google Calendar OAuth access token");
        let refreshed = self.refresh_token(&creds).await?;
        *creds = refreshed;
        Ok(creds.access_token.clone())
    }

    async fn refresh_token(&self, current: &GoogleCredentials) -> Result<GoogleCredentials, CalendarError> {
        let params = [
            ("client_id", current.client_id.as_str()),
            ("client_secret", current.client_secret.as_str()),
            ("refresh_token", current.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let resp = self.client.post(TOKEN_URL).form(&params).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Api { status, message: describe_error_body(&text) });
        }

        let token_resp: TokenRefreshResponse = resp.json().await.map_err(|e| CalendarError::Parse(e.to_string()))?;
        let now = Utc::now().timestamp_millis();

        Ok(GoogleCredentials {
            access_token: token_resp.access_token,
            refresh_token: current.refresh_token.clone(),
            client_id: current.client_id.clone(),
            client_secret: current.client_secret.clone(),
            expiry_date: now + (token_resp.expires_in as i64 * 1000),
        })
    }

    fn events_url(calendar_id: &str) -> String {
        format!("{API_BASE}/calendars/{}/events", urlencode(calendar_id))
    }

    fn event_url(calendar_id: &str, external_id: &str) -> String {
        format!("{API_BASE}/calendars/{}/events/{}", urlencode(calendar_id), urlencode(external_id))
    }
}

fn urlencode(s: &str) -> String {
    // Calendar ids and event ids are email-like or opaque alphanumerics;
    // percent-encode the handful of characters that aren't URL-safe as-is.
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            other => format!("%{:02X}", other as u32),
        })
        .collect()
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn list_events_in_range(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, CalendarError> {
        let token = self.ensure_token().await?;
        let url = Self::events_url(calendar_id);

        debug!(calendar_id, %from, %to, "listing remote events");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[
                ("timeMin", from.to_rfc3339()),
                ("timeMax", to.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 404 {
            return Err(CalendarError::NotFound);
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Google Calendar list error");
            return Err(CalendarError::Api { status, message: describe_error_body(&text) });
        }

        let list: EventListResponse = resp.json().await.map_err(|e| CalendarError::Parse(e.to_string()))?;
        Ok(list.items.into_iter().filter_map(remote_event_from_wire).collect())
    }

    async fn get_event(&self, calendar_id: &str, external_id: &str) -> Result<RemoteEvent, CalendarError> {
        let token = self.ensure_token().await?;
        let url = Self::event_url(calendar_id, external_id);

        let resp = self.client.get(&url).bearer_auth(&token).send().await?;
        let status = resp.status().as_u16();
        if status == 404 {
            return Err(CalendarError::NotFound);
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Api { status, message: describe_error_body(&text) });
        }

        let wire: WireEvent = resp.json().await.map_err(|e| CalendarError::Parse(e.to_string()))?;
        remote_event_from_wire(wire).ok_or_else(|| CalendarError::Parse("event missing start time".to_string()))
    }

    async fn create_event(&self, calendar_id: &str, draft: &RemoteEventDraft) -> Result<RemoteEvent, CalendarError> {
        let token = self.ensure_token().await?;
        let url = Self::events_url(calendar_id);
        let body = wire_body_from_draft(draft);

        let resp = self.client.post(&url).bearer_auth(&token).json(&body).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Google Calendar create error");
            return Err(CalendarError::Api { status, message: describe_error_body(&text) });
        }

        let wire: WireEvent = resp.json().await.map_err(|e| CalendarError::Parse(e.to_string()))?;
        remote_event_from_wire(wire).ok_or_else(|| CalendarError::Parse("created event missing start time".to_string()))
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        external_id: &str,
        draft: &RemoteEventDraft,
    ) -> Result<RemoteEvent, CalendarError> {
        let token = self.ensure_token().await?;
        let url = Self::event_url(calendar_id, external_id);
        let body = wire_body_from_draft(draft);

        let resp = self.client.put(&url).bearer_auth(&token).json(&body).send().await?;
        let status = resp.status().as_u16();
        if status == 404 {
            return Err(CalendarError::NotFound);
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Api { status, message: describe_error_body(&text) });
        }

        let wire: WireEvent = resp.json().await.map_err(|e| CalendarError::Parse(e.to_string()))?;
        remote_event_from_wire(wire).ok_or_else(|| CalendarError::Parse("updated event missing start time".to_string()))
    }

    async fn delete_event(&self, calendar_id: &str, external_id: &str) -> Result<(), CalendarError> {
        let token = self.ensure_token().await?;
        let url = Self::event_url(calendar_id, external_id);

        let resp = self.client.delete(&url).bearer_auth(&token).send().await?;
        let status = resp.status().as_u16();
        if status == 404 {
            return Err(CalendarError::NotFound);
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Api { status, message: describe_error_body(&text) });
        }
        Ok(())
    }
}

fn describe_error_body(text: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return text.to_string();
    };
    let Some(error) = value.get("error") else {
        return text.to_string();
    };
    let message = error.get("message").and_then(|v| v.as_str()).unwrap_or("");
    let status = error.get("status").and_then(|v| v.as_str());
    match status {
        Some(s) => format!("{s}: {message}"),
        None => message.to_string(),
    }
}

#[derive(Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<WireEvent>,
}

#[derive(Deserialize, Serialize, Default)]
struct WireEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    start: Option<WireTime>,
    #[serde(default)]
    end: Option<WireTime>,
    #[serde(default)]
    attendees: Vec<WireAttendee>,
}

#[derive(Deserialize, Serialize, Default)]
struct WireTime {
    #[serde(rename = "dateTime", default)]
    date_time: Option<String>,
}

#[derive(Deserialize, Serialize, Default, Clone)]
struct WireAttendee {
    email: String,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(default)]
    optional: bool,
}

fn remote_event_from_wire(wire: WireEvent) -> Option<RemoteEvent> {
    let start_time = DateTime::parse_from_rfc3339(wire.start.as_ref()?.date_time.as_ref()?)
        .ok()?
        .with_timezone(&Utc);
    let end_time = wire
        .end
        .as_ref()
        .and_then(|t| t.date_time.as_ref())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(RemoteEvent {
        external_id: wire.id,
        title: wire.summary,
        description: wire.description,
        location: wire.location,
        start_time,
        end_time,
        attendees: wire
            .attendees
            .into_iter()
            .map(|a| RemoteAttendee {
                email: a.email.to_lowercase(),
                display_name: a.display_name,
                optional: a.optional,
            })
            .collect(),
    })
}

fn wire_body_from_draft(draft: &RemoteEventDraft) -> WireEvent {
    WireEvent {
        id: String::new(),
        summary: draft.title.clone(),
        description: draft.description.clone(),
        location: draft.location.clone(),
        start: Some(WireTime { date_time: Some(draft.start_time.to_rfc3339()) }),
        end: draft.end_time.map(|t| WireTime { date_time: Some(t.to_rfc3339()) }),
        attendees: draft
            .attendees
            .iter()
            .map(|a| WireAttendee {
                email: a.email.clone(),
                display_name: a.display_name.clone(),
                optional: a.optional,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_error_body_extracts_structured_message() {
        let body = r#"{"error":{"code":404,"message":"Not Found","status":"NOT_FOUND"}}"#;
        let msg = describe_error_body(body);
        assert!(msg.contains("NOT_FOUND"));
        assert!(msg.contains("Not Found"));
    }

    #[test]
    fn describe_error_body_falls_back_to_raw_text() {
        assert_eq!(describe_error_body("not json"), "not json");
    }

    #[test]
    fn remote_event_from_wire_requires_start_time() {
        let wire = WireEvent { summary: "Standup".to_string(), ..Default::default() };
        assert!(remote_event_from_wire(wire).is_none());
    }

    #[test]
    fn remote_event_from_wire_lowercases_attendee_emails() {
        let wire = WireEvent {
            id: "abc".to_string(),
            summary: "Standup".to_string(),
            start: Some(WireTime { date_time: Some("2026-08-14T09:00:00Z".to_string()) }),
            attendees: vec![WireAttendee { email: "Jane@Corp.com".to_string(), ..Default::default() }],
            ..Default::default()
        };
        let event = remote_event_from_wire(wire).unwrap();
        assert_eq!(event.attendees[0].email, "jane@corp.com");
    }
}
