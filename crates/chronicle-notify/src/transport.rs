use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use chronicle_core::UserId;

/// Everything a transport needs to render a notification, resolved once by
/// the dispatcher from the persisted proposal so every transport renders
/// the same content.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: &'static str,
    pub proposal_id: i64,
    pub title: String,
    pub when: DateTime<Utc>,
    pub reasoning: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// A single notification channel (email, push, ...), matching the corpus's
/// `Channel` trait shape: a stable `name` plus one `send` verb.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Stable lowercase identifier matched against `NotificationPrefs`
    /// (`"email"`, `"push"`).
    fn name(&self) -> &str;

    async fn send(&self, user_id: UserId, notification: &Notification) -> Result<(), TransportError>;
}
