use chronicle_core::{ChannelId, ChannelType, SourceType, UserId};

/// A tracked conversation: one messenger protocol identity belonging to one
/// user. Messages are processed only if a matching enabled channel exists,
/// or global debug pass-through is on.
#[derive(Debug, Clone)]
pub struct SourceChannel {
    pub id: ChannelId,
    pub user_id: UserId,
    pub source_type: SourceType,
    pub channel_type: ChannelType,
    /// Protocol-native identifier, unique per `(user_id, source_type)`.
    pub identifier: String,
    pub name: String,
    pub enabled: bool,
    /// Target calendar for proposals raised on this channel, if set.
    pub calendar_id: Option<String>,
}

/// Per-user notification fan-out preferences, loaded once per new proposal.
#[derive(Debug, Clone)]
pub struct NotificationPrefs {
    pub user_id: UserId,
    pub email_enabled: bool,
    pub push_enabled: bool,
}

/// OAuth2 credentials for a user's external calendar, stored as the raw
/// fields a `GoogleCalendarClient` is constructed from. Kept here rather
/// than depending on chronicle-calendar's type directly, since this crate
/// sits below it in the dependency graph.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub expiry_date: i64,
}

/// Per-user calendar sync configuration.
#[derive(Debug, Clone)]
pub struct CalendarSettings {
    pub user_id: UserId,
    /// Resolved when a channel has no `calendar_id` of its own; falls back
    /// further to `"primary"` if this is also unset.
    pub default_calendar_id: Option<String>,
    /// User-facing toggle, independent of whether OAuth is connected.
    pub sync_enabled: bool,
    pub oauth: Option<OAuthCredentials>,
}

impl CalendarSettings {
    /// Fallback chain: channel calendar_id -> user default -> "primary".
    pub fn resolve(&self, channel_calendar_id: Option<&str>) -> String {
        channel_calendar_id
            .map(str::to_string)
            .or_else(|| self.default_calendar_id.clone())
            .unwrap_or_else(|| "primary".to_string())
    }

    /// Whether the sync worker should run a tick for this user at all.
    pub fn is_syncable(&self) -> bool {
        self.sync_enabled && self.oauth.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(default_calendar_id: Option<&str>) -> CalendarSettings {
        CalendarSettings {
            user_id: UserId(1),
            default_calendar_id: default_calendar_id.map(str::to_string),
            sync_enabled: true,
            oauth: None,
        }
    }

    #[test]
    fn resolve_prefers_channel_calendar() {
        assert_eq!(settings(Some("user-default")).resolve(Some("channel-cal")), "channel-cal");
    }

    #[test]
    fn resolve_falls_back_to_user_default() {
        assert_eq!(settings(Some("user-default")).resolve(None), "user-default");
    }

    #[test]
    fn resolve_falls_back_to_primary() {
        assert_eq!(settings(None).resolve(None), "primary");
    }

    #[test]
    fn not_syncable_without_oauth() {
        assert!(!settings(None).is_syncable());
    }

    #[test]
    fn not_syncable_when_disabled() {
        let mut s = settings(None);
        s.sync_enabled = false;
        s.oauth = Some(OAuthCredentials {
            access_token: "a".into(),
            refresh_token: "r".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            expiry_date: 0,
        });
        assert!(!s.is_syncable());
    }

    #[test]
    fn syncable_with_oauth_and_enabled() {
        let mut s = settings(None);
        s.oauth = Some(OAuthCredentials {
            access_token: "a".into(),
            refresh_token: "r".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            expiry_date: 0,
        });
        assert!(s.is_syncable());
    }
}
