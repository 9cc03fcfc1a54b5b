use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use chronicle_core::{ChannelId, SourceType, UserId};

use crate::db::{row_to_calendar_settings, row_to_channel, CHANNEL_SELECT_SQL};
use crate::error::{AccountError, Result};
use crate::types::{CalendarSettings, NotificationPrefs, OAuthCredentials, SourceChannel};

/// Maximum number of `(user_id, source_type, identifier)` -> `ChannelId`
/// pairs kept in the in-process lookup cache.
const CACHE_MAX: usize = 256;

/// Channel (source) registry plus per-user notification and calendar settings.
///
/// Mirrors the hot-path cache-then-DB-fallback shape used for identity
/// resolution: `GetByIdentifier`/`IsTracked` are called once per inbound
/// message, so a cache hit avoids a DB round trip for known channels.
pub struct AccountRegistry {
    db: Arc<Mutex<Connection>>,
    cache: Mutex<HashMap<(UserId, SourceType, String), ChannelId>>,
    cache_order: Mutex<Vec<(UserId, SourceType, String)>>,
}

impl AccountRegistry {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
            cache_order: Mutex::new(Vec::new()),
        }
    }

    /// Register a new tracked channel for a user.
    pub fn create(&self, channel: &SourceChannel) -> Result<ChannelId> {
        let conn = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO channels
                (user_id, source_type, channel_type, identifier, name, enabled, calendar_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                channel.user_id.get(),
                channel.source_type.as_str(),
                channel.channel_type.as_str(),
                channel.identifier,
                channel.name,
                channel.enabled as i32,
                channel.calendar_id,
                now,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref se, _)
                if se.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AccountError::ChannelAlreadyExists
            }
            other => AccountError::Database(other),
        })?;
        let id = ChannelId(conn.last_insert_rowid());
        drop(conn);
        self.cache_insert(
            (channel.user_id, channel.source_type, channel.identifier.clone()),
            id,
        );
        info!(user = %channel.user_id, source_type = %channel.source_type, channel_id = %id, "channel created");
        Ok(id)
    }

    /// Update a channel's display name and enabled flag.
    pub fn update(&self, id: ChannelId, name: &str, enabled: bool) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE channels SET name = ?2, enabled = ?3 WHERE id = ?1",
            params![id.get(), name, enabled as i32],
        )?;
        if rows == 0 {
            return Err(AccountError::ChannelNotFound(id.get()));
        }
        Ok(())
    }

    /// Delete a channel permanently. Not-found is treated as success.
    pub fn delete(&self, id: ChannelId) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute("DELETE FROM channels WHERE id = ?1", params![id.get()])?;
        Ok(())
    }

    /// List every channel belonging to `user_id`, optionally filtered by
    /// `source_type`.
    pub fn list(&self, user_id: UserId, source_type: Option<SourceType>) -> Result<Vec<SourceChannel>> {
        let conn = self.db.lock().unwrap();
        let sql = match source_type {
            Some(_) => format!("{CHANNEL_SELECT_SQL} WHERE user_id = ?1 AND source_type = ?2"),
            None => format!("{CHANNEL_SELECT_SQL} WHERE user_id = ?1"),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = match source_type {
            Some(st) => stmt.query_map(params![user_id.get(), st.as_str()], row_to_channel)?,
            None => stmt.query_map(params![user_id.get()], row_to_channel)?,
        };
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AccountError::Database)
    }

    /// Every `(user_id, source_type)` pair with an enabled channel, across
    /// all users. Used at startup to build `ClientManager::restore_sessions`'s
    /// candidate list.
    pub fn list_all_enabled(&self) -> Result<Vec<(UserId, SourceType)>> {
        let conn = self.db.lock().unwrap();
        let sql = format!("{CHANNEL_SELECT_SQL} WHERE enabled = 1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_channel)?;
        rows.map(|r| r.map(|ch| (ch.user_id, ch.source_type)))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AccountError::Database)
    }

    /// Resolve `(user_id, source_type, identifier)` to its tracked channel, if any.
    pub fn get_by_identifier(
        &self,
        user_id: UserId,
        source_type: SourceType,
        identifier: &str,
    ) -> Result<Option<SourceChannel>> {
        let key = (user_id, source_type, identifier.to_string());
        if let Some(id) = self.cache_lookup(&key) {
            debug!(user = %user_id, source_type = %source_type, identifier, "channel cache hit");
            let conn = self.db.lock().unwrap();
            let sql = format!("{CHANNEL_SELECT_SQL} WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id.get()], row_to_channel) {
                Ok(ch) => return Ok(Some(ch)),
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    drop(stmt);
                    drop(conn);
                    self.cache_remove(&key);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let conn = self.db.lock().unwrap();
        let sql = format!(
            "{CHANNEL_SELECT_SQL} WHERE user_id = ?1 AND source_type = ?2 AND identifier = ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        match stmt.query_row(
            params![user_id.get(), source_type.as_str(), identifier],
            row_to_channel,
        ) {
            Ok(ch) => {
                drop(stmt);
                drop(conn);
                self.cache_insert(key, ch.id);
                Ok(Some(ch))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `(user_id, source_type, identifier)` maps to an enabled tracked
    /// channel. Untracked or disabled channels both return `false`.
    pub fn is_tracked(&self, user_id: UserId, source_type: SourceType, identifier: &str) -> Result<bool> {
        Ok(self
            .get_by_identifier(user_id, source_type, identifier)?
            .map(|ch| ch.enabled)
            .unwrap_or(false))
    }

    /// Resolve `(source_type, identifier)` to its tracked channel without
    /// knowing the owning user in advance.
    ///
    /// Used by protocol adapters normalizing a raw inbound update: the wire
    /// message carries a platform-native chat/mailbox identifier, not a
    /// `UserId`. `Identifier` is unique per `(UserID, SourceType)`, not
    /// globally, but a single shared bot token/mailbox serves one deployment
    /// in practice, so the first match is authoritative.
    pub fn resolve_channel(
        &self,
        source_type: SourceType,
        identifier: &str,
    ) -> Result<Option<SourceChannel>> {
        let conn = self.db.lock().unwrap();
        let sql = format!("{CHANNEL_SELECT_SQL} WHERE source_type = ?1 AND identifier = ?2");
        let mut stmt = conn.prepare(&sql)?;
        match stmt.query_row(params![source_type.as_str(), identifier], row_to_channel) {
            Ok(ch) => Ok(Some(ch)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a user's notification preferences, defaulting to all-disabled
    /// when no row exists yet.
    pub fn notification_prefs(&self, user_id: UserId) -> Result<NotificationPrefs> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT email_enabled, push_enabled FROM notification_prefs WHERE user_id = ?1",
        )?;
        match stmt.query_row(params![user_id.get()], |row| {
            Ok(NotificationPrefs {
                user_id,
                email_enabled: row.get::<_, i32>(0)? != 0,
                push_enabled: row.get::<_, i32>(1)? != 0,
            })
        }) {
            Ok(prefs) => Ok(prefs),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(NotificationPrefs {
                user_id,
                email_enabled: false,
                push_enabled: false,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a user's notification fan-out preferences, creating the row if needed.
    pub fn set_notification_prefs(&self, user_id: UserId, email_enabled: bool, push_enabled: bool) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO notification_prefs (user_id, email_enabled, push_enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                email_enabled = excluded.email_enabled,
                push_enabled = excluded.push_enabled",
            params![user_id.get(), email_enabled as i32, push_enabled as i32],
        )?;
        Ok(())
    }

    /// Load a user's calendar sync settings, defaulting to sync-enabled with
    /// no calendar override and no OAuth connected when no row exists yet.
    pub fn calendar_settings(&self, user_id: UserId) -> Result<CalendarSettings> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT default_calendar_id, sync_enabled, oauth_access_token, oauth_refresh_token, \
                 oauth_client_id, oauth_client_secret, oauth_expiry
             FROM calendar_settings WHERE user_id = ?1",
        )?;
        match stmt.query_row(params![user_id.get()], |row| row_to_calendar_settings(user_id, row)) {
            Ok(settings) => Ok(settings),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(CalendarSettings {
                user_id,
                default_calendar_id: None,
                sync_enabled: true,
                oauth: None,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Connect (or replace) a user's calendar OAuth credentials.
    pub fn set_calendar_oauth(&self, user_id: UserId, oauth: &OAuthCredentials) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO calendar_settings
                (user_id, oauth_access_token, oauth_refresh_token, oauth_client_id, oauth_client_secret, oauth_expiry)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                oauth_access_token = excluded.oauth_access_token,
                oauth_refresh_token = excluded.oauth_refresh_token,
                oauth_client_id = excluded.oauth_client_id,
                oauth_client_secret = excluded.oauth_client_secret,
                oauth_expiry = excluded.oauth_expiry",
            params![
                user_id.get(),
                oauth.access_token,
                oauth.refresh_token,
                oauth.client_id,
                oauth.client_secret,
                oauth.expiry_date,
            ],
        )?;
        Ok(())
    }

    /// Toggle whether the sync worker should run ticks for this user.
    pub fn set_sync_enabled(&self, user_id: UserId, enabled: bool) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO calendar_settings (user_id, sync_enabled) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET sync_enabled = excluded.sync_enabled",
            params![user_id.get(), enabled as i32],
        )?;
        Ok(())
    }

    /// Every user the sync worker should spawn a tick loop for: sync enabled
    /// and OAuth credentials on file.
    pub fn list_syncable_users(&self) -> Result<Vec<UserId>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id FROM calendar_settings
             WHERE sync_enabled = 1 AND oauth_access_token IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| Ok(UserId(row.get(0)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AccountError::Database)
    }

    fn cache_lookup(&self, key: &(UserId, SourceType, String)) -> Option<ChannelId> {
        self.cache.lock().unwrap().get(key).copied()
    }

    fn cache_remove(&self, key: &(UserId, SourceType, String)) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();
        cache.remove(key);
        order.retain(|k| k != key);
    }

    fn cache_insert(&self, key: (UserId, SourceType, String), id: ChannelId) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();

        if cache.contains_key(&key) {
            cache.insert(key, id);
            return;
        }

        if cache.len() >= CACHE_MAX {
            let evict_count = CACHE_MAX / 2;
            let to_remove: Vec<_> = order.drain(..evict_count).collect();
            for k in to_remove {
                cache.remove(&k);
            }
        }

        order.push(key.clone());
        cache.insert(key, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::ChannelType;

    fn test_registry() -> AccountRegistry {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (id, created_at) VALUES (1, ?1)",
            params![Utc::now().to_rfc3339()],
        )
        .unwrap();
        AccountRegistry::new(Arc::new(Mutex::new(conn)))
    }

    fn sample_channel() -> SourceChannel {
        SourceChannel {
            id: ChannelId(0),
            user_id: UserId(1),
            source_type: SourceType::MessengerA,
            channel_type: ChannelType::Sender,
            identifier: "12345".into(),
            name: "Alice".into(),
            enabled: true,
            calendar_id: None,
        }
    }

    #[test]
    fn create_then_get_by_identifier_round_trips() {
        let registry = test_registry();
        let id = registry.create(&sample_channel()).unwrap();
        let found = registry
            .get_by_identifier(UserId(1), SourceType::MessengerA, "12345")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert!(found.enabled);
    }

    #[test]
    fn is_tracked_false_for_disabled_channel() {
        let registry = test_registry();
        let mut channel = sample_channel();
        channel.enabled = false;
        registry.create(&channel).unwrap();
        assert!(!registry
            .is_tracked(UserId(1), SourceType::MessengerA, "12345")
            .unwrap());
    }

    #[test]
    fn is_tracked_false_for_unknown_identifier() {
        let registry = test_registry();
        assert!(!registry
            .is_tracked(UserId(1), SourceType::MessengerA, "unknown")
            .unwrap());
    }

    #[test]
    fn resolve_channel_finds_owner_without_user_id() {
        let registry = test_registry();
        registry.create(&sample_channel()).unwrap();
        let found = registry
            .resolve_channel(SourceType::MessengerA, "12345")
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, UserId(1));
    }

    #[test]
    fn resolve_channel_none_for_unknown_identifier() {
        let registry = test_registry();
        assert!(registry
            .resolve_channel(SourceType::MessengerA, "unknown")
            .unwrap()
            .is_none());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let registry = test_registry();
        registry.create(&sample_channel()).unwrap();
        let err = registry.create(&sample_channel()).unwrap_err();
        assert!(matches!(err, AccountError::ChannelAlreadyExists));
    }

    #[test]
    fn notification_prefs_default_to_disabled() {
        let registry = test_registry();
        let prefs = registry.notification_prefs(UserId(1)).unwrap();
        assert!(!prefs.email_enabled && !prefs.push_enabled);
    }

    #[test]
    fn set_notification_prefs_round_trips() {
        let registry = test_registry();
        registry.set_notification_prefs(UserId(1), true, false).unwrap();
        let prefs = registry.notification_prefs(UserId(1)).unwrap();
        assert!(prefs.email_enabled);
        assert!(!prefs.push_enabled);
    }

    #[test]
    fn calendar_settings_default_to_sync_enabled_no_oauth() {
        let registry = test_registry();
        let settings = registry.calendar_settings(UserId(1)).unwrap();
        assert_eq!(settings.default_calendar_id, None);
        assert!(settings.sync_enabled);
        assert!(settings.oauth.is_none());
        assert!(!settings.is_syncable());
    }

    fn sample_oauth() -> OAuthCredentials {
        OAuthCredentials {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            client_id: "cid".into(),
            client_secret: "secret".into(),
            expiry_date: 123,
        }
    }

    #[test]
    fn set_calendar_oauth_makes_user_syncable() {
        let registry = test_registry();
        registry.set_calendar_oauth(UserId(1), &sample_oauth()).unwrap();
        let settings = registry.calendar_settings(UserId(1)).unwrap();
        assert!(settings.is_syncable());
        assert_eq!(settings.oauth.unwrap().access_token, "at");
    }

    #[test]
    fn list_syncable_users_excludes_disabled_and_oauth_less() {
        let registry = test_registry();
        conn_insert_user(&registry, 2);
        registry.set_calendar_oauth(UserId(1), &sample_oauth()).unwrap();
        registry.set_calendar_oauth(UserId(2), &sample_oauth()).unwrap();
        registry.set_sync_enabled(UserId(2), false).unwrap();
        let syncable = registry.list_syncable_users().unwrap();
        assert_eq!(syncable, vec![UserId(1)]);
    }

    fn conn_insert_user(registry: &AccountRegistry, id: i64) {
        let conn = registry.db.lock().unwrap();
        conn.execute(
            "INSERT INTO users (id, created_at) VALUES (?1, ?2)",
            params![id, Utc::now().to_rfc3339()],
        )
        .unwrap();
    }
}
