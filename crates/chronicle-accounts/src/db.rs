use std::str::FromStr;

use rusqlite::{Connection, Result};

use chronicle_core::{ChannelId, ChannelType, SourceType, UserId};

use crate::types::{CalendarSettings, OAuthCredentials, SourceChannel};

/// Map a SELECT row (column order from `CHANNEL_SELECT_SQL`) to a `SourceChannel`.
pub(crate) fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceChannel> {
    let source_type = SourceType::from_str(&row.get::<_, String>(2)?)
        .map_err(|e| rusqlite::Error::InvalidColumnName(e))?;
    let channel_type = ChannelType::from_str(&row.get::<_, String>(3)?)
        .map_err(|e| rusqlite::Error::InvalidColumnName(e))?;
    Ok(SourceChannel {
        id: ChannelId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        source_type,
        channel_type,
        identifier: row.get(4)?,
        name: row.get(5)?,
        enabled: row.get::<_, i32>(6)? != 0,
        calendar_id: row.get(7)?,
    })
}

pub(crate) const CHANNEL_SELECT_SQL: &str = "SELECT id, user_id, source_type, channel_type, \
     identifier, name, enabled, calendar_id FROM channels";

/// Map a SELECT row (column order matching the query in
/// `AccountRegistry::calendar_settings`) to a `CalendarSettings`.
pub(crate) fn row_to_calendar_settings(
    user_id: UserId,
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<CalendarSettings> {
    let access_token: Option<String> = row.get(2)?;
    let oauth = match access_token {
        Some(access_token) => Some(OAuthCredentials {
            access_token,
            refresh_token: row.get(3)?,
            client_id: row.get(4)?,
            client_secret: row.get(5)?,
            expiry_date: row.get(6)?,
        }),
        None => None,
    };
    Ok(CalendarSettings {
        user_id,
        default_calendar_id: row.get(0)?,
        sync_enabled: row.get::<_, i32>(1)? != 0,
        oauth,
    })
}

/// Idempotently create every table this crate owns: `users`, `channels`,
/// `notification_prefs`, `calendar_settings`.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_channels_table(conn)?;
    create_notification_prefs_table(conn)?;
    create_calendar_settings_table(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY,
            created_at  TEXT NOT NULL
        );",
    )
}

fn create_channels_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS channels (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL REFERENCES users(id),
            source_type     TEXT NOT NULL,
            channel_type    TEXT NOT NULL,
            identifier      TEXT NOT NULL,
            name            TEXT NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            calendar_id     TEXT,
            created_at      TEXT NOT NULL,
            UNIQUE(user_id, source_type, identifier)
        );
        CREATE INDEX IF NOT EXISTS idx_channels_identifier
            ON channels (user_id, source_type, identifier);",
    )
}

fn create_notification_prefs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notification_prefs (
            user_id         INTEGER PRIMARY KEY REFERENCES users(id),
            email_enabled   INTEGER NOT NULL DEFAULT 0,
            push_enabled    INTEGER NOT NULL DEFAULT 0
        );",
    )
}

fn create_calendar_settings_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS calendar_settings (
            user_id             INTEGER PRIMARY KEY REFERENCES users(id),
            default_calendar_id TEXT,
            sync_enabled        INTEGER NOT NULL DEFAULT 1,
            oauth_access_token  TEXT,
            oauth_refresh_token TEXT,
            oauth_client_id     TEXT,
            oauth_client_secret TEXT,
            oauth_expiry        INTEGER
        );",
    )
}
