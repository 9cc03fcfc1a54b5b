use rusqlite::{Connection, Result};

/// Idempotently create every table this crate owns: `messages`,
/// `event_proposals`, `reminder_proposals`.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_messages_table(conn)?;
    create_event_proposals_table(conn)?;
    create_reminder_proposals_table(conn)?;
    Ok(())
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id  INTEGER NOT NULL,
            sender_id   TEXT NOT NULL,
            sender_name TEXT NOT NULL,
            text        TEXT NOT NULL,
            timestamp   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, timestamp);",
    )
}

fn create_event_proposals_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS event_proposals (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id           INTEGER NOT NULL,
            channel_id        INTEGER NOT NULL,
            title             TEXT NOT NULL,
            description       TEXT,
            status            TEXT NOT NULL DEFAULT 'pending',
            action_type       TEXT NOT NULL DEFAULT 'create',
            llm_reasoning     TEXT NOT NULL DEFAULT '',
            start_time        TEXT NOT NULL,
            end_time          TEXT,
            location          TEXT,
            attendees         TEXT NOT NULL DEFAULT '[]',
            calendar_id       TEXT,
            external_event_id TEXT,
            created_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_event_proposals_channel
            ON event_proposals(channel_id, status);
        CREATE INDEX IF NOT EXISTS idx_event_proposals_external
            ON event_proposals(user_id, external_event_id);",
    )
}

fn create_reminder_proposals_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reminder_proposals (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id        INTEGER NOT NULL,
            channel_id     INTEGER NOT NULL,
            title          TEXT NOT NULL,
            description    TEXT,
            status         TEXT NOT NULL DEFAULT 'pending',
            action_type    TEXT NOT NULL DEFAULT 'create',
            llm_reasoning  TEXT NOT NULL DEFAULT '',
            due_date       TEXT NOT NULL,
            notify_at      TEXT,
            priority       TEXT NOT NULL DEFAULT 'normal',
            created_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reminder_proposals_channel
            ON reminder_proposals(channel_id, status);",
    )
}
