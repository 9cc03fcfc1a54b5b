use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use chronicle_core::{ChannelId, ChannelMessage};

use crate::error::Result;

/// Default per-channel history size `H` when not overridden by configuration.
pub const DEFAULT_HISTORY_SIZE: usize = 25;

/// Bounded per-channel message history.
///
/// Pruning is best-effort and runs in the same transaction as the insert it
/// follows, so readers always see at most the newest `H` rows.
pub struct HistoryStore {
    db: Mutex<Connection>,
    history_size: usize,
}

impl HistoryStore {
    pub fn new(conn: Connection, history_size: usize) -> Self {
        Self {
            db: Mutex::new(conn),
            history_size,
        }
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Persist a message and prune the channel back down to `history_size`.
    pub fn insert(
        &self,
        channel_id: ChannelId,
        sender_id: &str,
        sender_name: &str,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO messages (channel_id, sender_id, sender_name, text, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![channel_id.get(), sender_id, sender_name, text, timestamp.to_rfc3339()],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE channel_id = ?1 AND id NOT IN (
                 SELECT id FROM messages WHERE channel_id = ?1
                 ORDER BY timestamp DESC LIMIT ?2
             )",
            params![channel_id.get(), self.history_size as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Newest `limit` messages for a channel, ordered ascending by timestamp.
    pub fn get_history(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<ChannelMessage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, channel_id, sender_id, sender_name, text, timestamp
             FROM messages WHERE channel_id = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![channel_id.get(), limit as i64], row_to_message)?;
        let mut msgs: Vec<ChannelMessage> = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        msgs.reverse();
        Ok(msgs)
    }

    /// Explicitly prune a channel down to `keep` newest rows.
    pub fn prune(&self, channel_id: ChannelId, keep: usize) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM messages WHERE channel_id = ?1 AND id NOT IN (
                 SELECT id FROM messages WHERE channel_id = ?1
                 ORDER BY timestamp DESC LIMIT ?2
             )",
            params![channel_id.get(), keep as i64],
        )?;
        Ok(())
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelMessage> {
    let timestamp: String = row.get(5)?;
    Ok(ChannelMessage {
        id: row.get(0)?,
        channel_id: ChannelId(row.get(1)?),
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        text: row.get(4)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(history_size: usize) -> HistoryStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        HistoryStore::new(conn, history_size)
    }

    #[test]
    fn insert_then_get_history_returns_ascending() {
        let store = test_store(25);
        let channel = ChannelId(1);
        for i in 0..3 {
            let ts = Utc::now() + chrono::Duration::seconds(i);
            store.insert(channel, "u1", "Alice", &format!("msg {i}"), ts).unwrap();
        }
        let history = store.get_history(channel, 25).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].text, "msg 0");
        assert_eq!(history[2].text, "msg 2");
    }

    #[test]
    fn insert_prunes_beyond_history_size() {
        let store = test_store(2);
        let channel = ChannelId(1);
        for i in 0..5 {
            let ts = Utc::now() + chrono::Duration::seconds(i);
            store.insert(channel, "u1", "Alice", &format!("msg {i}"), ts).unwrap();
        }
        let history = store.get_history(channel, 25).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "msg 3");
        assert_eq!(history[1].text, "msg 4");
    }
}
