use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use chronicle_core::{ActionType, ChannelId, Priority, ProposalStatus};

use crate::error::{HistoryError, Result};
use crate::types::ReminderProposal;

const REMINDER_SELECT_SQL: &str = "SELECT id, user_id, channel_id, title, description, status, \
     action_type, llm_reasoning, due_date, notify_at, priority, created_at FROM reminder_proposals";

/// New reminder proposal fields, prior to assignment of an `id`/`created_at`.
#[derive(Debug, Clone)]
pub struct NewReminderProposal {
    pub user_id: i64,
    pub channel_id: ChannelId,
    pub title: String,
    pub description: Option<String>,
    pub action_type: ActionType,
    pub llm_reasoning: String,
    pub due_date: DateTime<Utc>,
    pub notify_at: Option<DateTime<Utc>>,
    pub priority: Priority,
}

/// Persistence verbs for reminder proposals (§6's "reminders" persistence contract).
pub struct ReminderProposalStore {
    db: Mutex<Connection>,
}

impl ReminderProposalStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn create_pending(&self, fields: &NewReminderProposal) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO reminder_proposals
                (user_id, channel_id, title, description, status, action_type, llm_reasoning,
                 due_date, notify_at, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                fields.user_id,
                fields.channel_id.get(),
                fields.title,
                fields.description,
                fields.action_type.as_str(),
                fields.llm_reasoning,
                fields.due_date.to_rfc3339(),
                fields.notify_at.map(|t| t.to_rfc3339()),
                fields.priority.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<ReminderProposal>> {
        let db = self.db.lock().unwrap();
        let sql = format!("{REMINDER_SELECT_SQL} WHERE id = ?1");
        let mut stmt = db.prepare(&sql)?;
        match stmt.query_row(params![id], row_to_reminder) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list(&self, channel_id: Option<ChannelId>, status: Option<ProposalStatus>) -> Result<Vec<ReminderProposal>> {
        let db = self.db.lock().unwrap();
        let sql = match (channel_id, status) {
            (Some(_), Some(_)) => format!("{REMINDER_SELECT_SQL} WHERE channel_id = ?1 AND status = ?2"),
            (Some(_), None) => format!("{REMINDER_SELECT_SQL} WHERE channel_id = ?1"),
            (None, Some(_)) => format!("{REMINDER_SELECT_SQL} WHERE status = ?1"),
            (None, None) => REMINDER_SELECT_SQL.to_string(),
        };
        let mut stmt = db.prepare(&sql)?;
        let rows = match (channel_id, status) {
            (Some(c), Some(s)) => stmt.query_map(params![c.get(), s.as_str()], row_to_reminder)?,
            (Some(c), None) => stmt.query_map(params![c.get()], row_to_reminder)?,
            (None, Some(s)) => stmt.query_map(params![s.as_str()], row_to_reminder)?,
            (None, None) => stmt.query_map(params![], row_to_reminder)?,
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn update_pending(&self, id: i64, title: &str, description: Option<&str>, due_date: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE reminder_proposals SET title = ?2, description = ?3, due_date = ?4
             WHERE id = ?1 AND status = 'pending'",
            params![id, title, description, due_date.to_rfc3339()],
        )?;
        if rows == 0 {
            return Err(HistoryError::ProposalNotFound(id));
        }
        Ok(())
    }

    pub fn update_status(&self, id: i64, next: ProposalStatus) -> Result<()> {
        let current = self
            .get_by_id(id)?
            .ok_or(HistoryError::ProposalNotFound(id))?
            .status;
        if !current.can_transition_to(next) {
            return Err(HistoryError::Validation(format!(
                "illegal transition {current} -> {next}"
            )));
        }
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE reminder_proposals SET status = ?2 WHERE id = ?1",
            params![id, next.as_str()],
        )?;
        Ok(())
    }
}

fn row_to_reminder(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReminderProposal> {
    use std::str::FromStr;
    let status = ProposalStatus::from_str(&row.get::<_, String>(5)?).unwrap_or(ProposalStatus::Pending);
    let action_type = ActionType::from_str(&row.get::<_, String>(6)?).unwrap_or(ActionType::Create);
    let priority = Priority::from_str(&row.get::<_, String>(10)?).unwrap_or_default();
    let due_date: String = row.get(8)?;
    let notify_at: Option<String> = row.get(9)?;
    let created_at: String = row.get(11)?;
    Ok(ReminderProposal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        channel_id: ChannelId(row.get(2)?),
        title: row.get(3)?,
        description: row.get(4)?,
        status,
        action_type,
        llm_reasoning: row.get(7)?,
        due_date: parse_rfc3339(&due_date),
        notify_at: notify_at.map(|s| parse_rfc3339(&s)),
        priority,
        created_at: parse_rfc3339(&created_at),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> ReminderProposalStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        ReminderProposalStore::new(conn)
    }

    fn sample() -> NewReminderProposal {
        NewReminderProposal {
            user_id: 1,
            channel_id: ChannelId(1),
            title: "Pay rent".into(),
            description: None,
            action_type: ActionType::Create,
            llm_reasoning: "user asked to be reminded".into(),
            due_date: Utc::now(),
            notify_at: None,
            priority: Priority::Normal,
        }
    }

    #[test]
    fn create_then_get_by_id_round_trips() {
        let store = test_store();
        let id = store.create_pending(&sample()).unwrap();
        let r = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(r.title, "Pay rent");
        assert_eq!(r.priority, Priority::Normal);
    }

    #[test]
    fn update_status_rejects_illegal_transition() {
        let store = test_store();
        let id = store.create_pending(&sample()).unwrap();
        store.update_status(id, ProposalStatus::Rejected).unwrap();
        let err = store.update_status(id, ProposalStatus::Synced).unwrap_err();
        assert!(matches!(err, HistoryError::Validation(_)));
    }

    #[test]
    fn list_filters_by_status() {
        let store = test_store();
        let id1 = store.create_pending(&sample()).unwrap();
        let id2 = store.create_pending(&sample()).unwrap();
        store.update_status(id2, ProposalStatus::Synced).unwrap();
        let pending = store.list(None, Some(ProposalStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id1);
    }
}
