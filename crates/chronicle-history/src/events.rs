use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use chronicle_core::{ActionType, ChannelId, ProposalStatus};

use crate::error::{HistoryError, Result};
use crate::types::{Attendee, EventProposal};

const EVENT_SELECT_SQL: &str = "SELECT id, user_id, channel_id, title, description, status, \
     action_type, llm_reasoning, start_time, end_time, location, attendees, calendar_id, \
     external_event_id, created_at FROM event_proposals";

/// New event proposal fields, prior to assignment of an `id`/`created_at`.
#[derive(Debug, Clone)]
pub struct NewEventProposal {
    pub user_id: i64,
    pub channel_id: ChannelId,
    pub title: String,
    pub description: Option<String>,
    pub action_type: ActionType,
    pub llm_reasoning: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub attendees: Vec<Attendee>,
    pub calendar_id: Option<String>,
}

/// Persistence verbs for event proposals (§6's "events" persistence contract).
pub struct EventProposalStore {
    db: Mutex<Connection>,
}

impl EventProposalStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn create_pending(&self, fields: &NewEventProposal) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();
        db.execute(
            "INSERT INTO event_proposals
                (user_id, channel_id, title, description, status, action_type, llm_reasoning,
                 start_time, end_time, location, attendees, calendar_id, external_event_id, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, ?12)",
            params![
                fields.user_id,
                fields.channel_id.get(),
                fields.title,
                fields.description,
                fields.action_type.as_str(),
                fields.llm_reasoning,
                fields.start_time.to_rfc3339(),
                fields.end_time.map(|t| t.to_rfc3339()),
                fields.location,
                serde_attendees(&fields.attendees),
                fields.calendar_id,
                now.to_rfc3339(),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<EventProposal>> {
        let db = self.db.lock().unwrap();
        let sql = format!("{EVENT_SELECT_SQL} WHERE id = ?1");
        let mut stmt = db.prepare(&sql)?;
        match stmt.query_row(params![id], row_to_event) {
            Ok(ev) => Ok(Some(ev)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_by_external_id(&self, user_id: i64, external_id: &str) -> Result<Option<EventProposal>> {
        let db = self.db.lock().unwrap();
        let sql = format!("{EVENT_SELECT_SQL} WHERE user_id = ?1 AND external_event_id = ?2");
        let mut stmt = db.prepare(&sql)?;
        match stmt.query_row(params![user_id, external_id], row_to_event) {
            Ok(ev) => Ok(Some(ev)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Open (pending or confirmed) proposals for a channel, used for
    /// duplicate-suppression comparisons and `ModuleInput::open_proposals`.
    pub fn list(&self, channel_id: Option<ChannelId>, status: Option<ProposalStatus>) -> Result<Vec<EventProposal>> {
        let db = self.db.lock().unwrap();
        let sql = match (channel_id, status) {
            (Some(_), Some(_)) => format!("{EVENT_SELECT_SQL} WHERE channel_id = ?1 AND status = ?2"),
            (Some(_), None) => format!("{EVENT_SELECT_SQL} WHERE channel_id = ?1"),
            (None, Some(_)) => format!("{EVENT_SELECT_SQL} WHERE status = ?1"),
            (None, None) => EVENT_SELECT_SQL.to_string(),
        };
        let mut stmt = db.prepare(&sql)?;
        let rows = match (channel_id, status) {
            (Some(c), Some(s)) => stmt.query_map(params![c.get(), s.as_str()], row_to_event)?,
            (Some(c), None) => stmt.query_map(params![c.get()], row_to_event)?,
            (None, Some(s)) => stmt.query_map(params![s.as_str()], row_to_event)?,
            (None, None) => stmt.query_map(params![], row_to_event)?,
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn update_pending(&self, id: i64, title: &str, description: Option<&str>, start_time: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE event_proposals SET title = ?2, description = ?3, start_time = ?4
             WHERE id = ?1 AND status = 'pending'",
            params![id, title, description, start_time.to_rfc3339()],
        )?;
        if rows == 0 {
            return Err(HistoryError::ProposalNotFound(id));
        }
        Ok(())
    }

    /// Enforce the `ProposalStatus` state machine on transition.
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
            "UPDATE event_proposals SET status = ?2 WHERE id = ?1",
            params![id, next.as_str()],
        )?;
        Ok(())
    }

    pub fn update_external_id(&self, id: i64, external_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE event_proposals SET external_event_id = ?2 WHERE id = ?1",
            params![id, external_id],
        )?;
        Ok(())
    }

    pub fn set_attendees(&self, id: i64, attendees: &[Attendee]) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE event_proposals SET attendees = ?2 WHERE id = ?1",
            params![id, serde_attendees(attendees)],
        )?;
        Ok(())
    }

    /// Every `synced` proposal that has an external id, for reconciliation.
    pub fn list_synced_with_external_id(&self, user_id: i64) -> Result<Vec<EventProposal>> {
        let db = self.db.lock().unwrap();
        let sql = format!(
            "{EVENT_SELECT_SQL} WHERE user_id = ?1 AND status = 'synced' AND external_event_id IS NOT NULL"
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], row_to_event)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Overwrite the local record's mutable fields from the remote calendar event.
    pub fn update_from_external(
        &self,
        id: i64,
        title: &str,
        description: Option<&str>,
        location: Option<&str>,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE event_proposals SET title = ?2, description = ?3, location = ?4,
             start_time = ?5, end_time = ?6 WHERE id = ?1",
            params![
                id,
                title,
                description,
                location,
                start_time.to_rfc3339(),
                end_time.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Create a new local proposal already in the `synced` state for a
    /// remote event discovered during reconciliation.
    pub fn import_synced(
        &self,
        user_id: i64,
        channel_id: ChannelId,
        title: &str,
        description: Option<&str>,
        location: Option<&str>,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        calendar_id: &str,
        external_event_id: &str,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO event_proposals
                (user_id, channel_id, title, description, status, action_type, llm_reasoning,
                 start_time, end_time, location, attendees, calendar_id, external_event_id, created_at)
             VALUES (?1, ?2, ?3, ?4, 'synced', 'create', 'imported from external calendar',
                     ?5, ?6, ?7, '[]', ?8, ?9, ?10)",
            params![
                user_id,
                channel_id.get(),
                title,
                description,
                start_time.to_rfc3339(),
                end_time.map(|t| t.to_rfc3339()),
                location,
                calendar_id,
                external_event_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }
}

fn serde_attendees(attendees: &[Attendee]) -> String {
    let values: Vec<serde_json::Value> = attendees
        .iter()
        .map(|a| {
            serde_json::json!({
                "email": a.email,
                "display_name": a.display_name,
                "optional": a.optional,
            })
        })
        .collect();
    serde_json::Value::Array(values).to_string()
}

fn parse_attendees(raw: &str) -> Vec<Attendee> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return vec![],
    };
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| {
                    Some(Attendee {
                        email: v.get("email")?.as_str()?.to_string(),
                        display_name: v.get("display_name").and_then(|d| d.as_str()).map(str::to_string),
                        optional: v.get("optional").and_then(|o| o.as_bool()).unwrap_or(false),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventProposal> {
    use std::str::FromStr;
    let status = ProposalStatus::from_str(&row.get::<_, String>(5)?).unwrap_or(ProposalStatus::Pending);
    let action_type = ActionType::from_str(&row.get::<_, String>(6)?).unwrap_or(ActionType::Create);
    let start_time: String = row.get(8)?;
    let end_time: Option<String> = row.get(9)?;
    let attendees_raw: String = row.get(11)?;
    let created_at: String = row.get(14)?;
    Ok(EventProposal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        channel_id: ChannelId(row.get(2)?),
        title: row.get(3)?,
        description: row.get(4)?,
        status,
        action_type,
        llm_reasoning: row.get(7)?,
        start_time: parse_rfc3339(&start_time),
        end_time: end_time.map(|s| parse_rfc3339(&s)),
        location: row.get(10)?,
        attendees: parse_attendees(&attendees_raw),
        calendar_id: row.get(12)?,
        external_event_id: row.get(13)?,
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

    fn test_store() -> EventProposalStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        EventProposalStore::new(conn)
    }

    fn sample() -> NewEventProposal {
        NewEventProposal {
            user_id: 1,
            channel_id: ChannelId(1),
            title: "Dentist".into(),
            description: None,
            action_type: ActionType::Create,
            llm_reasoning: "user mentioned an appointment".into(),
            start_time: Utc::now(),
            end_time: None,
            location: None,
            attendees: vec![],
            calendar_id: None,
        }
    }

    #[test]
    fn create_then_get_by_id_round_trips() {
        let store = test_store();
        let id = store.create_pending(&sample()).unwrap();
        let ev = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(ev.title, "Dentist");
        assert_eq!(ev.status, ProposalStatus::Pending);
    }

    #[test]
    fn update_status_rejects_illegal_transition() {
        let store = test_store();
        let id = store.create_pending(&sample()).unwrap();
        store.update_status(id, ProposalStatus::Synced).unwrap();
        let err = store.update_status(id, ProposalStatus::Pending).unwrap_err();
        assert!(matches!(err, HistoryError::Validation(_)));
    }

    #[test]
    fn update_status_allows_pending_to_synced() {
        let store = test_store();
        let id = store.create_pending(&sample()).unwrap();
        store.update_status(id, ProposalStatus::Synced).unwrap();
        let ev = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(ev.status, ProposalStatus::Synced);
    }

    #[test]
    fn set_attendees_round_trips() {
        let store = test_store();
        let id = store.create_pending(&sample()).unwrap();
        let attendees = vec![Attendee {
            email: "a@example.com".into(),
            display_name: Some("Alice".into()),
            optional: false,
        }];
        store.set_attendees(id, &attendees).unwrap();
        let ev = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(ev.attendees.len(), 1);
        assert_eq!(ev.attendees[0].email, "a@example.com");
    }
}
