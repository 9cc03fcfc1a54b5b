use chronicle_core::{ActionType, ProposalStatus};

use crate::error::{HistoryError, Result};
use crate::events::{EventProposalStore, NewEventProposal};
use crate::reminders::{NewReminderProposal, ReminderProposalStore};
use crate::types::{normalize_instant, normalize_title, EventProposal, ReminderProposal};

/// Outcome of persisting an intent module's decision: either a fresh
/// proposal row was created, or an existing open one was revised in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Created(i64),
    Updated(i64),
}

impl PersistOutcome {
    pub fn id(&self) -> i64 {
        match self {
            PersistOutcome::Created(id) | PersistOutcome::Updated(id) => *id,
        }
    }
}

/// Applies create/update/delete decisions from intent modules to the
/// event/reminder proposal stores, suppressing duplicates and resolving
/// update/delete references to an existing open proposal on the same channel.
pub struct Persister {
    events: EventProposalStore,
    reminders: ReminderProposalStore,
}

impl Persister {
    pub fn new(events: EventProposalStore, reminders: ReminderProposalStore) -> Self {
        Self { events, reminders }
    }

    pub fn events(&self) -> &EventProposalStore {
        &self.events
    }

    pub fn reminders(&self) -> &ReminderProposalStore {
        &self.reminders
    }

    /// Persist an event decision. `Create` is suppressed into `Updated` when
    /// an open proposal with an equivalent normalized `(title, start_time)`
    /// already exists on the channel; `Update`/`Delete` must resolve to an
    /// existing open proposal or the call fails.
    pub fn persist_event(&self, action: ActionType, fields: NewEventProposal, target_id: Option<i64>) -> Result<PersistOutcome> {
        match action {
            ActionType::Create => {
                if let Some(existing) = self.find_duplicate_event(&fields)? {
                    self.events.update_pending(
                        existing.id,
                        &fields.title,
                        fields.description.as_deref(),
                        fields.start_time,
                    )?;
                    return Ok(PersistOutcome::Updated(existing.id));
                }
                let id = self.events.create_pending(&fields)?;
                Ok(PersistOutcome::Created(id))
            }
            ActionType::Update => {
                let id = self.resolve_event_reference(target_id, &fields)?;
                self.events
                    .update_pending(id, &fields.title, fields.description.as_deref(), fields.start_time)?;
                Ok(PersistOutcome::Updated(id))
            }
            ActionType::Delete => {
                let id = self.resolve_event_reference(target_id, &fields)?;
                self.events.update_status(id, ProposalStatus::Rejected)?;
                Ok(PersistOutcome::Updated(id))
            }
        }
    }

    /// Persist a reminder decision. Same suppression/resolution rules as
    /// `persist_event`, keyed on `(title, due_date)` instead.
    pub fn persist_reminder(&self, action: ActionType, fields: NewReminderProposal, target_id: Option<i64>) -> Result<PersistOutcome> {
        match action {
            ActionType::Create => {
                if let Some(existing) = self.find_duplicate_reminder(&fields)? {
                    self.reminders.update_pending(
                        existing.id,
                        &fields.title,
                        fields.description.as_deref(),
                        fields.due_date,
                    )?;
                    return Ok(PersistOutcome::Updated(existing.id));
                }
                let id = self.reminders.create_pending(&fields)?;
                Ok(PersistOutcome::Created(id))
            }
            ActionType::Update => {
                let id = self.resolve_reminder_reference(target_id, &fields)?;
                self.reminders
                    .update_pending(id, &fields.title, fields.description.as_deref(), fields.due_date)?;
                Ok(PersistOutcome::Updated(id))
            }
            ActionType::Delete => {
                let id = self.resolve_reminder_reference(target_id, &fields)?;
                self.reminders.update_status(id, ProposalStatus::Rejected)?;
                Ok(PersistOutcome::Updated(id))
            }
        }
    }

    fn find_duplicate_event(&self, fields: &NewEventProposal) -> Result<Option<EventProposal>> {
        let open = self.events.list(Some(fields.channel_id), Some(ProposalStatus::Pending))?;
        let title = normalize_title(&fields.title);
        let start = normalize_instant(fields.start_time);
        Ok(open
            .into_iter()
            .find(|ev| normalize_title(&ev.title) == title && normalize_instant(ev.start_time) == start))
    }

    fn find_duplicate_reminder(&self, fields: &NewReminderProposal) -> Result<Option<ReminderProposal>> {
        let open = self.reminders.list(Some(fields.channel_id), Some(ProposalStatus::Pending))?;
        let title = normalize_title(&fields.title);
        let due = normalize_instant(fields.due_date);
        Ok(open
            .into_iter()
            .find(|r| normalize_title(&r.title) == title && normalize_instant(r.due_date) == due))
    }

    fn resolve_event_reference(&self, target_id: Option<i64>, fields: &NewEventProposal) -> Result<i64> {
        let id = target_id.ok_or_else(|| HistoryError::Validation("update/delete requires a target id".into()))?;
        let ev = self
            .events
            .get_by_id(id)?
            .ok_or(HistoryError::ProposalNotFound(id))?;
        if ev.channel_id != fields.channel_id {
            return Err(HistoryError::Validation(format!(
                "proposal {id} does not belong to this channel"
            )));
        }
        Ok(id)
    }

    fn resolve_reminder_reference(&self, target_id: Option<i64>, fields: &NewReminderProposal) -> Result<i64> {
        let id = target_id.ok_or_else(|| HistoryError::Validation("update/delete requires a target id".into()))?;
        let r = self
            .reminders
            .get_by_id(id)?
            .ok_or(HistoryError::ProposalNotFound(id))?;
        if r.channel_id != fields.channel_id {
            return Err(HistoryError::Validation(format!(
                "proposal {id} does not belong to this channel"
            )));
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use chronicle_core::ChannelId;
    use rusqlite::Connection;

    fn test_persister() -> Persister {
        let conn1 = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn1).unwrap();
        let conn2 = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn2).unwrap();
        Persister::new(EventProposalStore::new(conn1), ReminderProposalStore::new(conn2))
    }

    fn sample_event(title: &str, start: DateTime<Utc>) -> NewEventProposal {
        NewEventProposal {
            user_id: 1,
            channel_id: ChannelId(1),
            title: title.into(),
            description: None,
            action_type: ActionType::Create,
            llm_reasoning: "reasoning".into(),
            start_time: start,
            end_time: None,
            location: None,
            attendees: vec![],
            calendar_id: None,
        }
    }

    #[test]
    fn create_twice_with_same_title_and_time_updates_instead_of_duplicating() {
        let p = test_persister();
        let now = Utc::now();
        let first = p.persist_event(ActionType::Create, sample_event("Dentist", now), None).unwrap();
        assert!(matches!(first, PersistOutcome::Created(_)));

        let second = p
            .persist_event(ActionType::Create, sample_event("  DENTIST  ", now), None)
            .unwrap();
        assert_eq!(second, PersistOutcome::Updated(first.id()));

        let all = p.events().list(Some(ChannelId(1)), None).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn update_without_target_id_fails() {
        let p = test_persister();
        let err = p
            .persist_event(ActionType::Update, sample_event("Dentist", Utc::now()), None)
            .unwrap_err();
        assert!(matches!(err, HistoryError::Validation(_)));
    }

    #[test]
    fn delete_resolves_to_existing_proposal_and_rejects_it() {
        let p = test_persister();
        let created = p.persist_event(ActionType::Create, sample_event("Dentist", Utc::now()), None).unwrap();
        let deleted = p
            .persist_event(ActionType::Delete, sample_event("Dentist", Utc::now()), Some(created.id()))
            .unwrap();
        assert_eq!(deleted.id(), created.id());
        let ev = p.events().get_by_id(created.id()).unwrap().unwrap();
        assert_eq!(ev.status, ProposalStatus::Rejected);
    }

    #[test]
    fn delete_referencing_other_channel_proposal_fails() {
        let p = test_persister();
        let created = p.persist_event(ActionType::Create, sample_event("Dentist", Utc::now()), None).unwrap();
        let mut other_channel = sample_event("Dentist", Utc::now());
        other_channel.channel_id = ChannelId(2);
        let err = p
            .persist_event(ActionType::Delete, other_channel, Some(created.id()))
            .unwrap_err();
        assert!(matches!(err, HistoryError::Validation(_)));
    }
}
