//! Bounded per-channel message history, event/reminder proposal storage, and
//! the message processor that turns inbound messages into persisted
//! proposals via registered intent modules.

pub mod db;
pub mod error;
pub mod events;
pub mod history;
pub mod persister;
pub mod processor;
pub mod reminders;
pub mod types;

pub use db::init_db;
pub use error::{HistoryError, Result};
pub use events::{EventProposalStore, NewEventProposal};
pub use history::{HistoryStore, DEFAULT_HISTORY_SIZE};
pub use persister::{PersistOutcome, Persister};
pub use processor::Processor;
pub use reminders::{NewReminderProposal, ReminderProposalStore};
pub use types::{normalize_instant, normalize_title, Attendee, EventProposal, ReminderProposal};
