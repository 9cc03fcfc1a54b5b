//! Notification fan-out for newly created proposals (`§4.7`): one
//! `NotificationTransport` per channel (email, push), invoked for each
//! preference the user has enabled. Implements `chronicle_core`'s generic
//! `NotificationDispatcher` seam so `chronicle-history::Processor` stays
//! decoupled from concrete transports.

pub mod dispatcher;
pub mod email;
pub mod transport;

pub use dispatcher::ChronicleNotificationDispatcher;
pub use email::{EmailConfig, EmailTransport};
pub use transport::{Notification, NotificationTransport, TransportError};
