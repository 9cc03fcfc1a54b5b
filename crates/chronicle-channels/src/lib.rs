//! Per-user messenger client manager: owns one client per `(UserId,
//! SourceType)`, presents a single fan-in stream of normalized inbound
//! messages, and keeps session files consistent with in-memory state.

pub mod client;
pub mod container;
pub mod error;
pub mod manager;
pub mod types;

pub use client::MessengerClient;
pub use container::UserContainer;
pub use error::ChannelError;
pub use manager::{ClientFactory, ClientManager};
pub use types::{ChannelStatus, MessageFormat, OutboundMessage, PairingOutcome};
