//! Shared types, configuration and error definitions used across every
//! `chronicle-*` crate: user/channel identifiers, the normalized inbound
//! message shape, proposal lifecycle types, and the layered `AppConfig`.

pub mod config;
pub mod contracts;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use contracts::{ChannelMessage, IntentModule, ModuleInput, ModuleOutput, NotificationDispatcher};
pub use error::{ChronicleError, Result};
pub use types::{
    ActionType, ChannelId, ChannelType, NormalizedMessage, Priority, ProposalStatus, SourceType,
    UserId,
};
