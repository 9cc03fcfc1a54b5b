use thiserror::Error;

/// Errors raised by the channel/notification/calendar-settings registry.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("channel not found: {0}")]
    ChannelNotFound(i64),

    #[error("channel already exists for this (user, source_type, identifier)")]
    ChannelAlreadyExists,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, AccountError>;
