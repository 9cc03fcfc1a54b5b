use thiserror::Error;

/// Errors that can occur within any messenger client or the manager that owns it.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying transport could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A message could not be delivered to the remote endpoint.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The channel rejected the supplied credentials or token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// An operation exceeded its allowed time budget.
    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The channel-specific configuration is invalid or missing.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Interactive pairing was required but no session file exists for restore.
    #[error("pairing required: no session file for user {user_id}")]
    PairingRequired { user_id: i64 },

    /// Session-file I/O failed.
    #[error("session store error: {0}")]
    Session(#[from] chronicle_sessions::SessionError),
}
