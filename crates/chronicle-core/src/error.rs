use thiserror::Error;

/// Fatal-at-startup and cross-cutting errors. Per-crate error enums
/// (`ChannelsError`, `HistoryError`, `AgentError`, ...) handle everything
/// recoverable; only the fatal subset listed here is expected to cross the
/// core boundary into `main`.
#[derive(Debug, Error)]
pub enum ChronicleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("User not found: {id}")]
    UserNotFound { id: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChronicleError {
    /// Short SCREAMING_SNAKE wire code a status collaborator could report.
    pub fn code(&self) -> &'static str {
        match self {
            ChronicleError::Config(_) => "CONFIG_ERROR",
            ChronicleError::AuthFailed(_) => "AUTH_FAILED",
            ChronicleError::UserNotFound { .. } => "USER_NOT_FOUND",
            ChronicleError::Database(_) => "DATABASE_ERROR",
            ChronicleError::Serialization(_) => "SERIALIZATION_ERROR",
            ChronicleError::Io(_) => "IO_ERROR",
            ChronicleError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Process exit code for a binary embedding the core (§6: 0 normal, 1 fatal).
    pub fn exit_code(&self) -> i32 {
        match self {
            ChronicleError::Config(_) | ChronicleError::Internal(_) => 1,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChronicleError>;
