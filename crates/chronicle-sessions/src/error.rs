use thiserror::Error;

/// Errors that can occur while reading or writing a session file.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session file exists for this `(UserId, SourceType)`. Corruption is
    /// treated identically — callers see a missing session, not a parse error.
    #[error("session file not found: {key}")]
    NotFound { key: String },

    /// An I/O error occurred that was not "file does not exist".
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
