use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("calendar error: {0}")]
    Calendar(#[from] chronicle_calendar::CalendarError),
    #[error("history store error: {0}")]
    History(#[from] chronicle_history::HistoryError),
    #[error("account registry error: {0}")]
    Account(#[from] chronicle_accounts::AccountError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
