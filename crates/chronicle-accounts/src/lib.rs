//! Channel (source) registry plus per-user notification and calendar-sync
//! settings: `users`, `channels`, `notification_prefs`, `calendar_settings`.

pub mod db;
pub mod error;
pub mod registry;
pub mod types;

pub use db::init_db;
pub use error::{AccountError, Result};
pub use registry::AccountRegistry;
pub use types::{CalendarSettings, NotificationPrefs, OAuthCredentials, SourceChannel};
