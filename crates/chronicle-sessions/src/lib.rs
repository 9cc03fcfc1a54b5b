//! Filesystem-backed storage for per-`(UserId, SourceType)` protocol
//! credential blobs, written on pairing and deleted on explicit logout.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{Result, SessionError};
pub use manager::SessionFileStore;
pub use types::SessionFileKey;
