//! `chronicle-sync` — per-user calendar reconciliation against the external
//! calendar (Google Calendar v3 via `chronicle-calendar`).
//!
//! One [`worker::CalendarSyncWorker`] runs per user with sync enabled and
//! OAuth on file, polling at a configured interval (default 1 minute, after
//! an initial 30 second delay). Each tick reconciles every locally `synced`
//! proposal against the remote calendar and imports any remote event not
//! yet linked locally. [`manager::SyncManager`] spawns and tracks one worker
//! per syncable user.

pub mod error;
pub mod manager;
pub mod worker;

pub use error::{Result, SyncError};
pub use manager::SyncManager;
pub use worker::{reconcile, CalendarSyncWorker, DEFAULT_INITIAL_DELAY, DEFAULT_POLL_INTERVAL};
