//! Outbound contract to the external calendar service, plus a Google
//! Calendar v3 implementation used by the sync worker and by persistence
//! once a proposal is confirmed.

pub mod client;
pub mod google;

pub use client::{CalendarClient, CalendarError, RemoteAttendee, RemoteEvent, RemoteEventDraft};
pub use google::{GoogleCalendarClient, GoogleCredentials};
