//! Email protocol adapter: implements `chronicle_channels::MessengerClient`
//! over IMAP polling (`async-imap` + `tokio-rustls`), normalizing unseen
//! mailbox messages the same way the messenger adapters normalize chat
//! updates.

pub mod client;
pub mod error;
pub mod factory;

pub use client::EmailClient;
pub use factory::EmailClientFactory;
