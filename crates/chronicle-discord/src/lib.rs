//! Discord protocol adapter: implements `chronicle_channels::MessengerClient`
//! over `serenity`'s gateway client, plus a `"push"` notification transport
//! reusing the same bot token.

pub mod client;
pub mod error;
pub mod factory;
pub mod notify;
pub mod send;

pub use client::DiscordClient;
pub use factory::DiscordClientFactory;
pub use notify::DiscordPushTransport;
