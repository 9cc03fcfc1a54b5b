//! Telegram protocol adapter: implements `chronicle_channels::MessengerClient`
//! over `teloxide`'s long-polling `Bot`, plus a `"push"` notification
//! transport reusing the same bot.

pub mod allow;
pub mod client;
pub mod error;
pub mod factory;
pub mod notify;
pub mod send;

pub use client::TelegramClient;
pub use factory::TelegramClientFactory;
pub use notify::TelegramPushTransport;
