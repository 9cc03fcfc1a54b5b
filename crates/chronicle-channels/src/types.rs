use serde::{Deserialize, Serialize};

use chronicle_core::SourceType;

/// A message to be delivered to an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Protocol to deliver through.
    pub source_type: SourceType,

    /// Platform-native identifier for the recipient (chat ID, user ID, …).
    pub recipient_id: String,

    /// Content to deliver.
    pub content: String,

    /// Formatting hint for the target platform.
    pub format: MessageFormat,
}

/// Formatting hint for outbound message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// Raw text with no special markup.
    #[default]
    PlainText,

    /// Markdown as understood by the target platform.
    Markdown,

    /// HTML markup (supported by Telegram, some web clients).
    Html,
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Fully connected and ready to send/receive.
    Connected,

    /// Attempting to establish or re-establish the connection.
    Connecting,

    /// Cleanly disconnected (not an error condition).
    Disconnected,

    /// An unrecoverable (or pre-retry) error occurred.
    Error(String),
}

/// Outcome of a pairing attempt (`MessengerClient::pair`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Pairing completed; the returned blob should be persisted as the session file.
    Complete(Vec<u8>),

    /// Pairing is still in progress (e.g. waiting for the user to confirm a code).
    Pending,
}
