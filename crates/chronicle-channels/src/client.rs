use async_trait::async_trait;

use chronicle_core::NormalizedMessage;

use crate::{
    error::ChannelError,
    types::{ChannelStatus, OutboundMessage, PairingOutcome},
};

/// Capability set implemented by every messenger protocol adapter (messenger-A,
/// messenger-B, …).
///
/// Instances are owned by exactly one `UserContainer`; sessions are never shared
/// across users or reused across reconnects.
#[async_trait]
pub trait MessengerClient: Send + Sync {
    /// Stable lowercase protocol identifier (e.g. `"telegram"`, `"discord"`).
    fn name(&self) -> &str;

    /// Establish the connection using an already-persisted session blob.
    ///
    /// Used by `RestoreSessions`; must not prompt for interactive pairing.
    async fn connect(&mut self, session: &[u8]) -> Result<(), ChannelError>;

    /// Begin interactive pairing for a user with no existing session.
    async fn pair(&mut self) -> Result<PairingOutcome, ChannelError>;

    /// Check whether a previously started pairing has completed.
    async fn verify(&mut self) -> Result<PairingOutcome, ChannelError>;

    /// Gracefully close the connection. Does not touch the session file.
    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Enumerate channels/chats reachable through this client, if supported.
    async fn discover(&self) -> Result<Vec<String>, ChannelError>;

    /// Deliver a single outbound message.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Normalize and hand off a raw platform update to `sink`.
    async fn handle_update(
        &self,
        raw: serde_json::Value,
        sink: &tokio::sync::mpsc::Sender<NormalizedMessage>,
    ) -> Result<(), ChannelError>;

    /// Current runtime status without blocking.
    fn status(&self) -> ChannelStatus;
}
