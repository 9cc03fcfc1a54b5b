//! Cross-crate seams that would otherwise create a dependency cycle between
//! `chronicle-history` (owns the processor loop) and its collaborators
//! (`chronicle-intents`, `chronicle-notify`). The processor is generic over
//! these traits; concrete implementations are wired together by the
//! embedding binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, NormalizedMessage, UserId};

/// A single persisted message record, bounded per channel to the last `H`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: i64,
    pub channel_id: ChannelId,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// What an intent module is given to decide on a single inbound message.
#[derive(Debug, Clone)]
pub struct ModuleInput {
    /// Bounded history slice, ascending by timestamp, current message last.
    pub history: Vec<ChannelMessage>,
    pub current: NormalizedMessage,
    /// Open (non-terminal) proposals of this module's kind for the channel,
    /// already filtered by the processor; module-kind-specific shape is
    /// opaque JSON since `chronicle-core` does not know about event/reminder
    /// proposal schemas.
    pub open_proposals: Vec<serde_json::Value>,
}

/// What an intent module decided to do, prior to validation and persistence.
#[derive(Debug, Clone)]
pub struct ModuleOutput {
    pub action: String,
    pub payload: serde_json::Value,
    pub reasoning: String,
}

/// A unit that turns a message plus context into a module output for a
/// single proposal kind (event or reminder).
#[async_trait]
pub trait IntentModule: Send + Sync {
    /// Stable lowercase kind tag, e.g. `"event"` or `"reminder"`.
    fn kind(&self) -> &'static str;

    async fn run(&self, input: ModuleInput) -> Result<ModuleOutput, String>;
}

/// Invoked by the processor whenever persistence creates a new proposal.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, user_id: UserId, kind: &str, proposal_id: i64);
}
