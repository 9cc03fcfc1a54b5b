use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer identifier for a real-world end user.
///
/// Every other piece of state in the system is keyed by this, directly or
/// transitively through a `ChannelId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Identifier for a tracked source channel (row id in the `channels` table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl ChannelId {
    /// `0` means "untracked" — the sentinel used by `NormalizedMessage::source_id`.
    pub fn untracked() -> Self {
        Self(0)
    }

    pub fn is_tracked(&self) -> bool {
        self.0 > 0
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChannelId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// The two live messenger protocols plus email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    MessengerA,
    MessengerB,
    Email,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::MessengerA => "messenger_a",
            SourceType::MessengerB => "messenger_b",
            SourceType::Email => "email",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "messenger_a" => Ok(SourceType::MessengerA),
            "messenger_b" => Ok(SourceType::MessengerB),
            "email" => Ok(SourceType::Email),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

/// What kind of conversation a tracked channel represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Sender,
    Group,
    Broadcast,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Sender => "sender",
            ChannelType::Group => "group",
            ChannelType::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sender" => Ok(ChannelType::Sender),
            "group" => Ok(ChannelType::Group),
            "broadcast" => Ok(ChannelType::Broadcast),
            other => Err(format!("unknown channel type: {other}")),
        }
    }
}

/// The uniform inbound message shape every messenger/email adapter produces.
///
/// Immutable once constructed at ingestion. `source_id` is the tracked
/// channel's `ChannelId`, or `ChannelId::untracked()` when no matching
/// channel row exists yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub user_id: UserId,
    pub source_type: SourceType,
    pub source_id: ChannelId,
    pub identifier: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub is_group: bool,
    pub timestamp: DateTime<Utc>,
    pub calendar_id: Option<String>,
}

/// Lifecycle state of a proposal (event or reminder).
///
/// Transitions: `Pending -> {Synced, Rejected}`, `Synced -> {Deleted}`.
/// Terminal states (`Rejected`, `Deleted`) never re-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Confirmed,
    Synced,
    Rejected,
    Deleted,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalStatus::Rejected | ProposalStatus::Deleted)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Pending, Synced) | (Pending, Rejected) | (Pending, Confirmed) => true,
            (Confirmed, Synced) | (Confirmed, Rejected) => true,
            (Synced, Deleted) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Confirmed => "confirmed",
            ProposalStatus::Synced => "synced",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProposalStatus::Pending),
            "confirmed" => Ok(ProposalStatus::Confirmed),
            "synced" => Ok(ProposalStatus::Synced),
            "rejected" => Ok(ProposalStatus::Rejected),
            "deleted" => Ok(ProposalStatus::Deleted),
            other => Err(format!("unknown proposal status: {other}")),
        }
    }
}

/// What an intent module decided to do with a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(ActionType::Create),
            "update" => Ok(ActionType::Update),
            "delete" => Ok(ActionType::Delete),
            other => Err(format!("unknown action type: {other}")),
        }
    }
}

/// Reminder urgency. Has no bearing on event proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_untracked_is_zero() {
        assert!(!ChannelId::untracked().is_tracked());
        assert!(ChannelId::from(5).is_tracked());
    }

    #[test]
    fn proposal_status_terminal_states_never_reopen() {
        assert!(!ProposalStatus::Rejected.can_transition_to(ProposalStatus::Pending));
        assert!(!ProposalStatus::Deleted.can_transition_to(ProposalStatus::Synced));
        assert!(ProposalStatus::Pending.can_transition_to(ProposalStatus::Synced));
        assert!(ProposalStatus::Synced.can_transition_to(ProposalStatus::Deleted));
        assert!(!ProposalStatus::Synced.can_transition_to(ProposalStatus::Pending));
    }

    #[test]
    fn source_type_round_trips_through_string() {
        for st in [SourceType::MessengerA, SourceType::MessengerB, SourceType::Email] {
            let parsed: SourceType = st.as_str().parse().unwrap();
            assert_eq!(parsed, st);
        }
    }
}
