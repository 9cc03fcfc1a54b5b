use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use chronicle_core::{NormalizedMessage, SourceType, UserId};
use chronicle_sessions::{SessionFileKey, SessionFileStore};

use crate::{container::UserContainer, error::ChannelError};

/// Constructs a connected [`crate::client::MessengerClient`] for a given user
/// and protocol.
///
/// One implementation per protocol (telegram, discord, email) lives in its own
/// crate; the manager is generic over this trait so it never depends on a
/// concrete messenger implementation.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Build and connect a client using a previously persisted session blob.
    async fn restore(
        &self,
        user_id: UserId,
        session: &[u8],
    ) -> Result<Box<dyn crate::client::MessengerClient>, ChannelError>;

    /// Build a client with no session, ready for interactive pairing.
    async fn new_client(
        &self,
        user_id: UserId,
    ) -> Result<Box<dyn crate::client::MessengerClient>, ChannelError>;
}

/// Owns every user's live messenger clients and presents a single bounded
/// fan-in stream of inbound messages to the rest of the system.
pub struct ClientManager {
    containers: DashMap<UserId, Arc<UserContainer>>,
    factories: HashMap<SourceType, Arc<dyn ClientFactory>>,
    session_bases: HashMap<SourceType, String>,
    sessions: SessionFileStore,
    sender: mpsc::Sender<NormalizedMessage>,
    dropped: Arc<AtomicU64>,
}

impl ClientManager {
    /// Create a manager with the given fan-in channel capacity.
    ///
    /// Returns the manager paired with the receiving end of the fan-in
    /// channel, which the message processor consumes. Factories are built
    /// from `manager.sender()`'s clone by the caller beforehand — see
    /// [`ClientManager::channel`] for constructing the sender first.
    pub fn new(
        capacity: usize,
        factories: HashMap<SourceType, Arc<dyn ClientFactory>>,
        session_bases: HashMap<SourceType, String>,
    ) -> (Self, mpsc::Receiver<NormalizedMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self::with_sender(sender, factories, session_bases),
            receiver,
        )
    }

    /// Pre-create the fan-in channel so protocol-adapter factories can be
    /// built with a clone of the sender *before* the manager itself exists,
    /// then hand both the sender and receiver to [`ClientManager::with_sender`]
    /// / the processor.
    pub fn channel(capacity: usize) -> (mpsc::Sender<NormalizedMessage>, mpsc::Receiver<NormalizedMessage>) {
        mpsc::channel(capacity)
    }

    /// Create a manager around an already-constructed fan-in sender, paired
    /// with factories built from a clone of that same sender.
    pub fn with_sender(
        sender: mpsc::Sender<NormalizedMessage>,
        factories: HashMap<SourceType, Arc<dyn ClientFactory>>,
        session_bases: HashMap<SourceType, String>,
    ) -> Self {
        Self {
            containers: DashMap::new(),
            factories,
            session_bases,
            sessions: SessionFileStore::new(),
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sender half of the fan-in channel, cloned into every client so protocol
    /// adapters can push normalized messages without holding the manager.
    pub fn sender(&self) -> mpsc::Sender<NormalizedMessage> {
        self.sender.clone()
    }

    /// Number of fan-in messages dropped so far because the channel was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Non-blocking push onto the fan-in channel; drops and counts on overflow.
    pub fn try_forward(&self, msg: NormalizedMessage) {
        if let Err(e) = self.sender.try_send(msg) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                dropped_total = self.dropped.load(Ordering::Relaxed),
                error = %e,
                "fan-in channel full, message dropped"
            );
        }
    }

    fn container(&self, user_id: UserId) -> Arc<UserContainer> {
        self.containers
            .entry(user_id)
            .or_insert_with(|| Arc::new(UserContainer::new()))
            .clone()
    }

    /// Return an existing connected client for `(user_id, protocol)` or
    /// construct one via the registered factory.
    ///
    /// Double-checked: the outer `DashMap` entry gives each user a container
    /// without holding a global lock; the container's own mutex (taken inside
    /// `has`/`install`) then prevents two racing callers from building two
    /// clients for the same protocol.
    #[instrument(skip(self), fields(user = %user_id, protocol = %protocol))]
    pub async fn get_or_create(
        &self,
        user_id: UserId,
        protocol: SourceType,
    ) -> Result<(), ChannelError> {
        let container = self.container(user_id);
        if container.has(protocol).await {
            return Ok(());
        }

        let factory = self.factories.get(&protocol).ok_or_else(|| {
            ChannelError::ConfigError(format!("no client factory registered for {protocol}"))
        })?;

        let client = factory.new_client(user_id).await?;
        container.install(protocol, client).await;
        info!(user = %user_id, protocol = %protocol, "messenger client constructed");
        Ok(())
    }

    /// Disconnect the client for `(user_id, protocol)` but keep its session
    /// file on disk.
    #[instrument(skip(self), fields(user = %user_id, protocol = %protocol))]
    pub async fn destroy(&self, user_id: UserId, protocol: SourceType) {
        if let Some(container) = self.containers.get(&user_id) {
            container.destroy(protocol).await;
        }
    }

    /// Disconnect the client for `(user_id, protocol)` and delete its session
    /// file. "Not found" while deleting is treated as success.
    #[instrument(skip(self), fields(user = %user_id, protocol = %protocol))]
    pub async fn logout(&self, user_id: UserId, protocol: SourceType) -> Result<(), ChannelError> {
        self.destroy(user_id, protocol).await;
        let base = self.session_bases.get(&protocol).ok_or_else(|| {
            ChannelError::ConfigError(format!("no session base configured for {protocol}"))
        })?;
        let key = SessionFileKey::new(user_id, protocol);
        self.sessions.delete(&key, base).await?;
        Ok(())
    }

    /// Disconnect every client for every user and close the fan-in channel.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        for entry in self.containers.iter() {
            entry.value().destroy_all().await;
        }
        self.containers.clear();
    }

    /// For every `(protocol, base)` pair, restore a client from disk for every
    /// user with an existing session file, without interactive pairing.
    ///
    /// Intended to be called once at startup per tracked user; the caller
    /// supplies the candidate `(UserId, SourceType)` pairs (typically every
    /// channel the account registry marks as enabled).
    #[instrument(skip(self, candidates))]
    pub async fn restore_sessions(&self, candidates: &[(UserId, SourceType)]) {
        for &(user_id, protocol) in candidates {
            let Some(base) = self.session_bases.get(&protocol) else {
                continue;
            };
            let key = SessionFileKey::new(user_id, protocol);
            let blob = match self.sessions.read(&key, base).await {
                Ok(Some(blob)) => blob,
                Ok(None) => continue,
                Err(e) => {
                    warn!(user = %user_id, protocol = %protocol, error = %e, "session restore read failed");
                    continue;
                }
            };

            let Some(factory) = self.factories.get(&protocol) else {
                continue;
            };
            match factory.restore(user_id, &blob).await {
                Ok(client) => {
                    let container = self.container(user_id);
                    container.install(protocol, client).await;
                    info!(user = %user_id, protocol = %protocol, "session restored");
                }
                Err(e) => {
                    warn!(user = %user_id, protocol = %protocol, error = %e, "failed to restore client from session");
                }
            }
        }
    }

    /// Send an outbound message through the live client for its recipient.
    pub async fn send(
        &self,
        user_id: UserId,
        protocol: SourceType,
        msg: &crate::types::OutboundMessage,
    ) -> Result<(), ChannelError> {
        match self.containers.get(&user_id) {
            Some(container) => container.send(protocol, msg).await,
            None => Err(ChannelError::ConnectionFailed(format!(
                "no container for user {user_id}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MessengerClient;
    use crate::types::{MessageFormat, OutboundMessage, PairingOutcome};

    struct MockClient {
        status: ChannelStatus,
    }

    #[async_trait]
    impl MessengerClient for MockClient {
        fn name(&self) -> &str {
            "mock"
        }

        async fn connect(&mut self, _session: &[u8]) -> Result<(), ChannelError> {
            self.status = ChannelStatus::Connected;
            Ok(())
        }

        async fn pair(&mut self) -> Result<PairingOutcome, ChannelError> {
            Ok(PairingOutcome::Complete(b"blob".to_vec()))
        }

        async fn verify(&mut self) -> Result<PairingOutcome, ChannelError> {
            Ok(PairingOutcome::Complete(b"blob".to_vec()))
        }

        async fn disconnect(&mut self) -> Result<(), ChannelError> {
            self.status = ChannelStatus::Disconnected;
            Ok(())
        }

        async fn discover(&self) -> Result<Vec<String>, ChannelError> {
            Ok(vec![])
        }

        async fn send(&self, _msg: &OutboundMessage) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn handle_update(
            &self,
            _raw: serde_json::Value,
            _sink: &mpsc::Sender<NormalizedMessage>,
        ) -> Result<(), ChannelError> {
            Ok(())
        }

        fn status(&self) -> ChannelStatus {
            self.status.clone()
        }
    }

    struct MockFactory;

    #[async_trait]
    impl ClientFactory for MockFactory {
        async fn restore(
            &self,
            _user_id: UserId,
            _session: &[u8],
        ) -> Result<Box<dyn MessengerClient>, ChannelError> {
            Ok(Box::new(MockClient {
                status: ChannelStatus::Connected,
            }))
        }

        async fn new_client(
            &self,
            _user_id: UserId,
        ) -> Result<Box<dyn MessengerClient>, ChannelError> {
            Ok(Box::new(MockClient {
                status: ChannelStatus::Connected,
            }))
        }
    }

    fn test_manager() -> (ClientManager, mpsc::Receiver<NormalizedMessage>) {
        let mut factories: HashMap<SourceType, Arc<dyn ClientFactory>> = HashMap::new();
        factories.insert(SourceType::MessengerA, Arc::new(MockFactory));
        let mut bases = HashMap::new();
        bases.insert(
            SourceType::MessengerA,
            format!(
                "{}/chronicle-channels-test-{}",
                std::env::temp_dir().display(),
                std::process::id()
            ),
        );
        ClientManager::new(4, factories, bases)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (manager, _rx) = test_manager();
        let user = UserId(1);
        manager
            .get_or_create(user, SourceType::MessengerA)
            .await
            .unwrap();
        manager
            .get_or_create(user, SourceType::MessengerA)
            .await
            .unwrap();
        assert!(manager.container(user).has(SourceType::MessengerA).await);
    }

    #[tokio::test]
    async fn unknown_protocol_errors() {
        let (manager, _rx) = test_manager();
        let result = manager
            .get_or_create(UserId(1), SourceType::MessengerB)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fan_in_overflow_increments_drop_counter() {
        let (manager, mut rx) = test_manager();
        let msg = NormalizedMessage {
            user_id: UserId(1),
            source_type: SourceType::MessengerA,
            source_id: chronicle_core::ChannelId::untracked(),
            identifier: "chat-1".into(),
            sender_id: "u1".into(),
            sender_name: "Alice".into(),
            text: "hi".into(),
            is_group: false,
            timestamp: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
            calendar_id: None,
        };

        for _ in 0..8 {
            manager.try_forward(msg.clone());
        }
        assert!(manager.dropped_count() > 0);

        while rx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn logout_removes_session_file() {
        let (manager, _rx) = test_manager();
        let user = UserId(5);
        manager
            .get_or_create(user, SourceType::MessengerA)
            .await
            .unwrap();
        manager.logout(user, SourceType::MessengerA).await.unwrap();
        assert!(!manager.container(user).has(SourceType::MessengerA).await);
    }
}
