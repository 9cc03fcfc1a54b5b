use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::warn;

use chronicle_core::SourceType;

use crate::{client::MessengerClient, error::ChannelError};

/// Per-user collection of live messenger clients, one per protocol.
///
/// Owned exclusively by the manager's `DashMap` entry for this user; holds no
/// back-reference to the manager. Internal state is behind its own mutex so
/// concurrent `GetOrCreate` calls for the same user serialize without blocking
/// other users.
pub struct UserContainer {
    clients: Mutex<HashMap<SourceType, Box<dyn MessengerClient>>>,
}

impl UserContainer {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Return whether a client is currently registered for `protocol`.
    pub async fn has(&self, protocol: SourceType) -> bool {
        self.clients.lock().await.contains_key(&protocol)
    }

    /// Install a freshly constructed, already-connected client for `protocol`.
    ///
    /// Replaces any existing entry; callers are expected to have disconnected
    /// the previous client first.
    pub async fn install(&self, protocol: SourceType, client: Box<dyn MessengerClient>) {
        self.clients.lock().await.insert(protocol, client);
    }

    /// Disconnect and drop the client for `protocol`, if one exists.
    ///
    /// Bounded at 5 s; a slow disconnect is logged and the reference dropped
    /// regardless so the container never blocks `Shutdown` indefinitely.
    pub async fn destroy(&self, protocol: SourceType) {
        let mut guard = self.clients.lock().await;
        if let Some(mut client) = guard.remove(&protocol) {
            let result =
                tokio::time::timeout(std::time::Duration::from_secs(5), client.disconnect())
                    .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(protocol = %protocol, error = %e, "error disconnecting client"),
                Err(_) => warn!(protocol = %protocol, "disconnect timed out after 5s"),
            }
        }
    }

    /// Disconnect every registered client.
    pub async fn destroy_all(&self) {
        let protocols: Vec<SourceType> = {
            let guard = self.clients.lock().await;
            guard.keys().copied().collect()
        };
        for protocol in protocols {
            self.destroy(protocol).await;
        }
    }

    pub async fn send(
        &self,
        protocol: SourceType,
        msg: &crate::types::OutboundMessage,
    ) -> Result<(), ChannelError> {
        let guard = self.clients.lock().await;
        match guard.get(&protocol) {
            Some(client) => client.send(msg).await,
            None => Err(ChannelError::ConnectionFailed(format!(
                "no live client for protocol {protocol}"
            ))),
        }
    }
}

impl Default for UserContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UserContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserContainer").finish_non_exhaustive()
    }
}
