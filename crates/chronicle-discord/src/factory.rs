//! `ClientFactory` for Discord: builds a connected `DiscordClient` for a
//! user, either fresh or restored from a session file.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chronicle_accounts::AccountRegistry;
use chronicle_channels::{ChannelError, ClientFactory, MessengerClient};
use chronicle_core::config::MessengerBConfig;
use chronicle_core::{NormalizedMessage, UserId};

use crate::client::DiscordClient;

pub struct DiscordClientFactory {
    config: MessengerBConfig,
    registry: Arc<AccountRegistry>,
    sink: mpsc::Sender<NormalizedMessage>,
}

impl DiscordClientFactory {
    pub fn new(
        config: MessengerBConfig,
        registry: Arc<AccountRegistry>,
        sink: mpsc::Sender<NormalizedMessage>,
    ) -> Self {
        Self {
            config,
            registry,
            sink,
        }
    }

    async fn connected_client(&self) -> Result<Box<dyn MessengerClient>, ChannelError> {
        let mut client = DiscordClient::new(self.config.clone(), Arc::clone(&self.registry), self.sink.clone());
        client.connect(&[]).await?;
        Ok(Box::new(client))
    }
}

#[async_trait]
impl ClientFactory for DiscordClientFactory {
    /// Like Telegram, Discord's bot token is shared deployment-wide
    /// configuration rather than a per-user secret, so restoring a session
    /// is identical to establishing a fresh one.
    async fn restore(
        &self,
        _user_id: UserId,
        _session: &[u8],
    ) -> Result<Box<dyn MessengerClient>, ChannelError> {
        self.connected_client().await
    }

    async fn new_client(&self, _user_id: UserId) -> Result<Box<dyn MessengerClient>, ChannelError> {
        self.connected_client().await
    }
}
