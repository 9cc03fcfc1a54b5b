//! `ClientFactory` for Telegram: builds a connected `TelegramClient` for a
//! user, either fresh or restored from a session file.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chronicle_accounts::AccountRegistry;
use chronicle_channels::{ChannelError, ClientFactory, MessengerClient};
use chronicle_core::config::MessengerAConfig;
use chronicle_core::{NormalizedMessage, UserId};

use crate::client::TelegramClient;

pub struct TelegramClientFactory {
    config: MessengerAConfig,
    registry: Arc<AccountRegistry>,
    sink: mpsc::Sender<NormalizedMessage>,
}

impl TelegramClientFactory {
    pub fn new(
        config: MessengerAConfig,
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
        let mut client = TelegramClient::new(self.config.clone(), Arc::clone(&self.registry), self.sink.clone());
        client.connect(&[]).await?;
        Ok(Box::new(client))
    }
}

#[async_trait]
impl ClientFactory for TelegramClientFactory {
    /// Telegram has no per-user session blob to restore from: the bot token
    /// is shared deployment-wide configuration, so this is identical to
    /// `new_client`. The session file still exists (a placeholder is
    /// written on pairing) so `RestoreSessions` finds this user eligible.
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
