//! `ClientFactory` for email: builds a connected `EmailClient` for a user.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chronicle_accounts::AccountRegistry;
use chronicle_channels::{ChannelError, ClientFactory, MessengerClient};
use chronicle_core::config::ImapConfig;
use chronicle_core::{NormalizedMessage, UserId};

use crate::client::EmailClient;

pub struct EmailClientFactory {
    config: ImapConfig,
    registry: Arc<AccountRegistry>,
    sink: mpsc::Sender<NormalizedMessage>,
}

impl EmailClientFactory {
    pub fn new(
        config: ImapConfig,
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
        let mut client = EmailClient::new(self.config.clone(), Arc::clone(&self.registry), self.sink.clone());
        client.connect(&[]).await?;
        Ok(Box::new(client))
    }
}

#[async_trait]
impl ClientFactory for EmailClientFactory {
    /// IMAP credentials are deployment config, not a per-user session blob,
    /// so restoring is identical to establishing a fresh connection.
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
