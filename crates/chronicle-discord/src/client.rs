//! Discord `MessengerClient`: wraps a `serenity::Client` gateway connection
//! and normalizes every accepted message into a `NormalizedMessage` on the
//! client manager's fan-in channel.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use serenity::all::{Context, EventHandler, GatewayIntents, Message};
use serenity::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use chronicle_accounts::AccountRegistry;
use chronicle_channels::{ChannelError, ChannelStatus, MessengerClient, OutboundMessage, PairingOutcome};
use chronicle_core::config::MessengerBConfig;
use chronicle_core::{ChannelId, NormalizedMessage, SourceType, UserId};

use crate::error::connect_failed;
use crate::send;

pub struct DiscordClient {
    config: MessengerBConfig,
    registry: Arc<AccountRegistry>,
    sink: mpsc::Sender<NormalizedMessage>,
    http: StdMutex<Option<Arc<serenity::http::Http>>>,
    status: StdMutex<ChannelStatus>,
    gateway_task: StdMutex<Option<JoinHandle<()>>>,
}

impl DiscordClient {
    pub fn new(
        config: MessengerBConfig,
        registry: Arc<AccountRegistry>,
        sink: mpsc::Sender<NormalizedMessage>,
    ) -> Self {
        Self {
            config,
            registry,
            sink,
            http: StdMutex::new(None),
            status: StdMutex::new(ChannelStatus::Disconnected),
            gateway_task: StdMutex::new(None),
        }
    }
}

struct Handler {
    config: MessengerBConfig,
    registry: Arc<AccountRegistry>,
    sink: mpsc::Sender<NormalizedMessage>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let is_dm = msg.guild_id.is_none();
        if is_dm && !self.config.dm_allowed {
            return;
        }
        if !is_dm && self.config.require_mention {
            let bot_id = ctx.cache.current_user().id;
            if !msg.mentions.iter().any(|u| u.id == bot_id) {
                return;
            }
        }
        if msg.content.is_empty() {
            return;
        }

        let identifier = msg.channel_id.get().to_string();
        let channel = self
            .registry
            .resolve_channel(SourceType::MessengerB, &identifier)
            .ok()
            .flatten();
        let (user_id, source_id) = match channel {
            Some(ch) if ch.enabled => (ch.user_id, ch.id),
            _ => (UserId(0), ChannelId::untracked()),
        };

        let timestamp = chrono::DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now);

        let normalized = NormalizedMessage {
            user_id,
            source_type: SourceType::MessengerB,
            source_id,
            identifier,
            sender_id: msg.author.id.get().to_string(),
            sender_name: msg.author.name.clone(),
            text: msg.content.clone(),
            is_group: !is_dm,
            timestamp,
            calendar_id: None,
        };

        if let Err(e) = self.sink.try_send(normalized) {
            warn!(error = %e, "discord: fan-in channel full, message dropped");
        }
    }
}

#[async_trait]
impl MessengerClient for DiscordClient {
    fn name(&self) -> &str {
        "discord"
    }

    async fn connect(&mut self, _session: &[u8]) -> Result<(), ChannelError> {
        let handler = Handler {
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            sink: self.sink.clone(),
        };
        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;
        let mut client = Client::builder(&self.config.bot_token, intents)
            .event_handler(handler)
            .await
            .map_err(connect_failed)?;

        *self.http.lock().unwrap() = Some(Arc::clone(&client.http));
        let task = tokio::spawn(async move {
            if let Err(e) = client.start().await {
                warn!(error = %e, "discord: gateway connection ended");
            }
        });
        *self.gateway_task.lock().unwrap() = Some(task);
        *self.status.lock().unwrap() = ChannelStatus::Connected;
        Ok(())
    }

    async fn pair(&mut self) -> Result<PairingOutcome, ChannelError> {
        self.connect(&[]).await?;
        Ok(PairingOutcome::Complete(Vec::new()))
    }

    async fn verify(&mut self) -> Result<PairingOutcome, ChannelError> {
        Ok(PairingOutcome::Complete(Vec::new()))
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        if let Some(task) = self.gateway_task.lock().unwrap().take() {
            task.abort();
        }
        *self.http.lock().unwrap() = None;
        *self.status.lock().unwrap() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<String>, ChannelError> {
        Ok(Vec::new())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let http = self
            .http
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ChannelError::ConnectionFailed("discord client not connected".into()))?;
        let channel_id: u64 = msg
            .recipient_id
            .parse()
            .map_err(|_| ChannelError::SendFailed(format!("invalid channel id: {}", msg.recipient_id)))?;
        send::send_chunked(&http, serenity::model::id::ChannelId::new(channel_id), &msg.content)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn handle_update(
        &self,
        _raw: serde_json::Value,
        _sink: &mpsc::Sender<NormalizedMessage>,
    ) -> Result<(), ChannelError> {
        // Discord messages arrive over the persistent gateway connection
        // driven in `connect`, not as discrete webhook payloads; this
        // adapter has nothing to replay here.
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient").finish_non_exhaustive()
    }
}
