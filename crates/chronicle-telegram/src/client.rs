//! Telegram `MessengerClient`: wraps a long-polling `teloxide::Bot` and
//! normalizes every accepted update into a `NormalizedMessage` on the
//! client manager's fan-in channel.

use std::sync::{Arc, Mutex as StdMutex};

use futures_util::StreamExt;
use teloxide::dispatching::update_listeners::{polling_default, UpdateListener};
use teloxide::prelude::*;
use teloxide::types::Update;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use chronicle_channels::{ChannelError, ChannelStatus, MessengerClient, OutboundMessage, PairingOutcome};
use chronicle_core::config::MessengerAConfig;
use chronicle_core::{NormalizedMessage, SourceType, UserId};

use chronicle_accounts::AccountRegistry;

use crate::allow;
use crate::error::connect_failed;
use crate::send;

/// One Telegram client per user, per `§4.1`. In practice every user of a
/// single deployment shares the same bot token, so each client wraps a
/// clone of the same cheaply-cloneable `Bot`; the manager's per-user
/// container still gives each user its own polling task and lifecycle.
pub struct TelegramClient {
    bot: Bot,
    config: MessengerAConfig,
    registry: Arc<AccountRegistry>,
    sink: mpsc::Sender<NormalizedMessage>,
    status: StdMutex<ChannelStatus>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
}

impl TelegramClient {
    pub fn new(
        config: MessengerAConfig,
        registry: Arc<AccountRegistry>,
        sink: mpsc::Sender<NormalizedMessage>,
    ) -> Self {
        Self {
            bot: Bot::new(&config.bot_token),
            config,
            registry,
            sink,
            status: StdMutex::new(ChannelStatus::Disconnected),
            poll_task: StdMutex::new(None),
        }
    }

    fn spawn_polling(&self) {
        let bot = self.bot.clone();
        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            let listener = polling_default(bot).await;
            let mut stream = listener.into_stream();
            while let Some(update) = stream.next().await {
                match update {
                    Ok(update) => {
                        if let Some(msg) = normalize_update(&update, &config, &registry) {
                            if let Err(e) = sink.try_send(msg) {
                                warn!(error = %e, "telegram: fan-in channel full, message dropped");
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "telegram: polling error"),
                }
            }
            info!("telegram: polling stream ended");
        });
        *self.poll_task.lock().unwrap() = Some(task);
    }
}

/// Normalize a raw `Update` into a `NormalizedMessage`, applying the
/// allowlist and DM/group guards. Returns `None` for anything that should
/// be silently ignored (bot senders, disallowed users, non-message updates,
/// empty text).
fn normalize_update(
    update: &Update,
    config: &MessengerAConfig,
    registry: &AccountRegistry,
) -> Option<NormalizedMessage> {
    let msg = match &update.kind {
        teloxide::types::UpdateKind::Message(msg) => msg,
        _ => return None,
    };
    let from = msg.from.as_ref()?;
    if from.is_bot {
        return None;
    }

    let username = from.username.as_deref().unwrap_or("");
    let telegram_user_id = from.id.0.to_string();
    if !allow::is_allowed(&config.allow_users, username, &telegram_user_id) {
        return None;
    }
    if msg.chat.is_private() && !config.dm_allowed {
        return None;
    }

    let text = msg.text().or_else(|| msg.caption()).unwrap_or("").to_string();
    if text.is_empty() {
        return None;
    }

    let identifier = msg.chat.id.0.to_string();
    let channel = registry
        .resolve_channel(SourceType::MessengerA, &identifier)
        .ok()
        .flatten();
    let (user_id, source_id, is_group) = match channel {
        Some(ch) if ch.enabled => (ch.user_id, ch.id, !msg.chat.is_private()),
        _ => (UserId(0), chronicle_core::ChannelId::untracked(), !msg.chat.is_private()),
    };

    Some(NormalizedMessage {
        user_id,
        source_type: SourceType::MessengerA,
        source_id,
        identifier,
        sender_id: telegram_user_id,
        sender_name: from.full_name(),
        text,
        is_group,
        timestamp: msg.date,
        calendar_id: None,
    })
}

#[async_trait::async_trait]
impl MessengerClient for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn connect(&mut self, _session: &[u8]) -> Result<(), ChannelError> {
        self.bot.get_me().await.map_err(connect_failed)?;
        self.spawn_polling();
        *self.status.lock().unwrap() = ChannelStatus::Connected;
        Ok(())
    }

    async fn pair(&mut self) -> Result<PairingOutcome, ChannelError> {
        // A bot token is configured up front; there is no interactive
        // pairing flow distinct from `connect`.
        self.connect(&[]).await?;
        Ok(PairingOutcome::Complete(Vec::new()))
    }

    async fn verify(&mut self) -> Result<PairingOutcome, ChannelError> {
        Ok(PairingOutcome::Complete(Vec::new()))
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        if let Some(task) = self.poll_task.lock().unwrap().take() {
            task.abort();
        }
        *self.status.lock().unwrap() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<String>, ChannelError> {
        // The Bot API has no "list chats" endpoint; chats only become known
        // once a message arrives from them.
        Ok(Vec::new())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let chat_id: i64 = msg
            .recipient_id
            .parse()
            .map_err(|_| ChannelError::SendFailed(format!("invalid chat id: {}", msg.recipient_id)))?;
        send::send_response(&self.bot, ChatId(chat_id), &msg.content).await;
        Ok(())
    }

    async fn handle_update(
        &self,
        raw: serde_json::Value,
        sink: &mpsc::Sender<NormalizedMessage>,
    ) -> Result<(), ChannelError> {
        let update: Update = serde_json::from_value(raw)
            .map_err(|e| ChannelError::ConnectionFailed(format!("malformed update: {e}")))?;
        if let Some(normalized) = normalize_update(&update, &self.config, &self.registry) {
            sink.try_send(normalized)
                .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}
