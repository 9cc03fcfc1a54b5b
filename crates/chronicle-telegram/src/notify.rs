//! Telegram-backed `"push"` notification transport (`§4.7`'s Open Question,
//! resolved in `DESIGN.md`): delivers a newly created proposal to whichever
//! Telegram chat is registered as the user's enabled `MessengerA` channel.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;

use chronicle_accounts::AccountRegistry;
use chronicle_core::{SourceType, UserId};
use chronicle_notify::{Notification, NotificationTransport, TransportError};

use crate::send;

pub struct TelegramPushTransport {
    registry: Arc<AccountRegistry>,
    bot: Bot,
}

impl TelegramPushTransport {
    pub fn new(registry: Arc<AccountRegistry>, bot_token: &str) -> Self {
        Self {
            registry,
            bot: Bot::new(bot_token),
        }
    }

    fn recipient(&self, user_id: UserId) -> Option<i64> {
        self.registry
            .list(user_id, Some(SourceType::MessengerA))
            .ok()?
            .into_iter()
            .find(|channel| channel.enabled)
            .and_then(|channel| channel.identifier.parse().ok())
    }
}

#[async_trait]
impl NotificationTransport for TelegramPushTransport {
    fn name(&self) -> &str {
        "push"
    }

    async fn send(&self, user_id: UserId, notification: &Notification) -> Result<(), TransportError> {
        let Some(chat_id) = self.recipient(user_id) else {
            return Ok(());
        };
        let text = format!(
            "{} proposal: {}\nwhen: {}\nreasoning: {}",
            notification.kind,
            notification.title,
            notification.when.to_rfc3339(),
            notification.reasoning,
        );
        send::send_response(&self.bot, ChatId(chat_id), &text).await;
        Ok(())
    }
}
