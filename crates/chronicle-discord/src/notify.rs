//! Discord-backed `"push"` notification transport (`§4.7`'s Open Question,
//! resolved in `DESIGN.md`): delivers a newly created proposal to whichever
//! Discord channel is registered as the user's enabled `MessengerB` channel.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::ChannelId;

use chronicle_accounts::AccountRegistry;
use chronicle_core::{SourceType, UserId};
use chronicle_notify::{Notification, NotificationTransport, TransportError};

use crate::send;

pub struct DiscordPushTransport {
    registry: Arc<AccountRegistry>,
    http: Http,
}

impl DiscordPushTransport {
    pub fn new(registry: Arc<AccountRegistry>, bot_token: &str) -> Self {
        Self {
            registry,
            http: Http::new(bot_token),
        }
    }

    fn recipient(&self, user_id: UserId) -> Option<u64> {
        self.registry
            .list(user_id, Some(SourceType::MessengerB))
            .ok()?
            .into_iter()
            .find(|channel| channel.enabled)
            .and_then(|channel| channel.identifier.parse().ok())
    }
}

#[async_trait]
impl NotificationTransport for DiscordPushTransport {
    fn name(&self) -> &str {
        "push"
    }

    async fn send(&self, user_id: UserId, notification: &Notification) -> Result<(), TransportError> {
        let Some(channel_id) = self.recipient(user_id) else {
            return Ok(());
        };
        let text = format!(
            "{} proposal: {}\nwhen: {}\nreasoning: {}",
            notification.kind,
            notification.title,
            notification.when.to_rfc3339(),
            notification.reasoning,
        );
        send::send_chunked(&self.http, ChannelId::new(channel_id), &text)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
