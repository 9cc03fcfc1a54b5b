use std::sync::Arc;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use chronicle_accounts::AccountRegistry;
use chronicle_core::{SourceType, UserId};

use crate::transport::{Notification, NotificationTransport, TransportError};

pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Delivers proposal notifications by SMTP, to whichever enabled `Email`
/// channel is registered for the recipient.
pub struct EmailTransport {
    registry: Arc<AccountRegistry>,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl EmailTransport {
    pub fn new(registry: Arc<AccountRegistry>, config: EmailConfig) -> Result<Self, TransportError> {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| TransportError::Unavailable(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(config.username, config.password))
            .build();
        Ok(Self {
            registry,
            mailer,
            from: config.from,
        })
    }

    fn recipient(&self, user_id: UserId) -> Option<String> {
        self.registry
            .list(user_id, Some(SourceType::Email))
            .ok()?
            .into_iter()
            .find(|channel| channel.enabled)
            .map(|channel| channel.identifier)
    }
}

#[async_trait]
impl NotificationTransport for EmailTransport {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, user_id: UserId, notification: &Notification) -> Result<(), TransportError> {
        let Some(to) = self.recipient(user_id) else {
            warn!(user = %user_id, "no email channel configured, skipping notification");
            return Ok(());
        };

        let email = Message::builder()
            .from(self.from.parse().map_err(|e| TransportError::Send(format!("{e}")))?)
            .to(to.parse().map_err(|e| TransportError::Send(format!("{e}")))?)
            .subject(format!("{} proposal: {}", notification.kind, notification.title))
            .body(format!(
                "{}\n\nwhen: {}\nreasoning: {}\n",
                notification.title,
                notification.when.to_rfc3339(),
                notification.reasoning,
            ))
            .map_err(|e| TransportError::Send(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        debug!(user = %user_id, proposal_id = notification.proposal_id, "notification email sent");
        Ok(())
    }
}
