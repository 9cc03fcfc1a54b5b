//! Email `MessengerClient`: polls one IMAP mailbox on an interval and
//! normalizes unseen messages into `NormalizedMessage`s on the client
//! manager's fan-in channel. Outbound delivery is not implemented here —
//! see `chronicle-notify::EmailTransport` for the SMTP side of `§4.7`.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use mail_parser::MessageParser;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::{self, pki_types::ServerName};
use tokio_rustls::TlsConnector;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::warn;

use chronicle_accounts::AccountRegistry;
use chronicle_channels::{ChannelError, ChannelStatus, MessengerClient, OutboundMessage, PairingOutcome};
use chronicle_core::config::ImapConfig;
use chronicle_core::{ChannelId, NormalizedMessage, SourceType, UserId};

use crate::error::connect_failed;

pub struct EmailClient {
    config: ImapConfig,
    registry: Arc<AccountRegistry>,
    sink: mpsc::Sender<NormalizedMessage>,
    status: StdMutex<ChannelStatus>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
}

impl EmailClient {
    pub fn new(
        config: ImapConfig,
        registry: Arc<AccountRegistry>,
        sink: mpsc::Sender<NormalizedMessage>,
    ) -> Self {
        Self {
            config,
            registry,
            sink,
            status: StdMutex::new(ChannelStatus::Disconnected),
            poll_task: StdMutex::new(None),
        }
    }

    fn spawn_polling(&self) {
        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_seconds));
            loop {
                ticker.tick().await;
                if let Err(e) = poll_once(&config, &registry, &sink).await {
                    warn!(error = %e, "email: poll failed");
                }
            }
        });
        *self.poll_task.lock().unwrap() = Some(task);
    }
}

fn tls_connector() -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn open_session(
    config: &ImapConfig,
) -> Result<async_imap::Session<tokio_util::compat::Compat<tokio_rustls::client::TlsStream<TcpStream>>>, ChannelError> {
    let tcp = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .map_err(connect_failed)?;
    let server_name = ServerName::try_from(config.host.clone()).map_err(connect_failed)?;
    let tls = tls_connector()
        .connect(server_name, tcp)
        .await
        .map_err(connect_failed)?;
    let client = async_imap::Client::new(tls.compat());
    let session = client
        .login(&config.username, &config.password)
        .await
        .map_err(|(e, _)| connect_failed(e))?;
    Ok(session)
}

/// One poll cycle: log in, search the configured mailbox for unseen
/// messages, normalize each, and log out. Fetching `RFC822` marks a message
/// `\Seen` per the IMAP protocol, so no explicit `STORE` is needed to avoid
/// re-processing it on the next tick.
async fn poll_once(
    config: &ImapConfig,
    registry: &AccountRegistry,
    sink: &mpsc::Sender<NormalizedMessage>,
) -> Result<(), ChannelError> {
    let mut session = open_session(config).await?;
    session
        .select(&config.mailbox)
        .await
        .map_err(connect_failed)?;

    let uids = session.uid_search("UNSEEN").await.map_err(connect_failed)?;
    if uids.is_empty() {
        let _ = session.logout().await;
        return Ok(());
    }

    let set = uids
        .iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let mut stream = session.uid_fetch(&set, "RFC822").await.map_err(connect_failed)?;
    while let Some(fetch) = stream.next().await {
        let fetch = match fetch {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "email: fetch failed");
                continue;
            }
        };
        if let Some(raw) = fetch.body() {
            if let Some(normalized) = normalize_body(raw, registry) {
                if let Err(e) = sink.try_send(normalized) {
                    warn!(error = %e, "email: fan-in channel full, message dropped");
                }
            }
        }
    }
    drop(stream);
    let _ = session.logout().await;
    Ok(())
}

fn normalize_body(raw: &[u8], registry: &AccountRegistry) -> Option<NormalizedMessage> {
    let message = MessageParser::default().parse(raw)?;

    let from = message.from()?.first()?;
    let sender_id = from.address()?.to_string();
    let sender_name = from.name().map(|n| n.to_string()).unwrap_or_else(|| sender_id.clone());

    let mut text = message.body_text(0).map(|b| b.to_string()).unwrap_or_default();
    if let Some(subject) = message.subject() {
        text = format!("{subject}\n\n{text}");
    }
    if text.trim().is_empty() {
        return None;
    }

    let timestamp = message
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(chrono::Utc::now);

    let channel = registry
        .resolve_channel(SourceType::Email, &sender_id)
        .ok()
        .flatten();
    let (user_id, source_id) = match channel {
        Some(ch) if ch.enabled => (ch.user_id, ch.id),
        _ => (UserId(0), ChannelId::untracked()),
    };

    Some(NormalizedMessage {
        user_id,
        source_type: SourceType::Email,
        source_id,
        identifier: sender_id.clone(),
        sender_id,
        sender_name,
        text,
        is_group: false,
        timestamp,
        calendar_id: None,
    })
}

#[async_trait]
impl MessengerClient for EmailClient {
    fn name(&self) -> &str {
        "email"
    }

    async fn connect(&mut self, _session: &[u8]) -> Result<(), ChannelError> {
        // Verify the configured credentials work once up front, then hand
        // off to the interval poller for ongoing ingestion.
        let mut session = open_session(&self.config).await?;
        let _ = session.logout().await;
        self.spawn_polling();
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
        if let Some(task) = self.poll_task.lock().unwrap().take() {
            task.abort();
        }
        *self.status.lock().unwrap() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<String>, ChannelError> {
        Ok(Vec::new())
    }

    async fn send(&self, _msg: &OutboundMessage) -> Result<(), ChannelError> {
        Err(ChannelError::SendFailed(
            "email is ingress-only; outbound delivery goes through the notify transport".into(),
        ))
    }

    async fn handle_update(
        &self,
        _raw: serde_json::Value,
        _sink: &mpsc::Sender<NormalizedMessage>,
    ) -> Result<(), ChannelError> {
        // Mail arrives only through the polling loop started in `connect`;
        // there is no webhook payload to replay here.
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for EmailClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chronicle_accounts::SourceChannel;
    use chronicle_core::{ChannelId, ChannelType};
    use rusqlite::Connection;

    use super::*;

    fn test_registry() -> AccountRegistry {
        let conn = Connection::open_in_memory().unwrap();
        chronicle_accounts::init_db(&conn).unwrap();
        conn.execute("INSERT INTO users (id, created_at) VALUES (1, '2026-01-01T00:00:00Z')", [])
            .unwrap();
        AccountRegistry::new(Arc::new(Mutex::new(conn)))
    }

    const RAW: &[u8] = b"From: Alice <alice@example.com>\r\n\
Subject: Dinner tomorrow\r\n\
Date: Thu, 9 Feb 2026 10:00:00 +0000\r\n\
Content-Type: text/plain\r\n\
\r\n\
Let's grab dinner tomorrow at 7pm.\r\n";

    #[test]
    fn normalizes_subject_and_body_into_text() {
        let registry = test_registry();
        let msg = normalize_body(RAW, &registry).expect("should parse");
        assert!(msg.text.starts_with("Dinner tomorrow"));
        assert!(msg.text.contains("dinner tomorrow at 7pm"));
        assert_eq!(msg.sender_id, "alice@example.com");
        assert_eq!(msg.sender_name, "Alice");
        assert!(!msg.is_group);
        assert!(msg.calendar_id.is_none());
    }

    #[test]
    fn unresolved_sender_falls_back_to_untracked() {
        let registry = test_registry();
        let msg = normalize_body(RAW, &registry).expect("should parse");
        assert_eq!(msg.user_id, UserId(0));
        assert_eq!(msg.source_id, ChannelId::untracked());
    }

    #[test]
    fn resolved_sender_uses_owning_channel() {
        let registry = test_registry();
        registry
            .create(&SourceChannel {
                id: ChannelId(0),
                user_id: UserId(1),
                source_type: SourceType::Email,
                channel_type: ChannelType::Sender,
                identifier: "alice@example.com".into(),
                name: "Alice".into(),
                enabled: true,
                calendar_id: None,
            })
            .unwrap();

        let msg = normalize_body(RAW, &registry).expect("should parse");
        assert_eq!(msg.user_id, UserId(1));
        assert_ne!(msg.source_id, ChannelId::untracked());
    }

    #[test]
    fn empty_body_and_subject_yields_none() {
        let registry = test_registry();
        let raw = b"From: Bob <bob@example.com>\r\nContent-Type: text/plain\r\n\r\n   \r\n";
        assert!(normalize_body(raw, &registry).is_none());
    }
}
