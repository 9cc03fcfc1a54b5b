//! Composition root: opens the shared database, builds every store and
//! adapter, and exposes `run` as the single long-running future `main`
//! drives to completion (or cancellation).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{error, info, warn};

use chronicle_accounts::AccountRegistry;
use chronicle_agent::{AgentRuntime, AnthropicProvider};
use chronicle_channels::{ClientFactory, ClientManager};
use chronicle_core::config::AppConfig;
use chronicle_core::{NormalizedMessage, NotificationDispatcher, SourceType};
use chronicle_discord::{DiscordClientFactory, DiscordPushTransport};
use chronicle_email::EmailClientFactory;
use chronicle_history::{EventProposalStore, HistoryStore, Persister, Processor, ReminderProposalStore};
use chronicle_intents::{EventModule, ReminderModule};
use chronicle_notify::{ChronicleNotificationDispatcher, EmailConfig as NotifyEmailConfig, EmailTransport, NotificationTransport};
use chronicle_sync::SyncManager;
use chronicle_telegram::{TelegramClientFactory, TelegramPushTransport};

const DISCONNECT_TIMEOUT_SECS: u64 = 5;

fn open_db(config: &AppConfig) -> anyhow::Result<Connection> {
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Connection::open(&config.database.path)?)
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}

/// Everything the binary needs to run: every long-lived component, wired
/// together once at startup per `§5`.
pub struct App {
    registry: Arc<AccountRegistry>,
    processor: Arc<Processor>,
    client_manager: Arc<ClientManager>,
    sync_manager: SyncManager,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl App {
    pub fn build(
        config: AppConfig,
    ) -> anyhow::Result<(Self, tokio::sync::mpsc::Receiver<NormalizedMessage>)> {
        // Table ownership order per §3.1: accounts → history → intents → sync.
        let accounts_conn = open_db(&config)?;
        chronicle_accounts::init_db(&accounts_conn)?;
        let registry = Arc::new(AccountRegistry::new(Arc::new(Mutex::new(accounts_conn))));

        let history_conn = open_db(&config)?;
        chronicle_history::init_db(&history_conn)?;
        let history = Arc::new(HistoryStore::new(history_conn, config.history.length));

        let persister_events_conn = open_db(&config)?;
        chronicle_history::init_db(&persister_events_conn)?;
        let persister_reminders_conn = open_db(&config)?;
        chronicle_history::init_db(&persister_reminders_conn)?;
        let persister = Arc::new(Persister::new(
            EventProposalStore::new(persister_events_conn),
            ReminderProposalStore::new(persister_reminders_conn),
        ));

        let sync_events_conn = open_db(&config)?;
        chronicle_history::init_db(&sync_events_conn)?;
        let sync_events = Arc::new(EventProposalStore::new(sync_events_conn));

        let provider = AnthropicProvider::new(config.agent.api_key.clone(), Some(config.agent.base_url.clone()));
        let runtime = Arc::new(AgentRuntime::new(
            Box::new(provider),
            config.agent.model_id.clone(),
            config.agent.max_turns,
        ));

        let modules: Vec<Arc<dyn chronicle_core::IntentModule>> = vec![
            Arc::new(EventModule::new(Arc::clone(&runtime))),
            Arc::new(ReminderModule::new(Arc::clone(&runtime))),
        ];

        let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(build_dispatcher(
            &config,
            Arc::clone(&registry),
            Arc::clone(&persister),
        )?);

        let processor = Arc::new(Processor::with_debug(
            history,
            persister,
            modules,
            dispatcher,
            config.debug.all_messages,
        ));

        let (sender, receiver) = ClientManager::channel(config.channels.capacity);
        let mut factories: HashMap<SourceType, Arc<dyn ClientFactory>> = HashMap::new();
        let mut session_bases: HashMap<SourceType, String> = HashMap::new();

        if let Some(messenger_a) = &config.messengers.messenger_a {
            session_bases.insert(SourceType::MessengerA, messenger_a.session_base_path.clone());
            factories.insert(
                SourceType::MessengerA,
                Arc::new(TelegramClientFactory::new(
                    messenger_a.clone(),
                    Arc::clone(&registry),
                    sender.clone(),
                )),
            );
        }
        if let Some(messenger_b) = &config.messengers.messenger_b {
            session_bases.insert(SourceType::MessengerB, messenger_b.session_base_path.clone());
            factories.insert(
                SourceType::MessengerB,
                Arc::new(DiscordClientFactory::new(
                    messenger_b.clone(),
                    Arc::clone(&registry),
                    sender.clone(),
                )),
            );
        }
        if let Some(imap) = &config.email.imap {
            session_bases.insert(SourceType::Email, format!("{}/.chronicle/session_email", home_dir()));
            factories.insert(
                SourceType::Email,
                Arc::new(EmailClientFactory::new(imap.clone(), Arc::clone(&registry), sender.clone())),
            );
        }

        let client_manager = Arc::new(ClientManager::with_sender(sender, factories, session_bases));

        let sync_manager = SyncManager::new(
            Arc::clone(&registry),
            sync_events,
            Duration::from_secs(config.sync.poll_interval_minutes * 60),
            Duration::from_secs(config.sync.initial_delay_seconds),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok((
            Self {
                registry,
                processor,
                client_manager,
                sync_manager,
                shutdown_tx,
                shutdown_rx,
            },
            receiver,
        ))
    }

    /// Restore every enabled channel's client from disk without starting
    /// the processor or sync workers. Returns the number of candidates
    /// considered, for the `restore-sessions` CLI subcommand.
    pub async fn restore_sessions_only(&self) -> anyhow::Result<usize> {
        let candidates = self.registry.list_all_enabled()?;
        let count = candidates.len();
        self.client_manager.restore_sessions(&candidates).await;
        Ok(count)
    }

    /// Restore every enabled channel's client from disk, spawn the
    /// processor and every sync worker, then block until the shutdown
    /// signal fires and unwind everything within the disconnect bound.
    pub async fn run(self, receiver: tokio::sync::mpsc::Receiver<NormalizedMessage>) -> anyhow::Result<()> {
        self.restore_sessions_only().await?;

        self.processor.start(receiver);
        let sync_handles = self.sync_manager.spawn_all(&self.shutdown_rx)?;
        info!(sync_workers = sync_handles.len(), "chronicle-gateway started");

        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }

        let _ = self.shutdown_tx.send(true);
        self.processor.stop().await;
        if tokio::time::timeout(Duration::from_secs(DISCONNECT_TIMEOUT_SECS), self.client_manager.shutdown())
            .await
            .is_err()
        {
            warn!("client manager shutdown exceeded disconnect timeout");
        }
        for handle in sync_handles {
            if let Err(e) = handle.await {
                error!(error = %e, "sync worker task panicked");
            }
        }

        Ok(())
    }
}

fn build_dispatcher(
    config: &AppConfig,
    registry: Arc<AccountRegistry>,
    persister: Arc<Persister>,
) -> anyhow::Result<ChronicleNotificationDispatcher> {
    let mut transports: Vec<Box<dyn NotificationTransport>> = Vec::new();

    if let Some(email) = &config.notify.email_transport {
        let transport = EmailTransport::new(
            Arc::clone(&registry),
            NotifyEmailConfig {
                smtp_host: email.smtp_host.clone(),
                smtp_port: email.smtp_port,
                username: email.smtp_username.clone(),
                password: email.smtp_password.clone(),
                from: email.from_address.clone(),
            },
        )
        .map_err(|e| anyhow::anyhow!("failed to build email transport: {e}"))?;
        transports.push(Box::new(transport));
    }
    if let Some(messenger_a) = &config.messengers.messenger_a {
        transports.push(Box::new(TelegramPushTransport::new(Arc::clone(&registry), &messenger_a.bot_token)));
    }
    if let Some(messenger_b) = &config.messengers.messenger_b {
        transports.push(Box::new(DiscordPushTransport::new(Arc::clone(&registry), &messenger_b.bot_token)));
    }

    Ok(ChronicleNotificationDispatcher::new(registry, persister, transports))
}
