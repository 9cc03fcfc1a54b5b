//! Spawns one [`CalendarSyncWorker`] per syncable user, cancelled together
//! with every other long-running task via a shared `watch::Receiver<bool>`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use chronicle_accounts::AccountRegistry;
use chronicle_history::EventProposalStore;

use crate::error::Result;
use crate::worker::CalendarSyncWorker;

pub struct SyncManager {
    registry: Arc<AccountRegistry>,
    events: Arc<EventProposalStore>,
    poll_interval: Duration,
    initial_delay: Duration,
}

impl SyncManager {
    pub fn new(
        registry: Arc<AccountRegistry>,
        events: Arc<EventProposalStore>,
        poll_interval: Duration,
        initial_delay: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            poll_interval,
            initial_delay,
        }
    }

    /// Spawn a worker task for every user with sync enabled and OAuth on
    /// file, each holding its own clone of `shutdown`.
    pub fn spawn_all(&self, shutdown: &watch::Receiver<bool>) -> Result<Vec<JoinHandle<()>>> {
        let users = self.registry.list_syncable_users()?;
        let handles = users
            .into_iter()
            .map(|user_id| {
                let worker = CalendarSyncWorker::new(
                    user_id,
                    self.registry.clone(),
                    self.events.clone(),
                    self.poll_interval,
                    self.initial_delay,
                );
                tokio::spawn(worker.run(shutdown.clone()))
            })
            .collect();
        Ok(handles)
    }
}
