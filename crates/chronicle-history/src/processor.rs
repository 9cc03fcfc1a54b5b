use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{error, instrument, warn};

use chronicle_core::{
    ActionType, ChannelId, ChannelMessage, IntentModule, ModuleInput, ModuleOutput,
    NormalizedMessage, NotificationDispatcher, Priority, UserId,
};

use crate::events::NewEventProposal;
use crate::history::HistoryStore;
use crate::persister::{PersistOutcome, Persister};
use crate::reminders::NewReminderProposal;

const WORKER_COUNT: usize = 8;
const WORKER_QUEUE_CAPACITY: usize = 256;

/// Turns inbound messages into persisted proposals by running every
/// registered `IntentModule` in order, validating its output, and handing
/// valid ones to the `Persister`.
pub struct Processor {
    history: Arc<HistoryStore>,
    persister: Arc<Persister>,
    modules: Vec<Arc<dyn IntentModule>>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    module_errors: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    consumer: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    workers: std::sync::Mutex<Vec<WorkerHandle>>,
    /// Bypasses the tracked-channel filter in `process_one` when set
    /// (`debug.all_messages`); untracked messages are bucketed under
    /// `ChannelId::untracked()` instead of being dropped.
    debug_all_messages: bool,
}

struct WorkerHandle {
    tx: mpsc::Sender<NormalizedMessage>,
    task: tokio::task::JoinHandle<()>,
}

impl Processor {
    pub fn new(
        history: Arc<HistoryStore>,
        persister: Arc<Persister>,
        modules: Vec<Arc<dyn IntentModule>>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self::with_debug(history, persister, modules, dispatcher, false)
    }

    pub fn with_debug(
        history: Arc<HistoryStore>,
        persister: Arc<Persister>,
        modules: Vec<Arc<dyn IntentModule>>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        debug_all_messages: bool,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            history,
            persister,
            modules,
            dispatcher,
            module_errors: AtomicU64::new(0),
            shutdown_tx,
            shutdown_rx,
            consumer: std::sync::Mutex::new(None),
            workers: std::sync::Mutex::new(Vec::new()),
            debug_all_messages,
        }
    }

    pub fn module_error_count(&self) -> u64 {
        self.module_errors.load(Ordering::Relaxed)
    }

    /// Spawn the fan-in consumer plus a fixed worker pool. Messages for the
    /// same `(UserID, SourceType, Identifier)` always land on the same
    /// worker, so per-triple order is preserved while cross-channel work
    /// runs concurrently.
    pub fn start(self: &Arc<Self>, mut rx: mpsc::Receiver<NormalizedMessage>) {
        let mut workers = self.workers.lock().unwrap();
        for _ in 0..WORKER_COUNT {
            let (tx, mut worker_rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);
            let this = Arc::clone(self);
            let mut shutdown = self.shutdown_rx.clone();
            let task = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(msg) = worker_rx.recv() => {
                            this.process_one(msg).await;
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                        else => break,
                    }
                }
            });
            workers.push(WorkerHandle { tx, task });
        }
        let worker_count = workers.len();
        drop(workers);

        let this = Arc::clone(self);
        let mut shutdown = self.shutdown_rx.clone();
        let consumer_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(msg) = rx.recv() => {
                        let idx = this.worker_index(&msg, worker_count);
                        let workers = this.workers.lock().unwrap();
                        let tx = workers[idx].tx.clone();
                        drop(workers);
                        if tx.send(msg).await.is_err() {
                            warn!("processor worker channel closed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        });
        *self.consumer.lock().unwrap() = Some(consumer_task);
    }

    /// Idempotent. Flips the shutdown watch, then joins the consumer and
    /// every worker task.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.consumer.lock().unwrap().take() {
            let _ = task.await;
        }
        let workers: Vec<WorkerHandle> = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in workers {
            let _ = handle.task.await;
        }
    }

    fn worker_index(&self, msg: &NormalizedMessage, worker_count: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        msg.user_id.get().hash(&mut hasher);
        msg.source_type.as_str().hash(&mut hasher);
        msg.identifier.hash(&mut hasher);
        (hasher.finish() as usize) % worker_count
    }

    #[instrument(skip(self, msg), fields(user_id = msg.user_id.get(), channel_id = msg.source_id.get()))]
    async fn process_one(&self, msg: NormalizedMessage) {
        if !msg.source_id.is_tracked() && !self.debug_all_messages {
            return;
        }
        let channel_id = msg.source_id;
        let history_size = self.history.history_size();

        let mut history = match self.history.get_history(channel_id, history_size) {
            Ok(h) => h,
            Err(e) => {
                error!(error = %e, "failed to load history");
                return;
            }
        };

        if let Err(e) = self.history.insert(
            channel_id,
            &msg.sender_id,
            &msg.sender_name,
            &msg.text,
            msg.timestamp,
        ) {
            error!(error = %e, "failed to persist message");
            return;
        }

        history.push(ChannelMessage {
            id: 0,
            channel_id,
            sender_id: msg.sender_id.clone(),
            sender_name: msg.sender_name.clone(),
            text: msg.text.clone(),
            timestamp: msg.timestamp,
        });

        for module in &self.modules {
            let open_proposals = self.open_proposals_json(channel_id, module.kind());
            let input = ModuleInput {
                history: history.clone(),
                current: msg.clone(),
                open_proposals,
            };
            let output = match module.run(input).await {
                Ok(out) => out,
                Err(e) => {
                    self.module_errors.fetch_add(1, Ordering::Relaxed);
                    error!(module = module.kind(), error = %e, "intent module failed");
                    continue;
                }
            };
            self.apply_output(module.kind(), &msg, channel_id, output).await;
        }
    }

    fn open_proposals_json(&self, channel_id: ChannelId, kind: &str) -> Vec<serde_json::Value> {
        match kind {
            "event" => self
                .persister
                .events()
                .list(Some(channel_id), Some(chronicle_core::ProposalStatus::Pending))
                .unwrap_or_default()
                .into_iter()
                .map(|ev| serde_json::json!({"id": ev.id, "title": ev.title, "start_time": ev.start_time}))
                .collect(),
            "reminder" => self
                .persister
                .reminders()
                .list(Some(channel_id), Some(chronicle_core::ProposalStatus::Pending))
                .unwrap_or_default()
                .into_iter()
                .map(|r| serde_json::json!({"id": r.id, "title": r.title, "due_date": r.due_date}))
                .collect(),
            _ => Vec::new(),
        }
    }

    async fn apply_output(&self, kind: &str, msg: &NormalizedMessage, channel_id: ChannelId, output: ModuleOutput) {
        let action: ActionType = match output.action.parse() {
            Ok(a) => a,
            Err(_) => return,
        };
        if output.reasoning.trim().is_empty() {
            warn!(module = kind, "empty reasoning, skipping output");
            return;
        }

        let target_id = output.payload.get("target_id").and_then(|v| v.as_i64());

        let outcome = match kind {
            "event" => {
                let fields = match parse_event_fields(&output.payload, msg.user_id, channel_id) {
                    Some(f) => f,
                    None => {
                        warn!(module = kind, "malformed event payload, skipping");
                        return;
                    }
                };
                self.persister.persist_event(action, fields, target_id)
            }
            "reminder" => {
                let fields = match parse_reminder_fields(&output.payload, msg.user_id, channel_id) {
                    Some(f) => f,
                    None => {
                        warn!(module = kind, "malformed reminder payload, skipping");
                        return;
                    }
                };
                self.persister.persist_reminder(action, fields, target_id)
            }
            _ => return,
        };

        match outcome {
            Ok(PersistOutcome::Created(id)) => {
                self.dispatcher.dispatch(msg.user_id, kind, id).await;
            }
            Ok(PersistOutcome::Updated(_)) => {}
            Err(e) => {
                self.module_errors.fetch_add(1, Ordering::Relaxed);
                error!(module = kind, error = %e, "failed to persist module output");
            }
        }
    }
}

fn parse_event_fields(payload: &serde_json::Value, user_id: UserId, channel_id: ChannelId) -> Option<NewEventProposal> {
    let title = payload.get("title")?.as_str()?.to_string();
    let start_time = parse_timestamp(payload.get("start_time")?.as_str()?)?;
    Some(NewEventProposal {
        user_id: user_id.get(),
        channel_id,
        title,
        description: payload.get("description").and_then(|v| v.as_str()).map(str::to_string),
        action_type: ActionType::Create,
        llm_reasoning: payload.get("reasoning").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        start_time,
        end_time: payload
            .get("end_time")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp),
        location: payload.get("location").and_then(|v| v.as_str()).map(str::to_string),
        attendees: Vec::new(),
        calendar_id: payload.get("calendar_id").and_then(|v| v.as_str()).map(str::to_string),
    })
}

fn parse_reminder_fields(payload: &serde_json::Value, user_id: UserId, channel_id: ChannelId) -> Option<NewReminderProposal> {
    let title = payload.get("title")?.as_str()?.to_string();
    let due_date = parse_timestamp(payload.get("due_date")?.as_str()?)?;
    let priority = payload
        .get("priority")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(Priority::Normal);
    Some(NewReminderProposal {
        user_id: user_id.get(),
        channel_id,
        title,
        description: payload.get("description").and_then(|v| v.as_str()).map(str::to_string),
        action_type: ActionType::Create,
        llm_reasoning: payload.get("reasoning").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        due_date,
        notify_at: payload
            .get("notify_at")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp),
        priority,
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventProposalStore;
    use crate::reminders::ReminderProposalStore;
    use async_trait::async_trait;
    use chronicle_core::SourceType;
    use rusqlite::Connection;
    use std::sync::atomic::AtomicUsize;

    struct EchoEventModule;

    #[async_trait]
    impl IntentModule for EchoEventModule {
        fn kind(&self) -> &'static str {
            "event"
        }

        async fn run(&self, input: ModuleInput) -> Result<ModuleOutput, String> {
            Ok(ModuleOutput {
                action: "create".to_string(),
                payload: serde_json::json!({
                    "title": input.current.text,
                    "start_time": input.current.timestamp.to_rfc3339(),
                }),
                reasoning: "message mentions a plan".to_string(),
            })
        }
    }

    struct CountingDispatcher {
        count: AtomicUsize,
    }

    #[async_trait]
    impl NotificationDispatcher for CountingDispatcher {
        async fn dispatch(&self, _user_id: UserId, _kind: &str, _proposal_id: i64) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn make_processor() -> (Arc<Processor>, Arc<CountingDispatcher>) {
        let history_conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&history_conn).unwrap();
        let history = Arc::new(HistoryStore::new(history_conn, 25));

        let event_conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&event_conn).unwrap();
        let reminder_conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&reminder_conn).unwrap();
        let persister = Arc::new(Persister::new(
            EventProposalStore::new(event_conn),
            ReminderProposalStore::new(reminder_conn),
        ));

        let dispatcher = Arc::new(CountingDispatcher {
            count: AtomicUsize::new(0),
        });
        let modules: Vec<Arc<dyn IntentModule>> = vec![Arc::new(EchoEventModule)];
        let processor = Arc::new(Processor::new(history, persister, modules, dispatcher.clone()));
        (processor, dispatcher)
    }

    fn sample_message() -> NormalizedMessage {
        NormalizedMessage {
            user_id: UserId(1),
            source_type: SourceType::MessengerA,
            source_id: ChannelId(1),
            identifier: "chat-1".to_string(),
            sender_id: "u1".to_string(),
            sender_name: "Alice".to_string(),
            text: "lunch tomorrow".to_string(),
            is_group: false,
            timestamp: Utc::now(),
            calendar_id: None,
        }
    }

    #[tokio::test]
    async fn untracked_message_is_dropped_without_side_effects() {
        let (processor, dispatcher) = make_processor();
        let mut msg = sample_message();
        msg.source_id = ChannelId::untracked();
        processor.process_one(msg).await;
        assert_eq!(dispatcher.count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn tracked_message_creates_proposal_and_notifies() {
        let (processor, dispatcher) = make_processor();
        processor.process_one(sample_message()).await;
        assert_eq!(dispatcher.count.load(Ordering::Relaxed), 1);
        let events = processor.persister.events().list(Some(ChannelId(1)), None).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn start_then_stop_joins_cleanly() {
        let (processor, _dispatcher) = make_processor();
        let (tx, rx) = mpsc::channel(8);
        processor.start(rx);
        tx.send(sample_message()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        processor.stop().await;
    }
}
