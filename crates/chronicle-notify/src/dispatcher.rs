use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::{error, warn};

use chronicle_accounts::AccountRegistry;
use chronicle_core::{NotificationDispatcher, UserId};
use chronicle_history::Persister;

use crate::transport::{Notification, NotificationTransport};

/// Fans a freshly created proposal out to every transport the user has
/// enabled. One transport erroring, or panicking, never skips the others.
pub struct ChronicleNotificationDispatcher {
    registry: Arc<AccountRegistry>,
    persister: Arc<Persister>,
    transports: Vec<Box<dyn NotificationTransport>>,
}

impl ChronicleNotificationDispatcher {
    pub fn new(
        registry: Arc<AccountRegistry>,
        persister: Arc<Persister>,
        transports: Vec<Box<dyn NotificationTransport>>,
    ) -> Self {
        Self {
            registry,
            persister,
            transports,
        }
    }

    fn build_notification(&self, kind: &str, proposal_id: i64) -> Option<Notification> {
        match kind {
            "event" => self
                .persister
                .events()
                .get_by_id(proposal_id)
                .ok()
                .flatten()
                .map(|ev| Notification {
                    kind: "event",
                    proposal_id,
                    title: ev.title,
                    when: ev.start_time,
                    reasoning: ev.llm_reasoning,
                }),
            "reminder" => self
                .persister
                .reminders()
                .get_by_id(proposal_id)
                .ok()
                .flatten()
                .map(|r| Notification {
                    kind: "reminder",
                    proposal_id,
                    title: r.title,
                    when: r.due_date,
                    reasoning: r.llm_reasoning,
                }),
            _ => None,
        }
    }

    fn transport_enabled(&self, transport: &dyn NotificationTransport, email_enabled: bool, push_enabled: bool) -> bool {
        match transport.name() {
            "email" => email_enabled,
            "push" => push_enabled,
            _ => false,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for ChronicleNotificationDispatcher {
    async fn dispatch(&self, user_id: UserId, kind: &str, proposal_id: i64) {
        let Some(notification) = self.build_notification(kind, proposal_id) else {
            warn!(kind, proposal_id, "no proposal found for notification, skipping");
            return;
        };

        let prefs = match self.registry.notification_prefs(user_id) {
            Ok(p) => p,
            Err(e) => {
                error!(user = %user_id, error = %e, "failed to load notification preferences");
                return;
            }
        };

        for transport in &self.transports {
            if !self.transport_enabled(transport.as_ref(), prefs.email_enabled, prefs.push_enabled) {
                continue;
            }

            match AssertUnwindSafe(transport.send(user_id, &notification)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(user = %user_id, transport = transport.name(), error = %e, "notification transport failed");
                }
                Err(_) => {
                    error!(user = %user_id, transport = transport.name(), "notification transport panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::Utc;
    use chronicle_core::ChannelId;
    use chronicle_history::{EventProposalStore, NewEventProposal, ReminderProposalStore};
    use rusqlite::Connection;

    use crate::transport::TransportError;

    struct CountingTransport {
        label: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NotificationTransport for CountingTransport {
        fn name(&self) -> &str {
            self.label
        }

        async fn send(&self, _user_id: UserId, _notification: &Notification) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_registry() -> Arc<AccountRegistry> {
        let conn = Connection::open_in_memory().unwrap();
        chronicle_accounts::init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (id, created_at) VALUES (1, ?1)",
            rusqlite::params![Utc::now().to_rfc3339()],
        )
        .unwrap();
        Arc::new(AccountRegistry::new(Arc::new(Mutex::new(conn))))
    }

    fn test_persister() -> Arc<Persister> {
        let events_conn = Connection::open_in_memory().unwrap();
        chronicle_history::init_db(&events_conn).unwrap();
        let reminders_conn = Connection::open_in_memory().unwrap();
        chronicle_history::init_db(&reminders_conn).unwrap();
        Arc::new(Persister::new(
            EventProposalStore::new(events_conn),
            ReminderProposalStore::new(reminders_conn),
        ))
    }

    #[tokio::test]
    async fn dispatch_only_calls_enabled_transports() {
        let registry = test_registry();
        registry.set_notification_prefs(UserId(1), true, false).unwrap();
        let persister = test_persister();
        let proposal_id = persister
            .events()
            .create_pending(&NewEventProposal {
                user_id: 1,
                channel_id: ChannelId(1),
                title: "Dentist".into(),
                description: None,
                action_type: chronicle_core::ActionType::Create,
                llm_reasoning: "mentioned appointment".into(),
                start_time: Utc::now(),
                end_time: None,
                location: None,
                attendees: vec![],
                calendar_id: None,
            })
            .unwrap();

        let email_calls = Arc::new(AtomicUsize::new(0));
        let push_calls = Arc::new(AtomicUsize::new(0));
        let email = Box::new(CountingTransport {
            label: "email",
            calls: email_calls.clone(),
        });
        let push = Box::new(CountingTransport {
            label: "push",
            calls: push_calls.clone(),
        });
        let dispatcher = ChronicleNotificationDispatcher::new(registry, persister, vec![email, push]);

        dispatcher.dispatch(UserId(1), "event", proposal_id).await;

        assert_eq!(email_calls.load(Ordering::SeqCst), 1);
        assert_eq!(push_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch_skips_unknown_proposal() {
        let registry = test_registry();
        registry.set_notification_prefs(UserId(1), true, true).unwrap();
        let persister = test_persister();
        let dispatcher = ChronicleNotificationDispatcher::new(registry, persister, vec![]);
        dispatcher.dispatch(UserId(1), "event", 999).await;
    }
}
