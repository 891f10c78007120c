//! Trade notifications
//!
//! The engine publishes after a write has committed; delivery happens on a
//! dispatcher task. Publishing never waits: if the queue is full the
//! notification is dropped and logged.

pub mod audit;

pub use audit::AuditLogNotifier;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use bson::oid::ObjectId;

use crate::trade::Trade;
use crate::types::Result;

/// What happened to a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeEventKind {
    Proposed,
    Executed,
    Declined,
    Cancelled,
    /// Displaced by the execution of a conflicting trade
    Voided,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeNotification {
    pub timestamp: DateTime<Utc>,
    pub kind: TradeEventKind,
    pub schedule_id: String,
    pub trade_id: String,
    pub initiator_email: String,
    pub executor_email: String,
    /// Who should hear about it
    pub recipients: Vec<String>,
}

impl TradeNotification {
    pub fn for_trade(kind: TradeEventKind, schedule_id: &ObjectId, trade: &Trade) -> Self {
        let recipients = match kind {
            TradeEventKind::Proposed | TradeEventKind::Cancelled => {
                vec![trade.executor_email.clone()]
            }
            TradeEventKind::Declined => vec![trade.initiator_email.clone()],
            TradeEventKind::Executed | TradeEventKind::Voided => {
                vec![trade.initiator_email.clone(), trade.executor_email.clone()]
            }
        };
        Self {
            timestamp: Utc::now(),
            kind,
            schedule_id: schedule_id.to_hex(),
            trade_id: trade.id.to_hex(),
            initiator_email: trade.initiator_email.clone(),
            executor_email: trade.executor_email.clone(),
            recipients,
        }
    }
}

/// Delivery backend
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &TradeNotification) -> Result<()>;
}

/// Writes notifications to the tracing log
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &TradeNotification) -> Result<()> {
        info!(
            kind = ?n.kind,
            schedule = %n.schedule_id,
            trade = %n.trade_id,
            recipients = ?n.recipients,
            "trade notification"
        );
        Ok(())
    }
}

/// Sending half held by the engine
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<TradeNotification>,
}

impl NotificationQueue {
    /// Enqueue without waiting. Returns whether the notification was queued.
    pub fn publish(&self, notification: TradeNotification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!(kind = ?n.kind, trade = %n.trade_id, "notification queue full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                warn!(kind = ?n.kind, trade = %n.trade_id, "notification dispatcher stopped, dropping");
                false
            }
        }
    }
}

/// Start the dispatcher. It exits once every queue handle is dropped.
pub fn spawn_dispatcher(
    capacity: usize,
    notifier: Arc<dyn Notifier>,
) -> (NotificationQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<TradeNotification>(capacity.max(1));
    let handle = tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            if let Err(e) = notifier.notify(&notification).await {
                error!(trade = %notification.trade_id, error = %e, "notification delivery failed");
            }
        }
    });
    (NotificationQueue { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::UnitId;
    use crate::trade::fixtures::open_trade;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<TradeNotification>>);

    #[async_trait::async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, n: &TradeNotification) -> Result<()> {
            self.0.lock().await.push(n.clone());
            Ok(())
        }
    }

    fn trade() -> Trade {
        let (u1, u2) = (UnitId::new_v4(), UnitId::new_v4());
        open_trade("alice@example.com", &[&u1], "bob@example.com", &[&u2])
    }

    #[test]
    fn test_recipients_by_kind() {
        let t = trade();
        let sid = ObjectId::new();
        let to = |kind| TradeNotification::for_trade(kind, &sid, &t).recipients;

        assert_eq!(to(TradeEventKind::Proposed), vec!["bob@example.com"]);
        assert_eq!(to(TradeEventKind::Cancelled), vec!["bob@example.com"]);
        assert_eq!(to(TradeEventKind::Declined), vec!["alice@example.com"]);
        assert_eq!(to(TradeEventKind::Executed).len(), 2);
        assert_eq!(to(TradeEventKind::Voided).len(), 2);
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_in_order() {
        let recorder = Arc::new(Recorder::default());
        let (queue, handle) = spawn_dispatcher(8, recorder.clone());
        let t = trade();
        let sid = ObjectId::new();

        assert!(queue.publish(TradeNotification::for_trade(TradeEventKind::Proposed, &sid, &t)));
        assert!(queue.publish(TradeNotification::for_trade(TradeEventKind::Executed, &sid, &t)));
        drop(queue);
        handle.await.unwrap();

        let seen = recorder.0.lock().await;
        let kinds: Vec<_> = seen.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![TradeEventKind::Proposed, TradeEventKind::Executed]);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let queue = NotificationQueue { tx };
        let t = trade();
        let sid = ObjectId::new();

        assert!(queue.publish(TradeNotification::for_trade(TradeEventKind::Proposed, &sid, &t)));
        assert!(!queue.publish(TradeNotification::for_trade(TradeEventKind::Proposed, &sid, &t)));
    }
}
