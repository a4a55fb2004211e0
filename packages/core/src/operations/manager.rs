//! Operation manager with timeout-driven retry
//!
//! Every CRUD call registers a [`PendingOperation`] here before touching the
//! backend. The manager arms a timer for it; when the timer fires before the
//! operation is completed, the attempt counter is bumped and the timer is
//! re-armed with exponential backoff:
//!
//! | Attempt | Deadline          |
//! |---------|-------------------|
//! | 1       | `timeout`         |
//! | 2       | `timeout * 2`     |
//! | 3       | `timeout * 4`     |
//!
//! When the last attempt expires the operation fails with a timeout error
//! and the caller holding the [`OperationTicket`] is signalled so it can
//! roll back its optimistic change.

use crate::models::{NodeId, NodeType, OperationId, OperationKind, OperationStatus, PendingOperation};
use crate::services::error::TreeError;
use crate::services::events::{EventBus, TreeEvent};
use crate::services::notifier::{Notification, Notifier};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handle returned by [`OperationManager::start_operation`]
///
/// Resolves [`expired`](Self::expired) once the operation is ended by the
/// manager itself (timeout or cancellation). Completing the operation
/// normally closes the signal without a value.
#[derive(Debug)]
pub struct OperationTicket {
    pub id: OperationId,
    expiry: oneshot::Receiver<TreeError>,
}

impl OperationTicket {
    /// Wait for the manager to end the operation
    ///
    /// Returns `None` when the operation was completed by its owner.
    pub async fn expired(&mut self) -> Option<TreeError> {
        (&mut self.expiry).await.ok()
    }
}

/// Counters over every operation the manager has seen
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub total: usize,
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Most recent terminal operations, oldest first
    pub history: Vec<PendingOperation>,
}

struct Tracked {
    operation: PendingOperation,
    timer: Option<JoinHandle<()>>,
    expiry: Option<oneshot::Sender<TreeError>>,
}

impl Tracked {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct Ledger {
    pending: HashMap<OperationId, Tracked>,
    history: VecDeque<PendingOperation>,
    seq: u64,
    total: usize,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

impl Ledger {
    fn finish(&mut self, operation: PendingOperation, history_limit: usize) {
        match operation.status {
            OperationStatus::Success => self.succeeded += 1,
            OperationStatus::Error => self.failed += 1,
            OperationStatus::Cancelled => self.cancelled += 1,
            OperationStatus::Pending => {}
        }
        self.history.push_back(operation);
        while self.history.len() > history_limit {
            self.history.pop_front();
        }
    }
}

struct Shared {
    ledger: Mutex<Ledger>,
    events: EventBus,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
    history_limit: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the timer for the current attempt of `id`
    fn arm(self: &Arc<Self>, id: OperationId, attempt: u32, delay: Duration) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.on_timeout(&id, attempt);
        })
    }

    fn on_timeout(self: &Arc<Self>, id: &OperationId, attempt: u32) {
        let mut ledger = self.lock();
        let Some(tracked) = ledger.pending.get_mut(id) else {
            return;
        };
        if tracked.operation.attempts != attempt {
            return;
        }
        // the firing task is this one; dropping its handle detaches it
        tracked.timer = None;

        if tracked.operation.attempts < self.max_attempts {
            tracked.operation.attempts += 1;
            let attempts = tracked.operation.attempts;
            let delay = tracked.operation.timeout * 2u32.saturating_pow(attempts - 1);
            tracked.timer = Some(self.arm(id.clone(), attempts, delay));
            let operation = tracked.operation.clone();
            drop(ledger);

            tracing::warn!(
                "Operation {} timed out, retrying (attempt {}/{}, next deadline {:?})",
                id,
                attempts,
                self.max_attempts,
                delay
            );
            self.notifier.notify(Notification::retrying(format!(
                "{} {} is taking longer than expected, retrying ({}/{})",
                operation.kind, operation.target_type, attempts, self.max_attempts
            )));
            self.events.emit(TreeEvent::OperationRetry { operation, delay });
            return;
        }

        let Some(mut tracked) = ledger.pending.remove(id) else {
            return;
        };
        let error = TreeError::Timeout {
            operation_id: id.clone(),
            attempts: tracked.operation.attempts,
        };
        tracked.operation.status = OperationStatus::Error;
        tracked.operation.end_time = Some(Utc::now());
        tracked.operation.error = Some(error.to_string());
        let operation = tracked.operation.clone();
        ledger.finish(tracked.operation, self.history_limit);
        drop(ledger);

        if let Some(expiry) = tracked.expiry.take() {
            let _ = expiry.send(error.clone());
        }

        tracing::error!("Operation {} failed: {}", id, error);
        self.notifier.notify(Notification::permanent_error(format!(
            "Could not {} {}: the server did not respond",
            operation.kind, operation.target_type
        )));
        self.events.emit(TreeEvent::OperationComplete { operation });
    }
}

/// Tracks in-flight CRUD operations
pub struct OperationManager {
    shared: Arc<Shared>,
}

impl OperationManager {
    pub fn new(
        events: EventBus,
        notifier: Arc<dyn Notifier>,
        max_attempts: u32,
        history_limit: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                ledger: Mutex::new(Ledger::default()),
                events,
                notifier,
                max_attempts: max_attempts.max(1),
                history_limit,
            }),
        }
    }

    /// Register an operation and arm its first timeout
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_operation(
        &self,
        kind: OperationKind,
        target_type: NodeType,
        target_id: Option<NodeId>,
        timeout: Duration,
    ) -> OperationTicket {
        let (expiry_tx, expiry_rx) = oneshot::channel();
        let now = Utc::now();

        let operation = {
            let mut ledger = self.shared.lock();
            let id = OperationId::new(kind, target_type, now.timestamp_millis(), ledger.seq);
            ledger.seq += 1;
            ledger.total += 1;

            let operation = PendingOperation {
                id: id.clone(),
                kind,
                target_type,
                target_id,
                status: OperationStatus::Pending,
                attempts: 1,
                timeout,
                start_time: now,
                end_time: None,
                error: None,
            };
            let timer = self.shared.arm(id.clone(), 1, timeout);
            ledger.pending.insert(
                id,
                Tracked {
                    operation: operation.clone(),
                    timer: Some(timer),
                    expiry: Some(expiry_tx),
                },
            );
            operation
        };

        tracing::debug!("Started operation {}", operation.id);
        let ticket = OperationTicket {
            id: operation.id.clone(),
            expiry: expiry_rx,
        };
        self.shared.events.emit(TreeEvent::OperationStart { operation });
        ticket
    }

    /// Record the terminal status of an operation
    ///
    /// Unknown or already finished ids are ignored and yield `None`.
    pub fn complete_operation(
        &self,
        id: &OperationId,
        status: OperationStatus,
        error: Option<String>,
    ) -> Option<PendingOperation> {
        let operation = {
            let mut ledger = self.shared.lock();
            let Some(mut tracked) = ledger.pending.remove(id) else {
                tracing::debug!("Ignoring completion of unknown operation {}", id);
                return None;
            };
            tracked.disarm();
            tracked.operation.status = if status.is_terminal() {
                status
            } else {
                OperationStatus::Success
            };
            tracked.operation.end_time = Some(Utc::now());
            tracked.operation.error = error;
            let operation = tracked.operation.clone();
            ledger.finish(tracked.operation, self.shared.history_limit);
            operation
        };

        tracing::debug!("Operation {} finished as {:?}", id, operation.status);
        self.shared.events.emit(TreeEvent::OperationComplete {
            operation: operation.clone(),
        });
        Some(operation)
    }

    /// Cancel a pending operation, signalling its ticket
    pub fn cancel_operation(&self, id: &OperationId) -> bool {
        let (operation, expiry) = {
            let mut ledger = self.shared.lock();
            let Some(mut tracked) = ledger.pending.remove(id) else {
                return false;
            };
            tracked.disarm();
            tracked.operation.status = OperationStatus::Cancelled;
            tracked.operation.end_time = Some(Utc::now());
            let operation = tracked.operation.clone();
            ledger.finish(tracked.operation, self.shared.history_limit);
            (operation, tracked.expiry.take())
        };

        if let Some(expiry) = expiry {
            let _ = expiry.send(TreeError::Cancelled {
                operation_id: id.clone(),
            });
        }
        tracing::info!("Cancelled operation {}", id);
        self.shared.events.emit(TreeEvent::OperationComplete { operation });
        true
    }

    /// Cancel everything still pending
    pub fn teardown(&self) {
        let ids: Vec<OperationId> = self.shared.lock().pending.keys().cloned().collect();
        for id in &ids {
            self.cancel_operation(id);
        }
        if !ids.is_empty() {
            tracing::debug!("Cancelled {} pending operation(s) on teardown", ids.len());
        }
    }

    /// Snapshot of a pending operation
    pub fn get(&self, id: &OperationId) -> Option<PendingOperation> {
        self.shared
            .lock()
            .pending
            .get(id)
            .map(|tracked| tracked.operation.clone())
    }

    pub fn pending(&self) -> Vec<PendingOperation> {
        let mut pending: Vec<PendingOperation> = self
            .shared
            .lock()
            .pending
            .values()
            .map(|tracked| tracked.operation.clone())
            .collect();
        pending.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        pending
    }

    pub fn stats(&self) -> OperationStats {
        let ledger = self.shared.lock();
        OperationStats {
            total: ledger.total,
            pending: ledger.pending.len(),
            succeeded: ledger.succeeded,
            failed: ledger.failed,
            cancelled: ledger.cancelled,
            history: ledger.history.iter().cloned().collect(),
        }
    }
}

impl Drop for OperationManager {
    fn drop(&mut self) {
        for tracked in self.shared.lock().pending.values_mut() {
            tracked.disarm();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifier::{RecordingNotifier, Severity};

    fn manager(max_attempts: u32) -> (OperationManager, Arc<RecordingNotifier>, EventBus) {
        let events = EventBus::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let manager = OperationManager::new(events.clone(), notifier.clone(), max_attempts, 10);
        (manager, notifier, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_disarms_timer() {
        let (manager, notifier, _) = manager(3);
        let mut ticket = manager.start_operation(
            OperationKind::Update,
            NodeType::Measurement,
            Some("m7".into()),
            Duration::from_secs(60),
        );

        let done = manager
            .complete_operation(&ticket.id, OperationStatus::Success, None)
            .unwrap();
        assert_eq!(done.status, OperationStatus::Success);
        assert!(done.end_time.is_some());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(ticket.expired().await.is_none());
        assert!(notifier.notifications().is_empty());

        let stats = manager.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_with_backoff_then_fails() {
        let (manager, notifier, events) = manager(3);
        let mut rx = events.subscribe();
        let mut ticket = manager.start_operation(
            OperationKind::Create,
            NodeType::Location,
            None,
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(manager.get(&ticket.id).unwrap().attempts, 2);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(manager.get(&ticket.id).unwrap().attempts, 3);

        let err = ticket.expired().await.unwrap();
        assert_eq!(
            err,
            TreeError::Timeout {
                operation_id: ticket.id.clone(),
                attempts: 3
            }
        );

        let stats = manager.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.history[0].status, OperationStatus::Error);
        assert_eq!(stats.history[0].attempts, 3);

        let severities: Vec<Severity> = notifier
            .notifications()
            .iter()
            .map(|n| n.severity)
            .collect();
        assert_eq!(
            severities,
            vec![Severity::Warning, Severity::Warning, Severity::Error]
        );

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.event_type());
        }
        assert_eq!(
            names,
            vec![
                "crud:operation:start",
                "crud:operation:retry",
                "crud:operation:retry",
                "crud:operation:complete",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_and_repeated_completion_is_ignored() {
        let (manager, _, _) = manager(3);
        let ticket = manager.start_operation(
            OperationKind::Delete,
            NodeType::Project,
            Some("p1".into()),
            Duration::from_secs(30),
        );

        assert!(manager
            .complete_operation(&ticket.id, OperationStatus::Error, Some("boom".into()))
            .is_some());
        assert!(manager
            .complete_operation(&ticket.id, OperationStatus::Success, None)
            .is_none());

        let stats = manager.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats.history[0].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_teardown_cancels_pending() {
        let (manager, _, _) = manager(3);
        let mut first = manager.start_operation(
            OperationKind::Update,
            NodeType::Project,
            Some("p1".into()),
            Duration::from_secs(60),
        );
        let _second = manager.start_operation(
            OperationKind::Delete,
            NodeType::Project,
            Some("p2".into()),
            Duration::from_secs(30),
        );
        assert_eq!(manager.pending().len(), 2);

        manager.teardown();

        assert!(matches!(
            first.expired().await,
            Some(TreeError::Cancelled { .. })
        ));
        let stats = manager.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.cancelled, 2);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let events = EventBus::new();
        let manager = OperationManager::new(events, Arc::new(RecordingNotifier::new()), 3, 2);

        for _ in 0..5 {
            let ticket = manager.start_operation(
                OperationKind::Create,
                NodeType::Project,
                None,
                Duration::from_secs(60),
            );
            manager.complete_operation(&ticket.id, OperationStatus::Success, None);
        }

        let stats = manager.stats();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.history.len(), 2);
    }
}
