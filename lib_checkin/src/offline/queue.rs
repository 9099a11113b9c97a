use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::error::{Result, SyncError};
use crate::models::{OfflineCapabilities, OfflineOperation, PendingOperation};

struct QueueInner {
    offline: bool,
    capabilities: OfflineCapabilities,
    pending: Vec<PendingOperation>,
}

/// Stores and reports; it never replays, retries or expires anything.
///
/// The pending list and the offline flag are published on watch channels,
/// so observers always see the latest value rather than every change.
pub struct OfflineQueue {
    inner: Mutex<QueueInner>,
    pending_tx: watch::Sender<Vec<PendingOperation>>,
    status_tx: watch::Sender<bool>,
}

impl Default for OfflineQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineQueue {
    pub fn new() -> Self {
        let (pending_tx, _) = watch::channel(Vec::new());
        let (status_tx, _) = watch::channel(false);
        Self {
            inner: Mutex::new(QueueInner {
                offline: false,
                capabilities: OfflineCapabilities::default(),
                pending: Vec::new(),
            }),
            pending_tx,
            status_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records device reachability and recomputes the capability table.
    pub fn set_offline_status(&self, offline: bool) {
        let mut inner = self.lock();
        if inner.offline != offline {
            log::info!("Device is now {}", if offline { "offline" } else { "online" });
        }
        inner.offline = offline;
        inner.capabilities = OfflineCapabilities::for_status(offline);
        self.status_tx.send_replace(offline);
    }

    pub fn is_offline(&self) -> bool {
        self.lock().offline
    }

    pub fn capabilities(&self) -> OfflineCapabilities {
        self.lock().capabilities
    }

    pub fn is_operation_available_offline(&self, operation: OfflineOperation) -> bool {
        self.lock().capabilities.allows(operation)
    }

    pub fn get_offline_message(&self, operation: OfflineOperation) -> String {
        operation.offline_message().to_string()
    }

    /// Appends an operation. Ids must be unique within the queue.
    pub fn add_pending_operation(&self, operation: PendingOperation) -> Result<()> {
        let mut inner = self.lock();
        if inner.pending.iter().any(|op| op.id == operation.id) {
            return Err(SyncError::DuplicateOperation(operation.id));
        }
        log::debug!("Queued pending {:?} operation {}", operation.kind, operation.id);
        inner.pending.push(operation);
        self.publish(&inner);
        Ok(())
    }

    /// Removes the operation with `id`, returning it if it was queued.
    pub fn remove_pending_operation(&self, id: &str) -> Option<PendingOperation> {
        let mut inner = self.lock();
        let pos = inner.pending.iter().position(|op| op.id == id)?;
        let removed = inner.pending.remove(pos);
        self.publish(&inner);
        Some(removed)
    }

    pub fn clear_pending_operations(&self) {
        let mut inner = self.lock();
        let dropped = inner.pending.len();
        inner.pending.clear();
        if dropped > 0 {
            log::info!("Cleared {} pending operation(s)", dropped);
        }
        self.publish(&inner);
    }

    /// Current list in insertion order.
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.lock().pending.clone()
    }

    pub fn subscribe_pending_operations(&self) -> watch::Receiver<Vec<PendingOperation>> {
        self.pending_tx.subscribe()
    }

    pub fn subscribe_offline_status(&self) -> watch::Receiver<bool> {
        self.status_tx.subscribe()
    }

    /// Copy of the queue for persisting across restarts.
    pub fn snapshot(&self) -> Vec<PendingOperation> {
        self.pending_operations()
    }

    /// Replaces the queue with previously saved operations. When ids repeat,
    /// the first occurrence is kept.
    pub fn restore(&self, operations: Vec<PendingOperation>) {
        let mut seen = HashSet::new();
        let mut inner = self.lock();
        inner.pending = operations
            .into_iter()
            .filter(|op| seen.insert(op.id.clone()))
            .collect();
        log::info!("Restored {} pending operation(s)", inner.pending.len());
        self.publish(&inner);
    }

    fn publish(&self, inner: &QueueInner) {
        self.pending_tx.send_replace(inner.pending.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PendingOperationType;

    fn op(id: &str) -> PendingOperation {
        PendingOperation::new(id, PendingOperationType::CheckInChild, format!("check in {}", id))
    }

    fn ids(ops: &[PendingOperation]) -> Vec<&str> {
        ops.iter().map(|op| op.id.as_str()).collect()
    }

    #[test]
    fn test_add_two_remove_first_leaves_second() {
        let queue = OfflineQueue::new();
        queue.add_pending_operation(op("op1")).unwrap();
        queue.add_pending_operation(op("op2")).unwrap();

        let removed = queue.remove_pending_operation("op1");

        assert_eq!(removed.map(|op| op.id), Some("op1".to_string()));
        assert_eq!(ids(&queue.pending_operations()), vec!["op2"]);
    }

    #[test]
    fn test_clear_empties_queue_and_notifies_watchers() {
        let queue = OfflineQueue::new();
        let mut watcher = queue.subscribe_pending_operations();
        for id in ["a", "b", "c"] {
            queue.add_pending_operation(op(id)).unwrap();
        }
        assert_eq!(watcher.borrow_and_update().len(), 3);

        queue.clear_pending_operations();

        assert!(queue.pending_operations().is_empty());
        assert!(watcher.has_changed().unwrap());
        assert!(watcher.borrow_and_update().is_empty());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let queue = OfflineQueue::new();
        queue.add_pending_operation(op("op1")).unwrap();

        let result = queue.add_pending_operation(op("op1"));

        assert!(matches!(result, Err(SyncError::DuplicateOperation(id)) if id == "op1"));
        assert_eq!(queue.pending_operations().len(), 1);
    }

    #[test]
    fn test_remove_unknown_id_is_none() {
        let queue = OfflineQueue::new();
        assert!(queue.remove_pending_operation("missing").is_none());
    }

    #[test]
    fn test_capabilities_follow_offline_status() {
        let queue = OfflineQueue::new();

        queue.set_offline_status(true);
        assert!(!queue.is_operation_available_offline(OfflineOperation::CheckIn));
        assert!(queue.is_operation_available_offline(OfflineOperation::ViewChildren));
        assert!(queue.is_offline());

        queue.set_offline_status(false);
        assert_eq!(queue.capabilities(), OfflineCapabilities::default());
        assert!(queue.is_operation_available_offline(OfflineOperation::CheckIn));
    }

    #[test]
    fn test_offline_status_is_watchable() {
        let queue = OfflineQueue::new();
        let watcher = queue.subscribe_offline_status();

        queue.set_offline_status(true);

        assert!(*watcher.borrow());
    }

    #[test]
    fn test_offline_message_mentions_connection() {
        let queue = OfflineQueue::new();
        assert!(queue
            .get_offline_message(OfflineOperation::CheckOut)
            .contains("internet connection"));
    }

    #[test]
    fn test_restore_keeps_first_of_duplicate_ids() {
        let queue = OfflineQueue::new();
        let mut second = op("a");
        second.description = "later copy".to_string();

        queue.restore(vec![op("a"), op("b"), second]);

        let restored = queue.snapshot();
        assert_eq!(ids(&restored), vec!["a", "b"]);
        assert_eq!(restored[0].description, "check in a");
    }
}
