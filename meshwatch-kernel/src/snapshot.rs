/**
 * SNAPSHOT PUBLISHER - Read side of the aggregation core
 *
 * ROLE: owns the node store, the message log and the connection status,
 * and tells subscribers when any of them changed.
 *
 * Notifications go through a watch channel carrying a generation counter:
 * a subscriber wakes up at most once per pending change and then copies
 * the current state, so a slow consumer coalesces updates instead of
 * holding back ingestion. Writers are crate-private; consumers only ever
 * get owned copies.
 */

use crate::messages::MessageLog;
use crate::models::{ConnectionStatus, MessageEvent, MessageRecord, NodeRecord, NodeUpdate};
use crate::nodes::{NodeStore, NodesMap};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;

/// Point-in-time copy of the aggregated state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSnapshot {
    pub generation: u64,
    pub status: ConnectionStatus,
    pub nodes: NodesMap,
    pub messages: Vec<MessageRecord>,
}

#[derive(Clone)]
pub struct SnapshotPublisher {
    inner: Arc<Inner>,
}

struct Inner {
    nodes: NodeStore,
    messages: MessageLog,
    status: Mutex<ConnectionStatus>,
    generation: watch::Sender<u64>,
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                nodes: NodeStore::new(),
                messages: MessageLog::new(),
                status: Mutex::new(ConnectionStatus::Disconnected),
                generation,
            }),
        }
    }

    pub fn snapshot(&self) -> MeshSnapshot {
        MeshSnapshot {
            generation: *self.inner.generation.borrow(),
            status: self.status(),
            nodes: self.inner.nodes.snapshot(),
            messages: self.inner.messages.snapshot(),
        }
    }

    pub fn subscribe(&self) -> SnapshotSubscription {
        SnapshotSubscription {
            rx: self.inner.generation.subscribe(),
            publisher: self.clone(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.lock()
    }

    pub fn node(&self, node_id: &str) -> Option<NodeRecord> {
        self.inner.nodes.get(node_id)
    }

    pub fn nodes(&self) -> NodesMap {
        self.inner.nodes.snapshot()
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.inner.messages.snapshot()
    }

    pub fn messages_since(&self, after_id: u64) -> Vec<MessageRecord> {
        self.inner.messages.since(after_id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.nodes.len()
    }

    pub fn message_count(&self) -> usize {
        self.inner.messages.len()
    }

    pub fn generation(&self) -> u64 {
        *self.inner.generation.borrow()
    }

    pub(crate) fn apply_node_update(&self, update: NodeUpdate, at: OffsetDateTime) -> NodeRecord {
        let record = self.inner.nodes.apply_update(update, at);
        self.notify();
        record
    }

    pub(crate) fn append_message(&self, event: MessageEvent, at: OffsetDateTime) -> MessageRecord {
        let record = self.inner.messages.append(event, at);
        self.notify();
        record
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        let previous = std::mem::replace(&mut *self.inner.status.lock(), status);
        tracing::info!(from = %previous, to = %status, "connection status changed");
        self.notify();
    }

    fn notify(&self) {
        self.inner.generation.send_modify(|g| *g += 1);
    }
}

/// Change feed for one consumer.
pub struct SnapshotSubscription {
    rx: watch::Receiver<u64>,
    publisher: SnapshotPublisher,
}

impl SnapshotSubscription {
    /// Waits until something changed since the last call, then copies the state.
    pub async fn next(&mut self) -> MeshSnapshot {
        // The sender lives inside `publisher`, so this cannot fail.
        let _ = self.rx.changed().await;
        self.publisher.snapshot()
    }

    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    pub fn current(&self) -> MeshSnapshot {
        self.publisher.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::datetime;

    fn message(text: &str) -> MessageEvent {
        MessageEvent { from: "N1".into(), text: text.into(), timestamp: None }
    }

    #[tokio::test]
    async fn test_every_subscriber_is_notified() {
        let publisher = SnapshotPublisher::new();
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.apply_node_update(NodeUpdate::new("N1"), datetime!(2025-03-01 10:00 UTC));

        let a = tokio::time::timeout(Duration::from_secs(1), first.next()).await.unwrap();
        let b = tokio::time::timeout(Duration::from_secs(1), second.next()).await.unwrap();
        assert!(a.nodes.contains_key("N1"));
        assert!(b.nodes.contains_key("N1"));
        assert_eq!(a.generation, b.generation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_gets_coalesced_state() {
        let publisher = SnapshotPublisher::new();
        let mut sub = publisher.subscribe();
        let now = datetime!(2025-03-01 10:00 UTC);

        for i in 0..10 {
            publisher.append_message(message(&format!("m{i}")), now);
        }
        publisher.set_status(ConnectionStatus::Connected);

        let snap = sub.next().await;
        assert_eq!(snap.messages.len(), 10);
        assert_eq!(snap.status, ConnectionStatus::Connected);
        assert_eq!(snap.generation, 11);

        // nothing pending any more
        assert!(!sub.has_changed());
        assert!(tokio::time::timeout(Duration::from_secs(5), sub.next()).await.is_err());
    }

    #[test]
    fn test_snapshot_is_detached_from_live_state() {
        let publisher = SnapshotPublisher::new();
        let now = datetime!(2025-03-01 10:00 UTC);
        publisher.append_message(message("before"), now);

        let snap = publisher.snapshot();
        publisher.append_message(message("after"), now);

        assert_eq!(snap.messages.len(), 1);
        assert_eq!(publisher.message_count(), 2);
        assert_eq!(publisher.messages_since(1).len(), 1);
    }

    #[test]
    fn test_initial_state() {
        let publisher = SnapshotPublisher::new();
        let snap = publisher.snapshot();
        assert_eq!(snap.status, ConnectionStatus::Disconnected);
        assert_eq!(snap.generation, 0);
        assert!(snap.nodes.is_empty() && snap.messages.is_empty());
    }
}
