//! Node state store.
//!
//! Each node lives behind its own mutex so updates to different nodes do
//! not contend; the outer map lock is only taken for writing when a node
//! is seen for the first time. Nodes are never removed.

use crate::models::{NodeRecord, NodeUpdate};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use time::OffsetDateTime;

pub type NodesMap = BTreeMap<String, NodeRecord>;

#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: RwLock<HashMap<String, Arc<Mutex<NodeRecord>>>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `update` into the node's record and returns a copy of the result.
    pub fn apply_update(&self, update: NodeUpdate, ingested_at: OffsetDateTime) -> NodeRecord {
        let slot = self.slot(&update.node_id, ingested_at);
        let mut record = slot.lock();
        record.merge(update, ingested_at);
        record.clone()
    }

    fn slot(&self, node_id: &str, at: OffsetDateTime) -> Arc<Mutex<NodeRecord>> {
        if let Some(slot) = self.nodes.read().get(node_id) {
            return slot.clone();
        }
        self.nodes
            .write()
            .entry(node_id.to_string())
            .or_insert_with(|| {
                tracing::info!(node_id, "new node discovered");
                Arc::new(Mutex::new(NodeRecord::empty(node_id, at)))
            })
            .clone()
    }

    pub fn get(&self, node_id: &str) -> Option<NodeRecord> {
        let slot = self.nodes.read().get(node_id).cloned()?;
        let record = slot.lock().clone();
        Some(record)
    }

    pub fn snapshot(&self) -> NodesMap {
        self.nodes
            .read()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.lock().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
