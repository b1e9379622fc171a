//! Ingestion pipeline: the single writer of the node store and message log.
//!
//! topic -> classify -> decode -> store -> notify. Nothing here can fail
//! the stream: unrouted topics and undecodable payloads are logged,
//! counted and dropped.

use crate::decode::{decode, Decoded};
use crate::error::DecodeError;
use crate::health::HealthTracker;
use crate::models::InboundMessage;
use crate::snapshot::SnapshotPublisher;
use crate::topics::{classify, EventKind};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

#[derive(Debug)]
pub enum IngestOutcome {
    NodeUpdated(String),
    MessageAppended(u64),
    DeviceReserved,
    Unrecognized,
    Dropped(DecodeError),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::NodeUpdated(_) | IngestOutcome::MessageAppended(_))
    }
}

#[derive(Clone)]
pub struct Ingestor {
    publisher: SnapshotPublisher,
    health: HealthTracker,
}

impl Ingestor {
    pub fn new(publisher: SnapshotPublisher, health: HealthTracker) -> Self {
        Self { publisher, health }
    }

    pub fn handle(&self, msg: &InboundMessage, ingested_at: OffsetDateTime) -> IngestOutcome {
        let kind = classify(&msg.topic);
        if kind == EventKind::Unrecognized {
            trace!(topic = %msg.topic, "ignoring unrouted topic");
            self.health.record_unrecognized();
            return IngestOutcome::Unrecognized;
        }

        match decode(kind, &msg.payload) {
            Ok(Decoded::Node(update)) => {
                let record = self.publisher.apply_node_update(update, ingested_at);
                self.health.record_accepted();
                debug!(node_id = %record.node_id, "node updated");
                IngestOutcome::NodeUpdated(record.node_id)
            }
            Ok(Decoded::Message(event)) => {
                let record = self.publisher.append_message(event, ingested_at);
                self.health.record_accepted();
                debug!(id = record.id, from = %record.from, "message appended");
                IngestOutcome::MessageAppended(record.id)
            }
            Ok(Decoded::Device) => {
                trace!(topic = %msg.topic, "device event reserved, not processed");
                self.health.record_device_event();
                IngestOutcome::DeviceReserved
            }
            Err(e) => {
                warn!(topic = %msg.topic, bytes = msg.payload.len(), error = %e, "dropping undecodable payload");
                self.health.record_decode_failure();
                IngestOutcome::Dropped(e)
            }
        }
    }

    /// Drains the inbound channel until every sender is gone.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(msg) = inbound.recv().await {
            self.handle(&msg, OffsetDateTime::now_utc());
        }
        info!("ingestion pipeline stopped");
    }

    pub fn spawn(self, inbound: mpsc::Receiver<InboundMessage>) -> JoinHandle<()> {
        tokio::spawn(self.run(inbound))
    }
}
