//! MeshWatch kernel - telemetry aggregation for a mesh radio network.
//!
//! Inbound MQTT publishes flow through the connection supervisor into a
//! single ingestion task which classifies, decodes and merges them into
//! the node store and message log. Consumers read owned snapshots from
//! the snapshot publisher and get woken on change.

pub mod config;
pub mod console;
pub mod decode;
pub mod error;
pub mod health;
pub mod http;
pub mod ingest;
pub mod messages;
pub mod models;
pub mod mqtt;
pub mod nodes;
pub mod session;
pub mod snapshot;
pub mod supervisor;
pub mod topics;
pub mod transport;

pub use error::{ConfigError, DecodeError, TransportError};
pub use health::HealthTracker;
pub use ingest::{IngestOutcome, Ingestor};
pub use models::{ConnectionStatus, InboundMessage, MessageRecord, NodeRecord};
pub use snapshot::{MeshSnapshot, SnapshotPublisher, SnapshotSubscription};
pub use supervisor::{ConnectionSupervisor, ReconnectPolicy, ShutdownHandle, SupervisorSettings};
pub use transport::{Transport, TransportEvent};
