use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::snapshot::SnapshotPublisher;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub nodes_tracked: u64,
    pub messages_buffered: u64,
    pub mqtt_status: String,
    pub mqtt_reconnects: u64,
    pub events_accepted: u64,
    pub decode_failures: u64,
    pub unrecognized_topics: u64,
    pub device_events: u64,
}

/// Ingestion and connection counters, cheap to clone and share between tasks.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    reconnects: AtomicU64,
    accepted: AtomicU64,
    decode_failures: AtomicU64,
    unrecognized: AtomicU64,
    device_events: AtomicU64,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn increment_reconnects(&self) {
        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrecognized(&self) {
        self.counters.unrecognized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_event(&self) {
        self.counters.device_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnects(&self) -> u64 {
        self.counters.reconnects.load(Ordering::Relaxed)
    }

    pub fn decode_failures(&self) -> u64 {
        self.counters.decode_failures.load(Ordering::Relaxed)
    }

    pub fn get_health(&self, publisher: &SnapshotPublisher) -> KernelHealth {
        let c = &self.counters;
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            nodes_tracked: publisher.node_count() as u64,
            messages_buffered: publisher.message_count() as u64,
            mqtt_status: publisher.status().to_string(),
            mqtt_reconnects: c.reconnects.load(Ordering::Relaxed),
            events_accepted: c.accepted.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            unrecognized_topics: c.unrecognized.load(Ordering::Relaxed),
            device_events: c.device_events.load(Ordering::Relaxed),
        }
    }
}
