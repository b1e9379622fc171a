//! Bounded log of received text messages.

use crate::models::{MessageEvent, MessageRecord};
use parking_lot::Mutex;
use std::collections::VecDeque;
use time::OffsetDateTime;

pub const MESSAGE_LOG_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct MessageLog {
    inner: Mutex<LogInner>,
}

#[derive(Debug)]
struct LogInner {
    entries: VecDeque<MessageRecord>,
    next_id: u64,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                entries: VecDeque::with_capacity(MESSAGE_LOG_CAPACITY + 1),
                next_id: 1,
            }),
        }
    }

    /// Appends at the tail, evicting by arrival order once over capacity.
    pub fn append(&self, event: MessageEvent, ingested_at: OffsetDateTime) -> MessageRecord {
        let mut inner = self.inner.lock();
        let record = MessageRecord {
            id: inner.next_id,
            timestamp: event.timestamp.unwrap_or_else(|| epoch_seconds(ingested_at)),
            from: event.from,
            text: event.text,
        };
        inner.next_id += 1;
        inner.entries.push_back(record.clone());

        while inner.entries.len() > MESSAGE_LOG_CAPACITY {
            if let Some(evicted) = inner.entries.pop_front() {
                tracing::debug!(id = evicted.id, "message evicted from log");
            }
        }
        record
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<MessageRecord> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    /// Messages with an id greater than `after_id`, oldest first.
    pub fn since(&self, after_id: u64) -> Vec<MessageRecord> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|m| m.id > after_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id the next appended message will receive.
    pub fn next_id(&self) -> u64 {
        self.inner.lock().next_id
    }
}

fn epoch_seconds(at: OffsetDateTime) -> f64 {
    at.unix_timestamp_nanos() as f64 / 1_000_000_000.0
}
