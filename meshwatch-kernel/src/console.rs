//! Console consumer: logs a summary per coalesced snapshot and every new
//! text message, identified by its log id.

use crate::session::OperatorSession;
use crate::snapshot::{MeshSnapshot, SnapshotPublisher};
use tokio::task::JoinHandle;
use tracing::info;

pub struct ConsoleView {
    session: OperatorSession,
    last_message_id: u64,
}

impl ConsoleView {
    pub fn new(session: OperatorSession) -> Self {
        Self { session, last_message_id: 0 }
    }

    /// Lines describing what changed since the previous render.
    pub fn render(&mut self, snap: &MeshSnapshot) -> Vec<String> {
        let mut lines = vec![format!(
            "[{}] status={} nodes={} messages={}",
            self.session.username,
            snap.status,
            snap.nodes.len(),
            snap.messages.len()
        )];
        for m in snap.messages.iter().filter(|m| m.id > self.last_message_id) {
            lines.push(format!("  #{} <{}> {}", m.id, m.from, m.text));
        }
        if let Some(last) = snap.messages.last() {
            self.last_message_id = self.last_message_id.max(last.id);
        }
        lines
    }

    pub fn spawn(mut self, publisher: SnapshotPublisher) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("{}", self.session.greeting());
            let mut sub = publisher.subscribe();
            loop {
                let snap = sub.next().await;
                for line in self.render(&snap) {
                    info!("{line}");
                }
            }
        })
    }
}
