/*!
Test harness for the aggregation core

Wires a `MockBroker`, the connection supervisor, the ingestion pipeline and
the snapshot publisher together the way the kernel binary does, and offers
waits on snapshot conditions.
*/

use crate::mqtt_stub::MockBroker;
use crate::payloads::MeshMessageBuilder;
use anyhow::Result;
use meshwatch_kernel::{
    ConnectionStatus, ConnectionSupervisor, HealthTracker, Ingestor, MeshSnapshot, ShutdownHandle,
    SnapshotPublisher, SnapshotSubscription, SupervisorSettings,
};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const DEFAULT_WAIT: Duration = Duration::from_secs(60);

pub struct TestHarness {
    pub broker: MockBroker,
    pub publisher: SnapshotPublisher,
    pub health: HealthTracker,
    pub builder: MeshMessageBuilder,
    subscription: SnapshotSubscription,
    shutdown: ShutdownHandle,
    supervisor: JoinHandle<()>,
    ingest: JoinHandle<()>,
}

impl TestHarness {
    /// Must be called inside a tokio runtime.
    pub fn start(settings: SupervisorSettings) -> Self {
        env_logger::try_init().ok();

        let (broker, transport) = MockBroker::new();
        let publisher = SnapshotPublisher::new();
        let health = HealthTracker::new();
        let subscription = publisher.subscribe();

        let (tx, rx) = mpsc::channel(64);
        let ingest = Ingestor::new(publisher.clone(), health.clone()).spawn(rx);
        let (supervisor, shutdown) =
            ConnectionSupervisor::new(transport, settings, publisher.clone(), health.clone(), tx);

        Self {
            broker,
            publisher,
            health,
            builder: MeshMessageBuilder::default(),
            subscription,
            shutdown,
            supervisor: supervisor.spawn(),
            ingest,
        }
    }

    pub fn with_defaults() -> Self {
        Self::start(SupervisorSettings::default())
    }

    pub fn send_node(&self, node_id: &str, payload: &Value) {
        self.broker.publish_json(&self.builder.node_topic(node_id), payload);
    }

    pub fn send_text(&self, from: &str, text: &str) {
        let payload = MeshMessageBuilder::text(from, text);
        self.broker.publish_json(&self.builder.message_topic(from), &payload);
    }

    /// Waits until `pred` holds on a snapshot; checks the current state first.
    pub async fn wait_for<F>(&mut self, what: &str, pred: F) -> Result<MeshSnapshot>
    where
        F: Fn(&MeshSnapshot) -> bool,
    {
        let sub = &mut self.subscription;
        let found = timeout(DEFAULT_WAIT, async {
            let mut snap = sub.current();
            while !pred(&snap) {
                snap = sub.next().await;
            }
            snap
        })
        .await;

        match found {
            Ok(snap) => {
                log::info!("✅ reached: {what}");
                Ok(snap)
            }
            Err(_) => anyhow::bail!("timeout waiting for {what}"),
        }
    }

    pub async fn wait_for_status(&mut self, status: ConnectionStatus) -> Result<MeshSnapshot> {
        self.wait_for(&format!("status {status}"), |s| s.status == status).await
    }

    pub async fn wait_for_messages(&mut self, count: usize) -> Result<MeshSnapshot> {
        self.wait_for(&format!("{count} messages"), |s| s.messages.len() >= count).await
    }

    /// Requests shutdown and waits for both tasks; returns the final state.
    pub async fn shutdown(self) -> Result<MeshSnapshot> {
        self.shutdown.shutdown();
        timeout(DEFAULT_WAIT, self.supervisor).await??;
        // the supervisor owned the only sender, so the pipeline drains and exits
        timeout(DEFAULT_WAIT, self.ingest).await??;
        log::info!("🧹 harness shut down");
        Ok(self.publisher.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_kernel::ReconnectPolicy;

    fn quick_retry() -> SupervisorSettings {
        SupervisorSettings {
            connect_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(500),
                retry_period: Duration::from_secs(2),
            },
            ..SupervisorSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_merge_and_log() {
        let mut h = TestHarness::start(quick_retry());
        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();

        h.send_node("N1", &MeshMessageBuilder::node("N1").battery(80.0, 3.9).build());
        h.send_node("N1", &MeshMessageBuilder::node("N1").position(1.0, 2.0, None).build());
        h.send_text("N1", "first light");

        let snap = h
            .wait_for("N1 merged and one message", |s| {
                s.nodes.get("N1").is_some_and(|n| n.position.is_some()) && s.messages.len() == 1
            })
            .await
            .unwrap();
        let n1 = &snap.nodes["N1"];
        assert_eq!(n1.battery.unwrap().level_percent, 80.0);
        assert_eq!(n1.position.unwrap().longitude, 2.0);
        assert_eq!(snap.messages[0].text, "first light");
        assert_eq!(snap.messages[0].id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connected_schedules_reconnect() {
        let mut h = TestHarness::start(quick_retry());
        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();
        assert_eq!(h.broker.connect_attempts(), 1);

        h.broker.hold_connects();
        h.broker.drop_connection();

        h.wait_for_status(ConnectionStatus::Offline).await.unwrap();
        // held connect attempt makes the Connecting state observable
        h.wait_for_status(ConnectionStatus::Connecting).await.unwrap();
        assert_eq!(h.broker.connect_attempts(), 2);

        h.broker.release_connect();
        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();
        assert_eq!(h.health.reconnects(), 1);
        // topics subscribed again on the new session
        assert_eq!(h.broker.subscriptions().len(), 2 * SupervisorSettings::default().topics.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_then_refused_reconnects() {
        let mut h = TestHarness::start(quick_retry());
        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();

        h.broker.refuse_next_connects(2);
        h.broker.fail_connection("tls alert: bad record mac");

        h.wait_for_status(ConnectionStatus::Error).await.unwrap();
        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();
        // 1 initial + 2 refused + 1 accepted
        assert_eq!(h.broker.connect_attempts(), 4);
        assert_eq!(h.health.reconnects(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_survives_reconnect() {
        let mut h = TestHarness::start(quick_retry());
        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();
        h.send_node("N9", &MeshMessageBuilder::node("N9").name("summit").build());
        h.wait_for("N9 known", |s| s.nodes.contains_key("N9")).await.unwrap();

        h.broker.drop_connection();
        h.wait_for_status(ConnectionStatus::Offline).await.unwrap();
        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();

        h.send_node("N9", &MeshMessageBuilder::node("N9").battery(12.0, 3.4).build());
        let snap = h
            .wait_for("N9 battery", |s| s.nodes.get("N9").is_some_and(|n| n.battery.is_some()))
            .await
            .unwrap();
        assert_eq!(snap.nodes["N9"].display_name.as_deref(), Some("summit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_payloads_do_not_disturb_the_stream() {
        let mut h = TestHarness::start(quick_retry());
        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();

        h.broker.publish("meshtastic/nodes/N1", "{not json");
        h.broker.publish("meshtastic/messages/N1", r#"{"payload": "anonymous"}"#);
        h.broker.publish("meshtastic/unknown/thing", r#"{"from": "N1"}"#);
        h.broker.publish("meshtastic/device/radio0", r#"{"rssi": -90}"#);
        h.send_text("N2", "still flowing");

        let snap = h.wait_for_messages(1).await.unwrap();
        assert_eq!(snap.messages[0].from, "N2");
        assert!(snap.nodes.is_empty());
        assert_eq!(snap.status, ConnectionStatus::Connected);
        assert_eq!(h.health.decode_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_keeps_connection() {
        let (topics, failing) = {
            let settings = SupervisorSettings::default();
            let failing = settings.topics[1].clone();
            (settings.topics, failing)
        };
        let mut h = TestHarness::start(quick_retry());
        h.broker.fail_subscribe(&failing);

        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let subscribed = h.broker.subscriptions();
        assert_eq!(subscribed.len(), topics.len() - 1);
        assert!(!subscribed.contains(&failing));
        assert_eq!(h.publisher.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_terminal() {
        let mut h = TestHarness::start(quick_retry());
        h.wait_for_status(ConnectionStatus::Connected).await.unwrap();
        h.send_text("N1", "before shutdown");
        h.wait_for_messages(1).await.unwrap();

        let broker = h.broker.clone();
        broker.refuse_next_connects(usize::MAX);
        broker.drop_connection();
        h.wait_for_status(ConnectionStatus::Error).await.unwrap();
        let attempts = broker.connect_attempts();

        let last = h.shutdown().await.unwrap();
        assert_eq!(last.status, ConnectionStatus::Disconnected);
        assert_eq!(last.messages.len(), 1);
        assert!(broker.is_closed());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(broker.connect_attempts(), attempts);
    }
}
