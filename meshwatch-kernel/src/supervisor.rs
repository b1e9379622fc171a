/**
 * CONNECTION SUPERVISOR - Broker session lifecycle
 *
 * ROLE: connects, (re)subscribes to the fixed topic set, forwards every
 * inbound publish to the ingestion pipeline and reconnects with backoff.
 *
 * STATES:
 *   Disconnected -> Connecting -> Connected -> Offline | Error | Disconnected
 *   Offline | Error -> Connecting      (after the backoff delay)
 *   Connecting -> Error                (refused or timed out)
 *
 * An explicit shutdown interrupts any wait (connect, inbound, backoff),
 * closes the transport and ends in Disconnected for good.
 */

use crate::error::TransportError;
use crate::health::HealthTracker;
use crate::models::{ConnectionStatus, InboundMessage};
use crate::snapshot::SnapshotPublisher;
use crate::topics::DEFAULT_TOPICS;
use crate::transport::{Transport, TransportEvent};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delay before the first retry after a loss, then a fixed period between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub retry_period: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            retry_period: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// `attempt` counts consecutive retries since the last successful connect.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            self.initial_delay
        } else {
            self.retry_period
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub topics: Vec<String>,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Requests a terminal shutdown. Dropping the handle has the same effect.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct ConnectionSupervisor<T> {
    transport: T,
    settings: SupervisorSettings,
    publisher: SnapshotPublisher,
    health: HealthTracker,
    inbound: mpsc::Sender<InboundMessage>,
    shutdown: watch::Receiver<bool>,
}

impl<T: Transport + 'static> ConnectionSupervisor<T> {
    pub fn new(
        transport: T,
        settings: SupervisorSettings,
        publisher: SnapshotPublisher,
        health: HealthTracker,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> (Self, ShutdownHandle) {
        let (tx, shutdown) = watch::channel(false);
        let supervisor = Self {
            transport,
            settings,
            publisher,
            health,
            inbound,
            shutdown,
        };
        (supervisor, ShutdownHandle { tx })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.transition(ConnectionStatus::Connecting);
            let timeout = self.settings.connect_timeout;
            let connected = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break,
                res = tokio::time::timeout(timeout, self.transport.connect()) => match res {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(error = %e, "broker connection failed");
                        false
                    }
                    Err(_) => {
                        let e = TransportError::ConnectTimeout(timeout.as_millis() as u64);
                        warn!(error = %e, "broker connection failed");
                        false
                    }
                },
            };

            if connected {
                attempt = 0;
                self.transition(ConnectionStatus::Connected);
                let lost = tokio::select! {
                    biased;
                    _ = shutdown_requested(&mut self.shutdown) => break,
                    lost = run_session(&mut self.transport, &self.settings.topics, &self.inbound) => lost,
                };
                self.transition(lost);
            } else {
                self.transition(ConnectionStatus::Error);
            }

            let delay = self.settings.reconnect.delay_for(attempt);
            attempt = attempt.saturating_add(1);
            self.health.increment_reconnects();
            info!(delay_ms = delay.as_millis() as u64, attempt, "reconnect scheduled");

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("shutdown requested, closing broker session");
        self.transport.close().await;
        self.transition(ConnectionStatus::Disconnected);
    }

    fn transition(&self, status: ConnectionStatus) {
        self.publisher.set_status(status);
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        debug!("shutdown handle dropped");
    }
}

/// Subscribes, then pumps inbound events until the session ends.
/// Returns the status the session ended in.
async fn run_session<T: Transport>(
    transport: &mut T,
    topics: &[String],
    inbound: &mpsc::Sender<InboundMessage>,
) -> ConnectionStatus {
    let mut subscribed = 0;
    for topic in topics {
        match transport.subscribe(topic).await {
            Ok(()) => {
                subscribed += 1;
                debug!(topic = %topic, "subscribed");
            }
            Err(e) => warn!(topic = %topic, error = %e, "subscription failed, continuing with other topics"),
        }
    }
    info!(subscribed, total = topics.len(), "broker session established");

    loop {
        match transport.next_event().await {
            Ok(TransportEvent::Message(msg)) => {
                if inbound.send(msg).await.is_err() {
                    debug!("ingestion pipeline gone, inbound message discarded");
                }
            }
            Ok(TransportEvent::Disconnected) => {
                warn!("broker connection lost");
                return ConnectionStatus::Offline;
            }
            Err(e) => {
                warn!(error = %e, "broker transport error");
                return ConnectionStatus::Error;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotSubscription;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    enum ConnectStep {
        Accept,
        Refuse,
        Hang,
    }

    #[derive(Default)]
    struct Record {
        status_at_connect: Vec<ConnectionStatus>,
        subscribed: Vec<String>,
        closed: bool,
    }

    struct ScriptTransport {
        publisher: SnapshotPublisher,
        connects: VecDeque<ConnectStep>,
        events: VecDeque<Result<TransportEvent, TransportError>>,
        record: Arc<Mutex<Record>>,
    }

    impl Transport for ScriptTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            self.record.lock().status_at_connect.push(self.publisher.status());
            match self.connects.pop_front().unwrap_or(ConnectStep::Accept) {
                ConnectStep::Accept => Ok(()),
                ConnectStep::Refuse => Err(TransportError::Connect("refused".into())),
                ConnectStep::Hang => std::future::pending().await,
            }
        }

        async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
            if topic.starts_with("bad/") {
                return Err(TransportError::Subscribe {
                    topic: topic.into(),
                    reason: "not authorized".into(),
                });
            }
            self.record.lock().subscribed.push(topic.to_string());
            Ok(())
        }

        async fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
            match self.events.pop_front() {
                Some(event) => event,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.record.lock().closed = true;
        }
    }

    struct Fixture {
        publisher: SnapshotPublisher,
        health: HealthTracker,
        record: Arc<Mutex<Record>>,
        inbound: mpsc::Receiver<InboundMessage>,
        handle: ShutdownHandle,
        task: JoinHandle<()>,
        sub: SnapshotSubscription,
    }

    fn start(
        connects: Vec<ConnectStep>,
        events: Vec<Result<TransportEvent, TransportError>>,
        settings: SupervisorSettings,
    ) -> Fixture {
        let publisher = SnapshotPublisher::new();
        let health = HealthTracker::new();
        let record = Arc::new(Mutex::new(Record::default()));
        let transport = ScriptTransport {
            publisher: publisher.clone(),
            connects: connects.into(),
            events: events.into(),
            record: record.clone(),
        };
        let (tx, inbound) = mpsc::channel(16);
        let sub = publisher.subscribe();
        let (supervisor, handle) =
            ConnectionSupervisor::new(transport, settings, publisher.clone(), health.clone(), tx);
        let task = supervisor.spawn();
        Fixture { publisher, health, record, inbound, handle, task, sub }
    }

    async fn wait_for_status(sub: &mut SnapshotSubscription, status: ConnectionStatus) {
        let reached = tokio::time::timeout(Duration::from_secs(600), async {
            while sub.current().status != status {
                sub.next().await;
            }
        })
        .await;
        assert!(reached.is_ok(), "status {status} never reached");
    }

    fn msg(topic: &str) -> Result<TransportEvent, TransportError> {
        Ok(TransportEvent::Message(InboundMessage::new(topic, "{}")))
    }

    #[test]
    fn test_reconnect_policy_delays() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(200),
            retry_period: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_goes_offline_then_reconnects() {
        let mut f = start(
            vec![ConnectStep::Accept, ConnectStep::Accept],
            vec![msg("mesh/nodes/N1"), Ok(TransportEvent::Disconnected)],
            SupervisorSettings::default(),
        );

        wait_for_status(&mut f.sub, ConnectionStatus::Offline).await;
        assert_eq!(f.inbound.recv().await.unwrap().topic, "mesh/nodes/N1");

        wait_for_status(&mut f.sub, ConnectionStatus::Connected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let record = f.record.lock();
        assert_eq!(
            record.status_at_connect,
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connecting]
        );
        // re-subscribed after the reconnect
        assert_eq!(record.subscribed.len(), 2 * DEFAULT_TOPICS.len());
        assert_eq!(f.health.reconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_goes_to_error_then_retries() {
        let mut f = start(
            vec![],
            vec![Err(TransportError::Connection("broken frame".into()))],
            SupervisorSettings::default(),
        );

        wait_for_status(&mut f.sub, ConnectionStatus::Error).await;
        wait_for_status(&mut f.sub, ConnectionStatus::Connected).await;
        assert_eq!(f.record.lock().status_at_connect.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_subscription_does_not_stop_the_others() {
        let settings = SupervisorSettings {
            topics: vec!["mesh/nodes/#".into(), "bad/messages/#".into(), "mesh/device/#".into()],
            ..SupervisorSettings::default()
        };
        let mut f = start(vec![], vec![], settings);

        wait_for_status(&mut f.sub, ConnectionStatus::Connected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(f.record.lock().subscribed, vec!["mesh/nodes/#", "mesh/device/#"]);
        assert_eq!(f.publisher.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff_is_terminal() {
        let settings = SupervisorSettings {
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_secs(30),
                retry_period: Duration::from_secs(30),
            },
            ..SupervisorSettings::default()
        };
        let mut f = start(vec![ConnectStep::Refuse], vec![], settings);

        wait_for_status(&mut f.sub, ConnectionStatus::Error).await;
        f.handle.shutdown();
        f.task.await.unwrap();

        assert_eq!(f.publisher.status(), ConnectionStatus::Disconnected);
        let record = f.record.lock();
        assert!(record.closed);
        assert_eq!(record.status_at_connect.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_is_an_error() {
        let settings = SupervisorSettings {
            connect_timeout: Duration::from_secs(5),
            ..SupervisorSettings::default()
        };
        let mut f = start(vec![ConnectStep::Hang], vec![], settings);

        wait_for_status(&mut f.sub, ConnectionStatus::Error).await;
        wait_for_status(&mut f.sub, ConnectionStatus::Connected).await;
        assert_eq!(f.health.reconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_connected() {
        let mut f = start(vec![], vec![], SupervisorSettings::default());
        wait_for_status(&mut f.sub, ConnectionStatus::Connected).await;

        drop(f.handle);
        f.task.await.unwrap();

        assert_eq!(f.publisher.status(), ConnectionStatus::Disconnected);
        assert!(f.record.lock().closed);
    }
}
