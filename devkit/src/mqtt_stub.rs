/*!
Mock broker for developing without an MQTT server

`MockBroker` is the test side: it injects publishes, drops or breaks the
connection, refuses or holds connect attempts and records what the
supervisor did. `MockTransport` is the kernel side and implements
`meshwatch_kernel::Transport`.
*/

use meshwatch_kernel::{InboundMessage, Transport, TransportError, TransportEvent};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[derive(Debug)]
enum MockEvent {
    Publish(InboundMessage),
    Drop,
    Fail(String),
}

#[derive(Debug, Default)]
struct BrokerState {
    subscriptions: Vec<String>,
    failing_topics: HashSet<String>,
    connect_attempts: usize,
    refuse_connects: usize,
    hold_connects: bool,
    connected: bool,
    closed: bool,
}

/// Test-side handle, cheap to clone.
#[derive(Clone)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
    gate: Arc<Notify>,
    events: mpsc::UnboundedSender<MockEvent>,
}

/// Kernel-side transport bound to a `MockBroker`.
pub struct MockTransport {
    state: Arc<Mutex<BrokerState>>,
    gate: Arc<Notify>,
    events: mpsc::UnboundedReceiver<MockEvent>,
}

impl MockBroker {
    pub fn new() -> (Self, MockTransport) {
        let state = Arc::new(Mutex::new(BrokerState::default()));
        let gate = Arc::new(Notify::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Self { state: state.clone(), gate: gate.clone(), events: tx };
        let transport = MockTransport { state, gate, events: rx };
        (broker, transport)
    }

    /// Queues a publish for the current (or next) session.
    pub fn publish<S, V>(&self, topic: S, payload: V)
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let msg = InboundMessage::new(topic, payload);
        log::info!("📨 [MOCK] publish on {}", msg.topic);
        self.send(MockEvent::Publish(msg));
    }

    pub fn publish_json(&self, topic: &str, payload: &serde_json::Value) {
        self.publish(topic, payload.to_string());
    }

    /// Clean disconnect, as if the broker closed the socket.
    pub fn drop_connection(&self) {
        log::info!("🔌 [MOCK] dropping connection");
        self.send(MockEvent::Drop);
    }

    /// Transport-level failure distinct from a clean disconnect.
    pub fn fail_connection(&self, reason: &str) {
        log::info!("💥 [MOCK] failing connection: {reason}");
        self.send(MockEvent::Fail(reason.to_string()));
    }

    pub fn refuse_next_connects(&self, count: usize) {
        self.state.lock().unwrap().refuse_connects = count;
    }

    pub fn fail_subscribe(&self, topic: &str) {
        self.state.lock().unwrap().failing_topics.insert(topic.to_string());
    }

    /// Connect attempts block until `release_connect` is called.
    pub fn hold_connects(&self) {
        self.state.lock().unwrap().hold_connects = true;
    }

    /// Lets one held connect attempt through and stops holding new ones.
    pub fn release_connect(&self) {
        self.state.lock().unwrap().hold_connects = false;
        self.gate.notify_one();
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().connect_attempts
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn send(&self, event: MockEvent) {
        if self.events.send(event).is_err() {
            log::warn!("⚠️ [MOCK] transport dropped, event discarded");
        }
    }
}

impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let held = {
            let mut state = self.state.lock().unwrap();
            state.connect_attempts += 1;
            state.hold_connects
        };
        if held {
            self.gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(TransportError::Connect("refused by mock broker".into()));
        }
        state.connected = true;
        state.closed = false;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_topics.contains(topic) {
            return Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "rejected by mock broker".into(),
            });
        }
        state.subscriptions.push(topic.to_string());
        log::info!("📥 [MOCK] subscribed to {topic}");
        Ok(())
    }

    async fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        let event = match self.events.recv().await {
            Some(event) => event,
            // broker handle gone: the session just stays quiet
            None => std::future::pending().await,
        };
        match event {
            MockEvent::Publish(msg) => Ok(TransportEvent::Message(msg)),
            MockEvent::Drop => {
                self.state.lock().unwrap().connected = false;
                Ok(TransportEvent::Disconnected)
            }
            MockEvent::Fail(reason) => {
                self.state.lock().unwrap().connected = false;
                Err(TransportError::Connection(reason))
            }
        }
    }

    async fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.closed = true;
    }
}
