use crate::config::MqttConf;
use crate::error::TransportError;
use crate::models::InboundMessage;
use crate::transport::{Transport, TransportEvent};
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS,
    StateError, SubscribeReasonCode,
};
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, warn};

/// rumqttc-backed transport. Each `connect` builds a fresh client/event loop
/// pair; the supervisor owns retries, so rumqttc's own reconnect is never used.
pub struct MqttTransport {
    options: MqttOptions,
    request_capacity: usize,
    session: Option<Session>,
}

struct Session {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: SubscriptionTracker,
}

/// Maps SUBSCRIBE packet ids back to topics so SUBACK rejections can be
/// reported per topic. Requests leave the event loop in the order they
/// were queued, one topic per request.
#[derive(Debug, Default)]
struct SubscriptionTracker {
    queued: VecDeque<String>,
    in_flight: HashMap<u16, String>,
}

impl SubscriptionTracker {
    fn queued(&mut self, topic: &str) {
        self.queued.push_back(topic.to_string());
    }

    fn sent(&mut self, pkid: u16) {
        if let Some(topic) = self.queued.pop_front() {
            self.in_flight.insert(pkid, topic);
        }
    }

    /// Returns the topic of a rejected subscription, if this ack rejects one.
    fn acked(&mut self, pkid: u16, codes: &[SubscribeReasonCode]) -> Option<String> {
        let topic = self.in_flight.remove(&pkid)?;
        codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
            .then_some(topic)
    }
}

pub fn mqtt_options(conf: &MqttConf) -> MqttOptions {
    let mut opts = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(conf.keep_alive_secs));
    opts.set_clean_session(true);
    if let (Some(user), Some(pass)) = (&conf.username, &conf.password) {
        opts.set_credentials(user, pass);
    }
    opts
}

impl MqttTransport {
    pub fn new(conf: &MqttConf) -> Self {
        Self {
            options: mqtt_options(conf),
            request_capacity: conf.request_capacity,
            session: None,
        }
    }
}

impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.session = None;
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), self.request_capacity);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    debug!(code = ?ack.code, session_present = ack.session_present, "CONNACK received");
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(TransportError::Connect(e.to_string())),
            }
        }

        self.session = Some(Session {
            client,
            eventloop,
            subscriptions: SubscriptionTracker::default(),
        });
        Ok(())
    }

    /// Queues the request without waiting: the event loop is only polled by
    /// `next_event`, so a full request queue is reported instead of awaited.
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let session = self.session.as_mut().ok_or(TransportError::NotConnected)?;
        session
            .client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| TransportError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        session.subscriptions.queued(topic);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        let session = self.session.as_mut().ok_or(TransportError::NotConnected)?;

        let outcome = loop {
            match session.eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    break Ok(TransportEvent::Message(InboundMessage {
                        topic: p.topic,
                        payload: p.payload.to_vec(),
                    }));
                }
                Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => session.subscriptions.sent(pkid),
                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                    if let Some(topic) = session.subscriptions.acked(ack.pkid, &ack.return_codes) {
                        warn!(topic = %topic, pkid = ack.pkid, "broker rejected subscription");
                    }
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => break Ok(TransportEvent::Disconnected),
                Ok(_) => {}
                // rumqttc reports a peer close from the framed reader as a state error
                Err(ConnectionError::Io(e) | ConnectionError::MqttState(StateError::Io(e)))
                    if is_clean_disconnect(e.kind()) =>
                {
                    debug!(error = %e, "socket closed by peer");
                    break Ok(TransportEvent::Disconnected);
                }
                Err(e) => break Err(TransportError::Connection(e.to_string())),
            }
        };

        if !matches!(outcome, Ok(TransportEvent::Message(_))) {
            self.session = None;
        }
        outcome
    }

    async fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if session.client.try_disconnect().is_err() {
            debug!("request queue full, dropping session without DISCONNECT");
            return;
        }
        // flush the DISCONNECT packet
        let flushed = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match session.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            debug!("DISCONNECT not flushed before timeout");
        }
    }
}

fn is_clean_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
    )
}
