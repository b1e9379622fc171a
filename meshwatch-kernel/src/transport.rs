//! Broker seam used by the connection supervisor.
//!
//! `MqttTransport` (rumqttc) is the production implementation; the devkit
//! provides a scriptable one for tests.

use crate::error::TransportError;
use crate::models::InboundMessage;
use std::future::Future;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(InboundMessage),
    /// The broker went away cleanly (DISCONNECT, reset, EOF).
    Disconnected,
}

pub trait Transport: Send {
    /// Opens a new session. Resolves once the broker accepted it.
    fn connect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn subscribe(&mut self, topic: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next inbound event of the current session. An `Err` ends the session.
    fn next_event(&mut self) -> impl Future<Output = Result<TransportEvent, TransportError>> + Send;

    /// Releases the session, if any. Never fails.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
