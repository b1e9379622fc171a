//! Payload decoding for routed topics.
//!
//! Payloads are JSON documents. Unknown fields are ignored so newer
//! publishers keep working; a `null` optional field counts as absent.

use crate::error::DecodeError;
use crate::models::{
    Battery, MessageEvent, MessageIn, NodeUpdate, NodeUpdateIn, Position,
};
use crate::topics::EventKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Node(NodeUpdate),
    Message(MessageEvent),
    /// Device payloads are reserved, the body is not inspected.
    Device,
}

pub fn decode(kind: EventKind, payload: &[u8]) -> Result<Decoded, DecodeError> {
    match kind {
        EventKind::Node => decode_node_update(payload).map(Decoded::Node),
        EventKind::Message => decode_message(payload).map(Decoded::Message),
        EventKind::Device => Ok(Decoded::Device),
        EventKind::Unrecognized => Err(DecodeError::Unclassified),
    }
}

pub fn decode_node_update(payload: &[u8]) -> Result<NodeUpdate, DecodeError> {
    let wire: NodeUpdateIn = serde_json::from_slice(payload)?;
    let node_id = require_sender(wire.from)?;

    Ok(NodeUpdate {
        node_id,
        display_name: wire.name,
        battery: wire.battery.map(|b| Battery {
            level_percent: b.level,
            voltage_volts: b.voltage,
        }),
        position: wire.position.map(|p| Position {
            latitude: p.latitude,
            longitude: p.longitude,
            altitude_meters: p.altitude,
        }),
    })
}

pub fn decode_message(payload: &[u8]) -> Result<MessageEvent, DecodeError> {
    let wire: MessageIn = serde_json::from_slice(payload)?;
    let from = require_sender(wire.from)?;

    Ok(MessageEvent {
        from,
        text: wire.payload,
        timestamp: wire.timestamp,
    })
}

fn require_sender(from: Option<String>) -> Result<String, DecodeError> {
    match from {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(DecodeError::MissingSender),
    }
}
