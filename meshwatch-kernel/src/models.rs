use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Accumulated knowledge about one mesh node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub display_name: Option<String>,
    pub battery: Option<Battery>,
    pub position: Option<Position>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub level_percent: f64,
    pub voltage_volts: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_meters: Option<f64>,
}

/// Partial node attributes carried by one node event. `None` means "not in this update".
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub node_id: String,
    pub display_name: Option<String>,
    pub battery: Option<Battery>,
    pub position: Option<Position>,
}

impl NodeUpdate {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            display_name: None,
            battery: None,
            position: None,
        }
    }
}

impl NodeRecord {
    pub(crate) fn empty(node_id: &str, at: OffsetDateTime) -> Self {
        Self {
            node_id: node_id.to_string(),
            display_name: None,
            battery: None,
            position: None,
            last_update: at,
        }
    }

    /// Merge-by-field: absent fields of `update` leave the record untouched.
    pub(crate) fn merge(&mut self, update: NodeUpdate, at: OffsetDateTime) {
        debug_assert_eq!(self.node_id, update.node_id);
        if let Some(name) = update.display_name {
            self.display_name = Some(name);
        }
        if let Some(battery) = update.battery {
            self.battery = Some(battery);
        }
        if let Some(position) = update.position {
            self.position = Some(position);
        }
        self.last_update = at;
    }
}

/// One received text event. Immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub from: String,
    pub text: String,
}

/// Decoded text event, before the log assigns it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub from: String,
    pub text: String,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Offline,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Offline => "offline",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Wire formats of the inbound topics.

#[derive(Debug, Deserialize)]
pub struct NodeUpdateIn {
    pub from: Option<String>,
    pub name: Option<String>,
    pub battery: Option<BatteryIn>,
    pub position: Option<PositionIn>,
}

#[derive(Debug, Deserialize)]
pub struct BatteryIn {
    pub level: f64,
    pub voltage: f64,
}

#[derive(Debug, Deserialize)]
pub struct PositionIn {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct MessageIn {
    pub from: Option<String>,
    pub payload: String,
    pub timestamp: Option<f64>,
}

/// Raw publish handed over by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }
}
