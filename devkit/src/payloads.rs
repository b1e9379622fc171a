/*!
Builders for inbound payloads

Produce JSON documents in the wire format the kernel decodes, plus the
matching topics under a configurable root (default `meshtastic`).
*/

use serde_json::{json, Map, Value};

pub struct MeshMessageBuilder {
    root: String,
}

impl Default for MeshMessageBuilder {
    fn default() -> Self {
        Self::new("meshtastic")
    }
}

impl MeshMessageBuilder {
    pub fn new<S: Into<String>>(root: S) -> Self {
        Self { root: root.into() }
    }

    pub fn node_topic(&self, node_id: &str) -> String {
        format!("{}/nodes/{}", self.root, node_id)
    }

    pub fn message_topic(&self, node_id: &str) -> String {
        format!("{}/messages/{}", self.root, node_id)
    }

    pub fn device_topic(&self, device: &str) -> String {
        format!("{}/device/{}", self.root, device)
    }

    /// Node update with only the sender set; chain `NodePayload` setters for fields.
    pub fn node(node_id: &str) -> NodePayload {
        NodePayload { fields: Map::from_iter([("from".to_string(), json!(node_id))]) }
    }

    /// Text message stamped with the current time.
    pub fn text(from: &str, text: &str) -> Value {
        json!({
            "from": from,
            "payload": text,
            "timestamp": chrono::Utc::now().timestamp()
        })
    }

    /// Text message without timestamp: the kernel falls back to ingestion time.
    pub fn text_unstamped(from: &str, text: &str) -> Value {
        json!({ "from": from, "payload": text })
    }
}

#[derive(Debug, Clone)]
pub struct NodePayload {
    fields: Map<String, Value>,
}

impl NodePayload {
    pub fn name(mut self, name: &str) -> Self {
        self.fields.insert("name".into(), json!(name));
        self
    }

    pub fn battery(mut self, level: f64, voltage: f64) -> Self {
        self.fields.insert("battery".into(), json!({ "level": level, "voltage": voltage }));
        self
    }

    pub fn position(mut self, latitude: f64, longitude: f64, altitude: Option<f64>) -> Self {
        let mut position = json!({ "latitude": latitude, "longitude": longitude });
        if let Some(alt) = altitude {
            position["altitude"] = json!(alt);
        }
        self.fields.insert("position".into(), position);
        self
    }

    /// Arbitrary extra field, e.g. to check forward compatibility.
    pub fn extra(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}
