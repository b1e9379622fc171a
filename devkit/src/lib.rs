/*!
# MeshWatch DevKit - test doubles and helpers

- Mock broker + transport to drive the connection supervisor without a real MQTT server
- Builders for node/message payloads in the inbound wire format
- Harness wiring supervisor, ingestion and snapshot publisher together
*/

pub mod mqtt_stub;
pub mod payloads;
pub mod test_utils;

pub use mqtt_stub::{MockBroker, MockTransport};
pub use payloads::MeshMessageBuilder;
pub use test_utils::TestHarness;
