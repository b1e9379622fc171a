//! Simulated mesh traffic against a live broker.
//!
//! Run a broker on 127.0.0.1:1883 and the kernel, then this binary. Every
//! tick it publishes a battery or position update for one of a few fake
//! nodes, a text message now and then, and one malformed payload at the
//! start so the decode-failure counter moves.

use anyhow::Result;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde_json::json;
use tokio::time::{interval, Duration};

const MQTT_BROKER: &str = "127.0.0.1";
const MQTT_PORT: u16 = 1883;
const CLIENT_ID: &str = "meshwatch-sim";
const ROOT: &str = "meshtastic";
const NODES: [(&str, &str, f64, f64); 3] = [
    ("!a1b2c3d4", "ridge", 45.1885, 5.7245),
    ("!0badf00d", "valley", 45.1712, 5.6931),
    ("!deadbeef", "relay-3", 45.2043, 5.7512),
];

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("🚀 Starting mesh traffic simulator");

    let mut options = MqttOptions::new(CLIENT_ID, MQTT_BROKER, MQTT_PORT);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(options, 10);

    // rumqttc only makes progress while the event loop is polled
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("✅ Connected to {MQTT_BROKER}:{MQTT_PORT}"),
                Ok(_) => {}
                Err(e) => {
                    warn!("⚠️ MQTT connection error: {}. Reconnecting...", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });

    publish(&client, &format!("{ROOT}/nodes/{}", NODES[0].0), b"{\"from\": ".to_vec()).await?;

    let mut tick = interval(Duration::from_secs(2));
    let mut round: u64 = 0;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        round += 1;
        let (id, name, lat, lon) = NODES[(round as usize) % NODES.len()];
        let drift = (round % 10) as f64 * 0.0003;

        let update = if round % 2 == 0 {
            json!({
                "from": id,
                "name": name,
                "battery": { "level": 100.0 - (round % 90) as f64, "voltage": 4.1 - (round % 90) as f64 * 0.01 }
            })
        } else {
            json!({
                "from": id,
                "position": { "latitude": lat + drift, "longitude": lon - drift, "altitude": 400.0 + drift * 1000.0 }
            })
        };
        publish(&client, &format!("{ROOT}/nodes/{id}"), update.to_string().into_bytes()).await?;

        if round % 3 == 0 {
            let text = json!({ "from": id, "payload": format!("{name} check-in #{round}") });
            publish(&client, &format!("{ROOT}/messages/{id}"), text.to_string().into_bytes()).await?;
        }
    }

    info!("👋 Simulator stopped after {round} rounds");
    client.disconnect().await.ok();
    Ok(())
}

async fn publish(client: &AsyncClient, topic: &str, payload: Vec<u8>) -> Result<()> {
    debug!("📤 {topic} ({} bytes)", payload.len());
    client.publish(topic, QoS::AtLeastOnce, false, payload).await?;
    Ok(())
}
