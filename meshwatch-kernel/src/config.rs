use crate::error::ConfigError;
use crate::session::OperatorSession;
use crate::supervisor::{ReconnectPolicy, SupervisorSettings};
use crate::topics::DEFAULT_TOPICS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MeshConfig {
    pub mqtt: MqttConf,
    pub topics: Vec<String>,
    pub http: HttpConf,
    /// Age after which the HTTP view flags a node as stale.
    pub stale_after_secs: u64,
    pub operator: OperatorSession,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    pub initial_reconnect_delay_ms: u64,
    pub reconnect_period_ms: u64,
    pub request_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            http: HttpConf::default(),
            stale_after_secs: 900,
            operator: OperatorSession::default(),
        }
    }
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "meshwatch-kernel".into(),
            username: None,
            password: None,
            keep_alive_secs: 15,
            connect_timeout_ms: 30_000,
            initial_reconnect_delay_ms: 1_000,
            reconnect_period_ms: 5_000,
            request_capacity: 32,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl MeshConfig {
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            topics: self.topics.clone(),
            connect_timeout: Duration::from_millis(self.mqtt.connect_timeout_ms),
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(self.mqtt.initial_reconnect_delay_ms),
                retry_period: Duration::from_millis(self.mqtt.reconnect_period_ms),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.host is empty".into()));
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.client_id is empty".into()));
        }
        if self.mqtt.reconnect_period_ms == 0 {
            return Err(ConfigError::Invalid("mqtt.reconnect_period_ms must be > 0".into()));
        }
        // every SUBSCRIBE is queued before the event loop runs again
        if self.mqtt.request_capacity < self.topics.len().max(1) {
            return Err(ConfigError::Invalid(format!(
                "mqtt.request_capacity ({}) must be at least the number of topics ({})",
                self.mqtt.request_capacity,
                self.topics.len()
            )));
        }
        if self.topics.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid("no topics to subscribe to".into()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MESHWATCH_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Ok(port) = std::env::var("MESHWATCH_MQTT_PORT") {
            match port.parse() {
                Ok(port) => self.mqtt.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid MESHWATCH_MQTT_PORT"),
            }
        }
        if let Ok(bind) = std::env::var("MESHWATCH_HTTP_BIND") {
            self.http.bind = bind;
        }
    }
}

pub fn parse_config(txt: &str, path: &str) -> Result<MeshConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(MeshConfig::default());
    }
    serde_yaml::from_str(txt).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Loads `MESHWATCH_CONFIG` (default `meshwatch.yaml`), then environment overrides.
/// A missing file means defaults; an unreadable or invalid one is an error.
pub async fn load_config() -> Result<MeshConfig, ConfigError> {
    let path = std::env::var("MESHWATCH_CONFIG").unwrap_or_else(|_| "meshwatch.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        parse_config(&txt, &path)?
    } else {
        tracing::warn!(%path, "no config file, using defaults");
        MeshConfig::default()
    };
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
mqtt:
  host: broker.lan
  reconnect_period_ms: 2500
topics:
  - "msh/EU_868/nodes/#"
  - "msh/EU_868/messages/#"
operator:
  username: jdoe
  full_name: Jane Doe
  role: admin
"#;
        let cfg = parse_config(yaml, "test.yaml").unwrap();
        assert_eq!(cfg.mqtt.host, "broker.lan");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.topics.len(), 2);
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert_eq!(cfg.operator.full_name, "Jane Doe");

        let settings = cfg.supervisor_settings();
        assert_eq!(settings.reconnect.retry_period, Duration::from_millis(2500));
        assert_eq!(settings.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(settings.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_file_is_default() {
        let cfg = parse_config("  \n", "empty.yaml").unwrap();
        assert_eq!(cfg.topics, MeshConfig::default().topics);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let err = parse_config("mqtt: [not, a, map]", "bad.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn test_validation() {
        let mut cfg = MeshConfig::default();
        cfg.topics.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = MeshConfig::default();
        cfg.mqtt.reconnect_period_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MeshConfig::default();
        cfg.mqtt.host = " ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_request_queue_must_hold_all_subscriptions() {
        let mut cfg = MeshConfig::default();
        cfg.mqtt.request_capacity = cfg.topics.len() - 1;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("request_capacity"));

        cfg.mqtt.request_capacity = cfg.topics.len();
        assert!(cfg.validate().is_ok());

        cfg.mqtt.request_capacity = 0;
        assert!(cfg.validate().is_err());
    }
}
