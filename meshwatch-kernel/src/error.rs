//! Error types of the aggregation core.
//!
//! None of these is fatal: transport errors drive reconnection, decode
//! errors drop a single event, config errors only happen at startup.

use thiserror::Error;

/// Broker-side failures. Always recoverable through reconnection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out after {0} ms")]
    ConnectTimeout(u64),

    #[error("transport not connected")]
    NotConnected,

    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("connection error: {0}")]
    Connection(String),
}

/// Payload that could not be turned into a typed event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload has no 'from' field")]
    MissingSender,

    #[error("topic is not routed to any event kind")]
    Unclassified,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
