//! Environment-driven configuration.
//!
//! Every knob has a compiled default and can be overridden through `RELAY_*`
//! environment variables, e.g. `RELAY_LISTEN_ADDR=0.0.0.0:9000` or
//! `RELAY_WS__PING_INTERVAL_SECS=30` (double underscore crosses into the
//! nested `ws` section).

use std::time::Duration;

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Per-connection constants, fixed at connection creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Read deadline in seconds; reset on every received frame, ping, and
    /// pong. A silent connection is torn down when it expires.
    pub read_timeout_secs: u64,
    /// Write deadline in seconds, applied to every outbound frame.
    pub write_timeout_secs: u64,
    /// Period of the liveness ping timer in seconds. Must be shorter than
    /// the peer's read timeout for idle connections to survive.
    pub ping_interval_secs: u64,
    /// Maximum accepted frame payload size in bytes.
    pub max_frame_bytes: usize,
    /// Capacity of the per-connection outbound queue, in messages. When
    /// full, the connection is dropped rather than buffered further.
    pub outbound_queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            ping_interval_secs: 54,
            max_frame_bytes: 4096,
            outbound_queue_capacity: 256,
        }
    }
}

impl RelayConfig {
    /// Read deadline as a [`Duration`].
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Write deadline as a [`Duration`].
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Ping period as a [`Duration`].
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

/// Top-level configuration for the relay binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen_addr: String,
    /// `tracing` filter directive, e.g. `info` or `ws_relay=debug`.
    pub log_filter: String,
    /// WebSocket connection constants.
    pub ws: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".into(),
            log_filter: "info".into(),
            ws: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration: compiled defaults overridden by `RELAY_*`
    /// environment variables.
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("RELAY_").split("__"))
            .extract()
    }
}
