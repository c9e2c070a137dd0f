//! Relay configuration surface.
//!
//! Everything timing- or size-related in the protocol engine is driven
//! from here: the node identity doubling as the auth token, the primary's
//! endpoints, and the heartbeat and buffer policies. Defaults match the
//! relay's production conventions: 16 KiB read chunks, a 512 MiB message
//! cap, one-second heartbeat pacing and I/O timeouts, a 30-second
//! staleness threshold and 30 connect retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Port offset of the primary's heartbeat endpoint relative to its data
/// port.
pub const HEARTBEAT_PORT_OFFSET: u16 = 2000;

/// Configuration for one relay process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Numeric node identity; its decimal form is the expected auth token.
    pub node_id: u32,
    /// Hostname or address of the primary.
    pub master_host: String,
    /// The primary's data port; the heartbeat endpoint sits at
    /// `master_port + HEARTBEAT_PORT_OFFSET`.
    pub master_port: u16,
    /// Address this process binds and reports; substituted for loopback
    /// in accept-time logging.
    pub local_host: String,
    /// Seconds between heartbeat iterations.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Per-operation send/receive/connect timeout on the heartbeat link,
    /// in milliseconds.
    #[serde(default = "default_heartbeat_io_timeout_millis")]
    pub heartbeat_io_timeout_millis: u64,
    /// Seconds without a successful heartbeat reply before the link is
    /// declared dead.
    #[serde(default = "default_heartbeat_stale_secs")]
    pub heartbeat_stale_secs: u64,
    /// Consecutive heartbeat connect failures tolerated before forcing a
    /// teardown of the binlog connections.
    #[serde(default = "default_connect_retry_limit")]
    pub connect_retry_limit: u32,
    /// Read buffer growth increment in bytes.
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
    /// Maximum in-flight message size in bytes; the buffer cap.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_heartbeat_interval_secs() -> u64 { 1 }
fn default_heartbeat_io_timeout_millis() -> u64 { 1000 }
fn default_heartbeat_stale_secs() -> u64 { 30 }
fn default_connect_retry_limit() -> u32 { 30 }
fn default_read_chunk() -> usize { 16 * 1024 }
fn default_max_message_size() -> usize { 512 * 1024 * 1024 }

impl RelayConfig {
    /// Configuration with default policies for the given identity and
    /// primary endpoint.
    #[must_use]
    pub fn new(node_id: u32, master_host: impl Into<String>, master_port: u16) -> Self {
        Self {
            node_id,
            master_host: master_host.into(),
            master_port,
            local_host: "0.0.0.0".to_owned(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_io_timeout_millis: default_heartbeat_io_timeout_millis(),
            heartbeat_stale_secs: default_heartbeat_stale_secs(),
            connect_retry_limit: default_connect_retry_limit(),
            read_chunk: default_read_chunk(),
            max_message_size: default_max_message_size(),
        }
    }

    /// The token an auth frame must carry to authenticate against this
    /// node.
    #[must_use]
    pub fn auth_token(&self) -> String { self.node_id.to_string() }

    /// `host:port` of the primary's heartbeat endpoint.
    #[must_use]
    pub fn heartbeat_addr(&self) -> String {
        format!(
            "{}:{}",
            self.master_host,
            self.master_port + HEARTBEAT_PORT_OFFSET
        )
    }

    /// Pacing interval between heartbeat iterations.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Per-operation heartbeat I/O timeout.
    #[must_use]
    pub fn heartbeat_io_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_io_timeout_millis)
    }

    /// Staleness threshold for the heartbeat link.
    #[must_use]
    pub fn heartbeat_stale_after(&self) -> Duration {
        Duration::from_secs(self.heartbeat_stale_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_relay_conventions() {
        let config = RelayConfig::new(7, "primary.example", 9221);
        assert_eq!(config.auth_token(), "7");
        assert_eq!(config.heartbeat_addr(), "primary.example:11221");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(config.heartbeat_stale_after(), Duration::from_secs(30));
        assert_eq!(config.connect_retry_limit, 30);
        assert_eq!(config.max_message_size, 512 * 1024 * 1024);
    }

    #[test]
    fn omitted_policy_fields_deserialize_to_defaults() {
        let config: RelayConfig = serde_json::from_str(
            r#"{"node_id":3,"master_host":"h","master_port":9221,"local_host":"10.0.0.2"}"#,
        )
        .expect("deserialize");
        assert_eq!(config.read_chunk, 16 * 1024);
        assert_eq!(config.heartbeat_io_timeout_millis, 1000);
    }
}
