//! Shared relay context.
//!
//! The original design kept the node handle, the master-connection counter
//! and the "should ping" condition in process globals. Here they are an
//! explicitly constructed [`RelayContext`], shared by `Arc` between the
//! connection engines and the heartbeat supervisor. The counter and flag
//! use atomics: the supervisor and the acceptance path update them
//! concurrently.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crate::{config::RelayConfig, registry::ConnectionRegistry};

/// Process-wide state shared between connection engines and the heartbeat
/// supervisor.
#[derive(Debug)]
pub struct RelayContext {
    config: RelayConfig,
    registry: ConnectionRegistry,
    master_connections: AtomicI64,
    should_ping: AtomicBool,
}

impl RelayContext {
    /// Build a context around the given configuration. Pinging starts
    /// enabled; the embedding process clears it when it leaves the
    /// replication-follower role.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::default(),
            master_connections: AtomicI64::new(0),
            should_ping: AtomicBool::new(true),
        }
    }

    /// Relay configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig { &self.config }

    /// Registry of live binlog connections.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry { &self.registry }

    /// Count of active master-originated links (binlog and heartbeat).
    #[must_use]
    pub fn master_connections(&self) -> i64 {
        self.master_connections.load(Ordering::SeqCst)
    }

    /// Record one more active master link.
    pub fn plus_master_connection(&self) {
        self.master_connections.fetch_add(1, Ordering::SeqCst);
        #[cfg(feature = "metrics")]
        crate::metrics::inc_master_connections();
    }

    /// Record one master link gone.
    pub fn minus_master_connection(&self) {
        self.master_connections.fetch_sub(1, Ordering::SeqCst);
        #[cfg(feature = "metrics")]
        crate::metrics::dec_master_connections();
    }

    /// Whether the heartbeat supervisor should keep pinging the primary.
    #[must_use]
    pub fn should_ping_master(&self) -> bool { self.should_ping.load(Ordering::SeqCst) }

    /// Enable or disable heartbeat pinging.
    pub fn set_should_ping(&self, value: bool) {
        self.should_ping.store(value, Ordering::SeqCst);
    }

    /// Accept-time access hook for the external accept loop.
    ///
    /// Substitutes a loopback peer with this process's configured local
    /// address before logging, and counts the incoming link. The relay
    /// itself always allows; enforcing a stricter policy is the accept
    /// loop's decision.
    pub fn on_accept(&self, peer: &str) -> bool {
        let shown = if is_loopback(peer) {
            self.config.local_host.as_str()
        } else {
            peer
        };
        tracing::info!(peer = shown, "master binlog sender connecting");
        self.plus_master_connection();
        true
    }
}

fn is_loopback(peer: &str) -> bool {
    peer.parse::<std::net::IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RelayContext {
        let mut config = RelayConfig::new(7, "primary.example", 9221);
        config.local_host = "10.0.0.9".to_owned();
        RelayContext::new(config)
    }

    #[test]
    fn connection_count_is_symmetric() {
        let ctx = context();
        ctx.plus_master_connection();
        ctx.plus_master_connection();
        ctx.minus_master_connection();
        assert_eq!(ctx.master_connections(), 1);
    }

    #[test]
    fn ping_flag_toggles() {
        let ctx = context();
        assert!(ctx.should_ping_master());
        ctx.set_should_ping(false);
        assert!(!ctx.should_ping_master());
    }

    #[test]
    fn on_accept_allows_and_counts() {
        let ctx = context();
        assert!(ctx.on_accept("127.0.0.1"));
        assert!(ctx.on_accept("192.168.1.5"));
        assert_eq!(ctx.master_connections(), 2);
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(!is_loopback("10.0.0.1"));
        assert!(!is_loopback("not-an-ip"));
    }
}
