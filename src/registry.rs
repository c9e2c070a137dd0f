//! Registry of live binlog-receiving connections.
//!
//! Each connection registers a [`CancellationToken`] here; the heartbeat
//! supervisor can force-teardown every link by cancelling them all. A
//! cancelled token never invalidates memory a connection is still reading
//! from — the connection's driver observes the cancellation at its next
//! poll and closes its own socket.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Concurrent registry of per-connection kill handles.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, CancellationToken>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Register a newly accepted connection, returning its identifier and
    /// the token its driver must poll.
    #[must_use]
    pub fn register(&self) -> (ConnectionId, CancellationToken) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        self.connections.insert(id, token.clone());
        (id, token)
    }

    /// Remove a connection, typically from its own teardown path.
    pub fn deregister(&self, id: ConnectionId) { self.connections.remove(&id); }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize { self.connections.len() }

    /// True when no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.connections.is_empty() }

    /// Force-teardown every registered connection.
    ///
    /// Invoked by the heartbeat supervisor when the primary is considered
    /// unreachable. Safe to call concurrently with in-progress reads:
    /// cancellation is observed at each driver's next poll.
    pub fn kill_all(&self) {
        for entry in &self.connections {
            entry.value().cancel();
        }
        self.connections.clear();
    }
}
