//! Contract to the external data-serving layer.
//!
//! The relay never stores anything itself: once a binlog frame has been
//! authenticated and parsed, its command is handed to a [`CommandSink`]
//! together with the shard key the serving layer partitions on. A non-zero
//! status is logged by the engine and the stream continues; this layer
//! makes no delivery guarantee stronger than the stream's ordering.

use async_trait::async_trait;
use bytes::Bytes;

/// Shard key used when a command carries no explicit key argument.
pub const SENTINEL_SHARD_KEY: &[u8] = b" ";

/// Receiver for replicated commands, implemented by the data-serving
/// layer.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Apply one command, partitioned by `shard_key`.
    ///
    /// Returns a status code; zero means applied. Any other value is
    /// logged by the relay and never aborts the connection.
    async fn apply(&self, argv: &[Bytes], shard_key: &Bytes) -> i32;
}

/// Shard key for a parsed command: its first argument after the name, or
/// the sentinel when the command has none.
#[must_use]
pub fn shard_key(argv: &[Bytes]) -> Bytes {
    argv.get(1)
        .cloned()
        .unwrap_or_else(|| Bytes::from_static(SENTINEL_SHARD_KEY))
}
