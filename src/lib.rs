//! Public API for the `binrelay` library.
//!
//! `binrelay` is the protocol engine of a binlog replication relay: it
//! receives a primary's write-ahead stream, demultiplexes the binlog
//! framing from the embedded RESP command sub-protocol sharing the byte
//! stream, authenticates the sender, and re-issues each replicated write
//! against a pluggable [`CommandSink`]. An independent
//! [`HeartbeatSupervisor`] pings the primary on a second channel and
//! force-tears-down the binlog links when the primary is unreachable.
//!
//! The TCP accept loop and the data-serving layer are external
//! collaborators: the accept loop drives
//! [`RelayConnection::on_readable`] (or spawns
//! [`RelayConnection::run`]) and consults
//! [`RelayContext::on_accept`]; the serving layer implements
//! [`CommandSink`].

pub mod buffer;
pub mod byte_order;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod framer;
pub mod heartbeat;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod registry;
pub mod resp;
pub mod sink;

pub use codec::{BinlogItem, CodecError, FrameHeader, FrameKind};
pub use config::RelayConfig;
pub use connection::RelayConnection;
pub use context::RelayContext;
pub use error::{ReadStatus, RelayError};
pub use framer::{Framer, Scrub};
pub use heartbeat::{HeartbeatState, HeartbeatSupervisor};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use resp::{Parse, RespError, RespParser};
pub use sink::CommandSink;
