//! Canonical error and status types for the crate.
//!
//! The taxonomy follows the relay's recovery semantics: every variant of
//! [`RelayError`] is fatal for the connection that raised it and never for
//! the owning process. Resumable short reads are statuses, not errors
//! ([`ReadStatus::NeedMore`]); authentication failure and a rejected
//! command application are logged conditions that leave the link open and
//! therefore appear in neither type.

use thiserror::Error;

use crate::{codec::CodecError, resp::RespError};

/// Connection-fatal failures surfaced to the owning accept loop.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed binlog framing: the stream can no longer be trusted.
    #[error("protocol violation: {0}")]
    Codec(#[from] CodecError),

    /// Malformed embedded command serialization.
    #[error("command parse failure: {0}")]
    Resp(#[from] RespError),

    /// Read-buffer growth would exceed the maximum message size.
    #[error("read buffer overflow: {requested} bytes requested, cap {max}")]
    BufferOverflow {
        /// Total bytes the buffer would have had to hold.
        requested: usize,
        /// Configured maximum message size.
        max: usize,
    },

    /// Transport failure on the underlying socket.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of one readable-event cycle, consumed by the accept loop.
#[derive(Debug)]
pub enum ReadStatus {
    /// A frame is in flight; invoke again when the socket is readable.
    NeedMore,
    /// At least one frame was fully consumed and dispatched.
    FrameConsumed,
    /// The peer closed the connection; clean up, nothing was lost.
    Closed,
    /// Fatal failure; the connection must be torn down.
    Error(RelayError),
}

impl ReadStatus {
    /// True when the connection should keep being polled.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::NeedMore | Self::FrameConsumed)
    }
}
