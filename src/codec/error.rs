//! Error types for the binlog wire codec.
//!
//! The taxonomy separates resumable conditions from fatal ones. Running out
//! of bytes mid-frame is *not* an error — the framer reports it as
//! [`Scrub::NeedMore`](crate::framer::Scrub) and the caller retries with a
//! fuller buffer. Everything in [`CodecError`] is a protocol violation or a
//! resource-exhaustion guard, and both are fatal for the connection that
//! produced them: the framing state can no longer be trusted, so the link
//! must be closed rather than resynchronised.

use thiserror::Error;

/// Fatal wire-level failures raised while decoding binlog framing.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Outer header carries a frame kind outside the known enumeration.
    #[error("unknown frame kind: {kind}")]
    UnknownFrameType {
        /// Raw 16-bit kind field read from the wire.
        kind: u16,
    },

    /// Declared body length exceeds the configured message size cap.
    ///
    /// Raised before any allocation is attempted, so a misbehaving peer can
    /// never force memory growth past the cap.
    #[error("declared body of {size} bytes exceeds cap of {max}")]
    OversizedBody {
        /// Body length announced by the outer header.
        size: usize,
        /// Configured maximum message size.
        max: usize,
    },

    /// Too few bytes for a structure that must be fully present.
    ///
    /// Distinct from a resumable short read: this is reported when a
    /// complete span was promised (for example a frame body whose outer
    /// header declared its length) but the fixed-layout item header inside
    /// it is truncated.
    #[error("malformed item header: have {have} bytes, need {need}")]
    MalformedHeader {
        /// Bytes actually available.
        have: usize,
        /// Bytes the fixed layout requires.
        need: usize,
    },

    /// Content length field overruns the bytes the frame actually carries.
    #[error("content length mismatch: declared {declared}, available {available}")]
    LengthMismatch {
        /// Content length declared in the item header.
        declared: usize,
        /// Bytes remaining after the item header.
        available: usize,
    },

    /// An extension string's length prefix overruns the frame body.
    #[error("extension length mismatch: declared {declared}, available {available}")]
    ExtensionOverrun {
        /// Length declared by the extension prefix.
        declared: usize,
        /// Bytes remaining in the body.
        available: usize,
    },
}

impl CodecError {
    /// Returns true when the error is the resource-exhaustion guard rather
    /// than a malformed-bytes violation.
    #[must_use]
    pub fn is_overflow(&self) -> bool { matches!(self, Self::OversizedBody { .. }) }
}
