//! Growable, capacity-capped read buffer for a relay connection.
//!
//! Replaces the original design's manually reallocated byte region and
//! pointer cursors with an owned [`BytesMut`] and plain integer offsets:
//! nothing is invalidated by growth, and every consume is bounds-checked.
//!
//! Growth policy, per read cycle: an empty buffer grows by a fixed chunk
//! so small frames never trigger reallocation churn; when the parser has
//! forecast a larger requirement (the `bulk_len` hint), the buffer grows
//! to fit that requirement. Growth past the configured maximum message
//! size is refused before any allocation happens. Capacity is retained
//! when the logical contents reset to empty.

use bytes::BytesMut;

use crate::error::RelayError;

/// Per-connection read buffer with the chunk/hint growth policy.
#[derive(Debug)]
pub struct ReadBuffer {
    buf: BytesMut,
    chunk: usize,
    max: usize,
}

impl ReadBuffer {
    /// Create a buffer growing in `chunk` increments, capped at `max`
    /// bytes of unparsed content.
    #[must_use]
    pub fn new(chunk: usize, max: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            chunk,
            max,
        }
    }

    /// Unparsed bytes currently held.
    #[must_use]
    pub fn len(&self) -> usize { self.buf.len() }

    /// True when no partial frame is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    /// View of the unparsed bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] { &self.buf }

    /// Ensure room for the next read.
    ///
    /// `hint` is the minimum number of additional bytes the next read
    /// should be able to satisfy, when a parser has forecast one.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BufferOverflow`] when satisfying the request
    /// would exceed the maximum message size. No allocation is performed
    /// in that case.
    pub fn prepare(&mut self, hint: Option<usize>) -> Result<(), RelayError> {
        let remaining = self.buf.capacity() - self.buf.len();
        let wanted = match hint {
            Some(h) if h > remaining => h,
            _ if remaining == 0 => self.chunk,
            _ => return Ok(()),
        };
        let required = self.buf.len() + wanted;
        if required > self.max {
            return Err(RelayError::BufferOverflow {
                requested: required,
                max: self.max,
            });
        }
        self.buf.reserve(wanted);
        Ok(())
    }

    /// Drop `n` fully parsed bytes from the front.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the buffered length; callers only ever
    /// consume spans the framer has validated.
    pub fn consume(&mut self, n: usize) {
        use bytes::Buf;
        self.buf.advance(n);
    }

    /// Reset the logical contents to empty, retaining capacity.
    pub fn reset(&mut self) { self.buf.clear(); }

    /// Mutable access for vectored socket reads (`read_buf`).
    pub fn writable(&mut self) -> &mut BytesMut { &mut self.buf }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_grows_by_chunk() {
        let mut buf = ReadBuffer::new(16, 1024);
        buf.prepare(None).expect("prepare");
        assert!(buf.writable().capacity() >= 16);
    }

    #[test]
    fn hint_grows_to_fit() {
        let mut buf = ReadBuffer::new(16, 1024);
        buf.prepare(Some(100)).expect("prepare");
        assert!(buf.writable().capacity() >= 100);
    }

    #[test]
    fn growth_past_cap_is_refused() {
        let mut buf = ReadBuffer::new(16, 64);
        let err = buf.prepare(Some(65)).expect_err("expected overflow");
        assert!(matches!(err, RelayError::BufferOverflow { max: 64, .. }));
    }

    #[test]
    fn consume_then_reset_retains_capacity() {
        let mut buf = ReadBuffer::new(16, 1024);
        buf.prepare(None).expect("prepare");
        buf.writable().extend_from_slice(b"abcdef");
        buf.consume(4);
        assert_eq!(buf.as_slice(), b"ef");
        let cap = buf.writable().capacity();
        buf.reset();
        assert!(buf.is_empty());
        assert!(buf.writable().capacity() >= cap.min(16));
    }

    #[test]
    fn satisfied_hint_does_not_grow() {
        let mut buf = ReadBuffer::new(64, 1024);
        buf.prepare(None).expect("prepare");
        buf.prepare(Some(8)).expect("prepare");
        // Capacity already covers the hint; a second prepare is a no-op.
        assert!(buf.writable().capacity() >= 64);
    }
}
