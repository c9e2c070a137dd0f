//! Incremental extraction of outer frames from a raw byte stream.
//!
//! The framer is invoked with whatever unconsumed bytes the connection's
//! read buffer holds. It never copies bytes and never advances past a
//! frame it cannot fully validate: either a complete frame is present and
//! a [`Scrub::Frame`] describes its spans, or [`Scrub::NeedMore`] tells
//! the caller to read again with the same bytes still at the front of the
//! buffer. Frame boundaries split across reads are therefore reassembled
//! by the caller's buffer alone — the framer's only cross-call state is a
//! forecast of how many bytes the current partial frame still needs.

use std::ops::Range;

use crate::codec::{
    self,
    BinlogItem,
    CodecError,
    FrameHeader,
    FrameKind,
    ITEM_HEADER_LEN,
    OUTER_HEADER_LEN,
};

/// Outcome of one framing attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Scrub {
    /// The buffer ends mid-frame; read more and retry with the same bytes.
    NeedMore,
    /// One complete frame sits at the front of the buffer.
    Frame {
        /// Outer frame kind.
        kind: FrameKind,
        /// Item metadata for binlog frames (content left in place),
        /// `None` for auth frames.
        item: Option<BinlogItem>,
        /// Span of the embedded command payload within the presented
        /// buffer: the auth body, or the binlog item content.
        payload: Range<usize>,
        /// Total frame length; the caller consumes exactly this many
        /// bytes before the next framing attempt.
        consumed: usize,
    },
}

/// Stateless-per-frame outer framing over a caller-owned buffer.
#[derive(Debug)]
pub struct Framer {
    max_frame_len: usize,
    needed: Option<usize>,
}

impl Framer {
    /// Create a framer rejecting frames whose total length, outer header
    /// included, exceeds `max_frame_len`. Matches the read buffer's cap on
    /// held bytes, so every admitted frame is one the buffer can hold.
    #[must_use]
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            needed: None,
        }
    }

    /// Bytes still missing for the frame last seen, when its header has
    /// already announced a length. Feeds the engine's buffer pre-sizing.
    #[must_use]
    pub fn needed_hint(&self) -> Option<usize> { self.needed }

    /// Attempt to extract one complete frame from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownFrameType`] for an unrecognised kind,
    /// [`CodecError::OversizedBody`] when the declared body exceeds the
    /// configured cap, and the item decode errors for a binlog body whose
    /// fixed layout is inconsistent with the outer length. All are fatal
    /// for the connection.
    pub fn scrub(&mut self, buf: &[u8]) -> Result<Scrub, CodecError> {
        if buf.len() < OUTER_HEADER_LEN {
            self.needed = None;
            return Ok(Scrub::NeedMore);
        }
        let header = FrameHeader::decode(buf)?;
        let body_len = header.body_length as usize;
        let max_body = self.max_frame_len.saturating_sub(OUTER_HEADER_LEN);
        if body_len > max_body {
            return Err(CodecError::OversizedBody {
                size: body_len,
                max: max_body,
            });
        }
        let total = OUTER_HEADER_LEN + body_len;
        if buf.len() < total {
            self.needed = Some(total - buf.len());
            return Ok(Scrub::NeedMore);
        }
        self.needed = None;

        match header.kind {
            FrameKind::Auth => Ok(Scrub::Frame {
                kind: FrameKind::Auth,
                item: None,
                payload: OUTER_HEADER_LEN..total,
                consumed: total,
            }),
            FrameKind::Binlog => {
                let body = &buf[OUTER_HEADER_LEN..total];
                let item = codec::decode_item_sans_content(body)?;
                let content_len = codec::declared_content_len(body)?;
                let content_start = OUTER_HEADER_LEN + ITEM_HEADER_LEN;
                Ok(Scrub::Frame {
                    kind: FrameKind::Binlog,
                    item: Some(item),
                    payload: content_start..content_start + content_len,
                    consumed: total,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::resp::encode_command;

    fn binlog_frame(logic_id: u64, argv: &[&str]) -> Bytes {
        codec::encode_item(&BinlogItem {
            item_type: codec::ITEM_TYPE_FIRST,
            exec_time: 100,
            origin_id: 1,
            logic_id,
            file_num: 0,
            offset: 0,
            content: encode_command(argv),
            extends: Vec::new(),
        })
    }

    #[test]
    fn extracts_binlog_frame_spans() {
        let frame = binlog_frame(9, &["SET", "k", "v"]);
        let mut framer = Framer::new(1024);
        match framer.scrub(&frame).expect("scrub") {
            Scrub::Frame {
                kind,
                item,
                payload,
                consumed,
            } => {
                assert_eq!(kind, FrameKind::Binlog);
                assert_eq!(item.expect("item").logic_id, 9);
                assert_eq!(consumed, frame.len());
                assert_eq!(&frame[payload], &encode_command(&["SET", "k", "v"])[..]);
            }
            Scrub::NeedMore => panic!("frame is complete"),
        }
    }

    #[test]
    fn auth_frame_payload_is_whole_body() {
        let body = encode_command(&["auth", "7"]);
        let frame = codec::encode_auth(&body);
        let mut framer = Framer::new(1024);
        match framer.scrub(&frame).expect("scrub") {
            Scrub::Frame {
                kind,
                item,
                payload,
                consumed,
            } => {
                assert_eq!(kind, FrameKind::Auth);
                assert!(item.is_none());
                assert_eq!(consumed, frame.len());
                assert_eq!(&frame[payload], &body[..]);
            }
            Scrub::NeedMore => panic!("frame is complete"),
        }
    }

    #[test]
    fn partial_frame_reports_needed_bytes() {
        let frame = binlog_frame(1, &["PING"]);
        let mut framer = Framer::new(1024);

        // Header split: nothing is known yet.
        assert_eq!(framer.scrub(&frame[..4]).expect("scrub"), Scrub::NeedMore);
        assert_eq!(framer.needed_hint(), None);

        // Declared length known: forecast the missing tail.
        let cut = frame.len() - 3;
        assert_eq!(framer.scrub(&frame[..cut]).expect("scrub"), Scrub::NeedMore);
        assert_eq!(framer.needed_hint(), Some(3));

        // Completing the frame clears the forecast.
        assert!(matches!(
            framer.scrub(&frame).expect("scrub"),
            Scrub::Frame { .. }
        ));
        assert_eq!(framer.needed_hint(), None);
    }

    #[test]
    fn oversized_body_is_fatal_before_allocation() {
        let frame = binlog_frame(1, &["SET", "k", "v"]);
        let mut framer = Framer::new(8);
        let err = framer.scrub(&frame).expect_err("expected oversize");
        assert!(err.is_overflow());
    }

    #[test]
    fn cap_covers_header_and_body_together() {
        let frame = binlog_frame(1, &["PING"]);

        // A frame of exactly the cap is admitted; one byte over is not,
        // so nothing the framer admits can overflow the read buffer.
        let mut exact = Framer::new(frame.len());
        assert!(matches!(
            exact.scrub(&frame).expect("scrub"),
            Scrub::Frame { .. }
        ));

        let mut tight = Framer::new(frame.len() - 1);
        let err = tight.scrub(&frame).expect_err("expected oversize");
        assert!(err.is_overflow());
    }

    #[test]
    fn unknown_kind_is_fatal() {
        let mut frame = binlog_frame(1, &["PING"]).to_vec();
        frame[0] = 0;
        frame[1] = 7;
        let mut framer = Framer::new(1024);
        let err = framer.scrub(&frame).expect_err("expected violation");
        assert_eq!(err, CodecError::UnknownFrameType { kind: 7 });
    }

    #[test]
    fn leftover_bytes_stay_for_next_attempt() {
        let first = binlog_frame(1, &["PING"]);
        let second = binlog_frame(2, &["PING"]);
        let mut joined = first.to_vec();
        joined.extend_from_slice(&second);

        let mut framer = Framer::new(1024);
        let Scrub::Frame { consumed, .. } = framer.scrub(&joined).expect("scrub") else {
            panic!("first frame is complete");
        };
        assert_eq!(consumed, first.len());

        let Scrub::Frame { item, .. } = framer.scrub(&joined[consumed..]).expect("scrub") else {
            panic!("second frame is complete");
        };
        assert_eq!(item.expect("item").logic_id, 2);
    }
}
