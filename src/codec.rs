//! Fixed-layout wire codec for the binlog relay protocol.
//!
//! Every frame on the relay link starts with a six-byte outer header naming
//! the frame kind and the body length. Auth frames carry a RESP command
//! directly in the body; binlog frames carry a 34-byte item header, the
//! item content (itself a serialized RESP command) and any number of
//! trailing extension strings.
//!
//! ```text
//!  outer header          | kind: u16 | body_length: u32 |
//!  item header (binlog)  | type: u16 | exec_time: u32 | origin_id: u32 |
//!                        | logic_id: u64 | file_num: u32 | offset: u64 |
//!                        | content_length: u32 |
//! ```
//!
//! All integers are network byte order. Encoding is deterministic and
//! `decode_item(encode_item(x)) == x` for every well-formed item, including
//! empty content and empty extension lists.

use bytes::{BufMut, Bytes, BytesMut};

use crate::byte_order::{
    read_network_u16,
    read_network_u32,
    read_network_u64,
    write_network_u16,
    write_network_u32,
    write_network_u64,
};

pub mod error;

pub use error::CodecError;

/// Size of the outer frame header in bytes.
pub const OUTER_HEADER_LEN: usize = 6;

/// Size of the binlog item header in bytes.
pub const ITEM_HEADER_LEN: usize = 34;

/// Item type tag carried in the item header. Only one layout generation
/// exists so far.
pub const ITEM_TYPE_FIRST: u16 = 1;

/// Length prefix size for each trailing extension string.
const EXT_PREFIX_LEN: usize = 4;

/// RESP overhead of the padding command, excluding the filler itself and
/// its fixed-width length field.
const PADDING_PROTOCOL_OVERHEAD: usize = 22;

/// Digits reserved for the padding filler's bulk length field.
const PADDING_LEN_DIGITS: usize = 5;

/// Kind tag carried by the outer frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Authentication handshake; the body is a RESP command.
    Auth,
    /// Replicated operation; the body is an item header plus content.
    Binlog,
}

impl FrameKind {
    /// Map the raw wire value onto the enumeration.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownFrameType`] for values outside the
    /// enumeration.
    pub fn from_wire(kind: u16) -> Result<Self, CodecError> {
        match kind {
            1 => Ok(Self::Auth),
            2 => Ok(Self::Binlog),
            other => Err(CodecError::UnknownFrameType { kind: other }),
        }
    }

    /// Raw value written to the wire.
    #[must_use]
    pub fn to_wire(self) -> u16 {
        match self {
            Self::Auth => 1,
            Self::Binlog => 2,
        }
    }
}

/// Decoded outer frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame kind tag.
    pub kind: FrameKind,
    /// Length of the body following the header.
    pub body_length: u32,
}

impl FrameHeader {
    /// Decode the six-byte outer header from the front of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedHeader`] when fewer than six bytes
    /// are supplied and [`CodecError::UnknownFrameType`] for an
    /// unrecognised kind tag.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let Some(raw) = bytes.get(..OUTER_HEADER_LEN) else {
            return Err(CodecError::MalformedHeader {
                have: bytes.len(),
                need: OUTER_HEADER_LEN,
            });
        };
        let kind = FrameKind::from_wire(read_network_u16([raw[0], raw[1]]))?;
        let body_length = read_network_u32([raw[2], raw[3], raw[4], raw[5]]);
        Ok(Self { kind, body_length })
    }

    /// Append the encoded header to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_slice(&write_network_u16(self.kind.to_wire()));
        dst.put_slice(&write_network_u32(self.body_length));
    }
}

/// One replicated operation with its sequencing metadata.
///
/// `file_num` and `offset` locate the item in the origin's log and are
/// relayed untouched; `logic_id` increases monotonically per origin. The
/// extension list is a forward-compatibility payload: unrecognised entries
/// must survive a decode/encode round trip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BinlogItem {
    /// Item layout generation tag ([`ITEM_TYPE_FIRST`]).
    pub item_type: u16,
    /// Seconds-resolution execution timestamp at the origin.
    pub exec_time: u32,
    /// Identifier of the node that emitted the item.
    pub origin_id: u32,
    /// Monotonically increasing per-origin sequence number.
    pub logic_id: u64,
    /// Log file number at the origin.
    pub file_num: u32,
    /// Byte offset within that log file.
    pub offset: u64,
    /// Fully serialized RESP command.
    pub content: Bytes,
    /// Ordered forward-compatibility strings.
    pub extends: Vec<Bytes>,
}

impl BinlogItem {
    /// Total encoded body length: item header, content and extensions.
    #[must_use]
    pub fn body_len(&self) -> usize {
        let ext: usize = self
            .extends
            .iter()
            .map(|e| EXT_PREFIX_LEN + e.len())
            .sum();
        ITEM_HEADER_LEN + self.content.len() + ext
    }
}

/// Encode a binlog item as a complete frame: outer header, item header,
/// content and extension strings.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "Body and content lengths are validated against u32 ranges by the buffer cap."
)]
pub fn encode_item(item: &BinlogItem) -> Bytes {
    let body_len = item.body_len();
    let mut dst = BytesMut::with_capacity(OUTER_HEADER_LEN + body_len);
    FrameHeader {
        kind: FrameKind::Binlog,
        body_length: body_len as u32,
    }
    .encode_into(&mut dst);
    dst.put_slice(&write_network_u16(item.item_type));
    dst.put_slice(&write_network_u32(item.exec_time));
    dst.put_slice(&write_network_u32(item.origin_id));
    dst.put_slice(&write_network_u64(item.logic_id));
    dst.put_slice(&write_network_u32(item.file_num));
    dst.put_slice(&write_network_u64(item.offset));
    dst.put_slice(&write_network_u32(item.content.len() as u32));
    dst.put_slice(&item.content);
    for ext in &item.extends {
        dst.put_slice(&write_network_u32(ext.len() as u32));
        dst.put_slice(ext);
    }
    dst.freeze()
}

/// Encode an auth frame wrapping a serialized RESP command.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "Auth payloads are short command serializations."
)]
pub fn encode_auth(payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(OUTER_HEADER_LEN + payload.len());
    FrameHeader {
        kind: FrameKind::Auth,
        body_length: payload.len() as u32,
    }
    .encode_into(&mut dst);
    dst.put_slice(payload);
    dst.freeze()
}

/// Decode a binlog item from a frame body (the bytes following the outer
/// header).
///
/// # Errors
///
/// Returns [`CodecError::MalformedHeader`] when the body is shorter than
/// the 34-byte item header, [`CodecError::LengthMismatch`] when the
/// declared content length overruns the body, and
/// [`CodecError::ExtensionOverrun`] when a trailing extension prefix does.
pub fn decode_item(body: &[u8]) -> Result<BinlogItem, CodecError> {
    let mut item = decode_item_sans_content(body)?;
    let declared = declared_content_len(body)?;
    item.content = Bytes::copy_from_slice(&body[ITEM_HEADER_LEN..ITEM_HEADER_LEN + declared]);
    Ok(item)
}

/// Decode and validate a frame body without copying the content bytes.
///
/// The returned item carries the header metadata and extension strings but
/// an empty `content`; the caller addresses the content in place via
/// [`declared_content_len`]. Used by the framer, which hands the content
/// span to the command sub-parser without duplicating it.
///
/// # Errors
///
/// Same conditions as [`decode_item`].
pub fn decode_item_sans_content(body: &[u8]) -> Result<BinlogItem, CodecError> {
    let mut item = decode_item_header(body)?;
    let declared = declared_content_len(body)?;
    let available = body.len() - ITEM_HEADER_LEN;
    if declared > available {
        return Err(CodecError::LengthMismatch {
            declared,
            available,
        });
    }

    let mut rest = &body[ITEM_HEADER_LEN + declared..];
    while !rest.is_empty() {
        let Some(prefix) = rest.get(..EXT_PREFIX_LEN) else {
            return Err(CodecError::ExtensionOverrun {
                declared: EXT_PREFIX_LEN,
                available: rest.len(),
            });
        };
        let len = read_network_u32([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        rest = &rest[EXT_PREFIX_LEN..];
        if len > rest.len() {
            return Err(CodecError::ExtensionOverrun {
                declared: len,
                available: rest.len(),
            });
        }
        item.extends.push(Bytes::copy_from_slice(&rest[..len]));
        rest = &rest[len..];
    }
    Ok(item)
}

/// Decode only the fixed 34-byte item header, leaving content empty.
///
/// Used by the framer to surface sequencing metadata before the content is
/// handed to the command sub-parser.
///
/// # Errors
///
/// Returns [`CodecError::MalformedHeader`] when fewer than 34 bytes are
/// supplied.
pub fn decode_item_header(body: &[u8]) -> Result<BinlogItem, CodecError> {
    if body.len() < ITEM_HEADER_LEN {
        return Err(CodecError::MalformedHeader {
            have: body.len(),
            need: ITEM_HEADER_LEN,
        });
    }
    Ok(BinlogItem {
        item_type: read_network_u16([body[0], body[1]]),
        exec_time: read_network_u32([body[2], body[3], body[4], body[5]]),
        origin_id: read_network_u32([body[6], body[7], body[8], body[9]]),
        logic_id: read_network_u64([
            body[10], body[11], body[12], body[13], body[14], body[15], body[16], body[17],
        ]),
        file_num: read_network_u32([body[18], body[19], body[20], body[21]]),
        offset: read_network_u64([
            body[22], body[23], body[24], body[25], body[26], body[27], body[28], body[29],
        ]),
        content: Bytes::new(),
        extends: Vec::new(),
    })
}

/// Content length declared by an item header.
///
/// # Errors
///
/// Returns [`CodecError::MalformedHeader`] when fewer than 34 bytes are
/// supplied.
pub fn declared_content_len(body: &[u8]) -> Result<usize, CodecError> {
    if body.len() < ITEM_HEADER_LEN {
        return Err(CodecError::MalformedHeader {
            have: body.len(),
            need: ITEM_HEADER_LEN,
        });
    }
    Ok(read_network_u32([body[30], body[31], body[32], body[33]]) as usize)
}

/// Smallest frame [`build_padding`] can represent.
pub const MIN_PADDING_FRAME: usize =
    OUTER_HEADER_LEN + ITEM_HEADER_LEN + PADDING_PROTOCOL_OVERHEAD + PADDING_LEN_DIGITS;

/// Build an inert filler frame of exactly `size` total bytes.
///
/// The content is the syntactically valid RESP command
/// `*2\r\n$7\r\npadding\r\n$NNNNN\r\n<spaces>\r\n`, with the filler length
/// written as five zero-padded digits so producers can size the frame
/// without reflowing the command. Relays parse it like any other frame and
/// discard it by command name.
///
/// Returns `None` when `size` is below [`MIN_PADDING_FRAME`] or the filler
/// would not fit in five digits.
#[must_use]
pub fn build_padding(kind: FrameKind, size: usize) -> Option<Bytes> {
    if size < MIN_PADDING_FRAME {
        return None;
    }
    let filler_len = size - MIN_PADDING_FRAME;
    if filler_len > 99_999 {
        return None;
    }

    let mut content = BytesMut::with_capacity(size - OUTER_HEADER_LEN - ITEM_HEADER_LEN);
    content.put_slice(b"*2\r\n$7\r\npadding\r\n$");
    content.put_slice(format!("{filler_len:0width$}", width = PADDING_LEN_DIGITS).as_bytes());
    content.put_slice(b"\r\n");
    content.put_bytes(b' ', filler_len);
    content.put_slice(b"\r\n");

    let item = BinlogItem {
        item_type: ITEM_TYPE_FIRST,
        content: content.freeze(),
        ..BinlogItem::default()
    };
    let mut frame = BytesMut::from(&encode_item(&item)[..]);
    // encode_item always writes the Binlog kind; rewrite it for callers
    // padding an auth-framed stream.
    frame[..2].copy_from_slice(&write_network_u16(kind.to_wire()));
    Some(frame.freeze())
}
