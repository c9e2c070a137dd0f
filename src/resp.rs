//! Resumable parser and serializer for the embedded RESP command protocol.
//!
//! Both auth bodies and binlog item content carry one command invocation
//! serialized as a RESP multibulk request: `*N\r\n` followed by N bulk
//! strings `$len\r\n<bytes>\r\n`. The parser is incremental: it consumes
//! only the bytes it fully interprets, retains completed arguments and the
//! pending bulk length across calls, and reports how many bytes each call
//! consumed so the caller can advance its own buffer.
//!
//! Bulk length prefixes may carry leading zeros; padding frames use a
//! fixed-width length field.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Default per-command size cap, matching the relay's message size cap.
pub const DEFAULT_MAX_COMMAND_LEN: usize = 512 * 1024 * 1024;

/// Smallest wire footprint of one bulk string: `$0\r\n\r\n`.
const MIN_BULK_WIRE_LEN: usize = 6;

/// Ceiling on speculative `argv` pre-allocation; longer commands grow on
/// push.
const ARGV_PREALLOC_CAP: usize = 1024;

/// Fatal failures raised by the command sub-parser.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RespError {
    /// Malformed multibulk or bulk length prefix.
    #[error("RESP protocol violation: {reason}")]
    Protocol {
        /// Human-readable description of the violation.
        reason: &'static str,
    },

    /// A single command would exceed the configured size cap.
    #[error("command of {size} bytes exceeds cap of {max}")]
    Oversize {
        /// Running size of the command being parsed.
        size: usize,
        /// Configured cap.
        max: usize,
    },
}

/// Outcome of one [`RespParser::parse`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum Parse {
    /// Input ended mid-command; `consumed` bytes were absorbed into the
    /// parser's partial state and must not be offered again.
    NeedMore {
        /// Bytes consumed by this call.
        consumed: usize,
    },
    /// One full command was parsed.
    Complete {
        /// Ordered argument list, first element is the command name.
        argv: Vec<Bytes>,
        /// Bytes consumed by this call. Trailing bytes beyond the command
        /// remain for a subsequent call.
        consumed: usize,
    },
}

/// Incremental RESP multibulk request parser.
///
/// Owns only minimal resumption state: arguments parsed so far, the count
/// of elements still expected, and the declared length of a bulk whose
/// payload has not fully arrived.
#[derive(Debug)]
pub struct RespParser {
    max_command_len: usize,
    /// Elements still expected in the current array, if one is open.
    remaining: Option<usize>,
    /// Declared payload length of the bulk currently awaited.
    pending_bulk: Option<usize>,
    argv: Vec<Bytes>,
    /// Running byte size of the command being assembled.
    command_size: usize,
}

impl Default for RespParser {
    fn default() -> Self { Self::new(DEFAULT_MAX_COMMAND_LEN) }
}

impl RespParser {
    /// Create a parser enforcing `max_command_len` per command.
    #[must_use]
    pub fn new(max_command_len: usize) -> Self {
        Self {
            max_command_len,
            remaining: None,
            pending_bulk: None,
            argv: Vec::new(),
            command_size: 0,
        }
    }

    /// True when no command is partially assembled.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.remaining.is_none() }

    /// Minimum bytes the next read should satisfy, when known.
    ///
    /// Populated while a bulk payload is awaited: the declared length plus
    /// its trailing CRLF. Drives the connection engine's buffer pre-sizing.
    #[must_use]
    pub fn bulk_hint(&self) -> Option<usize> { self.pending_bulk.map(|len| len + 2) }

    /// Parse as much of one command as `buf` allows.
    ///
    /// # Errors
    ///
    /// Returns [`RespError::Protocol`] on malformed length prefixes and
    /// [`RespError::Oversize`] when the command being assembled passes the
    /// size cap. Both are fatal: the parser's framing alignment is lost.
    pub fn parse(&mut self, buf: &[u8]) -> Result<Parse, RespError> {
        let mut pos = 0;

        if self.remaining.is_none() {
            match read_prefixed_line(&buf[pos..], b'*')? {
                None => return Ok(Parse::NeedMore { consumed: pos }),
                Some((count, line_len)) => {
                    if count == 0 {
                        return Err(RespError::Protocol {
                            reason: "empty multibulk command",
                        });
                    }
                    // Wire-supplied count: bound it by the smallest wire
                    // footprint a command of that arity can have before
                    // reserving anything for it.
                    let floor = count
                        .checked_mul(MIN_BULK_WIRE_LEN)
                        .ok_or(RespError::Protocol {
                            reason: "element count out of range",
                        })?;
                    if floor > self.max_command_len {
                        return Err(RespError::Oversize {
                            size: floor,
                            max: self.max_command_len,
                        });
                    }
                    pos += line_len;
                    self.remaining = Some(count);
                    self.argv = Vec::with_capacity(count.min(ARGV_PREALLOC_CAP));
                    self.command_size = line_len;
                    self.check_size()?;
                }
            }
        }

        while self.remaining.is_some_and(|r| r > 0) {
            let len = match self.pending_bulk {
                Some(len) => len,
                None => match read_prefixed_line(&buf[pos..], b'$')? {
                    None => return Ok(Parse::NeedMore { consumed: pos }),
                    Some((len, line_len)) => {
                        // Reject the declared length itself before any
                        // arithmetic or allocation depends on it.
                        if len > self.max_command_len {
                            return Err(RespError::Oversize {
                                size: len,
                                max: self.max_command_len,
                            });
                        }
                        pos += line_len;
                        self.command_size =
                            self.command_size.saturating_add(line_len + len + 2);
                        self.check_size()?;
                        self.pending_bulk = Some(len);
                        len
                    }
                },
            };

            let Some(payload) = buf.get(pos..pos + len + 2) else {
                return Ok(Parse::NeedMore { consumed: pos });
            };
            if &payload[len..] != b"\r\n" {
                return Err(RespError::Protocol {
                    reason: "bulk payload not terminated by CRLF",
                });
            }
            self.argv.push(Bytes::copy_from_slice(&payload[..len]));
            pos += len + 2;
            self.pending_bulk = None;
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
        }

        self.remaining = None;
        self.command_size = 0;
        Ok(Parse::Complete {
            argv: std::mem::take(&mut self.argv),
            consumed: pos,
        })
    }

    fn check_size(&self) -> Result<(), RespError> {
        if self.command_size > self.max_command_len {
            return Err(RespError::Oversize {
                size: self.command_size,
                max: self.max_command_len,
            });
        }
        Ok(())
    }
}

/// Read one `<marker><digits>\r\n` line from the front of `buf`.
///
/// Returns `Ok(None)` when the line is not yet complete, and the parsed
/// value plus the line's byte length otherwise. Leading zeros are accepted.
fn read_prefixed_line(buf: &[u8], marker: u8) -> Result<Option<(usize, usize)>, RespError> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != marker {
        return Err(RespError::Protocol {
            reason: "unexpected multibulk marker",
        });
    }
    let Some(rel) = buf.windows(2).position(|w| w == b"\r\n") else {
        // A length line never legitimately exceeds marker + 20 digits.
        if buf.len() > 32 {
            return Err(RespError::Protocol {
                reason: "unterminated length line",
            });
        }
        return Ok(None);
    };
    let digits = &buf[1..rel];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(RespError::Protocol {
            reason: "non-numeric length field",
        });
    }
    let mut value = 0_usize;
    for d in digits {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(usize::from(d - b'0')))
            .ok_or(RespError::Protocol {
                reason: "length field out of range",
            })?;
    }
    Ok(Some((value, rel + 2)))
}

/// Serialize an argument list as a RESP multibulk request.
///
/// This is the exact inverse of [`RespParser::parse`] and is used by the
/// heartbeat link for its `spci`/`ping` messages and by tests building
/// frame content.
#[must_use]
pub fn encode_command<A: AsRef<[u8]>>(argv: &[A]) -> Bytes {
    let mut dst = BytesMut::new();
    dst.put_slice(format!("*{}\r\n", argv.len()).as_bytes());
    for arg in argv {
        let arg = arg.as_ref();
        dst.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        dst.put_slice(arg);
        dst.put_slice(b"\r\n");
    }
    dst.freeze()
}

/// Decode one server reply into its textual token.
///
/// The heartbeat link only ever expects simple-string (`+PONG\r\n`), error
/// (`-ERR ...\r\n`) or bulk (`$4\r\npong\r\n`) replies; anything else is a
/// protocol failure. Returns the token and the bytes consumed, or `None`
/// when the reply is not yet complete.
///
/// # Errors
///
/// Returns [`RespError::Protocol`] for a reply outside those three shapes.
pub fn decode_reply_token(buf: &[u8]) -> Result<Option<(Bytes, usize)>, RespError> {
    let Some(&marker) = buf.first() else {
        return Ok(None);
    };
    match marker {
        b'+' | b'-' => {
            let Some(rel) = buf.windows(2).position(|w| w == b"\r\n") else {
                return Ok(None);
            };
            Ok(Some((Bytes::copy_from_slice(&buf[1..rel]), rel + 2)))
        }
        b'$' => {
            let Some((len, line_len)) = read_prefixed_line(buf, b'$')? else {
                return Ok(None);
            };
            let Some(payload) = buf.get(line_len..line_len + len + 2) else {
                return Ok(None);
            };
            if &payload[len..] != b"\r\n" {
                return Err(RespError::Protocol {
                    reason: "bulk reply not terminated by CRLF",
                });
            }
            Ok(Some((
                Bytes::copy_from_slice(&payload[..len]),
                line_len + len + 2,
            )))
        }
        _ => Err(RespError::Protocol {
            reason: "unsupported reply type",
        }),
    }
}
