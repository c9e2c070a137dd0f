//! Connection engine for one primary-originated binlog link.
//!
//! The engine owns the read buffer, the framer and the command sub-parser
//! for its socket, and exposes [`RelayConnection::on_readable`] to the
//! external accept loop: one readable event in, one [`ReadStatus`] out.
//! Frames are pulled apart in two nested layers sharing the buffer — the
//! binlog framing is scrubbed off first, then the embedded RESP command is
//! parsed from the span the framer marked. Dispatch is an explicit match
//! on the frame kind and the authentication state.
//!
//! [`RelayConnection::run`] drives the readable loop under a
//! [`CancellationToken`] so the heartbeat supervisor can force-close the
//! link concurrently with an in-progress read.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::{
    buffer::ReadBuffer,
    codec::{BinlogItem, FrameKind},
    context::RelayContext,
    error::{ReadStatus, RelayError},
    framer::{Framer, Scrub},
    resp::{Parse, RespError, RespParser},
    sink::{self, CommandSink},
};

/// Command name of the inert filler frames some producers emit.
const PADDING_COMMAND: &[u8] = b"padding";

/// Engine state for one accepted binlog connection.
pub struct RelayConnection<S, K> {
    stream: S,
    peer: String,
    context: Arc<RelayContext>,
    sink: Arc<K>,
    buffer: ReadBuffer,
    framer: Framer,
    parser: RespParser,
    is_authenticated: bool,
    /// Minimum bytes the next read should satisfy; `None` means any.
    bulk_len: Option<usize>,
}

impl<S, K> RelayConnection<S, K>
where
    S: AsyncRead + Unpin + Send,
    K: CommandSink,
{
    /// Wrap an accepted stream, sizing buffers from the context's
    /// configuration.
    pub fn new(stream: S, peer: impl Into<String>, context: Arc<RelayContext>, sink: Arc<K>) -> Self {
        let config = context.config();
        let max = config.max_message_size;
        let chunk = config.read_chunk;
        Self {
            stream,
            peer: peer.into(),
            context,
            sink,
            buffer: ReadBuffer::new(chunk, max),
            framer: Framer::new(max),
            parser: RespParser::new(max),
            is_authenticated: false,
            bulk_len: None,
        }
    }

    /// Whether the auth handshake has completed. The transition is
    /// one-way; nothing clears it.
    #[must_use]
    pub fn is_authenticated(&self) -> bool { self.is_authenticated }

    /// Handle one readable event: grow the buffer, read once, then frame
    /// and dispatch everything the read completed.
    pub async fn on_readable(&mut self) -> ReadStatus {
        if let Err(e) = self.buffer.prepare(self.bulk_len.take()) {
            return ReadStatus::Error(e);
        }

        match self.stream.read_buf(self.buffer.writable()).await {
            Ok(0) => return ReadStatus::Closed,
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return ReadStatus::NeedMore;
            }
            Err(e) => return ReadStatus::Error(e.into()),
        }

        let mut consumed_any = false;
        while !self.buffer.is_empty() {
            match self.framer.scrub(self.buffer.as_slice()) {
                Ok(Scrub::NeedMore) => break,
                Ok(Scrub::Frame {
                    kind,
                    item,
                    payload,
                    consumed,
                }) => {
                    if let Err(e) = self.process_frame(kind, item.as_ref(), payload).await {
                        return ReadStatus::Error(e);
                    }
                    self.buffer.consume(consumed);
                    consumed_any = true;
                }
                Err(e) => return ReadStatus::Error(e.into()),
            }
        }

        if self.buffer.is_empty() {
            self.buffer.reset();
            self.bulk_len = self.parser.bulk_hint();
        } else {
            // Mid-frame: keep the bytes and forecast the missing tail.
            self.bulk_len = self.framer.needed_hint();
        }

        if consumed_any {
            ReadStatus::FrameConsumed
        } else {
            ReadStatus::NeedMore
        }
    }

    /// Drive the readable loop until close, error, or forced teardown.
    ///
    /// The token is cancelled by the heartbeat supervisor when it declares
    /// the primary unreachable; the socket is closed by drop here, never
    /// from the supervisor's context.
    ///
    /// # Errors
    ///
    /// Returns the [`RelayError`] that made the connection fatal.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), RelayError> {
        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    tracing::info!(peer = %self.peer, "binlog link force-closed");
                    return Ok(());
                }

                status = self.on_readable() => match status {
                    ReadStatus::NeedMore | ReadStatus::FrameConsumed => {}
                    ReadStatus::Closed => {
                        tracing::info!(peer = %self.peer, "binlog sender closed the link");
                        return Ok(());
                    }
                    ReadStatus::Error(e) => {
                        tracing::warn!(peer = %self.peer, error = %e, "binlog link failed");
                        #[cfg(feature = "metrics")]
                        crate::metrics::inc_errors();
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Parse every command in the frame's payload span and dispatch each.
    async fn process_frame(
        &mut self,
        kind: FrameKind,
        item: Option<&BinlogItem>,
        payload: std::ops::Range<usize>,
    ) -> Result<(), RelayError> {
        let mut commands = Vec::new();
        let mut span = &self.buffer.as_slice()[payload];
        while !span.is_empty() {
            match self.parser.parse(span)? {
                Parse::NeedMore { .. } => {
                    // The framer only releases complete frames; content
                    // that ends mid-array can never be finished by more
                    // socket bytes.
                    return Err(RespError::Protocol {
                        reason: "embedded command truncated at frame end",
                    }
                    .into());
                }
                Parse::Complete { argv, consumed } => {
                    span = &span[consumed..];
                    commands.push(argv);
                }
            }
        }
        for argv in commands {
            self.dispatch(kind, &argv, item).await;
        }
        Ok(())
    }

    async fn dispatch(&mut self, kind: FrameKind, argv: &[Bytes], item: Option<&BinlogItem>) {
        match kind {
            FrameKind::Auth => {
                self.process_auth(argv);
            }
            FrameKind::Binlog => {
                self.process_binlog(argv, item).await;
            }
        }
    }

    /// Auth handshake: a two-argument `auth <token>` command whose token
    /// matches this node's identity. Failure leaves the link open; the
    /// sender may retry.
    fn process_auth(&mut self, argv: &[Bytes]) {
        let token_matches = argv.len() == 2
            && argv[0].eq_ignore_ascii_case(b"auth")
            && argv[1] == self.context.config().auth_token().as_bytes();
        if token_matches {
            self.is_authenticated = true;
            tracing::info!(
                peer = %self.peer,
                node_id = self.context.config().node_id,
                "binlog sender authenticated"
            );
        } else {
            tracing::warn!(
                peer = %self.peer,
                node_id = self.context.config().node_id,
                "binlog sender auth failed"
            );
        }
    }

    /// Forward one replicated command to the data-serving layer.
    async fn process_binlog(&mut self, argv: &[Bytes], item: Option<&BinlogItem>) {
        if !self.is_authenticated {
            tracing::warn!(peer = %self.peer, "binlog frame before auth, discarded");
            return;
        }
        let Some(name) = argv.first() else {
            return;
        };
        if name.eq_ignore_ascii_case(PADDING_COMMAND) {
            tracing::debug!(peer = %self.peer, "padding frame discarded");
            return;
        }

        let key = sink::shard_key(argv);
        let status = self.sink.apply(argv, &key).await;
        #[cfg(feature = "metrics")]
        crate::metrics::inc_frames();
        if status != 0 {
            let (logic_id, file_num, offset) = item
                .map(|i| (i.logic_id, i.file_num, i.offset))
                .unwrap_or_default();
            tracing::warn!(
                peer = %self.peer,
                status,
                logic_id,
                file_num,
                offset,
                "command apply reported failure, relay continues"
            );
        }
    }
}
