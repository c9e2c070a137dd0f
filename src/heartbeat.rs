//! Heartbeat supervision of the primary link.
//!
//! A single long-lived task per process connects to the primary's
//! heartbeat endpoint and pings it on a fixed one-second cadence. The
//! first message of the supervisor's lifetime announces this node's
//! identity (`spci <node id>`); every later iteration sends a plain
//! `ping`. Any reply other than an affirmative `pong`/`ok` (case
//! insensitive) is a protocol failure.
//!
//! Failure policy, from the relay's production thresholds: a single I/O
//! timeout is absorbed — the link is only declared dead once more than 30
//! seconds have passed since the last successful reply. Thirty consecutive
//! connect failures count the same as a dead link. Either way the
//! supervisor force-tears-down every binlog-receiving connection through
//! the registry and returns to the disconnected state.
//!
//! The staleness bookkeeping lives in [`HeartbeatState`], kept free of I/O
//! so the threshold logic is testable against a paused clock.

use std::{io, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{Instant, timeout},
};
use tokio_util::sync::CancellationToken;

use crate::{context::RelayContext, resp};

/// Staleness bookkeeping for one heartbeat link.
#[derive(Debug)]
pub struct HeartbeatState {
    last_interaction: Instant,
    stale_after: Duration,
}

impl HeartbeatState {
    /// Start the clock at link establishment.
    #[must_use]
    pub fn new(stale_after: Duration) -> Self {
        Self {
            last_interaction: Instant::now(),
            stale_after,
        }
    }

    /// Record a successful reply.
    pub fn touch(&mut self) { self.last_interaction = Instant::now(); }

    /// True once the threshold since the last successful reply has been
    /// exceeded; transient timeouts inside the window are absorbed.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        Instant::now().duration_since(self.last_interaction) > self.stale_after
    }
}

/// Outcome of one send/receive exchange on the heartbeat link.
#[derive(Debug)]
enum PingError {
    /// The per-operation I/O timeout elapsed.
    Timeout,
    /// The peer replied with something other than an affirmative token.
    Protocol(Bytes),
    /// Hard transport failure.
    Io(io::Error),
}

/// Supervisor for the outbound heartbeat link.
pub struct HeartbeatSupervisor {
    context: Arc<RelayContext>,
    sent_identity: bool,
}

impl HeartbeatSupervisor {
    /// Create a supervisor over the shared relay context.
    #[must_use]
    pub fn new(context: Arc<RelayContext>) -> Self {
        Self {
            context,
            sent_identity: false,
        }
    }

    /// Run until `stop` is cancelled or the context stops requesting
    /// pings. Intended to be spawned once per process.
    pub async fn run(mut self, stop: CancellationToken) {
        let mut connect_retries: u32 = 0;
        let interval = self.context.config().heartbeat_interval();

        while !stop.is_cancelled() && self.context.should_ping_master() {
            match self.connect().await {
                Ok(stream) => {
                    connect_retries = 0;
                    self.context.plus_master_connection();
                    self.ping_loop(stream, &stop).await;
                    self.context.registry().kill_all();
                    self.context.minus_master_connection();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "heartbeat connect failed");
                    connect_retries += 1;
                    if connect_retries >= self.context.config().connect_retry_limit {
                        tracing::warn!(
                            retries = connect_retries,
                            "heartbeat connect retries exhausted, disconnecting from master"
                        );
                        self.context.registry().kill_all();
                        connect_retries = 0;
                    }
                }
            }

            tokio::select! {
                () = stop.cancelled() => {}
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn connect(&self) -> io::Result<TcpStream> {
        let addr = self.context.config().heartbeat_addr();
        let io_timeout = self.context.config().heartbeat_io_timeout();
        match timeout(io_timeout, TcpStream::connect(&addr)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {addr} timed out"),
            )),
        }
    }

    /// Ping until the link dies or a stop is requested. Exits with the
    /// socket closed; the caller performs the teardown and bookkeeping.
    async fn ping_loop(&mut self, mut stream: TcpStream, stop: &CancellationToken) {
        let config = self.context.config();
        let interval = config.heartbeat_interval();
        let mut state = HeartbeatState::new(config.heartbeat_stale_after());

        loop {
            if stop.is_cancelled() {
                tracing::info!("heartbeat stop requested, closing link");
                return;
            }

            match self.exchange(&mut stream).await {
                Ok(()) => state.touch(),
                Err(PingError::Timeout) => {
                    tracing::warn!("heartbeat timed out once");
                    if state.is_stale() {
                        tracing::info!("ping master timed out past threshold");
                        return;
                    }
                }
                Err(PingError::Protocol(token)) => {
                    tracing::warn!(reply = ?token, "unexpected heartbeat reply");
                    return;
                }
                Err(PingError::Io(e)) => {
                    tracing::warn!(error = %e, "ping master failed");
                    return;
                }
            }

            tokio::select! {
                () = stop.cancelled() => {}
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One send/receive cycle under the per-operation timeout.
    async fn exchange(&mut self, stream: &mut TcpStream) -> Result<(), PingError> {
        let io_timeout = self.context.config().heartbeat_io_timeout();
        let message = if self.sent_identity {
            resp::encode_command(&["ping"])
        } else {
            let node_id = self.context.config().node_id.to_string();
            let announce = resp::encode_command(&["spci", node_id.as_str()]);
            self.sent_identity = true;
            tracing::info!(node_id = %node_id, "announcing identity");
            announce
        };

        match timeout(io_timeout, stream.write_all(&message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(PingError::Io(e)),
            Err(_) => return Err(PingError::Timeout),
        }

        let token = match timeout(io_timeout, read_reply(stream)).await {
            Ok(Ok(token)) => token,
            Ok(Err(ReplyError::Io(e))) => return Err(PingError::Io(e)),
            Ok(Err(ReplyError::Malformed(token))) => return Err(PingError::Protocol(token)),
            Err(_) => return Err(PingError::Timeout),
        };

        if token.eq_ignore_ascii_case(b"pong") || token.eq_ignore_ascii_case(b"ok") {
            Ok(())
        } else {
            Err(PingError::Protocol(token))
        }
    }
}

enum ReplyError {
    Io(io::Error),
    Malformed(Bytes),
}

/// Read one reply token from the heartbeat socket, tolerating replies
/// split across reads.
async fn read_reply(stream: &mut TcpStream) -> Result<Bytes, ReplyError> {
    let mut buf = Vec::with_capacity(64);
    let mut chunk = [0_u8; 64];
    loop {
        let n = stream.read(&mut chunk).await.map_err(ReplyError::Io)?;
        if n == 0 {
            return Err(ReplyError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "heartbeat peer closed",
            )));
        }
        buf.extend_from_slice(&chunk[..n]);
        match resp::decode_reply_token(&buf) {
            Ok(Some((token, _))) => return Ok(token),
            Ok(None) => {}
            Err(_) => return Err(ReplyError::Malformed(Bytes::copy_from_slice(&buf))),
        }
    }
}
