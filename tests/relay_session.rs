//! End-to-end engine scenarios over in-memory streams.
//!
//! Drives `RelayConnection` through `tokio::io::duplex` exactly as the
//! external accept loop would: write wire bytes on one end, invoke
//! `on_readable`, observe dispatches on a recording sink.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

use binrelay::{
    BinlogItem,
    CommandSink,
    FrameKind,
    ReadStatus,
    RelayConfig,
    RelayConnection,
    RelayContext,
    RelayError,
    codec,
    resp::encode_command,
};

/// Sink recording every apply call in order.
#[derive(Default)]
struct RecordingSink {
    applied: Mutex<Vec<(Vec<Bytes>, Bytes)>>,
}

#[async_trait::async_trait]
impl CommandSink for RecordingSink {
    async fn apply(&self, argv: &[Bytes], shard_key: &Bytes) -> i32 {
        self.applied
            .lock()
            .await
            .push((argv.to_vec(), shard_key.clone()));
        0
    }
}

struct Harness {
    writer: DuplexStream,
    conn: RelayConnection<DuplexStream, RecordingSink>,
    sink: Arc<RecordingSink>,
    context: Arc<RelayContext>,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

fn harness_with(config: RelayConfig) -> Harness {
    init_tracing();
    let (writer, reader) = tokio::io::duplex(64 * 1024);
    let context = Arc::new(RelayContext::new(config));
    let sink = Arc::new(RecordingSink::default());
    let conn = RelayConnection::new(reader, "primary:9221", Arc::clone(&context), Arc::clone(&sink));
    Harness {
        writer,
        conn,
        sink,
        context,
    }
}

fn harness() -> Harness {
    harness_with(RelayConfig::new(7, "primary.example", 9221))
}

fn auth_frame(token: &str) -> Bytes {
    codec::encode_auth(&encode_command(&["auth", token]))
}

fn binlog_frame(logic_id: u64, argv: &[&str]) -> Bytes {
    codec::encode_item(&BinlogItem {
        item_type: codec::ITEM_TYPE_FIRST,
        exec_time: 1_700_000_000,
        origin_id: 1,
        logic_id,
        file_num: 2,
        offset: 4096,
        content: encode_command(argv),
        extends: Vec::new(),
    })
}

#[tokio::test]
async fn auth_then_binlog_dispatches_exactly_once() {
    let mut h = harness();

    h.writer.write_all(&auth_frame("7")).await.expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));
    assert!(h.conn.is_authenticated());

    h.writer
        .write_all(&binlog_frame(1, &["SET", "k", "v"]))
        .await
        .expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));

    let applied = h.sink.applied.lock().await;
    assert_eq!(applied.len(), 1);
    let (argv, key) = &applied[0];
    assert_eq!(
        argv,
        &vec![
            Bytes::from_static(b"SET"),
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v"),
        ]
    );
    assert_eq!(key, &Bytes::from_static(b"k"));
}

#[tokio::test]
async fn binlog_before_auth_is_rejected() {
    let mut h = harness();

    h.writer
        .write_all(&binlog_frame(1, &["SET", "k", "v"]))
        .await
        .expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));
    assert!(!h.conn.is_authenticated());
    assert!(h.sink.applied.lock().await.is_empty());
}

#[tokio::test]
async fn auth_mismatch_keeps_the_link_open_for_retry() {
    let mut h = harness();

    h.writer.write_all(&auth_frame("8")).await.expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));
    assert!(!h.conn.is_authenticated());

    // A later, correct token still authenticates.
    h.writer.write_all(&auth_frame("7")).await.expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));
    assert!(h.conn.is_authenticated());
}

#[tokio::test]
async fn concatenated_frames_dispatch_in_arrival_order() {
    let mut h = harness();

    let mut wire = auth_frame("7").to_vec();
    wire.extend_from_slice(&binlog_frame(1, &["SET", "a", "1"]));
    wire.extend_from_slice(&binlog_frame(2, &["SET", "b", "2"]));
    h.writer.write_all(&wire).await.expect("write");

    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));

    let applied = h.sink.applied.lock().await;
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[0].0[1], Bytes::from_static(b"a"));
    assert_eq!(applied[1].0[1], Bytes::from_static(b"b"));
}

#[tokio::test]
async fn truncated_frame_resumes_without_loss_or_duplication() {
    let mut h = harness();

    h.writer.write_all(&auth_frame("7")).await.expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));

    let frame = binlog_frame(5, &["SET", "k", "v"]);
    let cut = frame.len() - 3;
    h.writer.write_all(&frame[..cut]).await.expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::NeedMore));
    assert!(h.sink.applied.lock().await.is_empty());

    h.writer.write_all(&frame[cut..]).await.expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));
    assert_eq!(h.sink.applied.lock().await.len(), 1);
}

#[tokio::test]
async fn padding_frames_are_discarded_silently() {
    let mut h = harness();

    h.writer.write_all(&auth_frame("7")).await.expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));

    let padding = codec::build_padding(FrameKind::Binlog, 256).expect("padding");
    h.writer.write_all(&padding).await.expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));
    assert!(h.sink.applied.lock().await.is_empty());
}

#[tokio::test]
async fn oversized_declared_body_is_fatal() {
    let mut config = RelayConfig::new(7, "primary.example", 9221);
    config.read_chunk = 32;
    config.max_message_size = 64;
    let mut h = harness_with(config);

    // Declared body far beyond the cap; the header alone condemns it.
    let frame = binlog_frame(1, &["SET", "key", "a-much-longer-value-than-the-cap-allows"]);
    h.writer.write_all(&frame[..32]).await.expect("write");

    match h.conn.on_readable().await {
        ReadStatus::Error(RelayError::Codec(e)) => assert!(e.is_overflow()),
        other => panic!("expected codec overflow, got {other:?}"),
    }
}

#[tokio::test]
async fn peer_close_reports_closed() {
    let mut h = harness();
    drop(h.writer);
    assert!(matches!(h.conn.on_readable().await, ReadStatus::Closed));
}

#[tokio::test]
async fn supervisor_force_teardown_stops_the_driver() {
    let h = harness();
    let (_id, token) = h.context.registry().register();

    let driver = tokio::spawn(h.conn.run(token));
    h.context.registry().kill_all();

    let result = tokio::time::timeout(std::time::Duration::from_secs(1), driver)
        .await
        .expect("driver should stop promptly")
        .expect("driver task");
    assert!(result.is_ok());
}

#[tokio::test]
async fn garbled_embedded_command_is_fatal() {
    let mut h = harness();

    h.writer.write_all(&auth_frame("7")).await.expect("write");
    assert!(matches!(h.conn.on_readable().await, ReadStatus::FrameConsumed));

    // Valid framing around content that is not a RESP command.
    let frame = codec::encode_item(&BinlogItem {
        item_type: codec::ITEM_TYPE_FIRST,
        content: Bytes::from_static(b"not a command"),
        ..BinlogItem::default()
    });
    h.writer.write_all(&frame).await.expect("write");
    assert!(matches!(
        h.conn.on_readable().await,
        ReadStatus::Error(RelayError::Resp(_))
    ));
}
