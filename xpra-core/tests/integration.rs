//! Integration tests - engine lifecycle, command handling and input
//! encoding against recording collaborators, plus a real TCP session
//! on localhost.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::codec::Decoder;

use xpra_core::packet::{enframe, raw_frame};
use xpra_core::{
    Clock, Collaborators, ConnectTarget, ConnectionState, Deframed, Deframer, Display, DrawImage,
    DrawUpdate, Engine, EngineConfig, FrameResult, InputGrab, Modifiers, PacketHeader,
    StatusListener, TcpTransport, Transport, TransportEvent, Value, XpraCodec, XpraError,
};

// ── Recording collaborators ──────────────────────────────────────

#[derive(Default)]
struct Log {
    opened: Vec<ConnectTarget>,
    closes: usize,
    sent: Vec<Value>,
    resizes: Vec<(u32, u32)>,
    fb_resizes: Vec<(u32, u32)>,
    draws: Vec<DrawImage>,
    completed: Vec<DrawUpdate>,
    clears: usize,
    viewport: Vec<(i32, i32)>,
    grabs: usize,
    ungrabs: usize,
    states: Vec<(ConnectionState, ConnectionState, Option<String>)>,
    bells: Vec<i64>,
    clipboard: Vec<String>,
}

type Shared = Rc<RefCell<Log>>;

fn decode_frame(frame: &[u8]) -> Value {
    match Deframer::new().deframe(frame).unwrap() {
        FrameResult::Consumed {
            message: Some(message),
            ..
        } => message,
        other => panic!("not a complete message frame: {other:?}"),
    }
}

fn tag(message: &Value) -> String {
    message.as_list().unwrap()[0].as_str().unwrap().to_owned()
}

fn args(message: &Value) -> Vec<Value> {
    message.as_list().unwrap()[1..].to_vec()
}

struct MockTransport(Shared);

impl Transport for MockTransport {
    fn open(&mut self, target: &ConnectTarget, _protocols: &[&str]) {
        self.0.borrow_mut().opened.push(target.clone());
    }

    fn close(&mut self) {
        self.0.borrow_mut().closes += 1;
    }

    fn send(&mut self, frame: Bytes) {
        self.0.borrow_mut().sent.push(decode_frame(&frame));
    }
}

struct MockDisplay {
    log: Shared,
    working: bool,
}

impl Display for MockDisplay {
    fn render_mode(&self) -> Result<String, XpraError> {
        if self.working {
            Ok("mock".into())
        } else {
            Err(XpraError::Display("no canvas".into()))
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.log.borrow_mut().resizes.push((width, height));
    }

    fn render_enqueue(&mut self, image: DrawImage) {
        self.log.borrow_mut().draws.push(image);
    }

    fn clear(&mut self) {
        self.log.borrow_mut().clears += 1;
    }

    fn set_default_cursor(&mut self) {}

    fn viewport_change(&mut self, dx: i32, dy: i32) {
        self.log.borrow_mut().viewport.push((dx, dy));
    }
}

struct MockInput(Shared);

impl InputGrab for MockInput {
    fn grab(&mut self) {
        self.0.borrow_mut().grabs += 1;
    }

    fn ungrab(&mut self) {
        self.0.borrow_mut().ungrabs += 1;
    }
}

struct MockStatus(Shared);

impl StatusListener for MockStatus {
    fn on_state_change(&mut self, state: ConnectionState, old: ConnectionState, message: Option<&str>) {
        self.0
            .borrow_mut()
            .states
            .push((state, old, message.map(str::to_owned)));
    }

    fn on_fb_resize(&mut self, width: u32, height: u32) {
        self.0.borrow_mut().fb_resizes.push((width, height));
    }

    fn on_update_complete(&mut self, update: &DrawUpdate) {
        self.0.borrow_mut().completed.push(update.clone());
    }

    fn on_bell(&mut self, wid: i64) {
        self.0.borrow_mut().bells.push(wid);
    }

    fn on_clipboard(&mut self, text: &str) {
        self.0.borrow_mut().clipboard.push(text.to_owned());
    }
}

struct ManualClock(Rc<Cell<i64>>);

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.get()
    }
}

// ── Harness ──────────────────────────────────────────────────────

struct Harness {
    engine: Engine,
    log: Shared,
    clock: Rc<Cell<i64>>,
}

impl Harness {
    fn new(config: EngineConfig) -> Self {
        Self::build(config, true)
    }

    fn build(config: EngineConfig, working_display: bool) -> Self {
        let log = Shared::default();
        let clock = Rc::new(Cell::new(1_000_000));
        let engine = Engine::new(config, Collaborators {
            transport: Box::new(MockTransport(log.clone())),
            display: Box::new(MockDisplay {
                log: log.clone(),
                working: working_display,
            }),
            input: Box::new(MockInput(log.clone())),
            status: Box::new(MockStatus(log.clone())),
            clock: Box::new(ManualClock(clock.clone())),
        });
        Self { engine, log, clock }
    }

    fn now(&self) -> i64 {
        self.clock.get()
    }

    fn advance(&mut self, ms: i64) {
        self.clock.set(self.clock.get() + ms);
        self.engine.on_timer();
    }

    /// Deliver bytes and drain every complete frame.
    fn feed(&mut self, bytes: &[u8]) {
        self.engine
            .handle_transport_event(TransportEvent::Data(Bytes::copy_from_slice(bytes)));
        while self.engine.has_pending_work() {
            self.engine.process_pending();
        }
    }

    fn server(&mut self, command: &str, args: Vec<Value>) {
        self.feed(&enframe(command, args).unwrap());
    }

    fn handshake(&mut self) {
        self.engine.connect("localhost", 10000, "").unwrap();
        self.engine.handle_transport_event(TransportEvent::Opened);
        self.server("hello", vec![Value::Dict(BTreeMap::new())]);
        assert_eq!(self.engine.state(), ConnectionState::Normal);
    }

    fn new_window(&mut self, x: i64, y: i64, w: i64, h: i64) {
        self.server("new-window", vec![
            1.into(),
            x.into(),
            y.into(),
            w.into(),
            h.into(),
            Value::Dict(BTreeMap::new()),
        ]);
    }

    fn sent_tags(&self) -> Vec<String> {
        self.log.borrow().sent.iter().map(tag).collect()
    }

    fn last_sent(&self, command: &str) -> Option<Value> {
        self.log
            .borrow()
            .sent
            .iter()
            .rev()
            .find(|m| tag(m) == command)
            .cloned()
    }

    fn queued_tags(&self) -> Vec<String> {
        self.engine
            .outgoing()
            .iter()
            .map(|f| tag(&decode_frame(f)))
            .collect()
    }

    fn clear_sent(&self) {
        self.log.borrow_mut().sent.clear();
    }
}

fn draw_args(seq: i64, data: Value) -> Vec<Value> {
    vec![
        1.into(),
        0.into(),
        0.into(),
        16.into(),
        16.into(),
        "png".into(),
        data,
        seq.into(),
        64.into(),
        Value::Dict(BTreeMap::new()),
    ]
}

// ── Lifecycle ────────────────────────────────────────────────────

#[test]
fn test_construction_enters_loaded() {
    let h = Harness::new(EngineConfig::default());
    assert_eq!(h.engine.state(), ConnectionState::Loaded);
    assert_eq!(h.engine.status_message(), Some("Xpra client loaded"));
    let log = h.log.borrow();
    assert_eq!(log.states.len(), 1);
    assert_eq!(log.states[0].0, ConnectionState::Loaded);
}

#[test]
fn test_broken_display_is_fatal_and_absorbing() {
    let mut h = Harness::build(EngineConfig::default(), false);
    assert_eq!(h.engine.state(), ConnectionState::Fatal);
    assert_eq!(h.engine.status_message(), Some("No working Display"));
    let err = h.engine.connect("localhost", 10000, "").unwrap_err();
    assert!(matches!(err, XpraError::InvalidState { op: "connect", .. }));
    h.engine.handle_transport_event(TransportEvent::Opened);
    assert_eq!(h.engine.state(), ConnectionState::Fatal);
}

#[test]
fn test_connect_without_target() {
    let mut h = Harness::new(EngineConfig::default());
    assert!(matches!(
        h.engine.connect("", 10000, ""),
        Err(XpraError::MissingTarget)
    ));
    assert!(matches!(
        h.engine.connect("localhost", 0, ""),
        Err(XpraError::MissingTarget)
    ));
    assert_eq!(h.engine.state(), ConnectionState::Loaded);
    assert!(h.log.borrow().opened.is_empty());
}

#[test]
fn test_connect_opens_transport_once() {
    let mut h = Harness::new(EngineConfig {
        encrypt: true,
        ..Default::default()
    });
    h.engine.connect("example.org", 443, "/xpra").unwrap();
    assert_eq!(h.engine.state(), ConnectionState::Connect);
    assert_eq!(h.log.borrow().opened[0].uri(), "wss://example.org:443/xpra");

    let err = h.engine.connect("example.org", 443, "").unwrap_err();
    assert_eq!(err.to_string(), "cannot connect while in state 'connect'");
}

#[test]
fn test_hello_reaches_normal() {
    let mut h = Harness::new(EngineConfig::default());
    h.engine.connect("localhost", 10000, "").unwrap();
    h.engine.handle_transport_event(TransportEvent::Opened);
    assert_eq!(h.engine.state(), ConnectionState::Handshake);
    assert_eq!(h.sent_tags(), ["hello"]);

    let hello = h.last_sent("hello").unwrap();
    let caps = &args(&hello)[0];
    assert_eq!(caps.get(b"encoding").and_then(Value::as_str), Some("png"));
    assert!(caps.get(b"xkbmap_keycodes").is_some());

    h.server("hello", vec![Value::Dict(BTreeMap::new())]);
    assert_eq!(h.engine.state(), ConnectionState::Normal);
    assert_eq!(h.sent_tags(), ["hello", "set_deflate", "ping"]);
    assert_eq!(args(&h.last_sent("set_deflate").unwrap()), [Value::Int(0)]);
    assert_eq!(args(&h.last_sent("ping").unwrap()), [Value::Int(h.now())]);
}

#[test]
fn test_connect_timeout_fails() {
    let mut h = Harness::new(EngineConfig::default());
    h.engine.connect("localhost", 10000, "").unwrap();
    assert_eq!(h.engine.next_deadline(), Some(h.now() + 5_000));
    h.advance(4_999);
    assert_eq!(h.engine.state(), ConnectionState::Connect);
    h.advance(1);
    assert_eq!(h.engine.state(), ConnectionState::Failed);
    assert_eq!(h.engine.status_message(), Some("Connect timeout"));
}

#[test]
fn test_stale_connect_timer_does_not_fire() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.advance(10_000);
    assert_eq!(h.engine.state(), ConnectionState::Normal);
}

#[test]
fn test_close_while_normal_fails_and_stays_failed() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    let closes = h.log.borrow().closes;
    h.engine.handle_transport_event(TransportEvent::Closed {
        code: Some(1006),
        reason: String::new(),
    });
    assert_eq!(h.engine.state(), ConnectionState::Failed);
    assert_eq!(
        h.engine.status_message(),
        Some("Server disconnected (code: 1006)")
    );
    assert_eq!(h.log.borrow().closes, closes + 1);

    h.advance(50);
    assert_eq!(h.engine.state(), ConnectionState::Failed);
    assert_eq!(
        h.engine.status_message(),
        Some("Server disconnected (code: 1006)")
    );
    let log = h.log.borrow();
    assert_eq!(
        log.states.last().unwrap(),
        &(ConnectionState::Disconnected, ConnectionState::Failed, None)
    );
    assert_eq!(h.engine.next_deadline(), None);
}

#[test]
fn test_orderly_disconnect() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.engine.disconnect().unwrap();
    assert_eq!(h.engine.state(), ConnectionState::Disconnect);
    assert!(h.log.borrow().closes >= 1);

    h.engine.handle_transport_event(TransportEvent::Closed {
        code: Some(1000),
        reason: String::new(),
    });
    assert_eq!(h.engine.state(), ConnectionState::Disconnected);
    assert!(h.engine.disconnect().is_err());
    // Reconnect is allowed from here.
    h.engine.connect("localhost", 10000, "").unwrap();
    assert_eq!(h.log.borrow().opened.len(), 2);
}

#[test]
fn test_disconnect_timeout() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.engine.disconnect().unwrap();
    h.advance(3_000);
    assert_eq!(h.engine.state(), ConnectionState::Failed);
    assert_eq!(h.engine.status_message(), Some("Disconnect timeout"));
}

#[test]
fn test_disconnect_forgets_windows() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.new_window(0, 0, 800, 600);
    assert_eq!(h.engine.windows().len(), 1);

    h.engine.disconnect().unwrap();
    h.engine.handle_transport_event(TransportEvent::Closed {
        code: Some(1000),
        reason: String::new(),
    });
    assert_eq!(h.engine.state(), ConnectionState::Disconnected);
    assert!(h.engine.windows().is_empty());
}

#[test]
fn test_failure_forgets_windows_and_chunks() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.new_window(0, 0, 800, 600);
    h.feed(&raw_frame(
        PacketHeader {
            chunk_index: 6,
            ..PacketHeader::new(3)
        },
        b"abc",
    ));

    h.engine.handle_transport_event(TransportEvent::Closed {
        code: Some(1006),
        reason: String::new(),
    });
    assert_eq!(h.engine.state(), ConnectionState::Failed);
    assert!(h.engine.windows().is_empty());
    assert_eq!(h.engine.buffered_len(), 0);
    assert!(h.engine.outgoing().is_empty());

    // A stale chunk must not leak into the next session's first draw.
    h.advance(50);
    h.handshake();
    h.new_window(0, 0, 800, 600);
    h.server("draw", draw_args(1, Value::Bytes(b"own".to_vec())));
    assert_eq!(h.log.borrow().draws[0].data, b"own");
}

#[test]
fn test_close_during_connect() {
    let mut h = Harness::new(EngineConfig::default());
    h.engine.connect("localhost", 10000, "").unwrap();
    h.engine.handle_transport_event(TransportEvent::Closed {
        code: None,
        reason: "refused".into(),
    });
    assert_eq!(
        h.engine.status_message(),
        Some("Failed to connect to server (reason: refused)")
    );
}

#[test]
fn test_transport_error_fails_connection() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.engine
        .handle_transport_event(TransportEvent::Error("broken pipe".into()));
    assert_eq!(h.engine.state(), ConnectionState::Failed);
    assert_eq!(h.engine.status_message(), Some("Transport error: broken pipe"));
}

#[test]
fn test_unexpected_open_fails() {
    let mut h = Harness::new(EngineConfig::default());
    h.engine.handle_transport_event(TransportEvent::Opened);
    assert_eq!(h.engine.state(), ConnectionState::Failed);
    assert_eq!(h.engine.status_message(), Some("Got unexpected connection"));
}

// ── Incoming commands ────────────────────────────────────────────

#[test]
fn test_new_window_resizes_and_queues_map() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.clear_sent();
    h.new_window(0, 0, 800, 600);

    assert_eq!(h.engine.framebuffer_size(), (800, 600));
    assert_eq!(h.log.borrow().fb_resizes, [(800, 600)]);
    assert_eq!(h.log.borrow().resizes, [(800, 600)]);
    assert_eq!(h.log.borrow().grabs, 1);
    assert_eq!(h.queued_tags(), ["map-window", "focus"]);
    assert!(h.sent_tags().is_empty());

    // The periodic flush delivers them.
    h.advance(217);
    assert_eq!(h.sent_tags(), ["map-window", "focus"]);
    let map = h.last_sent("map-window").unwrap();
    assert_eq!(args(&map)[..5], [
        Value::Int(1),
        Value::Int(0),
        Value::Int(0),
        Value::Int(800),
        Value::Int(600)
    ]);
    assert_eq!(args(&h.last_sent("focus").unwrap()), [Value::Int(1)]);
}

#[test]
fn test_same_size_window_does_not_resize_twice() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.new_window(0, 0, 800, 600);
    h.new_window(0, 0, 800, 600);
    assert_eq!(h.log.borrow().fb_resizes.len(), 1);
}

#[test]
fn test_untracked_window_is_ignored() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.server("new-window", vec![
        2.into(),
        0.into(),
        0.into(),
        640.into(),
        480.into(),
    ]);
    assert!(h.engine.windows().is_empty());
    assert!(h.engine.outgoing().is_empty());
}

#[test]
fn test_window_move_resize_and_lost_window() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.new_window(0, 0, 800, 600);
    h.server("window-move-resize", vec![
        1.into(),
        10.into(),
        20.into(),
        1024.into(),
        768.into(),
    ]);
    let w = h.engine.windows().get(1).unwrap();
    assert_eq!((w.x, w.y, w.width, w.height), (10, 20, 1024, 768));
    assert_eq!(h.engine.framebuffer_size(), (1024, 768));

    h.server("lost-window", vec![1.into()]);
    assert!(h.engine.windows().is_empty());
}

#[test]
fn test_server_ping_is_echoed_immediately() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.server("ping", vec![Value::Int(123_456)]);
    assert_eq!(args(&h.last_sent("ping-echo").unwrap()), [
        Value::Int(123_456),
        Value::Int(500),
        Value::Int(500),
        Value::Int(500),
        Value::Int(-1),
    ]);

    // Once a latency is known it is reported back.
    let t = h.now();
    h.clock.set(t + 42);
    h.server("ping_echo", vec![
        Value::Int(t),
        0.into(),
        0.into(),
        0.into(),
        Value::Int(7),
    ]);
    h.server("ping", vec![Value::Int(1)]);
    assert_eq!(args(&h.last_sent("ping-echo").unwrap())[4], Value::Int(42));
    assert_eq!(h.engine.latency().last_client_latency(), Some(7));
}

#[test]
fn test_latency_history_is_bounded() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    let start = h.now();
    for i in 0..150 {
        h.server("ping-echo", vec![
            Value::Int(start - i),
            0.into(),
            0.into(),
            0.into(),
            Value::Int(i),
        ]);
    }
    assert_eq!(h.engine.latency().server_samples().len(), 100);
    assert_eq!(h.engine.latency().client_samples().len(), 100);
    assert_eq!(h.engine.latency().last_server_latency(), Some(149));
}

#[test]
fn test_extreme_ping_echo_timestamp_saturates() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.server("ping-echo", vec![
        Value::Int(i64::MIN),
        0.into(),
        0.into(),
        0.into(),
        Value::Int(-1),
    ]);
    assert_eq!(h.engine.state(), ConnectionState::Normal);
    assert_eq!(h.engine.latency().last_server_latency(), Some(i64::MAX));
}

#[test]
fn test_window_origin_at_integer_limit_saturates() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.new_window(i64::MAX, i64::MIN, 800, 600);
    h.engine.flush();
    assert!(h.engine.mouse_move(5, -5));
    let motion = decode_frame(&h.engine.outgoing()[0]);
    assert_eq!(args(&motion)[1], Value::list([i64::MAX, i64::MIN]));
}

#[test]
fn test_periodic_ping() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.clear_sent();
    h.advance(10_000);
    assert!(h.sent_tags().contains(&"ping".to_owned()));
}

#[test]
fn test_draw_renders_and_acknowledges() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.new_window(0, 0, 800, 600);
    h.engine.flush();

    // First half arrives 40 ms before the rest.
    let frame = enframe("draw", draw_args(9, Value::from(&b"\x89PNG"[..]))).unwrap();
    let (head, tail) = frame.split_at(frame.len() / 2);
    h.feed(head);
    assert!(h.log.borrow().draws.is_empty());
    h.clock.set(h.now() + 40);
    h.feed(tail);

    let log = h.log.borrow();
    assert_eq!(log.draws.len(), 1);
    assert_eq!(log.draws[0].data, b"\x89PNG");
    assert_eq!(log.draws[0].update.coding, "png");
    assert_eq!(log.completed.len(), 1);
    drop(log);

    assert_eq!(h.queued_tags(), ["damage-sequence"]);
    let ack = decode_frame(&h.engine.outgoing()[0]);
    assert_eq!(args(&ack), [
        Value::Int(9),
        Value::Int(1),
        Value::Int(16),
        Value::Int(16),
        Value::Int(40_000),
    ]);
}

#[test]
fn test_draw_before_window_is_ignored() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.server("draw", draw_args(1, Value::from(&b"x"[..])));
    assert!(h.log.borrow().draws.is_empty());
    assert!(h.engine.outgoing().is_empty());
}

#[test]
fn test_draw_with_raw_chunk() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.new_window(0, 0, 800, 600);

    let pixels = [0u8, 0xff, b'e', b':', 7];
    let chunk = raw_frame(
        PacketHeader {
            chunk_index: 7,
            ..PacketHeader::new(pixels.len() as u32)
        },
        &pixels,
    );
    let mut stream = chunk;
    stream.extend(enframe("draw", draw_args(3, Value::Int(0))).unwrap());
    h.feed(&stream);

    assert_eq!(h.log.borrow().draws[0].data, pixels);
}

#[test]
fn test_compressed_frame() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();

    let plain = enframe("bell", vec![1.into(), 0.into(), 100.into()]).unwrap();
    let mut z = ZlibEncoder::new(Vec::new(), Compression::default());
    z.write_all(&plain[8..]).unwrap();
    let payload = z.finish().unwrap();
    let frame = raw_frame(
        PacketHeader {
            compression_level: 6,
            ..PacketHeader::new(payload.len() as u32)
        },
        &payload,
    );
    h.feed(&frame);
    assert_eq!(h.log.borrow().bells, [1]);
}

#[test]
fn test_clipboard_and_unknown_commands() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.server("startup-complete", vec![]);
    h.server("clipboard-contents", vec![
        1.into(),
        "CLIPBOARD".into(),
        "UTF8_STRING".into(),
        8.into(),
        "bytes".into(),
        Value::from(&b"caf\xc3\xa9"[..]),
    ]);
    assert_eq!(h.engine.state(), ConnectionState::Normal);
    assert_eq!(h.log.borrow().clipboard, ["café"]);
}

#[test]
fn test_malformed_packet_is_dropped() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.server("new-window", vec!["one".into()]);
    assert_eq!(h.engine.state(), ConnectionState::Normal);
    assert!(h.engine.windows().is_empty());
}

#[test]
fn test_server_disconnect_request() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.server("disconnect", vec!["server shutdown".into()]);
    assert_eq!(h.engine.state(), ConnectionState::Failed);
    assert_eq!(
        h.engine.status_message(),
        Some("Server requested disconnect: server shutdown")
    );
}

#[test]
fn test_bad_magic_is_protocol_error() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.feed(b"X\0\0\0\0\0\0\x02le");
    assert_eq!(h.engine.state(), ConnectionState::Failed);
    assert!(h.engine.status_message().unwrap().starts_with("Protocol error"));
}

#[test]
fn test_data_outside_session_is_discarded() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(&enframe("hello", vec![]).unwrap());
    assert_eq!(h.engine.state(), ConnectionState::Loaded);
    assert_eq!(h.engine.buffered_len(), 0);
}

// ── Receive pump ─────────────────────────────────────────────────

#[test]
fn test_one_frame_per_turn() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    let mut burst = Vec::new();
    for i in 0..3 {
        burst.extend(enframe("ping", vec![Value::Int(i)]).unwrap());
    }
    h.engine
        .handle_transport_event(TransportEvent::Data(Bytes::from(burst)));
    assert!(h.engine.has_pending_work());
    assert_eq!(h.engine.stats().messages_received, 2); // hello + first ping

    h.engine.process_pending();
    assert!(h.engine.has_pending_work());
    h.engine.process_pending();
    assert!(!h.engine.has_pending_work());
    assert_eq!(h.engine.stats().messages_received, 4);
}

#[test]
fn test_partial_header_does_not_reschedule() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    let frame = enframe("ping", vec![Value::Int(1)]).unwrap();
    let mut data = frame.clone();
    data.extend_from_slice(&frame[..5]);
    h.engine
        .handle_transport_event(TransportEvent::Data(Bytes::from(data)));
    assert!(!h.engine.has_pending_work());
    assert_eq!(h.engine.buffered_len(), 5);
}

#[test]
fn test_incomplete_frame_waits_for_data() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    let frame = enframe("ping", vec![Value::Int(1)]).unwrap();
    let mut data = frame.clone();
    data.extend_from_slice(&frame[..10]);
    h.engine
        .handle_transport_event(TransportEvent::Data(Bytes::from(data)));
    // Enough bytes for a header, so the drain is rescheduled once...
    assert!(h.engine.has_pending_work());
    h.engine.process_pending();
    // ...and then waits for the transport.
    assert!(!h.engine.has_pending_work());
    assert_eq!(h.engine.buffered_len(), 10);
}

// ── Input ────────────────────────────────────────────────────────

#[test]
fn test_key_event_is_flushed_eagerly() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.clear_sent();
    assert!(h.engine.key_event(u32::from(b'a'), true, Modifiers {
        control: true,
        ..Modifiers::NONE
    }));
    let key = h.last_sent("key-action").unwrap();
    assert_eq!(args(&key), [
        Value::Int(1),
        "a".into(),
        Value::Int(1),
        Value::list(["control"]),
        Value::Int(97),
        "".into(),
        Value::Int(97),
        Value::Int(0),
        Value::Int(0),
    ]);
    assert!(h.engine.outgoing().is_empty());
    assert!(!h.engine.key_event(0x1234, true, Modifiers::NONE));
}

#[test]
fn test_input_dropped_outside_normal() {
    let mut h = Harness::new(EngineConfig::default());
    assert!(!h.engine.key_event(u32::from(b'a'), true, Modifiers::NONE));
    assert!(!h.engine.mouse_move(1, 1));
    assert!(h.log.borrow().sent.is_empty());
}

#[test]
fn test_queue_is_not_flushed_during_handshake() {
    let mut h = Harness::new(EngineConfig::default());
    h.engine.connect("localhost", 10000, "").unwrap();
    h.engine.handle_transport_event(TransportEvent::Opened);
    h.new_window(0, 0, 800, 600);
    assert_eq!(h.queued_tags(), ["map-window", "focus"]);

    assert_eq!(h.engine.flush(), 0);
    assert_eq!(h.sent_tags(), ["hello"]);

    h.server("hello", vec![Value::Dict(BTreeMap::new())]);
    assert_eq!(h.engine.flush(), 2);
    assert!(h.sent_tags().ends_with(&["map-window".to_owned(), "focus".to_owned()]));
}

#[test]
fn test_button_mask_or_on_press_xor_on_release() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    h.new_window(100, 50, 800, 600);
    h.engine.flush();
    h.clear_sent();

    assert!(h.engine.mouse_button(10, 20, true, 0b001));
    assert_eq!(h.engine.pointer().button_mask, 0b001);
    let press = h.last_sent("button-action").unwrap();
    assert_eq!(args(&press), [
        Value::Int(1),
        Value::Int(1),
        Value::Int(1),
        Value::list([110i64, 70]),
        Value::empty_list(),
        Value::empty_list(),
    ]);

    h.engine.mouse_button(10, 20, false, 0b001);
    assert_eq!(h.engine.pointer().button_mask, 0);

    // A release that was never pressed toggles the bit on.
    h.engine.mouse_button(10, 20, false, 0b100);
    assert_eq!(h.engine.pointer().button_mask, 0b100);
    let release = h.last_sent("button-action").unwrap();
    assert_eq!(args(&release)[1], Value::Int(3));
    assert_eq!(args(&release)[2], Value::Int(0));
}

#[test]
fn test_motion_queues_without_flush() {
    let mut h = Harness::new(EngineConfig::default());
    h.handshake();
    assert!(!h.engine.mouse_move(5, 5));
    h.new_window(0, 0, 800, 600);
    h.engine.flush();
    assert!(h.engine.mouse_move(5, 6));
    assert_eq!(h.queued_tags(), ["pointer-position"]);
    let motion = decode_frame(&h.engine.outgoing()[0]);
    assert_eq!(args(&motion)[1], Value::list([5i64, 6]));
}

#[test]
fn test_view_only_suppresses_input() {
    let mut h = Harness::new(EngineConfig {
        view_only: true,
        ..Default::default()
    });
    h.handshake();
    h.new_window(0, 0, 800, 600);
    h.engine.flush();
    h.clear_sent();

    assert!(!h.engine.key_event(u32::from(b'a'), true, Modifiers::NONE));
    assert!(!h.engine.mouse_button(1, 1, true, 1));
    assert!(!h.engine.mouse_move(2, 2));
    assert!(h.engine.outgoing().is_empty());
    assert!(h.sent_tags().is_empty());
    // Mask tracking continues.
    assert_eq!(h.engine.pointer().button_mask, 1);
    // Server traffic is still processed.
    h.server("draw", draw_args(1, Value::from(&b"x"[..])));
    assert_eq!(h.log.borrow().draws.len(), 1);
}

#[test]
fn test_viewport_drag() {
    let mut h = Harness::new(EngineConfig {
        viewport_drag: true,
        ..Default::default()
    });
    h.handshake();
    h.new_window(0, 0, 800, 600);
    h.engine.flush();
    h.clear_sent();

    h.engine.mouse_button(100, 100, true, 1);
    assert!(h.engine.pointer().dragging);
    h.engine.mouse_move(90, 95);
    h.engine.mouse_move(80, 95);
    assert_eq!(h.log.borrow().viewport, [(10, 5), (10, 0)]);
    assert!(h.engine.outgoing().is_empty());

    h.engine.mouse_button(80, 95, false, 1);
    assert!(!h.engine.pointer().dragging);
    assert_eq!(h.sent_tags(), ["buffer-refresh"]);
    assert_eq!(args(&h.last_sent("buffer-refresh").unwrap()), [
        Value::Int(1),
        Value::Int(0),
        Value::Int(100),
    ]);
}

#[test]
fn test_dragging_holds_periodic_flush() {
    let mut h = Harness::new(EngineConfig {
        viewport_drag: true,
        ..Default::default()
    });
    h.handshake();
    h.new_window(0, 0, 800, 600);
    h.engine.mouse_button(1, 1, true, 1);
    h.clear_sent();
    h.advance(217);
    assert!(h.sent_tags().is_empty());
    assert_eq!(h.queued_tags(), ["map-window", "focus"]);
}

// ── Codec over a stream ──────────────────────────────────────────

#[test]
fn test_codec_decodes_back_to_back_frames() {
    let mut codec = XpraCodec::new();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&enframe("ping", vec![Value::Int(1)]).unwrap());
    buf.extend_from_slice(&enframe("ping", vec![Value::Int(2)]).unwrap());
    let mut seen = Vec::new();
    while let Some(Deframed::Message(m)) = codec.decode(&mut buf).unwrap() {
        seen.push(args(&m)[0].clone());
    }
    assert_eq!(seen, [Value::Int(1), Value::Int(2)]);
}

// ── TCP round-trip ───────────────────────────────────────────────

/// Read from `stream` until the codec yields a message.
async fn read_message(stream: &mut tokio::net::TcpStream, buf: &mut BytesMut) -> Value {
    let mut codec = XpraCodec::new();
    loop {
        if let Some(Deframed::Message(m)) = codec.decode(buf).unwrap() {
            return m;
        }
        let n = stream.read_buf(buf).await.unwrap();
        assert!(n > 0, "peer closed");
    }
}

#[tokio::test]
async fn test_tcp_session_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = BytesMut::new();
        let hello = read_message(&mut stream, &mut buf).await;
        assert_eq!(tag(&hello), "hello");
        let reply = enframe("hello", vec![Value::Dict(BTreeMap::new())]).unwrap();
        stream.write_all(&reply).await.unwrap();
        let mut tags = Vec::new();
        for _ in 0..2 {
            tags.push(tag(&read_message(&mut stream, &mut buf).await));
        }
        tags
    });

    let log = Shared::default();
    let (transport, mut events) = TcpTransport::new();
    let mut engine = Engine::new(EngineConfig::default(), Collaborators {
        transport: Box::new(transport),
        display: Box::new(MockDisplay {
            log: log.clone(),
            working: true,
        }),
        input: Box::new(MockInput(log.clone())),
        status: Box::new(MockStatus(log.clone())),
        clock: Box::new(xpra_core::SystemClock),
    });
    engine.connect("127.0.0.1", port, "").unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.state() != ConnectionState::Normal {
            let event = events.recv().await.expect("transport gone");
            engine.handle_transport_event(event);
            while engine.has_pending_work() {
                engine.process_pending();
            }
        }
    })
    .await
    .expect("timeout");

    let tags = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("timeout")
        .unwrap();
    assert_eq!(tags, ["set_deflate", "ping"]);
}
