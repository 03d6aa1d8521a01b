//! The client protocol engine.
//!
//! [`Engine`] is sans-IO: it reacts to transport events, timer expiry and
//! local input, and talks to the outside world only through the
//! [`collab`](crate::collab) traits. A driver loop feeds it events and
//! sleeps until [`Engine::next_deadline`].
//!
//! Receiving is deliberately incremental: each call processes at most
//! one frame. When more complete-looking data remains afterwards,
//! [`Engine::has_pending_work`] turns true and the driver should call
//! [`Engine::process_pending`] after giving other events a turn.

mod dispatch;
mod input;
pub mod timers;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, warn};

use crate::codec::{Deframed, XpraCodec};
use crate::collab::{
    Clock, Collaborators, ConnectTarget, Display, InputGrab, SUBPROTOCOLS, StatusListener,
    Transport, TransportEvent,
};
use crate::config::EngineConfig;
use crate::error::XpraError;
use crate::header::HEADER_SIZE;
use crate::keymap::Keymap;
use crate::latency::LatencyTracker;
use crate::message::{self, Command, HelloCapabilities};
use crate::state::{ConnectionState, StateMachine};
use crate::value::Value;
use crate::window::WindowTable;

pub use input::PointerState;
use timers::{TimerKind, Timers};

/// How long `failed` lasts before the engine settles.
const FAIL_RESET_MS: u64 = 50;

/// Counters for the current session, logged on disconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_received: u64,
    /// Frames consumed, raw chunks included.
    pub frames_received: u64,
    pub messages_received: u64,
    pub draws: u64,
    pub frames_sent: u64,
}

pub struct Engine {
    config: EngineConfig,
    state: StateMachine,

    transport: Box<dyn Transport>,
    display: Box<dyn Display>,
    input: Box<dyn InputGrab>,
    status: Box<dyn StatusListener>,
    clock: Box<dyn Clock>,

    target: Option<ConnectTarget>,

    // ── Receive side ─────────────────────────────────────────────
    codec: XpraCodec,
    recv: BytesMut,
    /// When the first bytes of the message being assembled were seen.
    recv_started_ms: Option<i64>,
    more_pending: bool,

    // ── Send side ────────────────────────────────────────────────
    outgoing: Vec<Bytes>,

    windows: WindowTable,
    keymap: Keymap,
    latency: LatencyTracker,
    timers: Timers,
    fb_size: (u32, u32),
    pointer: PointerState,
    stats: SessionStats,
}

impl Engine {
    /// Build an engine. It starts in `loaded`, or `fatal` when the display
    /// reports no usable render mode.
    pub fn new(config: EngineConfig, collab: Collaborators) -> Self {
        let Collaborators {
            transport,
            display,
            input,
            status,
            clock,
        } = collab;

        let mut engine = Self {
            config,
            state: StateMachine::new(ConnectionState::Disconnected),
            transport,
            display,
            input,
            status,
            clock,
            target: None,
            codec: XpraCodec::new(),
            recv: BytesMut::new(),
            recv_started_ms: None,
            more_pending: false,
            outgoing: Vec::new(),
            windows: WindowTable::new(),
            keymap: Keymap::default(),
            latency: LatencyTracker::new(),
            timers: Timers::new(),
            fb_size: (0, 0),
            pointer: PointerState::default(),
            stats: SessionStats::default(),
        };

        match engine.display.render_mode() {
            Ok(mode) => {
                info!("using render mode '{mode}'");
                engine.update_state(ConnectionState::Loaded, Some("Xpra client loaded"));
            }
            Err(e) => {
                error!("no working display: {e}");
                engine.update_state(ConnectionState::Fatal, Some("No working Display"));
            }
        }
        engine
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Message recorded with the last reported transition.
    pub fn status_message(&self) -> Option<&str> {
        self.state.message()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn windows(&self) -> &WindowTable {
        &self.windows
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        self.fb_size
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Frames waiting for the next flush.
    pub fn outgoing(&self) -> &[Bytes] {
        &self.outgoing
    }

    /// Bytes received but not yet consumed by the frame layer.
    pub fn buffered_len(&self) -> usize {
        self.recv.len()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start connecting to `host:port`.
    pub fn connect(&mut self, host: &str, port: u16, path: &str) -> Result<(), XpraError> {
        if host.is_empty() || port == 0 {
            warn!("connect requested without host and port");
            return Err(XpraError::MissingTarget);
        }
        let state = self.state();
        if !state.is_idle() {
            return Err(XpraError::InvalidState { op: "connect", state });
        }
        let target = ConnectTarget {
            host: host.to_owned(),
            port,
            path: path.to_owned(),
            secure: self.config.encrypt,
        };
        let msg = format!("Connecting to {target}");
        self.target = Some(target);
        self.update_state(ConnectionState::Connect, Some(&msg));
        Ok(())
    }

    /// Begin an orderly disconnect; the transport's close event finishes it.
    pub fn disconnect(&mut self) -> Result<(), XpraError> {
        let state = self.state();
        if !matches!(
            state,
            ConnectionState::Connect | ConnectionState::Handshake | ConnectionState::Normal
        ) {
            return Err(XpraError::InvalidState { op: "disconnect", state });
        }
        self.update_state(ConnectionState::Disconnect, Some("Disconnecting"));
        Ok(())
    }

    // ── Transport events ─────────────────────────────────────────

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Closed { code, reason } => self.on_close(code, &reason),
            TransportEvent::Error(e) => self.on_transport_error(&e),
            TransportEvent::Data(data) => self.on_data(&data),
        }
    }

    fn on_open(&mut self) {
        if self.state() != ConnectionState::Connect {
            self.fail("Got unexpected connection");
            return;
        }
        info!("transport open, sending hello");
        self.send_hello();
        self.update_state(ConnectionState::Handshake, Some("Starting Xpra handshake"));
    }

    fn on_close(&mut self, code: Option<u16>, reason: &str) {
        let detail = match code {
            Some(code) if reason.is_empty() => format!(" (code: {code})"),
            Some(code) => format!(" (code: {code}, reason: {reason})"),
            None if reason.is_empty() => String::new(),
            None => format!(" (reason: {reason})"),
        };
        match self.state() {
            ConnectionState::Disconnect => {
                self.update_state(ConnectionState::Disconnected, Some(&format!("Disconnected{detail}")));
            }
            ConnectionState::Connect => self.fail(format!("Failed to connect to server{detail}")),
            ConnectionState::Handshake | ConnectionState::Normal => {
                self.fail(format!("Server disconnected{detail}"));
            }
            state => error!("received close while in state '{state}'"),
        }
    }

    fn on_transport_error(&mut self, e: &str) {
        warn!("transport error: {e}");
        if matches!(
            self.state(),
            ConnectionState::Connect | ConnectionState::Handshake | ConnectionState::Normal
        ) {
            self.fail(format!("Transport error: {e}"));
        }
    }

    fn on_data(&mut self, data: &[u8]) {
        let state = self.state();
        if !state.accepts_data() {
            warn!("discarding {} bytes received in state '{state}'", data.len());
            return;
        }
        self.stats.bytes_received += data.len() as u64;
        self.recv.extend_from_slice(data);
        self.process_receive_queue();
    }

    // ── Receive pump ─────────────────────────────────────────────

    /// More buffered data should be processed on a later turn.
    pub fn has_pending_work(&self) -> bool {
        self.more_pending
    }

    /// Process one more frame of buffered data, if any was pending.
    pub fn process_pending(&mut self) {
        if self.more_pending {
            self.process_receive_queue();
        }
    }

    fn process_receive_queue(&mut self) {
        self.more_pending = false;
        if !self.state().accepts_data() {
            return;
        }
        let now = self.clock.now_ms();
        self.recv_started_ms.get_or_insert(now);

        let consumed = match self.codec.decode(&mut self.recv) {
            Ok(None) => false,
            Ok(Some(Deframed::Chunk(index))) => {
                debug!("stored raw chunk {index}");
                true
            }
            Ok(Some(Deframed::Message(message))) => {
                self.stats.messages_received += 1;
                let started = self.recv_started_ms.take().unwrap_or(now);
                self.dispatch(message, started);
                true
            }
            Err(e) => {
                self.fail(format!("Protocol error: {e}"));
                return;
            }
        };
        if !consumed {
            return;
        }
        self.stats.frames_received += 1;
        if self.state().accepts_data() && self.recv.len() >= HEADER_SIZE {
            debug!("{} bytes left to process", self.recv.len());
            self.more_pending = true;
        }
    }

    // ── Timers ───────────────────────────────────────────────────

    /// Earliest timer deadline, in [`Clock`] milliseconds.
    pub fn next_deadline(&self) -> Option<i64> {
        self.timers.next_deadline()
    }

    /// Fire every timer whose deadline has passed.
    pub fn on_timer(&mut self) {
        let now = self.clock.now_ms();
        for kind in self.timers.take_due(now) {
            self.fire(kind, now);
        }
    }

    fn fire(&mut self, kind: TimerKind, now: i64) {
        let state = self.state();
        match kind {
            TimerKind::Connect if state == ConnectionState::Connect => self.fail("Connect timeout"),
            TimerKind::Disconnect if state == ConnectionState::Disconnect => {
                self.fail("Disconnect timeout");
            }
            TimerKind::FailReset if state == ConnectionState::Failed => {
                self.update_state(ConnectionState::Disconnected, None);
            }
            TimerKind::Flush if state == ConnectionState::Normal => {
                if !self.pointer.dragging {
                    self.flush();
                }
                self.timers.arm(TimerKind::Flush, now, self.config.flush_interval());
            }
            TimerKind::Ping if state == ConnectionState::Normal => {
                self.send_ping(now);
                self.timers.arm(TimerKind::Ping, now, self.config.ping_interval());
            }
            kind => debug!("stale {kind:?} timer in state '{state}'"),
        }
    }

    // ── State changes ────────────────────────────────────────────

    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.update_state(ConnectionState::Failed, Some(&message));
    }

    fn update_state(&mut self, requested: ConnectionState, message: Option<&str>) {
        let Some(transition) = self.state.apply(requested, message) else {
            return;
        };
        let old = transition.old;

        if requested.resets_session() {
            self.teardown();
        }

        let text = transition.message.as_deref().unwrap_or("");
        match requested {
            ConnectionState::Failed | ConnectionState::Fatal => error!("{requested}: {text}"),
            _ => info!("state '{old}' -> '{requested}' {text}"),
        }

        let current = self.state.current();
        if current != ConnectionState::Connect {
            self.timers.cancel(TimerKind::Connect);
        }
        if current != ConnectionState::Disconnect {
            self.timers.cancel(TimerKind::Disconnect);
        }
        if current != ConnectionState::Failed {
            self.timers.cancel(TimerKind::FailReset);
        }

        let now = self.clock.now_ms();
        match current {
            ConnectionState::Connect => {
                self.reset_session();
                match &self.target {
                    Some(target) => {
                        info!("connecting to {target}");
                        self.transport.open(target, SUBPROTOCOLS);
                    }
                    None => error!("connect without a target"),
                }
                self.timers.arm(TimerKind::Connect, now, self.config.connect_timeout());
            }
            ConnectionState::Disconnect => {
                self.log_stats();
                self.timers.arm(TimerKind::Disconnect, now, self.config.disconnect_timeout());
            }
            ConnectionState::Failed if requested == ConnectionState::Failed => {
                if old == ConnectionState::Normal {
                    error!("error while connected");
                }
                self.timers.arm(
                    TimerKind::FailReset,
                    now,
                    std::time::Duration::from_millis(FAIL_RESET_MS),
                );
            }
            _ => {}
        }

        self.status
            .on_state_change(requested, old, transition.message.as_deref());
    }

    /// Release everything tied to a live session.
    fn teardown(&mut self) {
        self.timers.cancel(TimerKind::Flush);
        self.timers.cancel(TimerKind::Ping);
        self.more_pending = false;
        self.codec.reset();
        self.recv.clear();
        self.recv_started_ms = None;
        self.outgoing.clear();
        self.windows.clear();
        self.pointer.dragging = false;
        self.input.ungrab();
        self.display.set_default_cursor();
        self.display.clear();
        self.transport.close();
    }

    /// Per-connection state, reset when a new connection starts.
    fn reset_session(&mut self) {
        self.codec.reset();
        self.recv.clear();
        self.recv_started_ms = None;
        self.more_pending = false;
        self.outgoing.clear();
        self.windows.clear();
        self.pointer = PointerState::default();
        self.stats = SessionStats::default();
    }

    fn log_stats(&self) {
        info!(
            "session stats: {} bytes, {} frames, {} messages, {} draws, {} sent, \
             server latency {:?} ms, client latency {:?} ms",
            self.stats.bytes_received,
            self.stats.frames_received,
            self.stats.messages_received,
            self.stats.draws,
            self.stats.frames_sent,
            self.latency.last_server_latency(),
            self.latency.last_client_latency(),
        );
    }

    // ── Sending ──────────────────────────────────────────────────

    /// Frame and hand a command straight to the transport.
    fn send(&mut self, cmd: Command, args: Vec<Value>) {
        match cmd.frame(args) {
            Ok(frame) => {
                debug!("sending {cmd}");
                self.stats.frames_sent += 1;
                self.transport.send(frame);
            }
            Err(e) => error!("cannot encode {cmd}: {e}"),
        }
    }

    /// Frame a command and hold it for the next flush.
    fn enqueue(&mut self, cmd: Command, args: Vec<Value>) {
        match cmd.frame(args) {
            Ok(frame) => {
                debug!("queueing {cmd}");
                self.outgoing.push(frame);
            }
            Err(e) => error!("cannot encode {cmd}: {e}"),
        }
    }

    fn send_hello(&mut self) {
        match HelloCapabilities::new(&self.config, &self.keymap).to_args() {
            Ok(args) => self.send(Command::Hello, args),
            Err(e) => self.fail(format!("cannot encode hello: {e}")),
        }
    }

    fn send_ping(&mut self, now: i64) {
        self.send(Command::Ping, message::ping(now));
    }
}

