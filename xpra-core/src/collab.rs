//! Collaborator seams.
//!
//! The engine owns no sockets, surfaces or clocks. Everything outside
//! the protocol is reached through these traits so the engine can be
//! driven by a tokio event loop in production and by plain function
//! calls in tests.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::XpraError;
use crate::state::ConnectionState;

// ── Transport ────────────────────────────────────────────────────

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub secure: bool,
}

impl ConnectTarget {
    /// `ws[s]://host:port/path`, used for logging and by transports that
    /// speak WebSocket.
    pub fn uri(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}/{}",
            self.host,
            self.port,
            self.path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Subprotocols offered when opening the transport.
pub const SUBPROTOCOLS: &[&str] = &["binary", "base64"];

/// Notifications a transport delivers back into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Closed { code: Option<u16>, reason: String },
    Error(String),
    Data(Bytes),
}

/// A bidirectional byte-stream connection.
///
/// Implementations report progress asynchronously as [`TransportEvent`]s;
/// none of these calls block.
pub trait Transport {
    fn open(&mut self, target: &ConnectTarget, protocols: &[&str]);
    fn close(&mut self);
    fn send(&mut self, frame: Bytes);
}

// ── Display ──────────────────────────────────────────────────────

/// Geometry and identity of one `draw` update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawUpdate {
    pub wid: i64,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    /// Image encoding, e.g. `png`.
    pub coding: String,
    pub sequence: i64,
    pub rowstride: i64,
}

/// A `draw` update with its pixel data, handed to the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawImage {
    pub update: DrawUpdate,
    pub data: Vec<u8>,
}

/// The drawing surface.
pub trait Display {
    /// Name of the render mode in use. An error means no usable display,
    /// which makes the engine fatal.
    fn render_mode(&self) -> Result<String, XpraError>;

    fn resize(&mut self, width: u32, height: u32);

    fn render_enqueue(&mut self, image: DrawImage);

    fn clear(&mut self);

    fn set_default_cursor(&mut self);

    /// Pan by `(dx, dy)` while viewport dragging.
    fn viewport_change(&mut self, _dx: i32, _dy: i32) {}

    /// Map a surface x coordinate to framebuffer space.
    fn abs_x(&self, x: i32) -> i32 {
        x
    }

    fn abs_y(&self, y: i32) -> i32 {
        y
    }
}

// ── Input ────────────────────────────────────────────────────────

/// Keyboard and pointer capture.
pub trait InputGrab {
    fn grab(&mut self);
    fn ungrab(&mut self);
}

// ── Status ───────────────────────────────────────────────────────

/// Application callbacks. Only state changes are mandatory.
pub trait StatusListener {
    fn on_state_change(&mut self, state: ConnectionState, old: ConnectionState, message: Option<&str>);

    fn on_fb_resize(&mut self, _width: u32, _height: u32) {}

    fn on_update_received(&mut self, _update: &DrawUpdate) {}

    fn on_update_complete(&mut self, _update: &DrawUpdate) {}

    fn on_bell(&mut self, _wid: i64) {}

    fn on_clipboard(&mut self, _text: &str) {}
}

// ── Clock ────────────────────────────────────────────────────────

/// Wall-clock milliseconds; ping timestamps travel on the wire.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

// ── Bundle ───────────────────────────────────────────────────────

/// Everything the engine needs from the outside world.
pub struct Collaborators {
    pub transport: Box<dyn Transport>,
    pub display: Box<dyn Display>,
    pub input: Box<dyn InputGrab>,
    pub status: Box<dyn StatusListener>,
    pub clock: Box<dyn Clock>,
}
