//! Command tags and outgoing packet builders.
//!
//! Builders return the argument list that follows the tag; the engine
//! frames them with [`Command::frame`].

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::FrameError;
use crate::keymap::{KeyEntry, Keymap, Modifiers};
use crate::packet;
use crate::ser;
use crate::value::Value;
use crate::window::WindowRecord;

/// Protocol version announced in `hello`.
pub const CLIENT_VERSION: &str = "0.9.0";

// ── Command ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // ── Both directions ──────────────────────────────────────────
    Hello,
    Ping,
    PingEcho,

    // ── Server → client ──────────────────────────────────────────
    NewWindow,
    WindowMoveResize,
    LostWindow,
    Draw,
    Bell,
    ClipboardContents,
    Disconnect,

    // ── Client → server ──────────────────────────────────────────
    KeyAction,
    ButtonAction,
    PointerPosition,
    MapWindow,
    Focus,
    DamageSequence,
    SetDeflate,
    BufferRefresh,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Command::Hello,
        Command::Ping,
        Command::PingEcho,
        Command::NewWindow,
        Command::WindowMoveResize,
        Command::LostWindow,
        Command::Draw,
        Command::Bell,
        Command::ClipboardContents,
        Command::Disconnect,
        Command::KeyAction,
        Command::ButtonAction,
        Command::PointerPosition,
        Command::MapWindow,
        Command::Focus,
        Command::DamageSequence,
        Command::SetDeflate,
        Command::BufferRefresh,
    ];

    /// Wire tag as this client sends it.
    pub fn tag(&self) -> &'static str {
        match self {
            Command::Hello => "hello",
            Command::Ping => "ping",
            Command::PingEcho => "ping-echo",
            Command::NewWindow => "new-window",
            Command::WindowMoveResize => "window-move-resize",
            Command::LostWindow => "lost-window",
            Command::Draw => "draw",
            Command::Bell => "bell",
            Command::ClipboardContents => "clipboard-contents",
            Command::Disconnect => "disconnect",
            Command::KeyAction => "key-action",
            Command::ButtonAction => "button-action",
            Command::PointerPosition => "pointer-position",
            Command::MapWindow => "map-window",
            Command::Focus => "focus",
            Command::DamageSequence => "damage-sequence",
            Command::SetDeflate => "set_deflate",
            Command::BufferRefresh => "buffer-refresh",
        }
    }

    /// Look up a received tag; `-` and `_` are interchangeable.
    pub fn from_tag(tag: &[u8]) -> Option<Command> {
        Self::ALL.into_iter().find(|cmd| {
            let known = cmd.tag().as_bytes();
            known.len() == tag.len()
                && known
                    .iter()
                    .zip(tag)
                    .all(|(a, b)| normalize(*a) == normalize(*b))
        })
    }

    /// Whether the engine has a handler for this command when received.
    pub fn is_incoming(&self) -> bool {
        matches!(
            self,
            Command::Hello
                | Command::Ping
                | Command::PingEcho
                | Command::NewWindow
                | Command::WindowMoveResize
                | Command::LostWindow
                | Command::Draw
                | Command::Bell
                | Command::ClipboardContents
                | Command::Disconnect
        )
    }

    /// Encode `[tag, ...args]` as one uncompressed frame.
    pub fn frame(&self, args: Vec<Value>) -> Result<Bytes, FrameError> {
        packet::enframe(self.tag(), args).map(Bytes::from)
    }
}

fn normalize(b: u8) -> u8 {
    if b == b'_' { b'-' } else { b }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ── Hello ────────────────────────────────────────────────────────

/// Capability mapping sent as the single argument of `hello`.
#[derive(Debug, Clone, Serialize)]
pub struct HelloCapabilities<'a> {
    pub version: &'static str,
    pub encoding: &'static str,
    pub encodings: [&'static str; 2],
    pub share: bool,
    pub cursors: bool,
    pub true_color: bool,
    pub xkbmap_keycodes: Vec<(u32, &'a str, u32, u32, u32)>,
}

impl<'a> HelloCapabilities<'a> {
    pub fn new(config: &EngineConfig, keymap: &'a Keymap) -> Self {
        Self {
            version: CLIENT_VERSION,
            encoding: "png",
            encodings: ["png", "jpeg"],
            share: config.shared,
            cursors: config.local_cursor,
            true_color: config.true_color,
            xkbmap_keycodes: keymap.xkbmap_keycodes(),
        }
    }

    pub fn to_args(&self) -> Result<Vec<Value>, FrameError> {
        Ok(vec![ser::to_value(self)?])
    }
}

// ── Builders ─────────────────────────────────────────────────────

pub fn key_action(wid: i64, key: &KeyEntry, down: bool, modifiers: Modifiers) -> Vec<Value> {
    vec![
        wid.into(),
        key.name.as_str().into(),
        down.into(),
        Value::list(modifiers.names()),
        key.keyval.into(),
        "".into(),
        key.keycode.into(),
        key.group.into(),
        key.level.into(),
    ]
}

pub fn button_action(wid: i64, button: u32, down: bool, pos: (i64, i64)) -> Vec<Value> {
    vec![
        wid.into(),
        button.into(),
        down.into(),
        Value::list([pos.0, pos.1]),
        Value::empty_list(),
        Value::empty_list(),
    ]
}

pub fn pointer_position(wid: i64, pos: (i64, i64)) -> Vec<Value> {
    vec![
        wid.into(),
        Value::list([pos.0, pos.1]),
        Value::empty_list(),
        Value::empty_list(),
    ]
}

pub fn map_window(window: &WindowRecord) -> Vec<Value> {
    vec![
        window.id.into(),
        window.x.into(),
        window.y.into(),
        window.width.into(),
        window.height.into(),
        window.placement.clone(),
    ]
}

pub fn focus(wid: i64) -> Vec<Value> {
    vec![wid.into()]
}

pub fn damage_sequence(
    sequence: i64,
    wid: i64,
    width: u32,
    height: u32,
    decode_time_us: i64,
) -> Vec<Value> {
    vec![
        sequence.into(),
        wid.into(),
        width.into(),
        height.into(),
        decode_time_us.into(),
    ]
}

pub fn ping(now_ms: i64) -> Vec<Value> {
    vec![now_ms.into()]
}

/// Reply to a server ping. The three load averages are fixed; the last
/// field is our latest server round-trip, or -1 before the first echo.
pub fn ping_echo(echo_time: Value, server_latency: Option<i64>) -> Vec<Value> {
    vec![
        echo_time,
        500i64.into(),
        500i64.into(),
        500i64.into(),
        server_latency.unwrap_or(-1).into(),
    ]
}

pub fn set_deflate(level: i64) -> Vec<Value> {
    vec![level.into()]
}

/// Ask the server to resend the whole window.
pub fn buffer_refresh(wid: i64) -> Vec<Value> {
    vec![wid.into(), 0i64.into(), 100i64.into()]
}

/// Button number for a mask: lowest set bit + 1.
pub fn button_number(mask: u32) -> Option<u32> {
    (mask != 0).then(|| mask.trailing_zeros() + 1)
}
