//! # xpra-core
//!
//! Client-side protocol engine for Xpra remote display servers.
//!
//! This crate contains:
//! - **Values**: `Value`, the bencode codec and a serde serializer into `Value`
//! - **Framing**: `PacketHeader`, `ProtocolFlags`, the `Deframer` with zlib
//!   and raw-chunk reassembly, and `XpraCodec` for `tokio_util`
//! - **Commands**: `Command` tags and outgoing packet builders
//! - **State**: `ConnectionState` and its `StateMachine`
//! - **Engine**: `Engine`, the sans-IO dispatcher, input encoder and timers
//! - **Collaborators**: traits for transport, display, input, status and clock
//! - **Network**: `TcpTransport`, a tokio implementation of the transport
//! - **Error**: `XpraError` - typed, `thiserror`-based error hierarchy

pub mod bencode;
pub mod codec;
pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod header;
pub mod keymap;
pub mod latency;
pub mod message;
pub mod network;
pub mod packet;
pub mod ser;
pub mod state;
pub mod value;
pub mod window;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{Deframed, XpraCodec};
pub use collab::{
    Clock, Collaborators, ConnectTarget, Display, DrawImage, DrawUpdate, InputGrab,
    StatusListener, SystemClock, Transport, TransportEvent,
};
pub use config::{EngineConfig, parse_flag};
pub use engine::{Engine, PointerState, SessionStats};
pub use error::{DecodeError, EncodeError, FrameError, XpraError};
pub use flags::ProtocolFlags;
pub use header::{HEADER_SIZE, PacketHeader};
pub use keymap::{KeyEntry, Keymap, Modifiers};
pub use latency::{LatencySample, LatencyTracker};
pub use message::Command;
pub use network::{TcpTransport, TransportEvents};
pub use packet::{Deframer, FrameResult, MAX_PAYLOAD_SIZE, PendingChunks};
pub use state::{ConnectionState, StateMachine};
pub use value::Value;
pub use window::{PRIMARY_WINDOW, WindowRecord, WindowTable};
