//! Connection lifecycle state machine.
//!
//! [`StateMachine::apply`] decides what a requested transition actually
//! does; the engine performs the side effects (timers, transport close,
//! display reset) around it.

use std::fmt;

use tracing::{debug, error};

// ── ConnectionState ──────────────────────────────────────────────

/// The lifecycle phase of a client connection.
///
/// ```text
///  loaded ──► connect ──► handshake ──► normal ──► disconnect ──► disconnected
///               │             │            │            │
///               └─────────────┴─────┬──────┴────────────┘
///                                   ▼
///                                failed ──(50 ms)──► (stays failed)
/// ```
///
/// `fatal` is absorbing: nothing leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    Disconnected,
    /// Engine constructed with working collaborators, never connected.
    #[default]
    Loaded,
    /// Transport open requested.
    Connect,
    /// Transport open, `hello` sent.
    Handshake,
    /// Server `hello` received; traffic flows.
    Normal,
    /// Close requested, waiting for the transport to confirm.
    Disconnect,
    Failed,
    /// Unrecoverable; e.g. no usable render mode.
    Fatal,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 8] = [
        Self::Disconnected,
        Self::Loaded,
        Self::Connect,
        Self::Handshake,
        Self::Normal,
        Self::Disconnect,
        Self::Failed,
        Self::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Loaded => "loaded",
            Self::Connect => "connect",
            Self::Handshake => "handshake",
            Self::Normal => "normal",
            Self::Disconnect => "disconnect",
            Self::Failed => "failed",
            Self::Fatal => "fatal",
        }
    }

    /// States whose entry tears down the session: timers cancelled,
    /// input released, display reset, transport closed.
    pub fn resets_session(&self) -> bool {
        !matches!(self, Self::Handshake | Self::Normal)
    }

    /// States in which incoming frames are processed.
    pub fn accepts_data(&self) -> bool {
        matches!(self, Self::Handshake | Self::Normal)
    }

    /// States from which a new `connect` may start.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Loaded | Self::Disconnected | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Transition ───────────────────────────────────────────────────

/// Outcome of an applied state change, reported to the status listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The state the caller asked for.
    pub requested: ConnectionState,
    /// The state before the change.
    pub old: ConnectionState,
    /// The state actually in effect now.
    pub current: ConnectionState,
    /// Status message to report, if any.
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current: ConnectionState,
    message: Option<String>,
}

impl StateMachine {
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            current: initial,
            message: None,
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// Last status message recorded with a transition.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Apply a requested transition.
    ///
    /// Returns `None` when nothing changes: the state is already current,
    /// or the machine is `fatal`. A request for `disconnected` while
    /// `failed` keeps `failed` in effect along with its message, and
    /// reports no message of its own. Entering `normal` from `disconnected`
    /// or `failed` is logged as invalid but still applied.
    pub fn apply(
        &mut self,
        requested: ConnectionState,
        message: Option<&str>,
    ) -> Option<Transition> {
        use ConnectionState::*;

        let old = self.current;
        if requested == old {
            debug!("already in state '{requested}', ignoring");
            return None;
        }
        if old == Fatal {
            error!("fatal error, cannot continue (requested '{requested}')");
            return None;
        }

        match (old, requested) {
            (Disconnected | Failed, Normal) | (Disconnected, Failed) => {
                error!("invalid transition from '{old}' to '{requested}'");
            }
            _ => {}
        }

        let sticky = old == Failed && requested == Disconnected;
        let reported = if sticky {
            None
        } else {
            self.message = message.map(str::to_owned);
            self.message.clone()
        };
        if !sticky {
            self.current = requested;
        }

        Some(Transition {
            requested,
            old,
            current: self.current,
            message: reported,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
