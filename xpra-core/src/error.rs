//! Domain-specific error types for the Xpra protocol engine.
//!
//! Codec and frame failures are typed so the engine can decide whether a
//! failure is fatal to the connection. No panics on invalid wire input.

use thiserror::Error;

use crate::state::ConnectionState;

/// The canonical error type for engine operations.
#[derive(Debug, Error)]
pub enum XpraError {
    // ── Lifecycle Errors ─────────────────────────────────────────
    /// `connect` was called without a host or with port 0.
    #[error("must set host and port")]
    MissingTarget,

    /// An operation is not legal in the current connection state.
    #[error("cannot {op} while in state '{state}'")]
    InvalidState {
        op: &'static str,
        state: ConnectionState,
    },

    /// The engine hit an unrecoverable startup error.
    #[error("fatal: {0}")]
    Fatal(String),

    // ── Collaborator Errors ──────────────────────────────────────
    /// The display collaborator could not be initialised.
    #[error("display error: {0}")]
    Display(String),

    /// The transport collaborator reported a failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    // ── Wire Errors ──────────────────────────────────────────────
    /// Encoding an outgoing value failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Deframing an incoming packet failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

// ── EncodeError ──────────────────────────────────────────────────

/// Failure while turning a Rust value into a structured [`Value`].
///
/// [`Value`]: crate::value::Value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// The value has no bencode representation (floats, unit, ...).
    #[error("unsupported type for bencode: {0}")]
    UnsupportedType(&'static str),

    /// A mapping key was neither a string nor a byte string.
    #[error("mapping keys must be strings or byte strings")]
    InvalidKey,

    /// Error raised by a `Serialize` implementation.
    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for EncodeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        EncodeError::Custom(msg.to_string())
    }
}

// ── DecodeError ──────────────────────────────────────────────────

/// Failure while parsing bencoded bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A terminator or the declared number of bytes is missing.
    #[error("truncated input at offset {offset}")]
    Truncated { offset: usize },

    /// The byte at `offset` does not start any known value kind.
    #[error("invalid tag {byte:#04x} at offset {offset}")]
    InvalidTag { byte: u8, offset: usize },

    /// A mapping key was not strictly greater than the previous key.
    #[error("unsorted or duplicate mapping key at offset {offset}")]
    UnsortedKeys { offset: usize },

    /// An integer body is empty, malformed or out of range.
    #[error("invalid integer at offset {offset}")]
    InvalidInteger { offset: usize },

    /// A byte-string length prefix is malformed.
    #[error("invalid string length at offset {offset}")]
    InvalidLength { offset: usize },

    /// Containers are nested deeper than the decoder allows.
    #[error("nesting deeper than {max} at offset {offset}")]
    DepthExceeded { max: usize, offset: usize },

    /// Bytes remain after a complete top-level value.
    #[error("trailing bytes after value at offset {offset}")]
    TrailingBytes { offset: usize },
}

// ── FrameError ───────────────────────────────────────────────────

/// Failure while deframing a packet. All variants are fatal to the
/// connection: byte alignment cannot be recovered mid-stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The first header byte is not the protocol magic.
    #[error("invalid magic byte {0:#04x}")]
    InvalidMagic(u8),

    /// The header requests an encoding or cipher this client lacks.
    #[error("unsupported protocol flags {0:#04x}")]
    UnsupportedFlags(u8),

    /// The declared payload exceeds the configured maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The zlib stream is corrupt.
    #[error("decompression failed: {0}")]
    Compression(String),

    /// The primary payload is not valid bencode.
    #[error("malformed payload: {0}")]
    Decode(#[from] DecodeError),

    /// The primary payload is not a list starting with a tag string.
    #[error("payload is not a command list")]
    NotACommand,

    /// Encoding an outgoing frame failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// I/O error surfaced through the `tokio_util` codec traits.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = FrameError::PayloadTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = DecodeError::InvalidTag {
            byte: b'x',
            offset: 3,
        };
        assert!(e.to_string().contains("0x78"));
    }

    #[test]
    fn decode_error_wraps_into_frame_error() {
        let e: FrameError = DecodeError::Truncated { offset: 7 }.into();
        assert!(matches!(e, FrameError::Decode(DecodeError::Truncated { offset: 7 })));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: FrameError = io_err.into();
        assert!(matches!(e, FrameError::Io(_)));
    }

    #[test]
    fn invalid_state_names_the_state() {
        let e = XpraError::InvalidState {
            op: "connect",
            state: ConnectionState::Normal,
        };
        assert_eq!(e.to_string(), "cannot connect while in state 'normal'");
    }
}
