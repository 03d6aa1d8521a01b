//! Frame layer: header + bencoded payload, decompression, and raw-chunk
//! reassembly.
//!
//! A logical message may arrive as several frames: zero or more raw
//! chunks (chunk index > 0) followed by the primary frame (chunk index 0).
//! Chunks are held in [`PendingChunks`] until the primary frame arrives,
//! then spliced into its decoded value at their index.

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::bencode;
use crate::error::FrameError;
use crate::flags::ProtocolFlags;
use crate::header::{HEADER_SIZE, PacketHeader};
use crate::value::Value;

/// Largest payload accepted in either direction.
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

// ── FrameResult ──────────────────────────────────────────────────

/// Outcome of one [`Deframer::deframe`] call.
#[derive(Debug, PartialEq)]
pub enum FrameResult {
    /// Not enough bytes buffered yet; nothing was consumed.
    Incomplete,
    /// One frame was processed; the caller drops `len` bytes.
    ///
    /// `message` is `None` when the frame was a raw chunk.
    Consumed { len: usize, message: Option<Value> },
}

// ── PendingChunks ────────────────────────────────────────────────

/// Raw chunks waiting for their primary frame, keyed by chunk index.
///
/// Chunk bytes are opaque and never bencode-decoded.
#[derive(Debug, Default)]
pub struct PendingChunks {
    chunks: BTreeMap<u8, Vec<u8>>,
}

impl PendingChunks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: u8, data: Vec<u8>) {
        self.chunks.insert(index, data);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Move every pending chunk into `message`, leaving the table empty.
    ///
    /// In a list the chunk replaces the element at its index (the list is
    /// padded with empty byte strings if too short). In a mapping the key
    /// is the decimal form of the index.
    pub fn patch_into(&mut self, message: &mut Value) {
        for (index, data) in std::mem::take(&mut self.chunks) {
            let index = index as usize;
            match message {
                Value::List(items) => {
                    if items.len() <= index {
                        items.resize(index + 1, Value::Bytes(Vec::new()));
                    }
                    items[index] = Value::Bytes(data);
                }
                Value::Dict(entries) => {
                    entries.insert(index.to_string().into_bytes(), Value::Bytes(data));
                }
                _ => {}
            }
        }
    }
}

// ── Deframer ─────────────────────────────────────────────────────

/// Resumable receive-side frame parser.
///
/// Processes at most one frame per call so the caller can interleave
/// other work between back-to-back frames.
#[derive(Debug)]
pub struct Deframer {
    pending: PendingChunks,
    max_payload: usize,
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deframer {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            pending: PendingChunks::new(),
            max_payload,
        }
    }

    /// Raw chunks received but not yet claimed by a primary frame.
    pub fn pending(&self) -> &PendingChunks {
        &self.pending
    }

    /// Drop any partially reassembled message.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Try to process the frame at the start of `buf`.
    pub fn deframe(&mut self, buf: &[u8]) -> Result<FrameResult, FrameError> {
        let Some(header) = PacketHeader::parse(buf)? else {
            return Ok(FrameResult::Incomplete);
        };
        if !header.flags.is_supported() {
            return Err(FrameError::UnsupportedFlags(header.flags.bits()));
        }
        let size = header.payload_length as usize;
        if size > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload,
            });
        }
        let len = header.frame_len();
        let Some(payload) = buf.get(HEADER_SIZE..len) else {
            return Ok(FrameResult::Incomplete);
        };

        let payload = if header.is_compressed() {
            inflate(payload, self.max_payload)?
        } else {
            payload.to_vec()
        };

        if header.is_chunk() {
            self.pending.insert(header.chunk_index, payload);
            return Ok(FrameResult::Consumed { len, message: None });
        }

        let mut message = bencode::decode_all(&payload)?;
        match message.as_list() {
            Some([first, ..]) if first.as_bytes().is_some() => {}
            _ => return Err(FrameError::NotACommand),
        }
        self.pending.patch_into(&mut message);
        Ok(FrameResult::Consumed {
            len,
            message: Some(message),
        })
    }
}

/// Inflate a zlib stream, refusing output larger than `max`.
fn inflate(payload: &[u8], max: usize) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::new();
    ZlibDecoder::new(payload)
        .take(max as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| FrameError::Compression(e.to_string()))?;
    if out.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: out.len(),
            max,
        });
    }
    Ok(out)
}

// ── Enframing ────────────────────────────────────────────────────

/// Build `[command, args...]`, encode it and prepend the header.
///
/// Outgoing frames are always uncompressed primary frames.
pub fn enframe(command: &str, args: Vec<Value>) -> Result<Vec<u8>, FrameError> {
    let mut items = Vec::with_capacity(args.len() + 1);
    items.push(Value::from(command));
    items.extend(args);
    enframe_value(&Value::List(items))
}

/// Encode an already-built message value into a frame.
pub fn enframe_value(message: &Value) -> Result<Vec<u8>, FrameError> {
    let payload = bencode::encode(message);
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let header = PacketHeader::new(payload.len() as u32);
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Build a raw frame around an arbitrary payload. Used by tests and
/// fake servers to produce chunked or compressed traffic.
pub fn raw_frame(header: PacketHeader, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    frame
}
