//! `tokio_util` codec over the frame layer.
//!
//! The engine drives its receive queue through [`Decoder::decode`]; the
//! same codec can back a `Framed` stream when a caller owns the socket.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;
use crate::header::PacketHeader;
use crate::packet::{self, Deframer, FrameResult, PendingChunks};
use crate::value::Value;

/// One processed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Deframed {
    /// A raw chunk with this index was stored for a later primary frame.
    Chunk(u8),
    /// A complete logical message, chunks already patched in.
    Message(Value),
}

#[derive(Debug, Default)]
pub struct XpraCodec {
    deframer: Deframer,
}

impl XpraCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            deframer: Deframer::with_max_payload(max_payload),
        }
    }

    pub fn pending(&self) -> &PendingChunks {
        self.deframer.pending()
    }

    /// Forget partially reassembled chunks (new connection).
    pub fn reset(&mut self) {
        self.deframer.reset();
    }
}

impl Decoder for XpraCodec {
    type Item = Deframed;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Deframed>, FrameError> {
        let Some(header) = PacketHeader::parse(src)? else {
            return Ok(None);
        };
        match self.deframer.deframe(src)? {
            FrameResult::Incomplete => {
                src.reserve(header.frame_len().saturating_sub(src.len()));
                Ok(None)
            }
            FrameResult::Consumed { len, message } => {
                src.advance(len);
                Ok(Some(match message {
                    Some(message) => Deframed::Message(message),
                    None => Deframed::Chunk(header.chunk_index),
                }))
            }
        }
    }
}

impl Encoder<Value> for XpraCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), FrameError> {
        let frame = packet::enframe_value(&item)?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
