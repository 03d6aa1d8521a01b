use crate::error::FrameError;
use crate::flags::ProtocolFlags;

/// Magic byte opening every packet (`'P'`).
pub const MAGIC: u8 = b'P';

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 8;

pub type PacketHeaderBytes = [u8; HEADER_SIZE];

/// Fixed 8-byte header preceding every frame.
///
/// ```text
/// byte 0     magic ('P')
/// byte 1     protocol flags
/// byte 2     compression level (0 = uncompressed)
/// byte 3     chunk index (0 = primary, >0 = raw chunk)
/// bytes 4-7  payload length, u32 big-endian
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: u8,
    pub flags: ProtocolFlags,
    pub compression_level: u8,
    pub chunk_index: u8,
    pub payload_length: u32,
}

impl PacketHeader {
    /// Header for an uncompressed primary packet.
    pub fn new(payload_length: u32) -> Self {
        Self {
            magic: MAGIC,
            flags: ProtocolFlags::empty(),
            compression_level: 0,
            chunk_index: 0,
            payload_length,
        }
    }

    pub fn to_bytes(&self) -> PacketHeaderBytes {
        let mut header: PacketHeaderBytes = [0; HEADER_SIZE];
        header[0] = self.magic;
        header[1] = self.flags.bits();
        header[2] = self.compression_level;
        header[3] = self.chunk_index;
        header[4..8].copy_from_slice(&self.payload_length.to_be_bytes());
        header
    }

    /// Parse the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Returns `Ok(None)` when fewer bytes are available.
    pub fn parse(bytes: &[u8]) -> Result<Option<Self>, FrameError> {
        let Some(header) = bytes.first_chunk::<HEADER_SIZE>() else {
            return Ok(None);
        };
        if header[0] != MAGIC {
            return Err(FrameError::InvalidMagic(header[0]));
        }
        Ok(Some(Self {
            magic: header[0],
            flags: ProtocolFlags::from_bits_retain(header[1]),
            compression_level: header[2],
            chunk_index: header[3],
            payload_length: u32::from_be_bytes([header[4], header[5], header[6], header[7]]),
        }))
    }

    /// Total frame size: header plus payload.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_length as usize
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_level > 0
    }

    pub fn is_chunk(&self) -> bool {
        self.chunk_index > 0
    }
}
