use bitflags::bitflags;

bitflags! {
    /// Protocol flags byte of the packet header.
    ///
    /// This client speaks bencode in clear only, so every defined bit
    /// marks a packet it cannot read.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProtocolFlags: u8 {
        /// Payload is rencoded instead of bencoded.
        const RENCODE = 0x01;
        /// Payload is encrypted.
        const CIPHER  = 0x02;
        /// Payload is YAML.
        const YAML    = 0x04;
    }
}

impl ProtocolFlags {
    /// Flags this client can decode.
    pub const SUPPORTED: ProtocolFlags = ProtocolFlags::empty();

    /// `true` when the flags only request encodings this client handles.
    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(self)
    }
}
