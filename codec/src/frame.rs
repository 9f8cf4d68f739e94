use bytes::Bytes;

/// Start-of-frame marker (`>`).
pub const SOF: u8 = 0x3e;

/// End-of-frame marker (`<`).
pub const EOF: u8 = 0x3c;

/// Escape introducer (`\`).
pub const ESCAPE: u8 = 0x5c;

/// Bytes that must be escaped inside a frame body, paired with the byte
/// emitted after [`ESCAPE`] on the wire.
pub const ESCAPE_MAP: [(u8, u8); 5] = [
    (0x00, b'0'),
    (0xff, b'F'),
    (SOF, b'>'),
    (EOF, b'<'),
    (ESCAPE, ESCAPE),
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Ping     = b'P',
    Announce = b'A',
    Coap     = b'C',
    System   = b'S',
    Trace    = b'T',
}

impl FrameType {
    pub fn from_wire(b: u8) -> Option<Self> {
        match b {
            b'P' => Some(FrameType::Ping),
            b'A' => Some(FrameType::Announce),
            b'C' => Some(FrameType::Coap),
            b'S' => Some(FrameType::System),
            b'T' => Some(FrameType::Trace),
            _ => None,
        }
    }

    #[inline]
    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

/// One MUP1 message: a type tag and an opaque body.
///
/// `checksum_ok` is advisory. Decoding never drops a frame whose declared
/// checksum disagrees with the computed one; the mismatch is flagged here
/// and logged by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub ty:          FrameType,
    pub payload:     Bytes,
    pub checksum_ok: bool,
}

impl Frame {
    pub fn new(ty: FrameType, payload: impl Into<Bytes>) -> Self {
        Self {
            ty,
            payload: payload.into(),
            checksum_ok: true,
        }
    }

    #[inline]
    pub fn ping() -> Self {
        Self::new(FrameType::Ping, Bytes::new())
    }

    #[inline]
    pub fn coap(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameType::Coap, payload)
    }

    #[inline]
    pub fn system(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameType::System, payload)
    }
}

#[inline]
pub(crate) fn escaped(b: u8) -> Option<u8> {
    ESCAPE_MAP.iter().find(|&&(raw, _)| raw == b).map(|&(_, esc)| esc)
}

/// Inverse of the escape map. Unmapped bytes after an [`ESCAPE`] pass
/// through unchanged; the device side is known to emit such pairs.
#[inline]
pub(crate) fn unescaped(b: u8) -> u8 {
    match ESCAPE_MAP.iter().find(|&&(_, esc)| esc == b) {
        Some(&(raw, _)) => raw,
        None => b,
    }
}
