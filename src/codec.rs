//! C2: the 14-byte header that prefixes every mesh frame, on both the
//! radio and UDP transports.
//!
//! ```norust
//!  1    | 6       | 6       | 1   | ...
//! type | src_mac | dst_mac | ttl | payload
//! ```

use crate::HwAddr;

/// Header length in bytes (offsets 0..14 of every frame).
pub const HEADER_LEN: usize = 14;

/// TTL written by the originator of a frame. Forwarders only ever
/// decrement, never re-raise, this value.
pub const MAX_TTL: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Frame shorter than [`HEADER_LEN`].
    TooShort { have: usize, need: usize },
    /// `type` byte did not match a known [`FrameType`] discriminant.
    UnknownFrameType { value: u8 },
}

/// One of the seven frame kinds carried in byte 0 of the header.
///
/// Discriminants are fixed by the wire format (spec §3.2) and must not be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Hello = 0,
    RReq = 1,
    RRep = 2,
    Data = 3,
    RErr = 4,
    Ack = 7,
}

impl TryFrom<u8> for FrameType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => FrameType::Hello,
            1 => FrameType::RReq,
            2 => FrameType::RRep,
            3 => FrameType::Data,
            4 => FrameType::RErr,
            7 => FrameType::Ack,
            _ => return Err(CodecError::UnknownFrameType { value }),
        })
    }
}

impl From<FrameType> for u8 {
    fn from(t: FrameType) -> Self {
        t as u8
    }
}

/// A decoded, zero-copy view over a frame's header and payload.
///
/// Mirrors the byte-slice-with-accessor-methods shape used throughout this
/// crate's frame parsing: no allocation, the payload keeps borrowing from
/// the original buffer.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    ty: FrameType,
    src_mac: HwAddr,
    dst_mac: HwAddr,
    ttl: u8,
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn ty(&self) -> FrameType {
        self.ty
    }

    pub fn src_mac(&self) -> HwAddr {
        self.src_mac
    }

    pub fn dst_mac(&self) -> HwAddr {
        self.dst_mac
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Decode a frame. Does not inspect `payload` — the codec's only job is
    /// the header.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::TooShort {
                have: bytes.len(),
                need: HEADER_LEN,
            });
        }

        let ty = FrameType::try_from(bytes[0])?;
        let mut src_mac = [0u8; 6];
        src_mac.copy_from_slice(&bytes[1..7]);
        let mut dst_mac = [0u8; 6];
        dst_mac.copy_from_slice(&bytes[7..13]);
        let ttl = bytes[13];

        Ok(Self {
            ty,
            src_mac,
            dst_mac,
            ttl,
            payload: &bytes[HEADER_LEN..],
        })
    }

    /// Encode a header + payload into a caller-owned buffer (radio MTU is
    /// bounded, so the hot forwarding path never allocates). Returns the
    /// number of bytes written.
    pub fn encode_into(
        buf: &mut [u8],
        ty: FrameType,
        src_mac: HwAddr,
        dst_mac: HwAddr,
        ttl: u8,
        payload: &[u8],
    ) -> Result<usize, CodecError> {
        let total = HEADER_LEN + payload.len();
        if buf.len() < total {
            return Err(CodecError::TooShort {
                have: buf.len(),
                need: total,
            });
        }

        buf[0] = ty.into();
        buf[1..7].copy_from_slice(&src_mac);
        buf[7..13].copy_from_slice(&dst_mac);
        buf[13] = ttl;
        buf[HEADER_LEN..total].copy_from_slice(payload);

        Ok(total)
    }

    /// Allocating convenience for the UDP/sink side, where frames are
    /// assembled once and handed to a socket rather than reused from a
    /// fixed ring buffer.
    pub fn encode_vec(
        ty: FrameType,
        src_mac: HwAddr,
        dst_mac: HwAddr,
        ttl: u8,
        payload: &[u8],
    ) -> alloc::vec::Vec<u8> {
        let mut v = alloc::vec![0u8; HEADER_LEN + payload.len()];
        Self::encode_into(&mut v, ty, src_mac, dst_mac, ttl, payload)
            .expect("buffer sized exactly for header + payload");
        v
    }
}
