// SPDX-License-Identifier: MIT

//! On-wire envelope: a fixed 8-byte header in front of every datagram.
//!
//! ```text
//! byte 0-3  magic    (big-endian u32, FRAME_MAGIC)
//! byte 4    version  (FRAME_VERSION)
//! byte 5    type     (0x01 DATA, 0x02 PING, 0x03 PONG)
//! byte 6-7  reserved (zero)
//! ```

use std::time::Duration;

use crate::config::{FRAME_HEADER_LEN, FRAME_MAGIC, FRAME_VERSION, PING_BODY_LEN};

/// Classified frame type. `Unknown` carries the raw byte so callers can log
/// it; unknown types are ignored, not treated as validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Ping,
    Pong,
    Unknown(u8),
}

impl FrameType {
    const DATA: u8 = 0x01;
    const PING: u8 = 0x02;
    const PONG: u8 = 0x03;

    fn from_byte(b: u8) -> Self {
        match b {
            Self::DATA => FrameType::Data,
            Self::PING => FrameType::Ping,
            Self::PONG => FrameType::Pong,
            other => FrameType::Unknown(other),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            FrameType::Data => Self::DATA,
            FrameType::Ping => Self::PING,
            FrameType::Pong => Self::PONG,
            FrameType::Unknown(b) => b,
        }
    }
}

/// Why a received buffer was rejected before it ever reached the dispatcher
/// proper. The caller decides which metrics counter to bump for each
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    TooShort,
    BadMagic,
    BadVersion,
}

/// Validate and classify a received buffer's header.
///
/// Rejects a buffer shorter than the header, a magic mismatch, or a
/// version mismatch. Unknown but otherwise well-formed types are returned
/// as `FrameType::Unknown` rather than rejected.
pub fn decode_header(buf: &[u8]) -> Result<FrameType, FrameError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Err(FrameError::TooShort);
    }
    let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != FRAME_MAGIC {
        return Err(FrameError::BadMagic);
    }
    if buf[4] != FRAME_VERSION {
        return Err(FrameError::BadVersion);
    }
    Ok(FrameType::from_byte(buf[5]))
}

/// Stamp `buf[0..FRAME_HEADER_LEN]` with a valid header of the given type.
/// `buf` must be at least `FRAME_HEADER_LEN` bytes long.
pub fn encode_header(buf: &mut [u8], frame_type: FrameType) {
    debug_assert!(buf.len() >= FRAME_HEADER_LEN);
    buf[0..4].copy_from_slice(&FRAME_MAGIC.to_be_bytes());
    buf[4] = FRAME_VERSION;
    buf[5] = frame_type.to_byte();
    buf[6] = 0;
    buf[7] = 0;
}

/// Rewrite only the type byte of an already-framed buffer in place — used
/// to turn a received PING into its PONG reflection without re-encoding
/// the rest of the header or copying the body.
pub fn rewrite_type(buf: &mut [u8], frame_type: FrameType) {
    debug_assert!(buf.len() >= FRAME_HEADER_LEN);
    buf[5] = frame_type.to_byte();
}

/// Encode a PING/PONG body: an 8-byte second count followed by an 8-byte
/// nanosecond count, both relative to the handle's monotonic epoch.
/// `body` must be at least `PING_BODY_LEN` bytes long.
pub fn encode_timestamp(body: &mut [u8], elapsed: Duration) {
    debug_assert!(body.len() >= PING_BODY_LEN);
    body[0..8].copy_from_slice(&elapsed.as_secs().to_be_bytes());
    body[8..16].copy_from_slice(&u64::from(elapsed.subsec_nanos()).to_be_bytes());
}

/// Decode a PING/PONG body produced by [`encode_timestamp`].
pub fn decode_timestamp(body: &[u8]) -> Duration {
    debug_assert!(body.len() >= PING_BODY_LEN);
    let secs = u64::from_be_bytes(body[0..8].try_into().unwrap());
    let nanos = u64::from_be_bytes(body[8..16].try_into().unwrap()) as u32;
    Duration::new(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header() {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        encode_header(&mut buf, FrameType::Data);
        assert_eq!(decode_header(&buf).unwrap(), FrameType::Data);
    }

    #[test]
    fn rejects_short_buffer() {
        let buf = [0u8; 4];
        assert_eq!(decode_header(&buf), Err(FrameError::TooShort));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        encode_header(&mut buf, FrameType::Ping);
        buf[0] ^= 0xff;
        assert_eq!(decode_header(&buf), Err(FrameError::BadMagic));
    }

    #[test]
    fn rejects_bad_version() {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        encode_header(&mut buf, FrameType::Ping);
        buf[4] = FRAME_VERSION.wrapping_add(1);
        assert_eq!(decode_header(&buf), Err(FrameError::BadVersion));
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        encode_header(&mut buf, FrameType::Data);
        buf[5] = 0x7f;
        assert_eq!(decode_header(&buf).unwrap(), FrameType::Unknown(0x7f));
    }

    #[test]
    fn timestamp_round_trips() {
        let mut body = [0u8; PING_BODY_LEN];
        let d = Duration::new(12, 345);
        encode_timestamp(&mut body, d);
        assert_eq!(decode_timestamp(&body), d);
    }

    #[test]
    fn rewrite_type_preserves_rest_of_header() {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        encode_header(&mut buf, FrameType::Ping);
        rewrite_type(&mut buf, FrameType::Pong);
        assert_eq!(decode_header(&buf).unwrap(), FrameType::Pong);
    }
}
