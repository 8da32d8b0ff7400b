//! FSLP frame header: `8E A1 | LEN_hi LEN_lo`.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use super::constants::{ALT_MAGIC_TOKEN, FRAME_HEADER_SIZE, MAGIC_TOKEN, MAX_FRAME_PAYLOAD};
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Transport is not open")]
    NotOpen,
    #[error("Did not receive magic token: got {:02X} {:02X}", .observed[0], .observed[1])]
    BadMagic { observed: [u8; 2] },
    #[error("No frame header found after scanning {scanned} bytes")]
    SyncLost { scanned: usize },
    #[error("Header too short: expected {expected}, got {actual}")]
    HeaderTooShort { expected: usize, actual: usize },
    #[error("Payload of {len} bytes does not fit a 16-bit length field")]
    PayloadTooLong { len: usize },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Decoded 4-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: [u8; 2],
    /// Payload byte count (header excluded).
    pub length: u16,
}

impl FrameHeader {
    pub const SIZE: usize = FRAME_HEADER_SIZE;

    /// Header for an outgoing payload. Always carries the primary magic.
    pub fn for_payload(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(FrameError::PayloadTooLong { len: payload.len() });
        }
        Ok(Self {
            magic: MAGIC_TOKEN,
            length: payload.len() as u16,
        })
    }

    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[..2].copy_from_slice(&self.magic);
        BigEndian::write_u16(&mut buf[2..], self.length);
        buf
    }

    /// Parse a received header.
    ///
    /// With `accept_alternate` the field-observed `7E A1` token is treated as
    /// equivalent to the primary one.
    pub fn from_bytes(data: &[u8], accept_alternate: bool) -> Result<Self, FrameError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::HeaderTooShort {
                expected: FRAME_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let magic = [data[0], data[1]];
        if !is_magic(magic, accept_alternate) {
            return Err(FrameError::BadMagic { observed: magic });
        }
        Ok(Self {
            magic,
            length: BigEndian::read_u16(&data[2..4]),
        })
    }

    pub fn payload_len(&self) -> usize {
        self.length as usize
    }

    pub fn is_alternate(&self) -> bool {
        self.magic == ALT_MAGIC_TOKEN
    }
}

pub(crate) fn is_magic(token: [u8; 2], accept_alternate: bool) -> bool {
    token == MAGIC_TOKEN || (accept_alternate && token == ALT_MAGIC_TOKEN)
}

/// Build a complete frame (header + payload) as one buffer.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let header = FrameHeader::for_payload(payload)?;
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FrameHeader::for_payload(&[0u8; 12]).unwrap();
        assert_eq!(header.to_bytes(), [0x8E, 0xA1, 0x00, 0x0C]);

        let big = FrameHeader::for_payload(&vec![0u8; 0x0102]).unwrap();
        assert_eq!(big.to_bytes(), [0x8E, 0xA1, 0x01, 0x02]);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; MAX_FRAME_PAYLOAD + 1];
        assert!(matches!(
            FrameHeader::for_payload(&payload),
            Err(FrameError::PayloadTooLong { len }) if len == MAX_FRAME_PAYLOAD + 1
        ));
    }

    #[test]
    fn test_alternate_magic_only_when_allowed() {
        let raw = [0x7E, 0xA1, 0x00, 0x04];
        assert!(matches!(
            FrameHeader::from_bytes(&raw, false),
            Err(FrameError::BadMagic { observed: [0x7E, 0xA1] })
        ));
        let header = FrameHeader::from_bytes(&raw, true).unwrap();
        assert!(header.is_alternate());
        assert_eq!(header.payload_len(), 4);
    }

    #[test]
    fn test_encode_frame_empty_payload() {
        assert_eq!(encode_frame(&[]).unwrap(), vec![0x8E, 0xA1, 0x00, 0x00]);
    }
}
