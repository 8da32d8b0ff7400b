//! Command envelope: `SEQ | FN_ID | STATUS | DATA`, all header words big-endian.
//!
//! Function ids are opaque here; nothing in this module knows what a given id
//! does on the camera.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::{ENVELOPE_HEADER_SIZE, STATUS_PLACEHOLDER};
use super::status::ReturnCode;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Payload too short: {len} bytes, envelope header needs 12")]
    ShortPayload { len: usize },
    #[error("Sequence mismatch: got 0x{actual:08X}, expected 0x{expected:08X}")]
    SequenceMismatch { expected: u32, actual: u32 },
    #[error("Function ID mismatch: got 0x{actual:08X}, expected 0x{expected:08X}")]
    FunctionMismatch { expected: u32, actual: u32 },
    #[error("Unexpected status: got {actual}, expected {expected}")]
    Status {
        expected: ReturnCode,
        actual: ReturnCode,
    },
}

/// Parsed 12-byte envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub sequence: u32,
    pub function_id: u32,
    pub status: ReturnCode,
}

impl EnvelopeHeader {
    pub const SIZE: usize = ENVELOPE_HEADER_SIZE;

    /// Header of an outgoing command; the status is not known yet.
    pub fn command(sequence: u32, function_id: u32) -> Self {
        Self {
            sequence,
            function_id,
            status: ReturnCode::PLACEHOLDER,
        }
    }

    pub fn to_bytes(&self) -> [u8; ENVELOPE_HEADER_SIZE] {
        let mut buf = [0u8; ENVELOPE_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[0..4], self.sequence);
        BigEndian::write_u32(&mut buf[4..8], self.function_id);
        BigEndian::write_u32(&mut buf[8..12], self.status.raw());
        buf
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bytes());
    }

    pub fn from_bytes(payload: &[u8]) -> Result<Self, EnvelopeError> {
        if payload.len() < Self::SIZE {
            return Err(EnvelopeError::ShortPayload { len: payload.len() });
        }
        let mut cursor = Cursor::new(payload);
        let mut word = || {
            cursor
                .read_u32::<BigEndian>()
                .map_err(|_| EnvelopeError::ShortPayload { len: payload.len() })
        };
        Ok(Self {
            sequence: word()?,
            function_id: word()?,
            status: ReturnCode::new(word()?),
        })
    }
}

/// Encode an outgoing command payload with the `FFFFFFFF` status placeholder.
pub fn encode_command(sequence: u32, function_id: u32, data: &[u8]) -> Vec<u8> {
    encode_envelope(EnvelopeHeader::command(sequence, function_id), data)
}

/// Encode an envelope with an explicit status word (responses, test vectors).
pub fn encode_envelope(header: EnvelopeHeader, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENVELOPE_HEADER_SIZE + data.len());
    header.write_to(&mut buf);
    buf.extend_from_slice(data);
    buf
}

/// Validate an envelope against the expected header words and return its data.
///
/// Pass [`STATUS_PLACEHOLDER`] as `expected_status` when checking an outgoing
/// command and `0` when checking a successful response. Checks run in the
/// order sequence, function id, status.
pub fn decode_and_validate(
    payload: &[u8],
    expected_sequence: u32,
    expected_function_id: u32,
    expected_status: u32,
) -> Result<&[u8], EnvelopeError> {
    let header = EnvelopeHeader::from_bytes(payload)?;
    if header.sequence != expected_sequence {
        return Err(EnvelopeError::SequenceMismatch {
            expected: expected_sequence,
            actual: header.sequence,
        });
    }
    if header.function_id != expected_function_id {
        return Err(EnvelopeError::FunctionMismatch {
            expected: expected_function_id,
            actual: header.function_id,
        });
    }
    if header.status.raw() != expected_status {
        return Err(EnvelopeError::Status {
            expected: ReturnCode::new(expected_status),
            actual: header.status,
        });
    }
    Ok(&payload[ENVELOPE_HEADER_SIZE..])
}

/// Shorthand for validating an outgoing command payload.
pub fn decode_command(
    payload: &[u8],
    expected_sequence: u32,
    expected_function_id: u32,
) -> Result<&[u8], EnvelopeError> {
    decode_and_validate(payload, expected_sequence, expected_function_id, STATUS_PLACEHOLDER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::STATUS_SUCCESS;

    const SET_MIPI_STATE: u32 = 0x0006_0024;

    #[test]
    fn test_encode_set_mipi_state() {
        let payload = encode_command(1, SET_MIPI_STATE, &[0x00, 0x00, 0x00, 0x02]);
        assert_eq!(
            payload,
            vec![
                0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 0x00, 0x24, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00,
                0x00, 0x02
            ]
        );
        let data = decode_command(&payload, 1, SET_MIPI_STATE).unwrap();
        assert_eq!(data, &[0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_response_with_success_status() {
        let header = EnvelopeHeader {
            sequence: 1,
            function_id: SET_MIPI_STATE,
            status: ReturnCode::SUCCESS,
        };
        let payload = encode_envelope(header, &[0, 0, 0, 2]);
        let data = decode_and_validate(&payload, 1, SET_MIPI_STATE, STATUS_SUCCESS).unwrap();
        assert_eq!(data, &[0, 0, 0, 2]);
    }

    #[test]
    fn test_short_payload() {
        assert_eq!(
            decode_command(&[0u8; 11], 0, 0),
            Err(EnvelopeError::ShortPayload { len: 11 })
        );
    }

    #[test]
    fn test_header_only_payload_has_empty_data() {
        let payload = encode_command(7, 0x0005_0002, &[]);
        assert_eq!(payload.len(), ENVELOPE_HEADER_SIZE);
        assert!(decode_command(&payload, 7, 0x0005_0002).unwrap().is_empty());
    }

    #[test]
    fn test_mismatches_reported_in_order() {
        let payload = encode_command(2, SET_MIPI_STATE, &[]);
        assert_eq!(
            decode_command(&payload, 3, 0x1234),
            Err(EnvelopeError::SequenceMismatch {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            decode_command(&payload, 2, 0x1234),
            Err(EnvelopeError::FunctionMismatch {
                expected: 0x1234,
                actual: SET_MIPI_STATE
            })
        );
        assert_eq!(
            decode_and_validate(&payload, 2, SET_MIPI_STATE, STATUS_SUCCESS),
            Err(EnvelopeError::Status {
                expected: ReturnCode::SUCCESS,
                actual: ReturnCode::PLACEHOLDER
            })
        );
    }
}
