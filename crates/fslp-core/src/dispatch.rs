//! Command dispatcher: one request/response exchange at a time.
//!
//! Owns a [`FrameCodec`] and the command sequence counter. Each command gets
//! the next sequence number; the response must echo it along with the
//! function id and carry a success status. Nothing is retried here.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::codec::FrameCodec;
use crate::protocol::constants::{ENVELOPE_HEADER_SIZE, STATUS_SUCCESS};
use crate::protocol::envelope::{EnvelopeError, decode_and_validate, encode_command};
use crate::protocol::header::FrameError;
use crate::protocol::status::ReturnCode;
use crate::transport::{Transport, TransportError};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl From<TransportError> for DispatchError {
    fn from(e: TransportError) -> Self {
        DispatchError::Frame(FrameError::Transport(e))
    }
}

impl DispatchError {
    /// Result code the camera SDK reports for this failure, where one exists.
    pub fn return_code(&self) -> Option<ReturnCode> {
        match self {
            DispatchError::Envelope(EnvelopeError::SequenceMismatch { .. }) => {
                Some(ReturnCode::new(0x0000_0131))
            }
            DispatchError::Envelope(EnvelopeError::FunctionMismatch { .. }) => {
                Some(ReturnCode::new(0x0000_0132))
            }
            DispatchError::Envelope(EnvelopeError::Status { actual, .. }) => Some(*actual),
            DispatchError::Frame(FrameError::NotOpen)
            | DispatchError::Frame(FrameError::Transport(TransportError::NotOpen)) => {
                Some(ReturnCode::new(0x0000_0265))
            }
            _ => None,
        }
    }
}

pub struct Dispatcher<T: Transport> {
    codec: FrameCodec<T>,
    /// Last sequence number issued.
    sequence: u32,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(codec: FrameCodec<T>) -> Self {
        Self { codec, sequence: 0 }
    }

    /// Start counting from `sequence`; the first command uses `sequence + 1`.
    pub fn with_initial_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn codec(&self) -> &FrameCodec<T> {
        &self.codec
    }

    pub fn codec_mut(&mut self) -> &mut FrameCodec<T> {
        &mut self.codec
    }

    pub fn into_codec(self) -> FrameCodec<T> {
        self.codec
    }

    /// Send one command; returns the sequence number it was issued with.
    ///
    /// The sequence number is consumed even if the send fails.
    #[instrument(skip(self, function_id, data), fields(fn_id = %format!("0x{:08X}", function_id)))]
    pub fn transmit(&mut self, function_id: u32, data: &[u8]) -> Result<u32, DispatchError> {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;
        let payload = encode_command(sequence, function_id, data);
        self.codec.send_frame(&payload)?;
        debug!(sequence = sequence, data_len = data.len(), "Command sent");
        Ok(sequence)
    }

    /// Read the response to a command sent with `sequence` and return its data.
    #[instrument(skip(self, function_id), fields(fn_id = %format!("0x{:08X}", function_id)))]
    pub fn receive(
        &mut self,
        sequence: u32,
        function_id: u32,
        expected_len: usize,
    ) -> Result<Vec<u8>, DispatchError> {
        let payload = self.codec.read_frame(ENVELOPE_HEADER_SIZE + expected_len)?;
        let data = decode_and_validate(&payload, sequence, function_id, STATUS_SUCCESS)?;
        debug!(sequence = sequence, data_len = data.len(), "Response accepted");
        Ok(data.to_vec())
    }

    /// Send a command and wait for its response.
    pub fn dispatch(
        &mut self,
        function_id: u32,
        data: &[u8],
        expected_len: usize,
    ) -> Result<Vec<u8>, DispatchError> {
        let sequence = self.transmit(function_id, data)?;
        self.receive(sequence, function_id, expected_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::envelope::{EnvelopeHeader, encode_envelope};
    use crate::protocol::header::encode_frame;
    use crate::transport::MockTransport;

    const GET_MIPI_STATE: u32 = 0x0006_0026;

    fn response(sequence: u32, function_id: u32, status: u32, data: &[u8]) -> Vec<u8> {
        let header = EnvelopeHeader {
            sequence,
            function_id,
            status: ReturnCode::new(status),
        };
        encode_frame(&encode_envelope(header, data)).unwrap()
    }

    #[test]
    fn test_dispatch_round_trip() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&response(1, GET_MIPI_STATE, 0, &[0, 0, 0, 2]));
        let mut dispatcher = Dispatcher::new(FrameCodec::new(mock));

        let data = dispatcher.dispatch(GET_MIPI_STATE, &[], 4).unwrap();
        assert_eq!(data, vec![0, 0, 0, 2]);
        assert_eq!(dispatcher.sequence(), 1);

        let writes = dispatcher.codec().get_ref().writes();
        assert_eq!(
            writes[0],
            vec![
                0x8E, 0xA1, 0x00, 0x0C, 0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 0x00, 0x26, 0xFF, 0xFF,
                0xFF, 0xFF
            ]
        );
    }

    #[test]
    fn test_sequence_increments_per_command() {
        let mut mock = MockTransport::opened();
        for seq in 11..=13 {
            mock.queue_rx(&response(seq, GET_MIPI_STATE, 0, &[]));
        }
        let mut dispatcher = Dispatcher::new(FrameCodec::new(mock)).with_initial_sequence(10);
        for expected in 11..=13 {
            dispatcher.dispatch(GET_MIPI_STATE, &[], 0).unwrap();
            assert_eq!(dispatcher.sequence(), expected);
        }
    }

    #[test]
    fn test_camera_error_status_surfaces() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&response(1, GET_MIPI_STATE, 0x0000_0203, &[]));
        let mut dispatcher = Dispatcher::new(FrameCodec::new(mock));

        let err = dispatcher.dispatch(GET_MIPI_STATE, &[], 0).unwrap_err();
        assert_eq!(err.return_code(), Some(ReturnCode::new(0x0000_0203)));
        assert!(err.to_string().contains("FLR_RANGE_ERROR"));
    }

    #[test]
    fn test_stale_response_is_sequence_mismatch() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&response(7, GET_MIPI_STATE, 0, &[]));
        let mut dispatcher = Dispatcher::new(FrameCodec::new(mock));

        let err = dispatcher.dispatch(GET_MIPI_STATE, &[], 0).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Envelope(EnvelopeError::SequenceMismatch {
                expected: 1,
                actual: 7
            })
        ));
        assert_eq!(
            err.return_code().and_then(|code| code.name()),
            Some("R_SDK_DSPCH_SEQUENCE_MISMATCH")
        );
    }

    #[test]
    fn test_split_transmit_receive() {
        let mut dispatcher = Dispatcher::new(FrameCodec::new(MockTransport::opened()));
        let seq = dispatcher.transmit(0x0006_0025, &[]).unwrap();
        assert_eq!(seq, 1);

        dispatcher
            .codec_mut()
            .get_mut()
            .queue_rx(&response(seq, 0x0006_0025, 0, &[]));
        assert!(dispatcher.receive(seq, 0x0006_0025, 0).unwrap().is_empty());
    }

    #[test]
    fn test_closed_port_is_not_open() {
        let mut dispatcher = Dispatcher::new(FrameCodec::new(MockTransport::new()));
        let err = dispatcher.dispatch(GET_MIPI_STATE, &[], 0).unwrap_err();
        assert!(matches!(err, DispatchError::Frame(FrameError::NotOpen)));
        assert_eq!(
            err.return_code().and_then(|code| code.name()),
            Some("FLR_COMM_PORT_NOT_OPEN")
        );
    }
}
