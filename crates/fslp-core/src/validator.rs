//! Hardware-less protocol conformance checks.
//!
//! [`ProtocolValidator`] rebuilds frames and envelopes byte by byte from
//! first principles and compares them with what [`FrameCodec`] and the
//! envelope codec produce over a [`MockTransport`]. It also synthesizes
//! camera responses to drive the receive path.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::codec::FrameCodec;
use crate::events::{FslpEvent, FslpObserver, NullObserver, TracingObserver};
use crate::protocol::constants::{ENVELOPE_HEADER_SIZE, STATUS_SUCCESS};
use crate::protocol::envelope::{
    EnvelopeError, decode_and_validate, decode_command, encode_command,
};
use crate::protocol::header::FrameError;
use crate::transport::MockTransport;

// Digital video output commands used by the suite.
pub const DVO_SET_OUTPUT_INTERFACE: u32 = 0x0006_0007;
pub const DVO_SET_TYPE: u32 = 0x0006_000F;
pub const DVO_SET_MIPI_STATE: u32 = 0x0006_0024;
pub const DVO_APPLY_CUSTOM_SETTINGS: u32 = 0x0006_0025;
pub const DVO_GET_MIPI_STATE: u32 = 0x0006_0026;

const OUTPUT_INTERFACE_MIPI: u32 = 1;
const DVO_TYPE_MONO8: u32 = 0;
const DVO_TYPE_MONO14: u32 = 1;
const MIPI_STATE_ACTIVE: u32 = 2;

#[derive(Error, Debug)]
pub enum ConformanceError {
    #[error("Frame bytes differ: expected {}, got {}", hex(.expected), hex(.actual))]
    FrameMismatch { expected: Vec<u8>, actual: Vec<u8> },
    #[error("Decoded data differs: expected {}, got {}", hex(.expected), hex(.actual))]
    DataMismatch { expected: Vec<u8>, actual: Vec<u8> },
    #[error("Sequence skew: expected {expected}, got {actual}")]
    SequenceSkew { expected: u32, actual: u32 },
    #[error("Codec wrote {0} frames, expected exactly one")]
    WriteCount(usize),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Lowercase hex without separators.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Frame bytes assembled by hand: `8E A1 | len BE | payload`.
pub fn reference_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| FrameError::PayloadTooLong { len: payload.len() })?;
    let mut frame = vec![0x8E, 0xA1, (len >> 8) as u8, (len & 0xFF) as u8];
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn reference_envelope(sequence: u32, function_id: u32, status: u32, data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(ENVELOPE_HEADER_SIZE + data.len());
    payload.extend_from_slice(&sequence.to_be_bytes());
    payload.extend_from_slice(&function_id.to_be_bytes());
    payload.extend_from_slice(&status.to_be_bytes());
    payload.extend_from_slice(data);
    payload
}

/// Command payload assembled by hand, status word `FFFFFFFF`.
pub fn reference_command(sequence: u32, function_id: u32, data: &[u8]) -> Vec<u8> {
    reference_envelope(sequence, function_id, 0xFFFF_FFFF, data)
}

/// A complete response frame as the camera would send it.
pub fn synthesize_response(
    sequence: u32,
    function_id: u32,
    status: u32,
    data: &[u8],
) -> Result<Vec<u8>, FrameError> {
    reference_frame(&reference_envelope(sequence, function_id, status, data))
}

/// Outcome of one named check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    pub checks: Vec<CheckOutcome>,
}

impl SuiteReport {
    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    /// Percentage of passing checks.
    pub fn success_rate(&self) -> f64 {
        if self.checks.is_empty() {
            return 0.0;
        }
        self.passed() as f64 * 100.0 / self.total() as f64
    }
}

pub struct ProtocolValidator {
    /// Last sequence number issued.
    sequence: u32,
    observer: Arc<dyn FslpObserver>,
}

impl Default for ProtocolValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolValidator {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FslpObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Encode a command with the production codecs and compare it against
    /// the hand-built frame, then decode it back.
    #[instrument(skip(self, function_id, data), fields(fn_id = %format!("0x{:08X}", function_id)))]
    pub fn check_command(
        &self,
        sequence: u32,
        function_id: u32,
        data: &[u8],
    ) -> Result<(), ConformanceError> {
        let expected = reference_frame(&reference_command(sequence, function_id, data))?;
        debug!(frame = %hex(&expected), "Reference frame");

        let mut codec =
            FrameCodec::new(MockTransport::opened()).with_observer(Arc::new(NullObserver));
        codec.send_frame(&encode_command(sequence, function_id, data))?;
        let mut writes = codec.get_mut().take_writes();
        if writes.len() != 1 {
            return Err(ConformanceError::WriteCount(writes.len()));
        }
        let actual = writes.remove(0);
        if actual != expected {
            error!(expected = %hex(&expected), actual = %hex(&actual), "Frame mismatch");
            return Err(ConformanceError::FrameMismatch { expected, actual });
        }

        codec.get_mut().queue_rx(&actual);
        let payload = codec.read_frame(ENVELOPE_HEADER_SIZE + data.len())?;
        let decoded = decode_command(&payload, sequence, function_id)?;
        if decoded != data {
            return Err(ConformanceError::DataMismatch {
                expected: data.to_vec(),
                actual: decoded.to_vec(),
            });
        }
        Ok(())
    }

    /// Feed a synthesized response through the receive path and return the
    /// data it carries.
    #[instrument(skip(self, function_id, data), fields(fn_id = %format!("0x{:08X}", function_id)))]
    pub fn check_response(
        &self,
        sequence: u32,
        function_id: u32,
        status: u32,
        data: &[u8],
    ) -> Result<Vec<u8>, ConformanceError> {
        let frame = synthesize_response(sequence, function_id, status, data)?;
        debug!(frame = %hex(&frame), "Synthesized response");

        let mut mock = MockTransport::opened();
        mock.queue_rx(&frame);
        let mut codec = FrameCodec::new(mock).with_observer(Arc::new(NullObserver));
        let payload = codec.read_frame(ENVELOPE_HEADER_SIZE + data.len())?;
        let decoded = decode_and_validate(&payload, sequence, function_id, status)?;
        if decoded != data {
            return Err(ConformanceError::DataMismatch {
                expected: data.to_vec(),
                actual: decoded.to_vec(),
            });
        }
        Ok(decoded.to_vec())
    }

    /// Issue the next command in the run and check it.
    pub fn issue(&mut self, function_id: u32, data: &[u8]) -> Result<u32, ConformanceError> {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;
        self.check_command(sequence, function_id, data)?;
        Ok(sequence)
    }

    fn get_mipi_state(&mut self) -> Result<(), ConformanceError> {
        let sequence = self.issue(DVO_GET_MIPI_STATE, &[])?;
        let active = MIPI_STATE_ACTIVE.to_be_bytes();
        self.check_response(sequence, DVO_GET_MIPI_STATE, STATUS_SUCCESS, &active)?;
        Ok(())
    }

    fn sequence_management(&mut self) -> Result<(), ConformanceError> {
        let initial = self.sequence;
        let commands = [
            (DVO_SET_OUTPUT_INTERFACE, OUTPUT_INTERFACE_MIPI),
            (DVO_SET_TYPE, DVO_TYPE_MONO8),
            (DVO_SET_MIPI_STATE, MIPI_STATE_ACTIVE),
        ];
        for (i, (function_id, arg)) in commands.into_iter().enumerate() {
            let sequence = self.issue(function_id, &arg.to_be_bytes())?;
            let expected = initial.wrapping_add(i as u32 + 1);
            if sequence != expected {
                return Err(ConformanceError::SequenceSkew {
                    expected,
                    actual: sequence,
                });
            }
        }
        Ok(())
    }

    /// Run the six standard checks.
    pub fn run_suite(&mut self) -> SuiteReport {
        let mut report = SuiteReport::default();

        let checks: [(&'static str, fn(&mut Self) -> Result<(), ConformanceError>); 6] = [
            ("Set Output Interface", |v| {
                v.issue(DVO_SET_OUTPUT_INTERFACE, &OUTPUT_INTERFACE_MIPI.to_be_bytes())
                    .map(drop)
            }),
            ("Set DVO Type", |v| {
                v.issue(DVO_SET_TYPE, &DVO_TYPE_MONO14.to_be_bytes()).map(drop)
            }),
            ("Set MIPI State", |v| {
                v.issue(DVO_SET_MIPI_STATE, &MIPI_STATE_ACTIVE.to_be_bytes())
                    .map(drop)
            }),
            ("Apply Settings", |v| {
                v.issue(DVO_APPLY_CUSTOM_SETTINGS, &[]).map(drop)
            }),
            ("Get MIPI State", Self::get_mipi_state),
            ("Sequence Management", Self::sequence_management),
        ];

        for (name, check) in checks {
            let outcome = match check(self) {
                Ok(()) => CheckOutcome {
                    name,
                    passed: true,
                    detail: None,
                },
                Err(e) => CheckOutcome {
                    name,
                    passed: false,
                    detail: Some(e.to_string()),
                },
            };
            self.observer.on_event(&FslpEvent::Conformance {
                check: name.to_string(),
                passed: outcome.passed,
            });
            report.checks.push(outcome);
        }

        info!(
            total = report.total(),
            passed = report.passed(),
            failed = report.failed(),
            "Conformance suite finished"
        );
        report
    }
}
