//! Event system for non-fatal protocol anomalies and traffic.
//!
//! Codecs and the resolver report through an [`FslpObserver`] instead of
//! failing, so callers (CLI, tests, host applications) decide what to do
//! with a length mismatch or an unapplied clock rate.

use std::fmt;
use std::sync::Mutex;

use crate::transport::TransportKind;

/// Direction of a frame on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => write!(f, "TX"),
            Direction::Rx => write!(f, "RX"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FslpEvent {
    /// A complete frame went out or came in.
    Frame { direction: Direction, payload_len: usize },
    /// Declared payload length differs from what the caller expected.
    /// The declared length is used.
    LengthMismatch { declared: usize, expected: usize },
    /// The `7E A1` token was accepted as the frame magic.
    AlternateMagicAccepted,
    /// The first magic byte timed out and was substituted.
    HeaderByteTimeout { substituted: u8 },
    /// Bytes discarded while hunting for the frame magic.
    SyncSkipped { skipped: usize },
    /// The backend runs the bus at a different clock than configured.
    RateNotApplied {
        kind: TransportKind,
        requested: u32,
        effective: u32,
    },
    /// Outcome of one conformance check.
    Conformance { check: String, passed: bool },
}

/// Receives events from codecs, the dispatcher and the resolver.
pub trait FslpObserver: Send + Sync {
    fn on_event(&self, event: &FslpEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl FslpObserver for NullObserver {
    fn on_event(&self, _event: &FslpEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl FslpObserver for TracingObserver {
    fn on_event(&self, event: &FslpEvent) {
        match event {
            FslpEvent::Frame {
                direction,
                payload_len,
            } => {
                tracing::trace!(dir = %direction, len = payload_len, "FSLP frame");
            }
            FslpEvent::LengthMismatch { declared, expected } => {
                tracing::warn!(
                    declared = declared,
                    expected = expected,
                    "Frame length differs from expected; using declared length"
                );
            }
            FslpEvent::AlternateMagicAccepted => {
                tracing::warn!("Accepted alternate magic token 7E A1");
            }
            FslpEvent::HeaderByteTimeout { substituted } => {
                tracing::warn!(
                    substituted = %format!("0x{:02X}", substituted),
                    "Timed out on first header byte"
                );
            }
            FslpEvent::SyncSkipped { skipped } => {
                tracing::warn!(skipped = skipped, "Discarded bytes before frame magic");
            }
            FslpEvent::RateNotApplied {
                kind,
                requested,
                effective,
            } => {
                tracing::warn!(
                    transport = %kind,
                    requested_hz = requested,
                    effective_hz = effective,
                    "Requested I2C rate not applied"
                );
            }
            FslpEvent::Conformance { check, passed } => {
                if *passed {
                    tracing::info!(check = %check, "PASS");
                } else {
                    tracing::error!(check = %check, "FAIL");
                }
            }
        }
    }
}

/// Keeps every event it sees.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<FslpEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FslpEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl FslpObserver for RecordingObserver {
    fn on_event(&self, event: &FslpEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = RecordingObserver::new();
        observer.on_event(&FslpEvent::AlternateMagicAccepted);
        observer.on_event(&FslpEvent::LengthMismatch {
            declared: 4,
            expected: 8,
        });
        assert_eq!(
            observer.events(),
            vec![
                FslpEvent::AlternateMagicAccepted,
                FslpEvent::LengthMismatch {
                    declared: 4,
                    expected: 8
                }
            ]
        );
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Tx.to_string(), "TX");
        assert_eq!(Direction::Rx.to_string(), "RX");
    }
}
