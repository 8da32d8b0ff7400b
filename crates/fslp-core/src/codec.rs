//! Frame codec: FSLP frames over a [`Transport`].
//!
//! Sending is a single write of `magic | len | payload`. Receiving reads the
//! 4-byte header using one of three [`HeaderStrategy`] variants, then exactly
//! the declared number of payload bytes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::events::{Direction, FslpEvent, FslpObserver, TracingObserver};
use crate::protocol::constants::{FRAME_HEADER_SIZE, MAGIC_TOKEN};
use crate::protocol::header::{FrameError, FrameHeader, encode_frame, is_magic};
use crate::transport::{Transport, TransportError};

/// How the 4-byte frame header is pulled off the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum HeaderStrategy {
    /// One 4-byte read; only `8E A1` is accepted.
    #[default]
    Atomic,
    /// Magic bytes read one at a time. A timeout on the first byte is
    /// replaced by `fallback_first_byte`; `accept_alternate` also admits the
    /// `7E A1` token.
    Tolerant {
        fallback_first_byte: u8,
        accept_alternate: bool,
    },
    /// Slide a 4-byte window one byte at a time until it starts with
    /// `8E A1`, discarding at most `max_bytes`.
    Scan { max_bytes: usize },
}

impl HeaderStrategy {
    /// Tolerant reader with the settings seen on deployed I2C hosts.
    pub fn tolerant() -> Self {
        HeaderStrategy::Tolerant {
            fallback_first_byte: MAGIC_TOKEN[0],
            accept_alternate: true,
        }
    }
}

pub struct FrameCodec<T: Transport> {
    transport: T,
    strategy: HeaderStrategy,
    observer: Arc<dyn FslpObserver>,
}

impl<T: Transport> FrameCodec<T> {
    /// Codec with the atomic header strategy, reporting through tracing.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            strategy: HeaderStrategy::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_strategy(mut self, strategy: HeaderStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FslpObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn strategy(&self) -> HeaderStrategy {
        self.strategy
    }

    pub fn observer(&self) -> &Arc<dyn FslpObserver> {
        &self.observer
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if !self.transport.is_open() {
            return Err(FrameError::NotOpen);
        }
        let frame = encode_frame(payload)?;
        self.transport.write(&frame)?;
        debug!(frame_len = frame.len(), "Frame sent");
        self.observer.on_event(&FslpEvent::Frame {
            direction: Direction::Tx,
            payload_len: payload.len(),
        });
        Ok(())
    }

    /// Read one frame and return its payload.
    ///
    /// A declared length other than `expected_len` is reported as a
    /// [`FslpEvent::LengthMismatch`] and the declared length is read.
    #[instrument(skip(self))]
    pub fn read_frame(&mut self, expected_len: usize) -> Result<Vec<u8>, FrameError> {
        if !self.transport.is_open() {
            return Err(FrameError::NotOpen);
        }
        let header = self.read_header()?;
        let declared = header.payload_len();
        if declared != expected_len {
            self.observer.on_event(&FslpEvent::LengthMismatch {
                declared,
                expected: expected_len,
            });
        }
        let payload = self.transport.read(declared)?;
        debug!(payload_len = payload.len(), "Frame received");
        self.observer.on_event(&FslpEvent::Frame {
            direction: Direction::Rx,
            payload_len: payload.len(),
        });
        Ok(payload)
    }

    fn read_header(&mut self) -> Result<FrameHeader, FrameError> {
        match self.strategy {
            HeaderStrategy::Atomic => {
                let raw = self.transport.read(FRAME_HEADER_SIZE)?;
                FrameHeader::from_bytes(&raw, false)
            }
            HeaderStrategy::Tolerant {
                fallback_first_byte,
                accept_alternate,
            } => self.read_header_tolerant(fallback_first_byte, accept_alternate),
            HeaderStrategy::Scan { max_bytes } => self.read_header_scan(max_bytes),
        }
    }

    fn read_header_tolerant(
        &mut self,
        fallback_first_byte: u8,
        accept_alternate: bool,
    ) -> Result<FrameHeader, FrameError> {
        let first = match self.transport.read(1) {
            Ok(byte) => byte[0],
            Err(TransportError::Timeout { .. }) => {
                self.observer.on_event(&FslpEvent::HeaderByteTimeout {
                    substituted: fallback_first_byte,
                });
                fallback_first_byte
            }
            Err(e) => return Err(e.into()),
        };
        let second = self.transport.read(1)?[0];

        let magic = [first, second];
        if !is_magic(magic, accept_alternate) {
            return Err(FrameError::BadMagic { observed: magic });
        }
        let length = self.transport.read(2)?;
        let raw = [first, second, length[0], length[1]];
        let header = FrameHeader::from_bytes(&raw, accept_alternate)?;
        if header.is_alternate() {
            self.observer.on_event(&FslpEvent::AlternateMagicAccepted);
        }
        Ok(header)
    }

    fn read_header_scan(&mut self, max_bytes: usize) -> Result<FrameHeader, FrameError> {
        let raw = self.transport.read(FRAME_HEADER_SIZE)?;
        let mut window = [raw[0], raw[1], raw[2], raw[3]];
        let mut skipped = 0;
        while window[..2] != MAGIC_TOKEN {
            if skipped >= max_bytes {
                return Err(FrameError::SyncLost { scanned: skipped });
            }
            let next = self.transport.read(1)?[0];
            window.copy_within(1.., 0);
            window[3] = next;
            skipped += 1;
        }
        if skipped > 0 {
            self.observer.on_event(&FslpEvent::SyncSkipped { skipped });
        }
        FrameHeader::from_bytes(&window, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;
    use crate::transport::{MockTransport, ReadFault};

    fn codec(mock: MockTransport) -> (FrameCodec<MockTransport>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        let codec = FrameCodec::new(mock).with_observer(observer.clone());
        (codec, observer)
    }

    #[test]
    fn test_send_frame_single_write() {
        let (mut codec, observer) = codec(MockTransport::opened());
        codec.send_frame(&[0xAA, 0xBB, 0xCC]).unwrap();

        let writes = codec.get_ref().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], vec![0x8E, 0xA1, 0x00, 0x03, 0xAA, 0xBB, 0xCC]);
        assert_eq!(
            observer.events(),
            vec![FslpEvent::Frame {
                direction: Direction::Tx,
                payload_len: 3
            }]
        );
    }

    #[test]
    fn test_closed_transport_is_state_error() {
        let (mut codec, _) = codec(MockTransport::new());
        assert!(matches!(codec.send_frame(&[1]), Err(FrameError::NotOpen)));
        assert!(matches!(codec.read_frame(1), Err(FrameError::NotOpen)));
        assert!(codec.get_ref().writes().is_empty());
    }

    #[test]
    fn test_read_frame_returns_payload() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&[0x8E, 0xA1, 0x00, 0x02, 0x12, 0x34]);
        let (mut codec, observer) = codec(mock);

        assert_eq!(codec.read_frame(2).unwrap(), vec![0x12, 0x34]);
        assert_eq!(codec.get_ref().pending_rx(), 0);
        assert!(
            !observer
                .events()
                .iter()
                .any(|e| matches!(e, FslpEvent::LengthMismatch { .. }))
        );
    }

    #[test]
    fn test_bad_magic_never_returns_payload() {
        for corrupt in [[0x00, 0xA1], [0x8E, 0x00]] {
            let mut mock = MockTransport::opened();
            mock.queue_rx(&[corrupt[0], corrupt[1], 0x00, 0x02, 0x12, 0x34]);
            let (mut codec, _) = codec(mock);

            match codec.read_frame(2) {
                Err(FrameError::BadMagic { observed }) => assert_eq!(observed, corrupt),
                other => panic!("unexpected: {:?}", other),
            }
            // Payload left unread.
            assert_eq!(codec.get_ref().pending_rx(), 2);
        }
    }

    #[test]
    fn test_length_mismatch_uses_declared_length() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&[0x8E, 0xA1, 0x00, 0x03, 1, 2, 3, 0xFF]);
        let (mut codec, observer) = codec(mock);

        assert_eq!(codec.read_frame(16).unwrap(), vec![1, 2, 3]);
        assert!(observer.events().contains(&FslpEvent::LengthMismatch {
            declared: 3,
            expected: 16
        }));
        assert_eq!(codec.get_ref().pending_rx(), 1);
    }

    #[test]
    fn test_short_payload_is_transport_error() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&[0x8E, 0xA1, 0x00, 0x04, 1, 2]);
        let (mut codec, _) = codec(mock);

        assert!(matches!(
            codec.read_frame(4),
            Err(FrameError::Transport(TransportError::ShortRead {
                requested: 4,
                actual: 2
            }))
        ));
    }

    #[test]
    fn test_atomic_rejects_alternate_magic() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&[0x7E, 0xA1, 0x00, 0x00]);
        let (mut codec, _) = codec(mock);
        assert!(matches!(
            codec.read_frame(0),
            Err(FrameError::BadMagic {
                observed: [0x7E, 0xA1]
            })
        ));
    }

    #[test]
    fn test_tolerant_accepts_alternate_magic() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&[0x7E, 0xA1, 0x00, 0x01, 0x55]);
        let (codec, observer) = codec(mock);
        let mut codec = codec.with_strategy(HeaderStrategy::tolerant());

        assert_eq!(codec.read_frame(1).unwrap(), vec![0x55]);
        assert!(observer.events().contains(&FslpEvent::AlternateMagicAccepted));
    }

    #[test]
    fn test_tolerant_substitutes_first_byte_on_timeout() {
        let mut mock = MockTransport::opened();
        mock.fail_next_read(ReadFault::Timeout);
        mock.queue_rx(&[0xA1, 0x00, 0x01, 0x55]);
        let (codec, observer) = codec(mock);
        let mut codec = codec.with_strategy(HeaderStrategy::tolerant());

        assert_eq!(codec.read_frame(1).unwrap(), vec![0x55]);
        assert!(
            observer
                .events()
                .contains(&FslpEvent::HeaderByteTimeout { substituted: 0x8E })
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_tolerant_substitutes_on_kernel_etimedout() {
        let mut mock = MockTransport::opened();
        mock.fail_next_read(ReadFault::Os(libc::ETIMEDOUT));
        mock.queue_rx(&[0xA1, 0x00, 0x01, 0x55]);
        let (codec, observer) = codec(mock);
        let mut codec = codec.with_strategy(HeaderStrategy::tolerant());

        assert_eq!(codec.read_frame(1).unwrap(), vec![0x55]);
        assert_eq!(
            observer.events()[0],
            FslpEvent::HeaderByteTimeout { substituted: 0x8E }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_tolerant_propagates_other_os_errors() {
        let mut mock = MockTransport::opened();
        mock.fail_next_read(ReadFault::Os(libc::EIO));
        mock.queue_rx(&[0xA1, 0x00, 0x01, 0x55]);
        let (codec, _) = codec(mock);
        let mut codec = codec.with_strategy(HeaderStrategy::tolerant());

        assert!(matches!(
            codec.read_frame(1),
            Err(FrameError::Transport(TransportError::Io(_)))
        ));
    }

    #[test]
    fn test_tolerant_strict_mode_rejects_alternate() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&[0x7E, 0xA1, 0x00, 0x00]);
        let (codec, _) = codec(mock);
        let mut codec = codec.with_strategy(HeaderStrategy::Tolerant {
            fallback_first_byte: 0x8E,
            accept_alternate: false,
        });
        assert!(matches!(
            codec.read_frame(0),
            Err(FrameError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_scan_skips_leading_noise() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&[0x00, 0xFF, 0x8E, 0x8E, 0xA1, 0x00, 0x01, 0x42]);
        let (codec, observer) = codec(mock);
        let mut codec = codec.with_strategy(HeaderStrategy::Scan { max_bytes: 16 });

        assert_eq!(codec.read_frame(1).unwrap(), vec![0x42]);
        assert!(
            observer
                .events()
                .contains(&FslpEvent::SyncSkipped { skipped: 3 })
        );
    }

    #[test]
    fn test_scan_gives_up() {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&[0u8; 32]);
        let (codec, _) = codec(mock);
        let mut codec = codec.with_strategy(HeaderStrategy::Scan { max_bytes: 8 });

        assert!(matches!(
            codec.read_frame(0),
            Err(FrameError::SyncLost { scanned: 8 })
        ));
    }

    #[test]
    fn test_strategy_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            header: HeaderStrategy,
        }
        let w: Wrapper = toml::from_str("[header]\nstrategy = \"scan\"\nmax_bytes = 64\n").unwrap();
        assert_eq!(w.header, HeaderStrategy::Scan { max_bytes: 64 });
        let w: Wrapper = toml::from_str("[header]\nstrategy = \"atomic\"\n").unwrap();
        assert_eq!(w.header, HeaderStrategy::Atomic);
    }
}
