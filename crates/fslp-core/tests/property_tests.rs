//! Property tests for the frame and envelope codecs.

use std::sync::Arc;

use fslp_core::protocol::STATUS_PLACEHOLDER;
use fslp_core::protocol::envelope::decode_command;
use fslp_core::transport::ReadFault;
use fslp_core::validator::{ProtocolValidator, reference_command, reference_frame};
use fslp_core::{
    FrameCodec, FrameError, FslpEvent, HeaderStrategy, MockTransport, NullObserver,
    RecordingObserver, decode_and_validate, encode_command,
};
use proptest::prelude::*;

fn loopback_codec() -> FrameCodec<MockTransport> {
    FrameCodec::new(MockTransport::loopback()).with_observer(Arc::new(NullObserver))
}

fn header_strategy() -> impl Strategy<Value = HeaderStrategy> {
    prop_oneof![
        Just(HeaderStrategy::Atomic),
        Just(HeaderStrategy::tolerant()),
        Just(HeaderStrategy::Scan { max_bytes: 0 }),
    ]
}

// ── Envelope round trip ──────────────────────────────────────

proptest! {
    #[test]
    fn envelope_round_trip(
        sequence in any::<u32>(),
        function_id in any::<u32>(),
        data in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let payload = encode_command(sequence, function_id, &data);
        let decoded = decode_and_validate(&payload, sequence, function_id, STATUS_PLACEHOLDER);
        prop_assert_eq!(decoded, Ok(data.as_slice()));
    }

    #[test]
    fn envelope_matches_hand_built_bytes(
        sequence in any::<u32>(),
        function_id in any::<u32>(),
        data in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assert_eq!(
            encode_command(sequence, function_id, &data),
            reference_command(sequence, function_id, &data)
        );
    }

    #[test]
    fn short_payload_never_decodes(len in 0usize..12) {
        let payload = vec![0xFFu8; len];
        prop_assert!(decode_command(&payload, 0, 0).is_err());
    }
}

// ── Frame round trip ─────────────────────────────────────────

proptest! {
    #[test]
    fn frame_round_trip(
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
        strategy in header_strategy(),
    ) {
        let mut codec = loopback_codec().with_strategy(strategy);
        codec.send_frame(&payload).unwrap();
        let expected = reference_frame(&payload).unwrap();
        prop_assert_eq!(codec.get_ref().writes()[0].clone(), expected);

        let received = codec.read_frame(payload.len()).unwrap();
        prop_assert_eq!(received, payload);
        prop_assert_eq!(codec.get_ref().pending_rx(), 0);
    }

    #[test]
    fn corrupted_magic_is_rejected(
        payload in proptest::collection::vec(any::<u8>(), 0..256),
        index in 0usize..2,
        corrupt in any::<u8>(),
    ) {
        let mut frame = reference_frame(&payload).unwrap();
        prop_assume!(frame[index] != corrupt);
        frame[index] = corrupt;

        let mut mock = MockTransport::opened();
        mock.queue_rx(&frame);
        let mut codec = FrameCodec::new(mock).with_observer(Arc::new(NullObserver));

        let result = codec.read_frame(payload.len());
        prop_assert!(
            matches!(result, Err(FrameError::BadMagic { .. })),
            "expected BadMagic, got {:?}",
            result
        );
        prop_assert_eq!(codec.get_ref().pending_rx(), payload.len());
    }

    #[test]
    fn declared_length_wins(
        payload in proptest::collection::vec(any::<u8>(), 0..256),
        expected in 0usize..512,
        trailing in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        let mut mock = MockTransport::opened();
        mock.queue_rx(&reference_frame(&payload).unwrap());
        mock.queue_rx(&trailing);
        let observer = Arc::new(RecordingObserver::new());
        let mut codec = FrameCodec::new(mock).with_observer(observer.clone());

        let received = codec.read_frame(expected).unwrap();
        prop_assert_eq!(&received, &payload);
        prop_assert_eq!(codec.get_ref().pending_rx(), trailing.len());

        let mismatch = FslpEvent::LengthMismatch { declared: payload.len(), expected };
        prop_assert_eq!(
            observer.events().contains(&mismatch),
            expected != payload.len()
        );
    }

    #[test]
    fn tolerant_reader_survives_first_byte_timeout(
        payload in proptest::collection::vec(any::<u8>(), 0..128),
    ) {
        let frame = reference_frame(&payload).unwrap();
        let mut mock = MockTransport::opened();
        mock.fail_next_read(ReadFault::Timeout);
        mock.queue_rx(&frame[1..]);
        let mut codec = FrameCodec::new(mock)
            .with_observer(Arc::new(NullObserver))
            .with_strategy(HeaderStrategy::tolerant());

        prop_assert_eq!(codec.read_frame(payload.len()).unwrap(), payload);
    }
}

// ── Validator sequence tracking ──────────────────────────────

proptest! {
    #[test]
    fn validator_sequences_are_consecutive(count in 1usize..32) {
        let mut validator = ProtocolValidator::new().with_observer(Arc::new(NullObserver));
        let initial = validator.sequence();
        for i in 1..=count {
            let seq = validator.issue(0x0006_0025, &[]).unwrap();
            prop_assert_eq!(seq, initial + i as u32);
        }
    }
}
