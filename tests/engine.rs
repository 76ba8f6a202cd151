mod common;

use common::TagEmulator;
use proptest::prelude::*;
use type4_chain::{
    ChainedTransport, ChannelConfig, ChannelSetupError, CommandApdu, ErrorKind, Instruction, SessionState,
    StatusWord, TransportBuilder, TransportError,
};

fn established(tag: TagEmulator) -> ChainedTransport<TagEmulator, Vec<u8>> {
    let mut transport = TransportBuilder::new(tag, ChannelConfig::default()).build_with_heap().unwrap();
    transport.establish().unwrap();
    transport
}

fn transport_frames(frames: &[Vec<u8>]) -> Vec<CommandApdu<'_>> {
    frames
        .iter()
        .map(|frame| CommandApdu::parse(frame).unwrap())
        .filter(|command| command.instruction() == Instruction::Transport)
        .collect()
}

#[test]
fn test_establish_connects_and_selects() {
    let tag = TagEmulator::echo();
    let log = tag.log();
    let mut transport = TransportBuilder::new(tag, ChannelConfig::default()).build_with_heap().unwrap();

    assert_eq!(transport.establish().unwrap(), None);

    assert_eq!(transport.channel().connects, 1);
    assert_eq!(transport.channel().timeout, Some(std::time::Duration::from_millis(5000)));
    assert_eq!(
        log.frames(),
        vec![vec![0x00, 0xA4, 0x04, 0x0C, 0x09, 0xA0, 0x00, 0x00, 0x09, 0x09, 0x8A, 0x77, 0xE4, 0x01, 0x00]]
    );
}

#[test]
fn test_wrong_application_is_rejected() {
    let config = ChannelConfig::default().with_application_id([0xF0, 0x00, 0x00, 0x00, 0x01]);
    let mut transport = TransportBuilder::new(TagEmulator::echo(), config).build_with_heap().unwrap();

    let err = transport.establish().unwrap_err();

    assert!(matches!(err, ChannelSetupError::Rejected(StatusWord::Error(0x6A, 0x82))));
    assert!(matches!(transport.send_payload(b"hello"), Err(TransportError::NotSelected)));
}

#[test]
fn test_500_byte_payload_with_short_reply() {
    let tag = TagEmulator::with_responder(|_| vec![1, 2, 3, 4, 5, 6, 7, 8]);
    let log = tag.log();
    let mut transport = established(tag);

    let reply = transport.send_payload(&[0x33; 500]).unwrap();

    assert_eq!(reply, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    let frames = log.frames();
    let fragments = transport_frames(&frames);
    let sizes: Vec<_> = fragments.iter().map(|f| f.data().len()).collect();
    assert_eq!(sizes, [245, 245, 10]);
    assert_eq!(fragments[0].encode()[..4], [0x90, 0x20, 0x01, 0xF4]);
    assert_eq!(fragments[1].encode()[..4], [0x90, 0x20, 0x01, 0xF4]);
    assert_eq!(fragments[2].encode()[..4], [0x80, 0x20, 0x01, 0xF4]);
    assert!(fragments.iter().all(|f| f.le() == Some(0xFA)));
    assert_eq!(transport.stats().fragments_sent, 3);
    assert_eq!(transport.stats().blocks_read, 0);
}

#[test]
fn test_announced_reply_is_fetched() {
    let tag = TagEmulator::with_responder(|_| vec![0xA1, 0xA2, 0xA3, 0xA4, 0xA5]).announce_only();
    let log = tag.log();
    let mut transport = established(tag);

    let reply = transport.send_payload(b"ping").unwrap();

    assert_eq!(reply, vec![0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
    assert_eq!(log.frames().last().unwrap(), &vec![0x00, 0xC0, 0x00, 0x00, 0x05]);
    assert_eq!(transport.stats().blocks_read, 1);
}

#[test]
fn test_reply_over_capacity_overflows() {
    let tag = TagEmulator::with_responder(|_| vec![0x5A; 3000]);
    let mut transport = established(tag);

    let err = transport.send_payload(b"large please").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BufferTooSmall);
    match err {
        TransportError::ReassemblyOverflow { capacity, attempted } => {
            assert_eq!(capacity, 2048);
            assert!(attempted > 2048);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(transport.session().state(), &SessionState::Invalidated);
}

#[test]
fn test_reply_at_capacity_fits() {
    let tag = TagEmulator::with_responder(|_| vec![0x5A; 2048]);
    let mut transport = established(tag);

    assert_eq!(transport.send_payload(b"exact").unwrap().len(), 2048);
    assert_eq!(transport.stats().bytes_received, 2048);
}

#[test]
fn test_zero_sw2_requests_maximum() {
    let reply = vec![0x77; 600];
    let run = |sw2: u8| {
        let reply = reply.clone();
        let tag = TagEmulator::with_responder(move |_| reply.clone()).forced_sw2(sw2);
        let log = tag.log();
        let mut transport = established(tag);
        let result = transport.send_payload(b"query").unwrap();
        let reads: Vec<_> = log
            .frames()
            .into_iter()
            .filter(|frame| frame[1] == 0xC0)
            .collect();
        (result, reads)
    };

    let (zero_reply, zero_reads) = run(0x00);
    let (max_reply, max_reads) = run(0xFA);

    assert_eq!(zero_reply, reply);
    assert_eq!(zero_reply, max_reply);
    assert_eq!(zero_reads, max_reads);
    assert!(zero_reads.iter().all(|frame| frame == &vec![0x00, 0xC0, 0x00, 0x00, 0xFA]));
}

#[test]
fn test_intermediate_continuation_aborts_send() {
    let tag = TagEmulator::echo().reject_fragment(0, [0x61, 0x10]);
    let log = tag.log();
    let mut transport = established(tag);

    let err = transport.send_payload(&[0u8; 500]).unwrap_err();

    assert!(matches!(
        err,
        TransportError::ChainedSend { fragment: 0, status: StatusWord::Continuation(0x10) }
    ));
    assert_eq!(err.kind(), ErrorKind::CorruptedInTransit);
    // SELECT plus the rejected fragment.
    assert_eq!(log.len(), 2);
}

#[test]
fn test_final_fragment_error_status() {
    let tag = TagEmulator::echo().reject_fragment(2, [0x6A, 0x80]);
    let mut transport = established(tag);

    let err = transport.send_payload(&[0u8; 500]).unwrap_err();

    assert!(matches!(err, TransportError::ChainedSend { fragment: 2, status: StatusWord::Error(0x6A, 0x80) }));
    assert_eq!(err.status(), Some(StatusWord::Error(0x6A, 0x80)));
}

#[test]
fn test_reselect_after_failure() {
    let tag = TagEmulator::echo().reject_fragment(0, [0x69, 0x85]);
    let mut transport = established(tag);

    assert!(transport.send_payload(b"first").is_err());
    assert!(matches!(transport.send_payload(b"second"), Err(TransportError::NotSelected)));

    transport.select_application().unwrap();
    assert_eq!(transport.send_payload(b"third").unwrap(), b"third".to_vec());
}

#[test]
fn test_transactions_do_not_leak_into_each_other() {
    let mut round = 0u8;
    let tag = TagEmulator::with_responder(move |_| {
        round += 1;
        if round == 1 { vec![0xEE; 700] } else { vec![round] }
    });
    let mut transport = established(tag);

    assert_eq!(transport.send_payload(b"one").unwrap().len(), 700);
    assert_eq!(transport.send_payload(b"two").unwrap(), vec![2]);
}

#[test]
fn test_empty_payload_round_trip() {
    let tag = TagEmulator::with_responder(|payload| {
        assert!(payload.is_empty());
        vec![0x01]
    });
    let log = tag.log();
    let mut transport = established(tag);

    assert_eq!(transport.send_payload(&[]).unwrap(), vec![0x01]);
    assert_eq!(log.frames().last().unwrap(), &vec![0x80, 0x20, 0x00, 0x00, 0xFA]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_echo_round_trip(
        payload in proptest::collection::vec(any::<u8>(), 0..=2048),
        block_size in 1usize..=250,
        zero_sw2 in any::<bool>(),
    ) {
        let mut tag = TagEmulator::echo().block_size(block_size);
        if zero_sw2 {
            tag = tag.forced_sw2(0);
        }
        let mut transport = established(tag);

        let reply = transport.send_payload(&payload).unwrap();

        prop_assert_eq!(reply, payload);
    }

    #[test]
    fn prop_fragment_frames_are_well_formed(payload in proptest::collection::vec(any::<u8>(), 1..=4000)) {
        let tag = TagEmulator::with_responder(|_| Vec::new());
        let log = tag.log();
        let mut transport = established(tag);

        transport.send_payload(&payload).unwrap();

        let frames = log.frames();
        let fragments = transport_frames(&frames);
        let last = fragments.len() - 1;
        prop_assert_eq!(fragments.len(), payload.len().div_ceil(245));
        for (index, fragment) in fragments.iter().enumerate() {
            prop_assert!(fragment.data().len() <= 245);
            prop_assert_eq!(fragment.p1p2() as usize, payload.len());
            prop_assert_eq!(fragment.class() == type4_chain::Class::ChainFinal, index == last);
        }
    }
}
