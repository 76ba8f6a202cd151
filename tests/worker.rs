mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Gate, TagEmulator};
use crossbeam_channel::bounded;
use type4_chain::{ChannelConfig, ChannelSetupError, TagWorker, TransportBuilder, TransportError};

fn spawn(tag: TagEmulator) -> TagWorker<common::EmulatorError> {
    let transport = TransportBuilder::new(tag, ChannelConfig::default()).build_with_heap().unwrap();
    TagWorker::spawn(transport).unwrap()
}

#[test]
fn test_transactions_complete_in_submission_order() {
    let worker = spawn(TagEmulator::echo());
    let order = Arc::new(Mutex::new(Vec::new()));

    worker.configure_timeout(Duration::from_secs(1)).wait().unwrap();
    worker.select_application().wait().unwrap();
    for i in 0..10u8 {
        let order = order.clone();
        worker.send_payload_with(vec![i; 300 + i as usize], move |result| {
            let reply = result.unwrap();
            order.lock().unwrap().push(reply[0]);
        });
    }
    let last = worker.send_payload(vec![0xFF]).wait().unwrap();
    worker.join().unwrap();

    assert_eq!(last, vec![0xFF]);
    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<u8>>());
}

#[test]
fn test_pending_handles_resolve_independently() {
    let worker = spawn(TagEmulator::with_responder(|payload| payload.iter().rev().copied().collect()));

    worker.select_application().wait().unwrap();
    let first = worker.send_payload(vec![1, 2, 3]);
    let second = worker.send_payload(vec![4, 5]);

    assert_eq!(second.wait().unwrap(), vec![5, 4]);
    assert_eq!(first.wait().unwrap(), vec![3, 2, 1]);
}

#[test]
fn test_shutdown_during_transaction() {
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let tag = TagEmulator::echo().gate(Gate { entered: entered_tx, release: release_rx });
    let log = tag.log();
    let mut worker = spawn(tag);

    worker.select_application().wait().unwrap();
    let in_flight = worker.send_payload(vec![0xAB; 500]);
    let queued = worker.send_payload(vec![0xCD]);

    // The first fragment is on the wire.
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    worker.shutdown();
    release_tx.send(()).unwrap();

    assert!(matches!(in_flight.wait(), Err(TransportError::Shutdown)));
    assert!(matches!(queued.wait(), Err(TransportError::Shutdown)));
    // SELECT and the first fragment only.
    assert_eq!(log.len(), 2);
}

#[test]
fn test_jobs_after_shutdown_fail_fast() {
    let mut worker = spawn(TagEmulator::echo());
    worker.shutdown();
    worker.shutdown();

    assert!(matches!(worker.select_application().wait(), Err(ChannelSetupError::Shutdown)));

    let (tx, rx) = bounded(1);
    worker.send_payload_with(vec![1], move |result| tx.send(result).unwrap());
    assert!(matches!(rx.recv().unwrap(), Err(TransportError::Shutdown)));
}

#[test]
fn test_errors_are_delivered_and_invalidate() {
    let worker = spawn(TagEmulator::echo().reject_fragment(0, [0x6A, 0x80]));
    worker.select_application().wait().unwrap();

    let result = worker.send_payload(vec![0u8; 10]).wait();

    assert!(matches!(result, Err(TransportError::ChainedSend { fragment: 0, .. })));
    assert!(matches!(worker.send_payload(vec![0u8; 10]).wait(), Err(TransportError::NotSelected)));
}
