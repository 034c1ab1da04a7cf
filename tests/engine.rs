mod common;

use std::net::IpAddr;
use std::sync::mpsc;
use std::sync::Arc;

use common::{Ending, FakeFactory, CLIENT, SERVER};
use sniffsight::capture::engine::EngineState;
use sniffsight::models::conversation::ConversationKey;
use sniffsight::models::detail::EngineEvent;
use sniffsight::resolve::cache::UNKNOWN_HOST;
use sniffsight::utils::error::AppError;

fn request_key() -> ConversationKey {
    ConversationKey::new(
        IpAddr::V4(CLIENT),
        UNKNOWN_HOST,
        IpAddr::V4(SERVER),
        UNKNOWN_HOST,
    )
}

#[test]
fn http_request_is_filed_as_readable() {
    let factory = Arc::new(FakeFactory::default()).scripted(vec![common::http_request()], Ending::Exhausted);
    let (engine, mut events) = common::engine(factory);

    engine.start("fake0").unwrap();
    let stats = engine.join().unwrap();
    assert_eq!(stats.total_packets, 1);
    assert_eq!(stats.filed_packets, 1);
    assert_eq!(engine.state(), EngineState::Idle);

    let readable = engine.store().snapshot_readable_only();
    assert_eq!(readable.len(), 1);
    assert_eq!(readable[0].key, request_key());
    assert_eq!(readable[0].bucket.readable.len(), 1);
    assert!(readable[0].bucket.encrypted.is_empty());

    let record = &readable[0].bucket.readable[0];
    assert_eq!(record.payload, b"GET / HTTP/1.1");
    assert_eq!(record.source_port, 1234);
    assert_eq!(record.destination_port, 80);
    assert_eq!(record.interface, "fake0");

    let seen = common::drain(&mut events);
    assert!(matches!(&seen[0], EngineEvent::SessionStarted { interface } if interface == "fake0"));
    assert!(matches!(&seen[1], EngineEvent::SessionEnded { stats, .. } if stats.filed_packets == 1));
    assert_eq!(seen.len(), 2);
}

#[test]
fn binary_payload_is_filed_as_encrypted() {
    let opaque: Vec<u8> = (0u8..=255).collect();
    let frame = common::tcp_frame(CLIENT, 50000, SERVER, 443, &opaque);
    let factory = Arc::new(FakeFactory::default()).scripted(vec![frame], Ending::Exhausted);
    let (engine, _events) = common::engine(factory);

    engine.start("fake0").unwrap();
    engine.join().unwrap();

    let store = engine.store();
    assert!(store.snapshot_readable_only().is_empty());
    let encrypted = store.snapshot_encrypted_only();
    assert_eq!(encrypted.len(), 1);
    assert_eq!(encrypted[0].bucket.encrypted.len(), 1);
}

#[test]
fn frames_without_payload_are_skipped() {
    let frames = vec![
        common::tcp_frame(CLIENT, 1234, SERVER, 80, b""),
        common::tcp_frame(CLIENT, 1234, SERVER, 80, &[0x00]),
        common::icmp_frame(CLIENT, SERVER),
        vec![0xde, 0xad],
        common::udp_frame(CLIENT, 5353, SERVER, 53, b"hello dns"),
    ];
    let factory = Arc::new(FakeFactory::default()).scripted(frames, Ending::Exhausted);
    let (engine, _events) = common::engine(factory);

    engine.start("fake0").unwrap();
    let stats = engine.join().unwrap();

    assert_eq!(stats.total_packets, 5);
    assert_eq!(stats.filed_packets, 1);
    assert_eq!(stats.skipped_packets + stats.errors, 4);
    assert_eq!(engine.store().packet_count(), 1);
}

#[test]
fn replies_form_their_own_conversation() {
    let frames = vec![
        common::http_request(),
        common::tcp_frame(SERVER, 80, CLIENT, 1234, b"HTTP/1.1 200 OK"),
        common::tcp_frame(CLIENT, 1234, SERVER, 80, b"GET /favicon.ico HTTP/1.1"),
    ];
    let factory = Arc::new(FakeFactory::default()).scripted(frames, Ending::Exhausted);
    let (engine, _events) = common::engine(factory);

    engine.start("fake0").unwrap();
    engine.join().unwrap();

    let snapshot = engine.store().snapshot();
    assert_eq!(snapshot.len(), 2);
    // Most packets first
    assert_eq!(snapshot[0].key, request_key());
    assert_eq!(snapshot[0].bucket.total(), 2);
    assert_eq!(snapshot[1].key.source_address, IpAddr::V4(SERVER));

    let groups = engine.store().group_by_source();
    assert_eq!(groups.len(), 2);
}

#[test]
fn stop_is_idempotent() {
    let (gate, gate_rx) = mpsc::channel();
    let factory = Arc::new(FakeFactory::default()).gated(gate_rx);
    let (engine, mut events) = common::engine(factory);

    engine.start("fake0").unwrap();
    assert_eq!(engine.state(), EngineState::Running);

    engine.stop().unwrap();
    assert_eq!(engine.state(), EngineState::Stopping);
    engine.stop().unwrap();
    assert_eq!(engine.state(), EngineState::Stopping);

    drop(gate);
    engine.join().unwrap();
    assert_eq!(engine.state(), EngineState::Idle);

    let ended = common::drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::SessionEnded { .. }))
        .count();
    assert_eq!(ended, 1);
}

#[test]
fn stop_while_idle_is_rejected() {
    let (engine, _events) = common::engine(Arc::new(FakeFactory::default()));
    assert!(matches!(engine.stop(), Err(AppError::NotRunning)));
    assert!(matches!(engine.join(), Err(AppError::NotRunning)));
}

#[test]
fn second_start_is_rejected() {
    let (gate, gate_rx) = mpsc::channel();
    let factory = Arc::new(FakeFactory::default())
        .gated(gate_rx)
        .scripted(vec![common::http_request()], Ending::Exhausted);
    let (engine, _events) = common::engine(factory);

    engine.start("fake0").unwrap();
    match engine.start("fake1") {
        Err(AppError::AlreadyRunning(interface)) => assert_eq!(interface, "fake0"),
        other => panic!("unexpected start result: {:?}", other),
    }

    engine.stop().unwrap();
    drop(gate);
    engine.join().unwrap();

    // Idle again, so the queued source can be used
    engine.start("fake1").unwrap();
    engine.join().unwrap();
    assert_eq!(engine.interface().as_deref(), Some("fake1"));
}

#[test]
fn unopenable_interface_leaves_engine_idle() {
    let (engine, mut events) = common::engine(Arc::new(FakeFactory::default()));

    assert!(matches!(engine.start("missing0"), Err(AppError::SourceError(_))));
    assert_eq!(engine.state(), EngineState::Idle);
    assert!(common::drain(&mut events).is_empty());
}

#[test]
fn source_failure_ends_the_session() {
    let factory = Arc::new(FakeFactory::default()).scripted(
        vec![common::http_request()],
        Ending::Fails("device went away".to_string()),
    );
    let (engine, mut events) = common::engine(factory);

    engine.start("fake0").unwrap();
    let failed = common::wait_for_event(&mut events, |e| matches!(e, EngineEvent::SessionFailed { .. }));
    match failed {
        Some(EngineEvent::SessionFailed { error, stats, .. }) => {
            assert!(error.contains("device went away"));
            assert_eq!(stats.filed_packets, 1);
        }
        other => panic!("expected a failure event, got {:?}", other),
    }

    assert!(matches!(engine.join(), Err(AppError::SourceError(_))));
    assert_eq!(engine.state(), EngineState::Idle);
    // Packets filed before the fault stay available
    assert_eq!(engine.store().packet_count(), 1);
}

#[test]
fn each_session_gets_a_fresh_store() {
    let factory = Arc::new(FakeFactory::default())
        .scripted(vec![common::http_request()], Ending::Exhausted)
        .scripted(vec![common::udp_frame(CLIENT, 5353, SERVER, 53, b"second run")], Ending::Exhausted);
    let (engine, _events) = common::engine(factory);

    engine.start("fake0").unwrap();
    engine.join().unwrap();
    let first = engine.store();

    engine.start("fake0").unwrap();
    engine.join().unwrap();
    let second = engine.store();

    assert_eq!(first.packet_count(), 1);
    assert_eq!(second.packet_count(), 1);
    assert_eq!(second.records()[0].payload, b"second run");
    // Ids keep increasing across sessions
    assert!(second.records()[0].id > first.records()[0].id);
}
