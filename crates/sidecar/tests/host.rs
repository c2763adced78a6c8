//! Host tests: region ownership, command delivery, framing and close.

mod common;

use std::sync::Arc;
use std::time::Duration;

use sidecar::{
    ACK_PAYLOAD, Command, EVENT_ACK, Framing, HostConfig, LoggingCallbacks, RegionError,
    SharedRegion, SidecarError, SidecarHost, WorkerConfig,
};

use common::{Call, Recorder, init_tracing, unique_name, wait_until};

#[test]
fn ping_round_trip() {
    init_tracing();
    let name = unique_name("hping");
    let recorder = Arc::new(Recorder::default());
    let mut host = SidecarHost::new(&name, 4096, recorder.clone()).unwrap();
    assert_eq!(host.name(), format!("/{}", name));
    assert_eq!(host.capacity(), 4096);
    assert_eq!(host.available_to_write(), 4096);

    host.start().unwrap();
    assert!(host.is_started());
    assert_eq!(host.send_command(b"PING"), 4);

    wait_until("ack", || !recorder.events().is_empty());
    host.stop();
    assert!(!host.is_started());

    assert_eq!(
        recorder.calls(),
        vec![
            Call::Init,
            Call::Process(b"PING".to_vec()),
            Call::Event(EVENT_ACK, ACK_PAYLOAD.to_vec()),
            Call::Dispose,
        ]
    );
}

#[test]
fn start_and_stop_are_idempotent() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let mut host = SidecarHost::new(&unique_name("hidem"), 64, recorder.clone()).unwrap();

    host.stop();
    host.start().unwrap();
    host.start().unwrap();
    host.stop();
    host.stop();

    assert_eq!(recorder.calls(), vec![Call::Init, Call::Dispose]);
}

#[test]
fn short_write_is_not_an_error() {
    init_tracing();
    let mut host =
        SidecarHost::new(&unique_name("hshort"), 8, Arc::new(Recorder::default())).unwrap();
    assert_eq!(host.send_command(b"0123456789"), 8);
    assert_eq!(host.send_command(b"x"), 0);
    assert_eq!(host.available_to_write(), 0);
}

#[test]
fn second_host_with_same_name_collides() {
    init_tracing();
    let name = unique_name("hdup");
    let _first = SidecarHost::new(&name, 64, Arc::new(Recorder::default())).unwrap();
    let err = SidecarHost::new(&name, 64, Arc::new(Recorder::default())).unwrap_err();
    assert!(
        matches!(err, SidecarError::Region(RegionError::NameCollision(_))),
        "{:?}",
        err
    );
}

#[test]
fn invalid_capacity_is_rejected() {
    init_tracing();
    let err = SidecarHost::new(&unique_name("hzero"), 0, Arc::new(Recorder::default()))
        .unwrap_err();
    assert!(
        matches!(err, SidecarError::Region(RegionError::InvalidArgument(_))),
        "{:?}",
        err
    );
}

#[test]
fn close_stops_worker_and_unlinks_region() {
    init_tracing();
    let name = unique_name("hclose");
    let recorder = Arc::new(Recorder::default());
    let mut host = SidecarHost::new(&name, 64, recorder.clone()).unwrap();
    host.start().unwrap();

    host.close();
    assert!(host.is_closed());
    assert_eq!(recorder.disposes(), 1);
    assert!(matches!(
        SharedRegion::open(&name),
        Err(RegionError::NotFound(_))
    ));

    assert_eq!(host.send_command(b"late"), 0);
    assert_eq!(host.available_to_write(), 0);
    assert!(matches!(
        host.start(),
        Err(SidecarError::Region(RegionError::Closed))
    ));
    assert!(matches!(
        host.send_frame(&Command::ping(), Duration::ZERO),
        Err(SidecarError::Region(RegionError::Closed))
    ));
    host.close();
    assert_eq!(recorder.disposes(), 1);
}

#[test]
fn drop_closes_region() {
    init_tracing();
    let name = unique_name("hdrop");
    let recorder = Arc::new(Recorder::default());
    {
        let mut host = SidecarHost::new(&name, 64, recorder.clone()).unwrap();
        host.start().unwrap();
    }
    assert_eq!(recorder.calls(), vec![Call::Init, Call::Dispose]);
    assert!(matches!(
        SharedRegion::open(&name),
        Err(RegionError::NotFound(_))
    ));
}

#[test]
fn send_frame_rejects_frames_larger_than_ring() {
    init_tracing();
    let mut host =
        SidecarHost::new(&unique_name("hbig"), 16, Arc::new(Recorder::default())).unwrap();
    let err = host
        .send_frame(&Command::process_data(vec![0u8; 12]), Duration::ZERO)
        .unwrap_err();
    assert!(
        matches!(err, SidecarError::FrameTooLarge { len: 17, max: 16 }),
        "{:?}",
        err
    );
    assert_eq!(host.available_to_write(), 16);
}

#[test]
fn send_frame_times_out_then_succeeds_after_drain() {
    init_tracing();
    let name = unique_name("hfull");
    let mut host = SidecarHost::new(&name, 16, Arc::new(Recorder::default())).unwrap();
    assert_eq!(host.send_command(&[0u8; 14]), 14);

    let err = host
        .send_frame(&Command::ping(), Duration::from_millis(20))
        .unwrap_err();
    assert!(matches!(err, SidecarError::Timeout(_)), "{:?}", err);
    // Nothing partial was written.
    assert_eq!(host.available_to_write(), 2);

    let peer = SharedRegion::open(&name).unwrap();
    let ring = peer.ring().unwrap();
    let mut sink = [0u8; 14];
    assert_eq!(ring.read(&mut sink), 14);

    host.send_frame(&Command::ping(), Duration::from_secs(1))
        .unwrap();
    let mut frame = [0u8; 5];
    assert_eq!(ring.read(&mut frame), 5);
    assert_eq!(Command::decode(&frame).unwrap(), Command::ping());
}

#[test]
fn send_frame_accepts_unbounded_timeout() {
    init_tracing();
    let name = unique_name("hmax");
    let mut host = SidecarHost::new(&name, 64, Arc::new(Recorder::default())).unwrap();

    host.send_frame(&Command::ping(), Duration::MAX).unwrap();
    assert_eq!(host.available_to_write(), 64 - 5);

    let peer = SharedRegion::open(&name).unwrap();
    let ring = peer.ring().unwrap();
    let mut frame = [0u8; 5];
    assert_eq!(ring.read(&mut frame), 5);
    assert_eq!(Command::decode(&frame).unwrap(), Command::ping());
}

#[test]
fn frames_mode_delivers_whole_commands() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let config = HostConfig {
        worker: WorkerConfig {
            framing: Framing::Frames,
            ack_events: false,
            ..WorkerConfig::default()
        },
        ..HostConfig::new(unique_name("hframe"), 32)
    };
    let mut host = SidecarHost::with_config(config, recorder.clone()).unwrap();
    host.start().unwrap();

    let commands = [
        Command::process_data(&b"first payload"[..]),
        Command::ping(),
        Command::process_data(vec![7u8; 20]),
        Command::shutdown(),
    ];
    for command in &commands {
        host.send_frame(command, Duration::from_secs(10)).unwrap();
    }

    wait_until("all frames", || recorder.processed().len() == commands.len());
    host.close();

    let decoded: Vec<Command> = recorder
        .processed()
        .iter()
        .map(|f| Command::decode(f).unwrap())
        .collect();
    assert_eq!(decoded, commands);
}

#[test]
fn events_handle_follows_worker() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let mut host = SidecarHost::new(&unique_name("hevt"), 64, recorder.clone()).unwrap();
    assert!(host.events().is_none());

    host.start().unwrap();
    let events = host.events().unwrap();
    assert!(events.emit(42, b"direct"));
    host.stop();
    assert!(!events.emit(42, b"after"));
    assert!(host.events().is_none());

    assert_eq!(recorder.events(), vec![(42, b"direct".to_vec())]);
}

#[test]
fn logging_callbacks_smoke() {
    init_tracing();
    let mut host =
        SidecarHost::new(&unique_name("hlog"), 64, Arc::new(LoggingCallbacks)).unwrap();
    host.start().unwrap();
    assert_eq!(host.send_command(b"PING"), 4);
    wait_until("drained", || host.available_to_write() == 64);
    host.close();
}
