//! Integration tests for the connection manager against a fake simulation.
//!
//! Each test binds a `TcpListener` on an ephemeral loopback port and plays the
//! simulation side by hand: accepting connections, writing frames in
//! deliberately awkward chunks, reading what the client sends, and dropping
//! sockets to force reconnects.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use simlink_client::{
    ClientSettings, ConnectionManager, ConnectionState, Dispatcher, InboundQueue, SendError,
};
use simlink_core::commands::{ENTITY_STATE, SIM_CLOCK, STATUS_TEXT};
use simlink_core::protocol::{
    encode_frame, Command, CommandId, FrameHeader, HEADER_SIZE, PROTOCOL_VERSION,
};
use simlink_core::{sim_command_factory, SimCommand, Vec3};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

const STEP: Duration = Duration::from_secs(5);

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn fake_simulation() -> (TcpListener, ClientSettings) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let settings = ClientSettings {
        sim_port: port,
        retry_backoff: Duration::from_millis(10),
        max_retry_backoff: Duration::from_millis(50),
        ..ClientSettings::default()
    };
    (listener, settings)
}

fn start_client(settings: ClientSettings) -> (Arc<ConnectionManager<SimCommand>>, Arc<InboundQueue<SimCommand>>) {
    let inbound = Arc::new(InboundQueue::new());
    let manager = Arc::new(ConnectionManager::new(
        settings,
        Arc::new(sim_command_factory()),
        Arc::clone(&inbound),
    ));
    manager.start();
    (manager, inbound)
}

async fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = timeout(STEP, listener.accept())
        .await
        .expect("client must connect")
        .expect("accept");
    stream
}

async fn wait_for_state(manager: &ConnectionManager<SimCommand>, want: ConnectionState) {
    let mut rx = manager.subscribe_state();
    timeout(STEP, rx.wait_for(|s| *s == want))
        .await
        .expect("state change timed out")
        .expect("state channel closed");
}

async fn wait_for_len(queue: &InboundQueue<SimCommand>, n: usize) {
    timeout(STEP, async {
        while queue.len() < n {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("commands did not arrive");
}

fn frame_for(seq: u32, cmd: &SimCommand) -> Vec<u8> {
    let payload = cmd.to_payload();
    let header = FrameHeader::for_payload(seq, cmd.command_id(), payload.len()).expect("header");
    encode_frame(&header, &payload)
}

async fn read_frame(stream: &mut TcpStream) -> (FrameHeader, Vec<u8>) {
    let mut raw = [0u8; HEADER_SIZE];
    timeout(STEP, stream.read_exact(&mut raw))
        .await
        .expect("frame header timed out")
        .expect("read header");
    let header = FrameHeader::decode(&raw);
    let len = if header.is_heartbeat() {
        0
    } else {
        header.payload_len().expect("valid length")
    };
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.expect("read payload");
    (header, payload)
}

fn entity(id: i32) -> SimCommand {
    SimCommand::EntityState {
        entity_id: id,
        position: Vec3::new(id as f32, 0.0, 50.0),
        heading_deg: 10.0,
        alive: true,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_frames_written_in_fragments_are_dispatched_in_order() {
    // Arrange
    let (listener, settings) = fake_simulation().await;
    let (manager, inbound) = start_client(settings);
    let mut sim = accept(&listener).await;

    let mut dispatcher = Dispatcher::new(Arc::clone(&inbound));
    let seen = Arc::new(Mutex::new(Vec::new()));
    for id in [ENTITY_STATE, SIM_CLOCK] {
        let seen = Arc::clone(&seen);
        dispatcher.register_handler(id, move |cmd| seen.lock().unwrap().push(cmd));
    }

    let commands = vec![
        entity(1),
        SimCommand::SimClock {
            tick: 7,
            sim_time_s: 0.35,
        },
        entity(2),
    ];
    let wire: Vec<u8> = commands
        .iter()
        .enumerate()
        .flat_map(|(i, c)| frame_for(i as u32, c))
        .collect();

    // Act – 5 bytes, then 7, then the rest in 3-byte pieces
    sim.write_all(&wire[..5]).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    sim.write_all(&wire[5..12]).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    for chunk in wire[12..].chunks(3) {
        sim.write_all(chunk).await.unwrap();
        sim.flush().await.unwrap();
    }
    wait_for_len(&inbound, commands.len()).await;
    let report = dispatcher.dispatch();

    // Assert
    assert_eq!(report.dispatched, 3);
    assert_eq!(*seen.lock().unwrap(), commands);
    manager.shutdown();
}

#[tokio::test]
async fn test_unknown_command_id_is_skipped_without_losing_alignment() {
    let (listener, settings) = fake_simulation().await;
    let (manager, inbound) = start_client(settings);
    let mut sim = accept(&listener).await;

    let unknown_header = FrameHeader::for_payload(1, CommandId(0x0BAD), 6).unwrap();
    let mut wire = frame_for(0, &entity(1));
    wire.extend(encode_frame(&unknown_header, &[1, 2, 3, 4, 5, 6]));
    wire.extend(FrameHeader::heartbeat(2).encode());
    wire.extend(frame_for(3, &entity(2)));
    sim.write_all(&wire).await.unwrap();

    wait_for_len(&inbound, 2).await;
    sleep(Duration::from_millis(20)).await;

    assert_eq!(inbound.drain(), vec![entity(1), entity(2)]);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.sessions_established(), 1);
    manager.shutdown();
}

#[tokio::test]
async fn test_sent_commands_arrive_with_counted_length_and_increasing_sequence() {
    // Arrange
    let (listener, settings) = fake_simulation().await;
    let (manager, _inbound) = start_client(settings);
    let mut sim = accept(&listener).await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    let sender = manager.sender();

    let status = SimCommand::StatusText {
        text: Some("camera locked".into()),
    };

    // Act
    sender.send(&status).unwrap();
    sender.send_heartbeat().unwrap();
    manager.send(&entity(5)).unwrap();

    // Assert
    let (first, payload) = read_frame(&mut sim).await;
    assert_eq!(first.command_id, STATUS_TEXT);
    assert_eq!(first.version, PROTOCOL_VERSION);
    assert_eq!(first.length as usize, payload.len() + 8);
    assert_eq!(payload, status.to_payload());
    assert_eq!(
        SimCommand::decode(first.command_id, &payload).unwrap(),
        status
    );

    let (heartbeat, _) = read_frame(&mut sim).await;
    assert!(heartbeat.is_heartbeat());

    let (third, payload) = read_frame(&mut sim).await;
    assert_eq!(third.command_id, ENTITY_STATE);
    assert_eq!(payload, entity(5).to_payload());

    assert!(first.sequence < heartbeat.sequence);
    assert!(heartbeat.sequence < third.sequence);
    manager.shutdown();
}

#[tokio::test]
async fn test_send_before_connect_is_rejected() {
    let (listener, settings) = fake_simulation().await;
    drop(listener);
    let (manager, _inbound) = start_client(settings);

    assert_eq!(manager.send(&entity(1)), Err(SendError::NotConnected));
    manager.shutdown();
}

#[tokio::test]
async fn test_connection_loss_mid_frame_triggers_exactly_one_reconnect() {
    // Arrange
    let (listener, settings) = fake_simulation().await;
    let (manager, inbound) = start_client(settings);

    // Act – first session dies halfway through a frame
    let mut first = accept(&listener).await;
    let wire = frame_for(0, &entity(1));
    first.write_all(&wire[..HEADER_SIZE + 3]).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    drop(first);

    let mut second = accept(&listener).await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    second.write_all(&frame_for(0, &entity(2))).await.unwrap();
    wait_for_len(&inbound, 1).await;
    sleep(Duration::from_millis(100)).await;

    // Assert – partial frame lost, one new attempt, one receive loop
    assert_eq!(inbound.drain(), vec![entity(2)]);
    assert_eq!(manager.connect_attempts(), 2);
    assert_eq!(manager.sessions_established(), 2);
    assert!(
        timeout(Duration::from_millis(100), listener.accept()).await.is_err(),
        "no further connection expected"
    );
    manager.shutdown();
}

#[tokio::test]
async fn test_reconnects_when_simulation_comes_up_late() {
    // Arrange – reserve a port, then leave it closed for a while
    let (listener, settings) = fake_simulation().await;
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let (manager, inbound) = start_client(settings);
    sleep(Duration::from_millis(80)).await;
    assert_ne!(manager.state(), ConnectionState::Connected);

    // Act
    let listener = TcpListener::bind(addr).await.expect("rebind");
    let mut sim = accept(&listener).await;
    sim.write_all(&frame_for(0, &entity(9))).await.unwrap();
    wait_for_len(&inbound, 1).await;

    // Assert
    assert!(manager.connect_attempts() >= 2);
    assert_eq!(manager.sessions_established(), 1);
    assert_eq!(inbound.drain(), vec![entity(9)]);
    manager.shutdown();
}

#[tokio::test]
async fn test_shutdown_closes_the_socket_and_stops_sending() {
    let (listener, settings) = fake_simulation().await;
    let (manager, _inbound) = start_client(settings);
    let mut sim = accept(&listener).await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    manager.shutdown();

    let mut buf = [0u8; 1];
    let n = timeout(STEP, sim.read(&mut buf))
        .await
        .expect("client must close its socket")
        .unwrap_or(0);
    assert_eq!(n, 0);
    assert_eq!(manager.state(), ConnectionState::ShuttingDown);
    assert_eq!(manager.send(&entity(1)), Err(SendError::NotConnected));
}

#[tokio::test]
async fn test_oversized_frame_forces_reconnect() {
    let (listener, mut settings) = fake_simulation().await;
    settings.max_payload_bytes = 16;
    let (manager, _inbound) = start_client(settings);
    let mut first = accept(&listener).await;

    let header = FrameHeader::for_payload(0, STATUS_TEXT, 1024).unwrap();
    first.write_all(&header.encode()).await.unwrap();

    let _second = accept(&listener).await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    assert_eq!(manager.sessions_established(), 2);
    manager.shutdown();
}
