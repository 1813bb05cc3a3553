//! Connection lifecycle tests against a real loopback peer: a wiremock
//! health endpoint plus a raw tokio-tungstenite acceptor standing in for
//! the tool server.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tether_bridge::{
    BridgeConfig, ConnectionState, ConnectionSupervisor, MessageRouter, RequestCorrelator,
};
use tether_core::envelope::kinds;
use tether_core::{BridgeError, Envelope, GateFailure};

const WAIT: Duration = Duration::from_secs(5);

/// Minimal accepting peer: counts accepts, records inbound envelopes,
/// answers pings while enabled, closes all sockets on demand.
struct TestPeer {
    port: u16,
    accepts: Arc<AtomicUsize>,
    inbound: mpsc::UnboundedReceiver<Envelope>,
    close: broadcast::Sender<()>,
    respond_pong: Arc<AtomicBool>,
}

async fn start_test_peer() -> TestPeer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepts = Arc::new(AtomicUsize::new(0));
    let (in_tx, inbound) = mpsc::unbounded_channel();
    let (close, _) = broadcast::channel(4);
    let respond_pong = Arc::new(AtomicBool::new(true));

    let accept_counter = Arc::clone(&accepts);
    let close_tx = close.clone();
    let pong_flag = Arc::clone(&respond_pong);
    drop(tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let _ = accept_counter.fetch_add(1, Ordering::SeqCst);
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            let in_tx = in_tx.clone();
            let mut close_rx = close_tx.subscribe();
            let pong_flag = Arc::clone(&pong_flag);
            drop(tokio::spawn(async move {
                let (mut ws_tx, mut ws_rx) = ws.split();
                loop {
                    tokio::select! {
                        _ = close_rx.recv() => {
                            let _ = ws_tx.close().await;
                            return;
                        }
                        message = ws_rx.next() => {
                            let Some(Ok(Message::Text(text))) = message else { return };
                            let Ok(envelope) = Envelope::from_json(&text) else { continue };
                            if envelope.kind == kinds::PING && pong_flag.load(Ordering::SeqCst) {
                                let pong = Envelope::new(kinds::PONG, json!({"timestamp": "now"}))
                                    .to_json()
                                    .unwrap();
                                let _ = ws_tx.send(Message::Text(pong.into())).await;
                            }
                            let _ = in_tx.send(envelope);
                        }
                    }
                }
            }));
        }
    }));

    TestPeer {
        port,
        accepts,
        inbound,
        close,
        respond_pong,
    }
}

async fn healthy_gate() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "version": "0.1.0",
            "uptimeSeconds": 1,
            "connected": false,
            "timestamp": "2026-08-01T00:00:00.000Z",
        })))
        .mount(&server)
        .await;
    server
}

fn fast_config(gate: &MockServer, peer: &TestPeer) -> BridgeConfig {
    BridgeConfig {
        server_url: format!("ws://127.0.0.1:{}/bridge", peer.port),
        health_url: format!("{}/health", gate.uri()),
        reconnect_interval_ms: 100,
        heartbeat_interval_ms: 100,
        heartbeat_timeout_ms: 400,
        ..BridgeConfig::default()
    }
}

fn build(
    config: BridgeConfig,
) -> (ConnectionSupervisor, Arc<RequestCorrelator>, Arc<MessageRouter>) {
    let router = Arc::new(MessageRouter::new());
    let correlator = Arc::new(RequestCorrelator::new(Arc::clone(&router)));
    RequestCorrelator::attach(&correlator, &router);
    let supervisor = ConnectionSupervisor::new(config, Arc::clone(&router), Arc::clone(&correlator));
    (supervisor, correlator, router)
}

async fn next_envelope(peer: &mut TestPeer) -> Envelope {
    tokio::time::timeout(WAIT, peer.inbound.recv())
        .await
        .expect("timed out waiting for envelope")
        .expect("peer channel closed")
}

#[tokio::test]
async fn gate_refusal_prevents_any_socket_attempt() {
    let peer = start_test_peer().await;
    let gate = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "draining",
            "version": "0.1.0",
            "uptimeSeconds": 9,
            "connected": false,
            "timestamp": "2026-08-01T00:00:00.000Z",
        })))
        .mount(&gate)
        .await;

    let (supervisor, _, _) = build(fast_config(&gate, &peer));
    let err = supervisor.connect().await.unwrap_err();

    assert_matches!(
        err,
        BridgeError::Gate(GateFailure::Unhealthy { status }) if status == "draining"
    );
    assert!(!supervisor.is_usable());
    assert_eq!(supervisor.state(), ConnectionState::Idle);
    assert_eq!(peer.accepts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_gate_is_a_timeout_failure() {
    let peer = start_test_peer().await;
    let gate = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_json(json!({"status": "ok"})),
        )
        .mount(&gate)
        .await;

    let config = BridgeConfig {
        gate_timeout_ms: 100,
        ..fast_config(&gate, &peer)
    };
    let (supervisor, _, _) = build(config);
    let err = supervisor.connect().await.unwrap_err();
    assert_matches!(err, BridgeError::Gate(GateFailure::Timeout { timeout_ms: 100 }));
    assert_eq!(peer.accepts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connect_sends_hello_and_becomes_usable() {
    let mut peer = start_test_peer().await;
    let gate = healthy_gate().await;
    let (supervisor, _, _) = build(fast_config(&gate, &peer));

    supervisor.connect().await.unwrap();
    assert!(supervisor.is_usable());
    assert_eq!(supervisor.state(), ConnectionState::Open);
    assert!(supervisor.connection_id().is_some());

    let hello = next_envelope(&mut peer).await;
    assert_eq!(hello.kind, "hello");
    assert!(hello.payload["version"].is_string());
    assert!(hello.payload["platform"].is_string());
    assert!(hello.payload["timestamp"].is_string());
}

#[tokio::test]
async fn concurrent_connects_open_exactly_one_socket() {
    let mut peer = start_test_peer().await;
    let gate = healthy_gate().await;
    let (supervisor, _, _) = build(fast_config(&gate, &peer));

    let (a, b) = tokio::join!(supervisor.connect(), supervisor.connect());
    assert!(a.is_ok() && b.is_ok());
    // A third call while Open is a guarded no-op.
    supervisor.connect().await.unwrap();

    let _ = next_envelope(&mut peer).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(peer.accepts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pong_keeps_the_connection_alive() {
    let mut peer = start_test_peer().await;
    let gate = healthy_gate().await;
    let (supervisor, _, _) = build(fast_config(&gate, &peer));
    supervisor.connect().await.unwrap();
    let _ = next_envelope(&mut peer).await; // hello

    // Tick past several heartbeat intervals; the peer answers each ping,
    // so no forced disconnect may occur.
    for _ in 0..8 {
        supervisor.tick().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(supervisor.is_usable());
}

#[tokio::test]
async fn missing_pongs_force_a_disconnect_within_one_tick() {
    let mut peer = start_test_peer().await;
    let gate = healthy_gate().await;
    let (supervisor, _, _) = build(fast_config(&gate, &peer));
    supervisor.connect().await.unwrap();
    let _ = next_envelope(&mut peer).await; // hello

    peer.respond_pong.store(false, Ordering::SeqCst);
    // Wait past the liveness timeout (400ms), then tick.
    tokio::time::sleep(Duration::from_millis(500)).await;
    supervisor.tick().await;
    assert!(!supervisor.is_usable());
}

#[tokio::test]
async fn disconnect_rejects_all_pending_requests() {
    let mut peer = start_test_peer().await;
    let gate = healthy_gate().await;
    let (supervisor, correlator, _) = build(fast_config(&gate, &peer));
    supervisor.connect().await.unwrap();
    let _ = next_envelope(&mut peer).await; // hello

    let pending = {
        let correlator = Arc::clone(&correlator);
        tokio::spawn(async move {
            correlator
                .issue(kinds::GET_STATE, json!({}), Duration::from_secs(30))
                .await
        })
    };
    // Let the request register and reach the peer.
    let request = next_envelope(&mut peer).await;
    assert_eq!(request.kind, "getState");

    supervisor.disconnect("test teardown");
    let result = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();
    assert_matches!(result, Err(BridgeError::ConnectionLost));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn peer_close_is_detected_and_tick_reconnects() {
    let mut peer = start_test_peer().await;
    let gate = healthy_gate().await;
    let (supervisor, _, _) = build(fast_config(&gate, &peer));
    supervisor.connect().await.unwrap();
    let _ = next_envelope(&mut peer).await; // hello
    let first_id = supervisor.connection_id().unwrap();

    let _ = peer.close.send(());
    // Reader notices the close shortly after.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!supervisor.is_usable());

    // Reconnect cadence is 100ms in this config.
    for _ in 0..20 {
        supervisor.tick().await;
        if supervisor.is_usable() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(supervisor.is_usable());
    assert_ne!(supervisor.connection_id().unwrap(), first_id);
    assert_eq!(peer.accepts.load(Ordering::SeqCst), 2);

    let hello_again = next_envelope(&mut peer).await;
    assert_eq!(hello_again.kind, "hello");
}

#[tokio::test]
async fn commands_round_trip_through_a_replying_peer() {
    // A peer that answers getState with a state envelope.
    let mut peer = start_test_peer().await;
    let gate = healthy_gate().await;
    let (supervisor, correlator, router) = build(fast_config(&gate, &peer));
    supervisor.connect().await.unwrap();
    let _ = next_envelope(&mut peer).await; // hello

    let pending = {
        let correlator = Arc::clone(&correlator);
        tokio::spawn(async move {
            correlator
                .issue(kinds::GET_STATE, json!({}), Duration::from_secs(5))
                .await
        })
    };
    let request = next_envelope(&mut peer).await;
    assert_eq!(request.kind, "getState");

    // Feed the reply through the router the way the reader task would.
    router
        .on_frame(r#"{"kind":"state","payload":{"sceneName":"Main","isPlaying":false}}"#)
        .await;

    let state = tokio::time::timeout(WAIT, pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(state["sceneName"], "Main");
}
