//! End-to-end tests driving the server with a raw WebSocket client that
//! plays the editor's role.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use tether_core::logs::{LogQuery, LogSeverity};
use tether_core::{BridgeError, Envelope};
use tether_server::{ServerConfig, TetherServer};

const WAIT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a server on an ephemeral port; return its base address and handle.
async fn boot_server() -> (String, Arc<TetherServer>) {
    let server = Arc::new(TetherServer::new(ServerConfig::default()));
    let (addr, _handle) = server.listen().await.unwrap();
    (addr.to_string(), server)
}

async fn connect_editor(addr: &str) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}/bridge")).await.unwrap();
    ws
}

/// Wait for the upgrade task to attach the editor to the bridge.
async fn wait_attached(server: &Arc<TetherServer>) {
    for _ in 0..100 {
        if server.bridge().is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("editor did not attach within 1s");
}

async fn recv_envelope(ws: &mut WsStream) -> Envelope {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return Envelope::from_json(&text).unwrap();
        }
    }
}

async fn send_envelope(ws: &mut WsStream, kind: &str, payload: Value) {
    let frame = Envelope::new(kind, payload).to_json().unwrap();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

async fn fetch_health(addr: &str) -> Value {
    reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reflects_editor_attachment() {
    let (addr, server) = boot_server().await;

    let health = fetch_health(&addr).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connected"], false);

    let _editor = connect_editor(&addr).await;
    // The upgrade completes asynchronously; poll briefly.
    for _ in 0..50 {
        if server.bridge().is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(server.bridge().is_connected());

    let health = fetch_health(&addr).await;
    assert_eq!(health["connected"], true);
}

#[tokio::test]
async fn hello_is_acknowledged_with_welcome() {
    let (addr, server) = boot_server().await;
    let mut editor = connect_editor(&addr).await;

    send_envelope(
        &mut editor,
        "hello",
        json!({"version": "0.1.0", "platform": "linux", "timestamp": "t"}),
    )
    .await;

    let welcome = recv_envelope(&mut editor).await;
    assert_eq!(welcome.kind, "welcome");
    assert!(welcome.payload["version"].is_string());

    for _ in 0..50 {
        if server.bridge().peer_info().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.bridge().peer_info().unwrap()["platform"], "linux");
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let (addr, _server) = boot_server().await;
    let mut editor = connect_editor(&addr).await;

    send_envelope(&mut editor, "ping", json!({"timestamp": "t"})).await;
    let pong = recv_envelope(&mut editor).await;
    assert_eq!(pong.kind, "pong");
}

#[tokio::test]
async fn caller_command_round_trips_through_the_editor() {
    let (addr, server) = boot_server().await;
    let mut editor = connect_editor(&addr).await;
    wait_attached(&server).await;

    let bridge = Arc::clone(server.bridge());
    let pending = tokio::spawn(async move { bridge.get_state().await });

    let request = recv_envelope(&mut editor).await;
    assert_eq!(request.kind, "getState");

    send_envelope(
        &mut editor,
        "state",
        json!({"sceneName": "Main", "isPlaying": false}),
    )
    .await;

    let state = timeout(WAIT, pending).await.unwrap().unwrap().unwrap();
    assert_eq!(state["sceneName"], "Main");
}

#[tokio::test]
async fn back_to_back_commands_resolve_in_issue_order() {
    let (addr, server) = boot_server().await;
    let mut editor = connect_editor(&addr).await;
    wait_attached(&server).await;

    let first = {
        let bridge = Arc::clone(server.bridge());
        tokio::spawn(async move { bridge.manipulate_scene("create", "A", json!({})).await })
    };
    let request_a = recv_envelope(&mut editor).await;
    assert_eq!(request_a.payload["name"], "A");

    let second = {
        let bridge = Arc::clone(server.bridge());
        tokio::spawn(async move { bridge.manipulate_scene("create", "B", json!({})).await })
    };
    let request_b = recv_envelope(&mut editor).await;
    assert_eq!(request_b.payload["name"], "B");

    // The editor replies in request order; FIFO correlation pairs them up.
    send_envelope(&mut editor, "sceneManipulationResult", json!({"created": "A"})).await;
    send_envelope(&mut editor, "sceneManipulationResult", json!({"created": "B"})).await;

    assert_eq!(
        timeout(WAIT, first).await.unwrap().unwrap().unwrap()["created"],
        "A"
    );
    assert_eq!(
        timeout(WAIT, second).await.unwrap().unwrap().unwrap()["created"],
        "B"
    );
}

#[tokio::test]
async fn error_replies_surface_as_failures() {
    let (addr, server) = boot_server().await;
    let mut editor = connect_editor(&addr).await;
    wait_attached(&server).await;

    let bridge = Arc::clone(server.bridge());
    let pending = tokio::spawn(async move { bridge.get_object_details("Ghost").await });

    let _request = recv_envelope(&mut editor).await;
    send_envelope(&mut editor, "objectDetails", json!({"error": "no object named 'Ghost'"})).await;

    let err = timeout(WAIT, pending).await.unwrap().unwrap().unwrap_err();
    assert_matches!(err, BridgeError::Handler { message } if message.contains("Ghost"));
}

#[tokio::test]
async fn editor_disconnect_rejects_pending_commands() {
    let (addr, server) = boot_server().await;
    let mut editor = connect_editor(&addr).await;
    wait_attached(&server).await;

    let bridge = Arc::clone(server.bridge());
    let pending = tokio::spawn(async move { bridge.take_screenshot().await });
    let _request = recv_envelope(&mut editor).await;

    drop(editor);

    let result = timeout(WAIT, pending).await.unwrap().unwrap();
    assert_matches!(result, Err(BridgeError::ConnectionLost));

    for _ in 0..50 {
        if !server.bridge().is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!server.bridge().is_connected());
}

#[tokio::test]
async fn relayed_logs_are_buffered_and_queryable() {
    let (addr, server) = boot_server().await;
    let mut editor = connect_editor(&addr).await;

    for (severity, message) in [
        ("info", "scene loaded"),
        ("error", "shader compile failed"),
        ("warn", "shader cache stale"),
    ] {
        send_envelope(
            &mut editor,
            "log",
            json!({
                "message": message,
                "severity": severity,
                "timestamp": "2026-08-01T10:00:00Z",
            }),
        )
        .await;
    }

    for _ in 0..50 {
        if server.bridge().log_count() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let errors = server.bridge().get_logs(&LogQuery {
        severities: Some(vec![LogSeverity::Error]),
        ..LogQuery::default()
    });
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "shader compile failed");

    let shader_errors = server.bridge().get_logs(&LogQuery {
        severities: Some(vec![LogSeverity::Error, LogSeverity::Warn]),
        text: Some("shader".into()),
        ..LogQuery::default()
    });
    assert_eq!(shader_errors.len(), 2);
}

#[tokio::test]
async fn reconnecting_editor_supersedes_the_stale_session() {
    let (addr, server) = boot_server().await;
    let mut first = connect_editor(&addr).await;
    send_envelope(&mut first, "hello", json!({"version": "1", "platform": "a", "timestamp": "t"})).await;
    let _welcome = recv_envelope(&mut first).await;

    let mut second = connect_editor(&addr).await;
    send_envelope(&mut second, "hello", json!({"version": "2", "platform": "b", "timestamp": "t"})).await;
    let _welcome = recv_envelope(&mut second).await;

    for _ in 0..50 {
        if server.bridge().peer_info().is_some_and(|p| p["version"] == "2") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.bridge().peer_info().unwrap()["version"], "2");
    assert!(server.bridge().is_connected());

    // Commands now route to the second editor.
    let bridge = Arc::clone(server.bridge());
    let pending = tokio::spawn(async move { bridge.get_state().await });
    let request = recv_envelope(&mut second).await;
    assert_eq!(request.kind, "getState");
    send_envelope(&mut second, "state", json!({"sceneName": "Second"})).await;
    let state = timeout(WAIT, pending).await.unwrap().unwrap().unwrap();
    assert_eq!(state["sceneName"], "Second");
}
