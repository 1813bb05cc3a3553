//! Editor WebSocket session — from upgrade through disconnect.
//!
//! Frames are processed strictly in arrival order through the shared
//! router; outbound frames (welcome, pong, command requests) drain through
//! one forwarder task per session so writes never interleave.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use tether_core::ConnectionId;

use crate::bridge::ToolBridge;

/// Run one editor session until the socket closes, the session is
/// superseded, or the server shuts down.
#[instrument(skip_all, fields(connection = %connection_id))]
pub async fn run_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    bridge: Arc<ToolBridge>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<String>(bridge.config().outbound_queue);
    let cancel = CancellationToken::new();
    bridge.attach_session(connection_id.clone(), send_tx, cancel.clone());

    let session_start = std::time::Instant::now();
    counter!("bridge_sessions_total").increment(1);
    gauge!("bridge_editor_connected").set(1.0);

    // Outbound forwarder: the single writer for this socket.
    let outbound_cancel = cancel.clone();
    let outbound = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = outbound_cancel.cancelled() => return,
                frame = send_rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    });

    let router = bridge.router();
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("session superseded");
                break;
            }
            () = shutdown.cancelled() => {
                info!("server shutting down; closing session");
                break;
            }
            message = ws_rx.next() => {
                let Some(Ok(message)) = message else {
                    info!("editor socket closed");
                    break;
                };
                match message {
                    Message::Text(ref text) => router.on_frame(text.as_str()).await,
                    Message::Binary(ref data) => match std::str::from_utf8(data) {
                        Ok(text) => router.on_frame(text).await,
                        Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
                    },
                    Message::Close(_) => {
                        info!("editor sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    }

    outbound.abort();
    bridge.detach_session(&connection_id);
    gauge!("bridge_editor_connected").set(if bridge.is_connected() { 1.0 } else { 0.0 });
    histogram!("bridge_session_duration_seconds").record(session_start.elapsed().as_secs_f64());
}
