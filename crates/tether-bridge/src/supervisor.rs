//! Connection lifecycle supervisor for the initiating (editor) side.
//!
//! Owns the physical connection and the state machine:
//!
//! ```text
//! Idle --connect(gate pass)--> HealthChecking -> Connecting -> Handshaking
//!      --hello sent--> Open --timeout/error/close--> Failed --cleanup--> Idle
//! ```
//!
//! `connect()` is a guarded no-op from any in-flight or open state, checked
//! and set under the state lock before the first suspending operation, so
//! concurrent callers can never open two sockets. Teardown is abortive: the
//! reader/writer tasks are cancelled, further sends fail fast, and every
//! pending request is rejected with a connection-lost error. Work already
//! submitted to the privileged context is not cancelled.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::correlator::RequestCorrelator;
use crate::heartbeat::HeartbeatTracker;
use crate::relay::LogRelay;
use crate::router::{EnvelopeHandler, MessageRouter, Routed};
use crate::state::ConnectionState;
use async_trait::async_trait;
use serde_json::Value;
use tether_core::envelope::{kinds, HeartbeatPayload, HelloPayload};
use tether_core::{BridgeError, ConnectionId, Envelope, GateFailure, HealthStatus, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle to the tasks of one live connection instance.
struct ActiveConnection {
    id: ConnectionId,
    cancel: CancellationToken,
}

/// Establishes, maintains, and tears down the logical connection.
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    config: BridgeConfig,
    router: Arc<MessageRouter>,
    correlator: Arc<RequestCorrelator>,
    state: Mutex<ConnectionState>,
    heartbeat: Mutex<HeartbeatTracker>,
    last_attempt: Mutex<Option<Instant>>,
    last_gate_failure: Mutex<Option<GateFailure>>,
    active: Mutex<Option<ActiveConnection>>,
    http: reqwest::Client,
}

impl ConnectionSupervisor {
    /// Create a supervisor over the shared router and correlator.
    #[must_use]
    pub fn new(
        config: BridgeConfig,
        router: Arc<MessageRouter>,
        correlator: Arc<RequestCorrelator>,
    ) -> Self {
        let now = Instant::now();
        let heartbeat = HeartbeatTracker::new(
            config.heartbeat_interval(),
            config.heartbeat_timeout(),
            now,
        );
        let inner = Arc::new(SupervisorInner {
            config,
            router,
            correlator,
            state: Mutex::new(ConnectionState::Idle),
            heartbeat: Mutex::new(heartbeat),
            last_attempt: Mutex::new(None),
            last_gate_failure: Mutex::new(None),
            active: Mutex::new(None),
            http: reqwest::Client::new(),
        });
        let supervisor = Self { inner };
        supervisor.attach_handlers();
        supervisor
    }

    /// Register lifecycle handlers (`pong`, `welcome`) on the router.
    fn attach_handlers(&self) {
        self.inner.router.register(
            kinds::PONG,
            PongHandler {
                inner: Arc::clone(&self.inner),
            },
        );
        self.inner.router.register(kinds::WELCOME, WelcomeHandler);
    }

    /// Wire a relay so a log-forwarding failure forces a disconnect.
    pub fn guard_relay(&self, relay: &LogRelay) {
        let inner = Arc::clone(&self.inner);
        relay.set_forward_failure_hook(Box::new(move || {
            inner.fail_connection("log forward failed");
        }));
    }

    /// Whether the connection is usable for commands.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.inner.state.lock().is_usable() && self.inner.active.lock().is_some()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// The most recent health-gate failure, if the last attempt was gated.
    #[must_use]
    pub fn last_gate_failure(&self) -> Option<GateFailure> {
        self.inner.last_gate_failure.lock().clone()
    }

    /// Id of the live connection instance, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.inner.active.lock().as_ref().map(|a| a.id.clone())
    }

    /// Establish the connection; a guarded no-op while one is in flight
    /// or open.
    pub async fn connect(&self) -> Result<()> {
        if !self.inner.begin_attempt() {
            return Ok(());
        }
        *self.inner.last_attempt.lock() = Some(Instant::now());
        counter!("bridge_connect_attempts_total").increment(1);

        match establish(&self.inner).await {
            Ok(()) => {
                *self.inner.last_gate_failure.lock() = None;
                Ok(())
            }
            Err(e) => {
                *self.inner.state.lock() = ConnectionState::Idle;
                if let BridgeError::Gate(gate) = &e {
                    *self.inner.last_gate_failure.lock() = Some(gate.clone());
                }
                debug!(error = %e, "connect attempt failed");
                Err(e)
            }
        }
    }

    /// Abort the connection immediately and reject all pending requests.
    pub fn disconnect(&self, reason: &str) {
        self.inner.fail_connection(reason);
    }

    /// Drive reconnection and heartbeats; called on a fixed cadence by the
    /// host's scheduling loop.
    pub async fn tick(&self) {
        let now = Instant::now();
        if self.is_usable() {
            if self.inner.heartbeat.lock().is_expired(now) {
                self.inner.fail_connection("heartbeat timeout");
                return;
            }
            let ping_due = {
                let mut heartbeat = self.inner.heartbeat.lock();
                if heartbeat.should_ping(now) {
                    heartbeat.mark_ping_sent(now);
                    true
                } else {
                    false
                }
            };
            if ping_due {
                let payload = serde_json::to_value(HeartbeatPayload::current())
                    .unwrap_or(Value::Null);
                if let Err(e) = self.inner.router.send(kinds::PING, payload) {
                    self.inner.fail_connection(&format!("ping send failed: {e}"));
                }
            }
        } else {
            let attempt_due = match *self.inner.last_attempt.lock() {
                None => true,
                Some(at) => now.duration_since(at) >= self.inner.config.reconnect_interval(),
            };
            if attempt_due {
                let _ = self.connect().await;
            }
        }
    }
}

impl SupervisorInner {
    /// Claim the right to attempt a connection.
    ///
    /// The check and the transition happen under one lock acquisition,
    /// before any suspending operation, which is the whole re-entry guard.
    fn begin_attempt(&self) -> bool {
        let mut state = self.state.lock();
        if !state.can_begin_connect() {
            return false;
        }
        *state = ConnectionState::HealthChecking;
        true
    }

    /// Out-of-band status probe against the peer's side channel.
    ///
    /// Failure kinds are distinguished so callers can tell an absent peer
    /// from a present-but-unhealthy one; none of them opens a socket.
    async fn health_gate(&self) -> Result<()> {
        let response = self
            .http
            .get(&self.config.health_url)
            .timeout(self.config.gate_timeout())
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(GateFailure::Timeout {
                    timeout_ms: self.config.gate_timeout_ms,
                }
                .into());
            }
            Err(e) => {
                return Err(GateFailure::Unreachable {
                    message: e.to_string(),
                }
                .into());
            }
        };
        if !response.status().is_success() {
            return Err(GateFailure::Unhealthy {
                status: response.status().to_string(),
            }
            .into());
        }
        let status: HealthStatus = response.json().await.map_err(|e| GateFailure::Unhealthy {
            status: format!("unparseable health body: {e}"),
        })?;
        if !status.is_ok() {
            return Err(GateFailure::Unhealthy {
                status: status.status,
            }
            .into());
        }
        Ok(())
    }

    /// Abort the live connection and reject everything pending.
    ///
    /// Idempotent: the first caller takes the active handle; later callers
    /// (the other task noticing the same failure, a tick racing a reader)
    /// find nothing to clean up.
    fn fail_connection(&self, reason: &str) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        *self.state.lock() = ConnectionState::Failed;
        warn!(connection = %active.id, reason, "bridge connection lost");
        counter!("bridge_disconnects_total").increment(1);
        gauge!("bridge_connected").set(0.0);

        active.cancel.cancel();
        self.router.unbind_outbound();
        self.correlator.fail_all(&BridgeError::ConnectionLost);
        *self.state.lock() = ConnectionState::Idle;
    }
}

/// Run one full connection attempt: gate, transport connect, hello, tasks.
async fn establish(inner: &Arc<SupervisorInner>) -> Result<()> {
    inner.health_gate().await?;

    *inner.state.lock() = ConnectionState::Connecting;
    let connect = connect_async(&inner.config.server_url);
    let (ws, _response) = tokio::time::timeout(inner.config.connect_timeout(), connect)
        .await
        .map_err(|_| BridgeError::Timeout {
            context: "transport connect".into(),
            timeout_ms: inner.config.connect_timeout_ms,
        })?
        .map_err(|e| BridgeError::transport(format!("connect failed: {e}")))?;

    *inner.state.lock() = ConnectionState::Handshaking;
    let (mut ws_tx, ws_rx) = ws.split();
    let hello = Envelope::new(
        kinds::HELLO,
        serde_json::to_value(HelloPayload::current()).unwrap_or(Value::Null),
    );
    let hello_json = hello
        .to_json()
        .map_err(|e| BridgeError::protocol(format!("hello encode: {e}")))?;
    ws_tx
        .send(Message::Text(hello_json.into()))
        .await
        .map_err(|e| BridgeError::transport(format!("hello send failed: {e}")))?;

    let id = ConnectionId::new();
    let cancel = CancellationToken::new();
    let (outbound_tx, outbound_rx) = mpsc::channel::<String>(inner.config.outbound_queue);
    inner.router.bind_outbound(outbound_tx);

    drop(tokio::spawn(run_writer(
        Arc::clone(inner),
        ws_tx,
        outbound_rx,
        cancel.clone(),
    )));
    drop(tokio::spawn(run_reader(
        Arc::clone(inner),
        ws_rx,
        cancel.clone(),
    )));

    inner.heartbeat.lock().reset(Instant::now());
    *inner.active.lock() = Some(ActiveConnection {
        id: id.clone(),
        cancel,
    });
    *inner.state.lock() = ConnectionState::Open;
    gauge!("bridge_connected").set(1.0);
    info!(connection = %id, url = %inner.config.server_url, "bridge connected");
    Ok(())
}

/// Drain the outbound queue into the socket, one frame at a time.
async fn run_writer(
    inner: Arc<SupervisorInner>,
    mut ws_tx: SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { return };
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    inner.fail_connection(&format!("send error: {e}"));
                    return;
                }
            }
        }
    }
}

/// Read frames in arrival order and dispatch each through the router.
///
/// Dispatch for a frame returns control before the next frame is read, but
/// a handler's deferred continuation never blocks this loop.
async fn run_reader(
    inner: Arc<SupervisorInner>,
    mut ws_rx: SplitStream<WsStream>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            message = ws_rx.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => inner.router.on_frame(&text).await,
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => inner.router.on_frame(text).await,
                        Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
                    },
                    Some(Ok(Message::Close(_))) => {
                        inner.fail_connection("peer closed the connection");
                        return;
                    }
                    // Transport-level ping/pong; liveness uses envelope
                    // heartbeats instead.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        inner.fail_connection(&format!("receive error: {e}"));
                        return;
                    }
                    None => {
                        inner.fail_connection("stream ended");
                        return;
                    }
                }
            }
        }
    }
}

/// Updates pong recency for the liveness detector.
struct PongHandler {
    inner: Arc<SupervisorInner>,
}

#[async_trait]
impl EnvelopeHandler for PongHandler {
    async fn handle(&self, _payload: Value) -> Result<Routed> {
        self.inner.heartbeat.lock().mark_pong(Instant::now());
        Ok(Routed::None)
    }
}

/// The `welcome` reply is advisory; consumers may already be issuing
/// commands before it arrives.
struct WelcomeHandler;

#[async_trait]
impl EnvelopeHandler for WelcomeHandler {
    async fn handle(&self, payload: Value) -> Result<Routed> {
        info!(
            server_version = payload.get("version").and_then(|v| v.as_str()).unwrap_or("unknown"),
            "received welcome"
        );
        Ok(Routed::None)
    }
}
