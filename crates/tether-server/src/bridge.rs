//! Accepting-side bridge state and the caller-facing command API.
//!
//! One editor connection is live at a time. Arbitrary concurrent external
//! callers go through the async operations here; each validates its
//! arguments first and surfaces "peer not connected" as an immediate error
//! without touching the correlator. Replies are matched FIFO per kind by
//! the shared [`RequestCorrelator`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tether_bridge::router::{EnvelopeHandler, MessageRouter, Routed};
use tether_bridge::{LogRelay, RequestCorrelator};
use tether_core::envelope::{kinds, HeartbeatPayload, WelcomePayload};
use tether_core::logs::LogQuery;
use tether_core::{BridgeError, ConnectionId, Envelope, Result};

use crate::config::ServerConfig;

/// Handle to the currently attached editor connection.
struct AttachedSession {
    id: ConnectionId,
    cancel: CancellationToken,
    peer: Option<Value>,
}

/// Shared bridge state on the tool-server side.
pub struct ToolBridge {
    config: ServerConfig,
    router: Arc<MessageRouter>,
    correlator: Arc<RequestCorrelator>,
    relay: Arc<LogRelay>,
    session: Mutex<Option<AttachedSession>>,
}

impl ToolBridge {
    /// Build the bridge and register its protocol handlers.
    #[must_use]
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let router = Arc::new(MessageRouter::new());
        let correlator = Arc::new(RequestCorrelator::new(Arc::clone(&router)));
        RequestCorrelator::attach(&correlator, &router);
        let relay = Arc::new(LogRelay::new(Arc::clone(&router), config.log_capacity));
        LogRelay::attach_ingest(&relay, &router);

        let bridge = Arc::new(Self {
            config,
            router,
            correlator,
            relay,
            session: Mutex::new(None),
        });
        bridge.router.register(
            kinds::HELLO,
            HelloHandler {
                bridge: Arc::clone(&bridge),
            },
        );
        bridge.router.register(kinds::PING, PingHandler);
        bridge
    }

    /// The shared router.
    #[must_use]
    pub fn router(&self) -> Arc<MessageRouter> {
        Arc::clone(&self.router)
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether an editor is currently attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    /// The attached editor's hello payload, if one announced itself.
    #[must_use]
    pub fn peer_info(&self) -> Option<Value> {
        self.session.lock().as_ref().and_then(|s| s.peer.clone())
    }

    /// Attach a new editor connection, superseding any previous one.
    ///
    /// The stale connection's tasks are cancelled and its pending waiters
    /// rejected, so an editor restart reconnects without waiting for the
    /// old half-open socket to expire.
    pub(crate) fn attach_session(
        &self,
        id: ConnectionId,
        outbound: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) {
        let previous = self.session.lock().replace(AttachedSession {
            id: id.clone(),
            cancel,
            peer: None,
        });
        if let Some(previous) = previous {
            warn!(
                old = %previous.id,
                new = %id,
                "editor reconnected; superseding previous session"
            );
            previous.cancel.cancel();
            self.correlator.fail_all(&BridgeError::ConnectionLost);
        }
        self.router.bind_outbound(outbound);
        info!(connection = %id, "editor attached");
    }

    /// Detach an editor connection after its receive loop ends.
    ///
    /// A superseded session finds a different id and leaves the new
    /// session's state alone.
    pub(crate) fn detach_session(&self, id: &ConnectionId) {
        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|s| &s.id == id) {
            *session = None;
            drop(session);
            self.router.unbind_outbound();
            self.correlator.fail_all(&BridgeError::ConnectionLost);
            info!(connection = %id, "editor detached");
        }
    }

    fn record_hello(&self, payload: Value) {
        if let Some(session) = self.session.lock().as_mut() {
            session.peer = Some(payload);
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BridgeError::NotConnected)
        }
    }

    async fn issue(&self, kind: &str, payload: Value) -> Result<Value> {
        self.ensure_connected()?;
        self.correlator
            .issue(kind, payload, self.config.reply_timeout_for(kind))
            .await
    }

    // ─── Caller-facing command operations ────────────────────────────────

    /// Run a command string inside the editor.
    pub async fn execute_command(&self, code: &str) -> Result<Value> {
        if code.trim().is_empty() {
            return Err(BridgeError::protocol("'code' must not be empty"));
        }
        self.issue(kinds::EXECUTE_COMMAND, json!({ "code": code })).await
    }

    /// Fetch the editor's current state summary.
    pub async fn get_state(&self) -> Result<Value> {
        self.issue(kinds::GET_STATE, json!({})).await
    }

    /// Fetch details of a named scene object.
    pub async fn get_object_details(&self, object_name: &str) -> Result<Value> {
        if object_name.trim().is_empty() {
            return Err(BridgeError::protocol("'objectName' must not be empty"));
        }
        self.issue(kinds::GET_OBJECT_DETAILS, json!({ "objectName": object_name }))
            .await
    }

    /// Capture the editor's current frame.
    pub async fn take_screenshot(&self) -> Result<Value> {
        self.issue(kinds::TAKE_SCREENSHOT, json!({})).await
    }

    /// Apply a scene-graph edit.
    pub async fn manipulate_scene(
        &self,
        action: &str,
        name: &str,
        details: Value,
    ) -> Result<Value> {
        if action.trim().is_empty() {
            return Err(BridgeError::protocol("'action' must not be empty"));
        }
        if name.trim().is_empty() {
            return Err(BridgeError::protocol("'name' must not be empty"));
        }
        self.issue(
            kinds::MANIPULATE_SCENE,
            json!({ "action": action, "name": name, "details": details }),
        )
        .await
    }

    /// Query or instantiate assets.
    pub async fn manage_assets(&self, action: &str, filter: &str) -> Result<Value> {
        if action.trim().is_empty() {
            return Err(BridgeError::protocol("'action' must not be empty"));
        }
        self.issue(kinds::MANAGE_ASSETS, json!({ "action": action, "filter": filter }))
            .await
    }

    /// Query the relayed editor logs; purely local, needs no connection.
    #[must_use]
    pub fn get_logs(&self, query: &LogQuery) -> Vec<Value> {
        self.relay.get_logs(query)
    }

    /// Number of buffered editor log records.
    #[must_use]
    pub fn log_count(&self) -> usize {
        self.relay.len()
    }
}

/// Answers `hello` with an advisory `welcome` and records the peer.
struct HelloHandler {
    bridge: Arc<ToolBridge>,
}

#[async_trait]
impl EnvelopeHandler for HelloHandler {
    async fn handle(&self, payload: Value) -> Result<Routed> {
        info!(
            version = payload.get("version").and_then(|v| v.as_str()).unwrap_or("unknown"),
            platform = payload.get("platform").and_then(|v| v.as_str()).unwrap_or("unknown"),
            "editor hello"
        );
        self.bridge.record_hello(payload);
        let welcome = serde_json::to_value(WelcomePayload::current()).unwrap_or(Value::Null);
        Ok(Routed::Reply(Envelope::new(kinds::WELCOME, welcome)))
    }
}

/// Answers `ping` with `pong`; the accepting side never originates pings.
struct PingHandler;

#[async_trait]
impl EnvelopeHandler for PingHandler {
    async fn handle(&self, _payload: Value) -> Result<Routed> {
        let pong = serde_json::to_value(HeartbeatPayload::current()).unwrap_or(Value::Null);
        Ok(Routed::Reply(Envelope::new(kinds::PONG, pong)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn attached_bridge() -> (Arc<ToolBridge>, mpsc::Receiver<String>) {
        let bridge = ToolBridge::new(ServerConfig::default());
        let (tx, rx) = mpsc::channel(32);
        bridge.attach_session(ConnectionId::new(), tx, CancellationToken::new());
        (bridge, rx)
    }

    #[tokio::test]
    async fn commands_fail_fast_while_disconnected() {
        let bridge = ToolBridge::new(ServerConfig::default());
        assert!(!bridge.is_connected());
        assert_matches!(bridge.get_state().await, Err(BridgeError::NotConnected));
        assert_matches!(
            bridge.execute_command("play").await,
            Err(BridgeError::NotConnected)
        );
    }

    #[tokio::test]
    async fn argument_validation_precedes_the_correlator() {
        let (bridge, _rx) = attached_bridge();
        assert_matches!(
            bridge.execute_command("   ").await,
            Err(BridgeError::Protocol { .. })
        );
        assert_matches!(
            bridge.get_object_details("").await,
            Err(BridgeError::Protocol { .. })
        );
        assert_matches!(
            bridge.manipulate_scene("", "Cube", json!({})).await,
            Err(BridgeError::Protocol { .. })
        );
        assert_matches!(
            bridge.manage_assets("", "").await,
            Err(BridgeError::Protocol { .. })
        );
    }

    #[tokio::test]
    async fn issued_commands_reach_the_wire_and_resolve() {
        let (bridge, mut rx) = attached_bridge();
        let issued = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.get_state().await })
        };

        let frame = rx.recv().await.unwrap();
        let request = Envelope::from_json(&frame).unwrap();
        assert_eq!(request.kind, "getState");

        bridge
            .router()
            .on_frame(r#"{"kind":"state","payload":{"sceneName":"Main"}}"#)
            .await;
        let state = issued.await.unwrap().unwrap();
        assert_eq!(state["sceneName"], "Main");
    }

    #[tokio::test]
    async fn hello_is_answered_with_welcome_and_recorded() {
        let (bridge, mut rx) = attached_bridge();
        bridge
            .router()
            .on_frame(r#"{"kind":"hello","payload":{"version":"0.1.0","platform":"linux","timestamp":"t"}}"#)
            .await;

        let frame = rx.recv().await.unwrap();
        let welcome = Envelope::from_json(&frame).unwrap();
        assert_eq!(welcome.kind, "welcome");
        assert_eq!(bridge.peer_info().unwrap()["platform"], "linux");
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (bridge, mut rx) = attached_bridge();
        bridge
            .router()
            .on_frame(r#"{"kind":"ping","payload":{"timestamp":"t"}}"#)
            .await;

        let frame = rx.recv().await.unwrap();
        assert_eq!(Envelope::from_json(&frame).unwrap().kind, "pong");
    }

    #[tokio::test]
    async fn new_session_supersedes_the_old_and_rejects_its_waiters() {
        let (bridge, _old_rx) = attached_bridge();
        let old_cancelled = {
            let session = bridge.session.lock();
            session.as_ref().unwrap().cancel.clone()
        };

        let pending = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.get_state().await })
        };
        tokio::task::yield_now().await;

        let (new_tx, _new_rx) = mpsc::channel(32);
        bridge.attach_session(ConnectionId::new(), new_tx, CancellationToken::new());

        assert!(old_cancelled.is_cancelled());
        assert_matches!(
            pending.await.unwrap(),
            Err(BridgeError::ConnectionLost)
        );
        assert!(bridge.is_connected());
    }

    #[tokio::test]
    async fn detach_of_a_superseded_session_leaves_the_new_one_attached() {
        let (bridge, _rx) = attached_bridge();
        let old_id = bridge.session.lock().as_ref().unwrap().id.clone();

        let (new_tx, _new_rx) = mpsc::channel(32);
        let new_id = ConnectionId::new();
        bridge.attach_session(new_id.clone(), new_tx, CancellationToken::new());

        // The superseded session's loop winds down and detaches late.
        bridge.detach_session(&old_id);
        assert!(bridge.is_connected());

        bridge.detach_session(&new_id);
        assert!(!bridge.is_connected());
    }

    #[tokio::test]
    async fn detach_rejects_outstanding_waiters() {
        let (bridge, mut rx) = attached_bridge();
        let id = bridge.session.lock().as_ref().unwrap().id.clone();

        let pending = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.take_screenshot().await })
        };
        let _ = rx.recv().await.unwrap();

        bridge.detach_session(&id);
        assert_matches!(pending.await.unwrap(), Err(BridgeError::ConnectionLost));
    }

    #[tokio::test]
    async fn logs_are_queryable_without_a_connection() {
        let bridge = ToolBridge::new(ServerConfig::default());
        bridge
            .router()
            .on_frame(r#"{"kind":"log","payload":{"message":"NullReference in Spawner","severity":"error","timestamp":"2026-08-01T10:00:00Z"}}"#)
            .await;

        let results = bridge.get_logs(&LogQuery {
            text: Some("Spawner".into()),
            ..LogQuery::default()
        });
        assert_eq!(results.len(), 1);
        assert_eq!(bridge.log_count(), 1);
    }
}
