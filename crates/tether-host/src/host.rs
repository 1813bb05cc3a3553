//! Editor-side composition root.
//!
//! Builds the supervisor, router, relay, privileged dispatch loop, and
//! command handlers into one `HostBridge` the editor embeds. The editor's
//! scheduling loop drives `tick()` on a fixed cadence; `run()` is a
//! convenience loop for hosts that can hand over a task instead.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tether_bridge::{
    BridgeConfig, ConnectionState, ConnectionSupervisor, LogRelay, MessageRouter,
    RequestCorrelator,
};

use crate::dispatch::MainThreadDispatch;
use crate::editor::EditorModel;
use crate::handlers;
use crate::log_hook::RelayLayer;

/// The bridge as embedded in the editor process.
pub struct HostBridge {
    supervisor: ConnectionSupervisor,
    router: Arc<MessageRouter>,
    relay: Arc<LogRelay>,
    editor: Arc<Mutex<EditorModel>>,
    tick_interval: Duration,
}

impl HostBridge {
    /// Default cadence for the embedded `run()` loop.
    pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

    /// Assemble the bridge around a fresh editor model.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_editor(config, EditorModel::new("Untitled"))
    }

    /// Assemble the bridge around an existing editor model.
    #[must_use]
    pub fn with_editor(config: BridgeConfig, editor: EditorModel) -> Self {
        let router = Arc::new(MessageRouter::new());
        let correlator = Arc::new(RequestCorrelator::new(Arc::clone(&router)));
        let relay = Arc::new(LogRelay::new(Arc::clone(&router), config.log_capacity));
        let editor = Arc::new(Mutex::new(editor));

        let (dispatch, _consumer) = MainThreadDispatch::start();
        handlers::register_all(&router, Arc::new(dispatch), Arc::clone(&editor));

        let supervisor = ConnectionSupervisor::new(config, Arc::clone(&router), correlator);
        supervisor.guard_relay(&relay);

        Self {
            supervisor,
            router,
            relay,
            editor,
            tick_interval: Self::DEFAULT_TICK,
        }
    }

    /// Tracing layer mirroring host log events over the bridge.
    #[must_use]
    pub fn log_layer(&self) -> RelayLayer {
        RelayLayer::new(Arc::clone(&self.relay))
    }

    /// The editor model (mutate only through privileged work in handlers;
    /// direct access is for host-side setup such as seeding assets).
    #[must_use]
    pub fn editor(&self) -> Arc<Mutex<EditorModel>> {
        Arc::clone(&self.editor)
    }

    /// The shared router.
    #[must_use]
    pub fn router(&self) -> Arc<MessageRouter> {
        Arc::clone(&self.router)
    }

    /// The log relay.
    #[must_use]
    pub fn relay(&self) -> Arc<LogRelay> {
        Arc::clone(&self.relay)
    }

    /// Whether the bridge is usable for commands.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.supervisor.is_usable()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Attempt to connect now (idempotent while an attempt is in flight).
    pub async fn connect(&self) -> tether_core::Result<()> {
        self.supervisor.connect().await
    }

    /// Tear the connection down and reject everything pending.
    pub fn disconnect(&self, reason: &str) {
        self.supervisor.disconnect(reason);
    }

    /// One scheduling-loop tick: reconnects and heartbeats.
    pub async fn tick(&self) {
        self.supervisor.tick().await;
    }

    /// Drive ticks on a fixed cadence until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        info!(
            every_ms = u64::try_from(self.tick_interval.as_millis()).unwrap_or(u64::MAX),
            "host bridge loop started"
        );
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.disconnect("host shutting down");
                    return;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }
}
