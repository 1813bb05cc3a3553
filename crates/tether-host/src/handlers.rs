//! Command handlers bridging inbound envelopes to the editor model.
//!
//! Each handler validates its payload and enqueues a closure on the
//! privileged context before returning, so frame dispatch stays in arrival
//! order while the editor does the real work. The closure itself enqueues
//! the reply onto the router's serialized write channel — replies reach
//! the wire in execution order, which the FIFO reply correlation on the
//! other end depends on. Handler failures become `{error}` replies; the
//! connection stays up.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::warn;

use tether_bridge::dispatch::PrivilegedDispatch;
use tether_bridge::router::{EnvelopeHandler, MessageRouter, Routed, SendOutcome};
use tether_core::envelope::kinds;
use tether_core::{BridgeError, Envelope, Result};

use crate::editor::EditorModel;

/// Shared context handed to every command handler.
#[derive(Clone)]
pub struct HandlerContext {
    dispatch: Arc<dyn PrivilegedDispatch>,
    router: Arc<MessageRouter>,
    editor: Arc<Mutex<EditorModel>>,
}

impl HandlerContext {
    /// Bundle the privileged dispatcher, router, and editor model.
    #[must_use]
    pub fn new(
        dispatch: Arc<dyn PrivilegedDispatch>,
        router: Arc<MessageRouter>,
        editor: Arc<Mutex<EditorModel>>,
    ) -> Self {
        Self {
            dispatch,
            router,
            editor,
        }
    }

    /// Enqueue editor work now; the reply is sent from the privileged
    /// consumer when the work completes.
    ///
    /// The editor lock is only ever taken inside the submitted closure, so
    /// the single privileged consumer is what serializes model access.
    fn run<F>(&self, reply: &'static str, work: F) -> Routed
    where
        F: FnOnce(&mut EditorModel) -> std::result::Result<Value, String> + Send + 'static,
    {
        let editor = Arc::clone(&self.editor);
        let router = Arc::clone(&self.router);
        drop(self.dispatch.submit(Box::new(move || {
            let outcome = work(&mut editor.lock());
            let envelope = match &outcome {
                Ok(value) => Envelope::new(reply, value.clone()),
                Err(message) => Envelope::error_reply(reply, message.clone()),
            };
            if router.try_send(&envelope) != SendOutcome::Sent {
                warn!(kind = reply, "connection dropped before the reply was sent");
            }
            outcome
        })));
        Routed::None
    }
}

fn required_str(payload: &Value, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| BridgeError::protocol(format!("'{key}' string required")))
}

/// `executeCommand {code}` → `commandResult`.
pub struct ExecuteCommandHandler(pub HandlerContext);

#[async_trait]
impl EnvelopeHandler for ExecuteCommandHandler {
    async fn handle(&self, payload: Value) -> Result<Routed> {
        let code = required_str(&payload, "code")?;
        Ok(self
            .0
            .run(kinds::COMMAND_RESULT, move |editor| editor.execute(&code)))
    }
}

/// `getState {}` → `state`.
pub struct GetStateHandler(pub HandlerContext);

#[async_trait]
impl EnvelopeHandler for GetStateHandler {
    async fn handle(&self, _payload: Value) -> Result<Routed> {
        Ok(self.0.run(kinds::STATE, |editor| Ok(editor.state())))
    }
}

/// `getObjectDetails {objectName}` → `objectDetails`.
pub struct ObjectDetailsHandler(pub HandlerContext);

#[async_trait]
impl EnvelopeHandler for ObjectDetailsHandler {
    async fn handle(&self, payload: Value) -> Result<Routed> {
        let name = required_str(&payload, "objectName")?;
        Ok(self.0.run(kinds::OBJECT_DETAILS, move |editor| {
            editor.object_details(&name)
        }))
    }
}

/// `takeScreenshot {}` → `screenshot`.
pub struct ScreenshotHandler(pub HandlerContext);

#[async_trait]
impl EnvelopeHandler for ScreenshotHandler {
    async fn handle(&self, _payload: Value) -> Result<Routed> {
        Ok(self
            .0
            .run(kinds::SCREENSHOT, |editor| Ok(editor.screenshot())))
    }
}

/// `manipulateScene {action, name, details}` → `sceneManipulationResult`.
pub struct ManipulateSceneHandler(pub HandlerContext);

#[async_trait]
impl EnvelopeHandler for ManipulateSceneHandler {
    async fn handle(&self, payload: Value) -> Result<Routed> {
        let action = required_str(&payload, "action")?;
        let name = required_str(&payload, "name")?;
        let details = payload.get("details").cloned().unwrap_or_else(|| json!({}));
        Ok(self.0.run(kinds::SCENE_MANIPULATION_RESULT, move |editor| {
            editor.manipulate(&action, &name, &details)
        }))
    }
}

/// `manageAssets {action, filter}` → `assetManagementResult`.
pub struct ManageAssetsHandler(pub HandlerContext);

#[async_trait]
impl EnvelopeHandler for ManageAssetsHandler {
    async fn handle(&self, payload: Value) -> Result<Routed> {
        let action = required_str(&payload, "action")?;
        let filter = payload
            .get("filter")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        Ok(self.0.run(kinds::ASSET_MANAGEMENT_RESULT, move |editor| {
            editor.manage_assets(&action, &filter)
        }))
    }
}

/// Register every command handler on the router.
pub fn register_all(
    router: &Arc<MessageRouter>,
    dispatch: Arc<dyn PrivilegedDispatch>,
    editor: Arc<Mutex<EditorModel>>,
) {
    let ctx = HandlerContext::new(dispatch, Arc::clone(router), editor);
    router.register(kinds::EXECUTE_COMMAND, ExecuteCommandHandler(ctx.clone()));
    router.register(kinds::GET_STATE, GetStateHandler(ctx.clone()));
    router.register(kinds::GET_OBJECT_DETAILS, ObjectDetailsHandler(ctx.clone()));
    router.register(kinds::TAKE_SCREENSHOT, ScreenshotHandler(ctx.clone()));
    router.register(kinds::MANIPULATE_SCENE, ManipulateSceneHandler(ctx.clone()));
    router.register(kinds::MANAGE_ASSETS, ManageAssetsHandler(ctx));
}
