//! Wire-format envelope matching the editor WebSocket protocol.
//!
//! Every text frame carries exactly one envelope. The payload is an opaque
//! JSON tree to the routing layer; only the handler registered for a kind
//! deserializes it into something concrete.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Message kind constants.
///
/// Request kinds map to reply kinds via [`reply_kind`]; `log` is
/// fire-and-forget and has no reply.
pub mod kinds {
    /// Handshake announcement sent by the editor after connecting.
    pub const HELLO: &str = "hello";
    /// Advisory handshake acknowledgement from the tool server.
    pub const WELCOME: &str = "welcome";
    /// Heartbeat probe (editor-originated).
    pub const PING: &str = "ping";
    /// Heartbeat answer.
    pub const PONG: &str = "pong";
    /// Run a command inside the editor.
    pub const EXECUTE_COMMAND: &str = "executeCommand";
    /// Reply to [`EXECUTE_COMMAND`].
    pub const COMMAND_RESULT: &str = "commandResult";
    /// Query the editor's current state.
    pub const GET_STATE: &str = "getState";
    /// Reply to [`GET_STATE`].
    pub const STATE: &str = "state";
    /// Query details of a named scene object.
    pub const GET_OBJECT_DETAILS: &str = "getObjectDetails";
    /// Reply to [`GET_OBJECT_DETAILS`].
    pub const OBJECT_DETAILS: &str = "objectDetails";
    /// Capture the current frame.
    pub const TAKE_SCREENSHOT: &str = "takeScreenshot";
    /// Reply to [`TAKE_SCREENSHOT`].
    pub const SCREENSHOT: &str = "screenshot";
    /// Edit the scene graph.
    pub const MANIPULATE_SCENE: &str = "manipulateScene";
    /// Reply to [`MANIPULATE_SCENE`].
    pub const SCENE_MANIPULATION_RESULT: &str = "sceneManipulationResult";
    /// Query or instantiate assets.
    pub const MANAGE_ASSETS: &str = "manageAssets";
    /// Reply to [`MANAGE_ASSETS`].
    pub const ASSET_MANAGEMENT_RESULT: &str = "assetManagementResult";
    /// Forwarded host log record (fire-and-forget).
    pub const LOG: &str = "log";
}

/// Map a request kind to the reply kind its caller waits for.
///
/// Returns `None` for fire-and-forget kinds (`log`, heartbeats) and for
/// kinds that are themselves replies.
#[must_use]
pub fn reply_kind(kind: &str) -> Option<&'static str> {
    match kind {
        kinds::EXECUTE_COMMAND => Some(kinds::COMMAND_RESULT),
        kinds::GET_STATE => Some(kinds::STATE),
        kinds::GET_OBJECT_DETAILS => Some(kinds::OBJECT_DETAILS),
        kinds::TAKE_SCREENSHOT => Some(kinds::SCREENSHOT),
        kinds::MANIPULATE_SCENE => Some(kinds::SCENE_MANIPULATION_RESULT),
        kinds::MANAGE_ASSETS => Some(kinds::ASSET_MANAGEMENT_RESULT),
        _ => None,
    }
}

/// The `{kind, payload}` unit exchanged over the connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind (see [`kinds`]).
    pub kind: String,
    /// Opaque payload tree; deserialized only by the kind's handler.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope from a kind and payload.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Build a reply envelope whose payload is the wire-level error case.
    pub fn error_reply(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind, json!({ "error": message.into() }))
    }

    /// The `error` field of the payload, if the payload carries one.
    #[must_use]
    pub fn payload_error(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }

    /// Serialize to the single-frame wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode one complete text frame into an envelope.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// `hello` payload announcing the connecting editor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    /// Editor-side crate version.
    pub version: String,
    /// Host platform triple or OS name.
    pub platform: String,
    /// ISO-8601 send time.
    pub timestamp: String,
}

impl HelloPayload {
    /// Build a hello for this process, stamped now.
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            platform: std::env::consts::OS.to_owned(),
            timestamp: now_rfc3339(),
        }
    }
}

/// `welcome` payload (advisory acknowledgement).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    /// Tool-server crate version.
    pub version: String,
    /// ISO-8601 send time.
    pub timestamp: String,
}

impl WelcomePayload {
    /// Build a welcome for this process, stamped now.
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            timestamp: now_rfc3339(),
        }
    }
}

/// `ping`/`pong` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    /// ISO-8601 send time.
    pub timestamp: String,
}

impl HeartbeatPayload {
    /// Build a heartbeat payload stamped now.
    #[must_use]
    pub fn current() -> Self {
        Self {
            timestamp: now_rfc3339(),
        }
    }
}

/// Current UTC time in RFC 3339 with millisecond precision.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::new(kinds::GET_STATE, json!({}));
        let raw = env.to_json().unwrap();
        let back = Envelope::from_json(&raw).unwrap();
        assert_eq!(back.kind, "getState");
        assert!(back.payload.is_object());
    }

    #[test]
    fn envelope_missing_payload_defaults_to_null() {
        let back = Envelope::from_json(r#"{"kind":"pong"}"#).unwrap();
        assert_eq!(back.kind, "pong");
        assert!(back.payload.is_null());
    }

    #[test]
    fn envelope_rejects_non_envelope_json() {
        assert!(Envelope::from_json("[1,2,3]").is_err());
        assert!(Envelope::from_json("not json").is_err());
    }

    #[test]
    fn error_reply_carries_error_field() {
        let env = Envelope::error_reply(kinds::COMMAND_RESULT, "boom");
        assert_eq!(env.payload_error(), Some("boom"));
    }

    #[test]
    fn payload_error_absent_on_success_payload() {
        let env = Envelope::new(kinds::STATE, json!({"sceneName": "Main"}));
        assert!(env.payload_error().is_none());
    }

    #[test]
    fn payload_error_requires_string() {
        let env = Envelope::new(kinds::STATE, json!({"error": 42}));
        assert!(env.payload_error().is_none());
    }

    #[test]
    fn reply_kind_table() {
        assert_eq!(reply_kind(kinds::EXECUTE_COMMAND), Some(kinds::COMMAND_RESULT));
        assert_eq!(reply_kind(kinds::GET_STATE), Some(kinds::STATE));
        assert_eq!(
            reply_kind(kinds::GET_OBJECT_DETAILS),
            Some(kinds::OBJECT_DETAILS)
        );
        assert_eq!(reply_kind(kinds::TAKE_SCREENSHOT), Some(kinds::SCREENSHOT));
        assert_eq!(
            reply_kind(kinds::MANIPULATE_SCENE),
            Some(kinds::SCENE_MANIPULATION_RESULT)
        );
        assert_eq!(
            reply_kind(kinds::MANAGE_ASSETS),
            Some(kinds::ASSET_MANAGEMENT_RESULT)
        );
    }

    #[test]
    fn fire_and_forget_kinds_have_no_reply() {
        assert_eq!(reply_kind(kinds::LOG), None);
        assert_eq!(reply_kind(kinds::PING), None);
        assert_eq!(reply_kind(kinds::HELLO), None);
    }

    #[test]
    fn reply_kinds_are_not_requests() {
        assert_eq!(reply_kind(kinds::COMMAND_RESULT), None);
        assert_eq!(reply_kind(kinds::STATE), None);
    }

    #[test]
    fn hello_payload_serde() {
        let hello = HelloPayload::current();
        let json = serde_json::to_value(&hello).unwrap();
        assert!(json["version"].is_string());
        assert!(json["platform"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn wire_format_fixture() {
        let raw = r#"{"kind": "manipulateScene", "payload": {"action": "create", "name": "Cube", "details": {}}}"#;
        let env = Envelope::from_json(raw).unwrap();
        assert_eq!(env.kind, "manipulateScene");
        assert_eq!(env.payload["action"], "create");
        assert_eq!(env.payload["name"], "Cube");
    }

    #[test]
    fn now_rfc3339_has_millis_and_zulu() {
        let ts = now_rfc3339();
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('.'));
    }
}
