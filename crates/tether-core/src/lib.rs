//! # tether-core
//!
//! Foundation types shared by both ends of the tether bridge:
//!
//! - **Envelope**: the `{kind, payload}` unit exchanged over the connection,
//!   plus the request→reply kind table
//! - **Errors**: `BridgeError` hierarchy via `thiserror`, with the wire-level
//!   `{error}` body as the serialization of the failure case
//! - **Health**: the side-channel `/health` status body
//! - **Logs**: `LogRecord`, the bounded ring buffer, and the query model
//! - **Ids**: `ConnectionId` newtype (UUID v7)

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod health;
pub mod ids;
pub mod logs;

pub use envelope::Envelope;
pub use errors::{BridgeError, GateFailure, Result};
pub use health::HealthStatus;
pub use ids::ConnectionId;
pub use logs::{LogBuffer, LogQuery, LogRecord, LogSeverity};
