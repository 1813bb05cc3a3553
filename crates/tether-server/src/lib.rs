//! # tether-server
//!
//! The tool-server (accepting) side of the bridge:
//!
//! - **TetherServer**: Axum router with the `/health` side channel and the
//!   `/bridge` WebSocket endpoint
//! - **ToolBridge**: one-editor-at-a-time bridge state plus the validated
//!   async command API external callers use
//! - **Session**: per-connection receive/forward loops; a reconnecting
//!   editor supersedes its stale session
//! - **ShutdownCoordinator**: cancellation fan-out with bounded drain

#![deny(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod server;
pub mod session;
pub mod shutdown;

pub use bridge::ToolBridge;
pub use config::ServerConfig;
pub use server::TetherServer;
pub use shutdown::ShutdownCoordinator;
