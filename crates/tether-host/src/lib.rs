//! # tether-host
//!
//! The editor-side half of the bridge:
//!
//! - **MainThreadDispatch**: the single privileged consumer loop behind
//!   `PrivilegedDispatch`
//! - **EditorModel**: the in-memory scene graph, asset catalog, and play
//!   state the command handlers operate on
//! - **Handlers**: one envelope handler per command kind, each marshaling
//!   its work onto the privileged context
//! - **RelayLayer**: a `tracing` layer mirroring host log events over the
//!   bridge
//! - **HostBridge**: the composition root the editor embeds

#![deny(unsafe_code)]

pub mod dispatch;
pub mod editor;
pub mod handlers;
pub mod host;
pub mod log_hook;

pub use dispatch::MainThreadDispatch;
pub use editor::{Asset, EditorModel, PlayState, SceneObject};
pub use host::HostBridge;
pub use log_hook::RelayLayer;
