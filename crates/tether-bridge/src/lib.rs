//! # tether-bridge
//!
//! The bridge protocol and connection-lifecycle core shared by both peers:
//!
//! - **ConnectionSupervisor**: health-gated connect, hello handshake,
//!   heartbeat liveness, reconnect cadence, abortive teardown
//! - **MessageRouter**: one frame = one envelope, per-kind dispatch,
//!   serialized outbound writes
//! - **RequestCorrelator**: FIFO request/reply matching per reply kind with
//!   hard timeouts (the wire format carries no request ids)
//! - **LogRelay**: bounded ring of host log records with opportunistic
//!   forwarding and filtered queries
//! - **PrivilegedDispatch**: the seam through which handlers marshal work
//!   onto the editor's single privileged execution context
//!
//! Messages in flight during a disconnect are dropped and surface to their
//! callers as failures; nothing is persisted across a lost connection.

#![deny(unsafe_code)]

pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod heartbeat;
pub mod relay;
pub mod router;
pub mod state;
pub mod supervisor;

pub use config::BridgeConfig;
pub use correlator::RequestCorrelator;
pub use dispatch::{PrivilegedDispatch, PrivilegedJob, PrivilegedResult};
pub use relay::LogRelay;
pub use router::{EnvelopeHandler, MessageRouter, Routed, SendOutcome};
pub use state::ConnectionState;
pub use supervisor::ConnectionSupervisor;
