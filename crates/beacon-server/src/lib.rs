//! # beacon-server
//!
//! Live push delivery to client sessions over `WebSocket` or SSE.
//!
//! - [`registry`]: one active connection per session, last writer wins
//! - [`dispatcher`]: unicast and encode-once broadcast with failure isolation
//! - [`monitor`]: periodic liveness probing and eviction of dead connections
//! - [`transport`]: `WebSocket` and SSE adapters behind [`connection::PushConnection`]
//! - [`server`]: axum router, listener lifecycle and graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::ServerConfig;
pub use connection::{ConnectionHandle, PushConnection};
pub use dispatcher::Dispatcher;
pub use errors::{ServerError, TransportError};
pub use monitor::LivenessMonitor;
pub use registry::SessionRegistry;
pub use server::{PushServer, RunningServer};
