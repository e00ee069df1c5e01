//! # beacon-core
//!
//! Shared building blocks for the Beacon push layer.
//!
//! - [`ids`]: caller-supplied session identities and server-generated connection ids
//! - [`events`]: the opaque `(type, data)` event pair delivered to clients
//! - [`encoder`]: lazy, chunked JSON encoding of an event
//! - [`frame`]: single-pass chunk source handed to one connection
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod encoder;
pub mod errors;
pub mod events;
pub mod frame;
pub mod ids;
pub mod logging;

pub use encoder::{DEFAULT_CHUNK_SIZE, EventEncoder};
pub use errors::{EncodeError, FrameError, IdError};
pub use events::PushEvent;
pub use frame::{Frame, SharedEncoding};
pub use ids::{ConnectionId, SessionId};
pub use logging::{LogFormat, init_subscriber};
