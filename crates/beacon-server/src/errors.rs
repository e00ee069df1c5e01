//! Transport and server error types.

use std::time::Duration;

use beacon_core::FrameError;
use thiserror::Error;

/// Failure of one operation on one connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is closed or its writer has gone away.
    #[error("connection closed")]
    Closed,
    /// The operation did not complete in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that overran (`send`, `probe`, `close`).
        operation: &'static str,
        /// Allotted time.
        after: Duration,
    },
    /// The peer did not answer the previous liveness probe.
    #[error("peer did not answer the previous probe")]
    Unresponsive,
    /// Reading the frame failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Transport-specific I/O failure.
    #[error("transport failure: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether the failure means the connection itself is unusable and
    /// should be evicted. Failures caused by the event (oversized, aborted
    /// encoding) leave the connection in place.
    pub fn is_connection_fault(&self) -> bool {
        match self {
            Self::Frame(err) => !err.is_producer_fault(),
            _ => true,
        }
    }
}

/// Errors starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The global metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
