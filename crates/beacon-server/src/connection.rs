//! Connection capability trait and the registry's per-connection handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use beacon_core::{ConnectionId, Frame, SessionId};
use tokio::sync::Mutex;

use crate::errors::TransportError;

/// What the core needs from a transport: deliver a frame, probe liveness,
/// close. Implemented by the `WebSocket` and SSE adapters.
#[async_trait]
pub trait PushConnection: Send + Sync {
    /// Short transport name for logs and metrics.
    fn transport(&self) -> &'static str;

    /// Deliver one complete frame. Called with exclusive write access.
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Check that the peer is still there.
    async fn probe(&self) -> Result<(), TransportError>;

    /// Tear the connection down.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A registered connection.
///
/// Writes are serialized per handle so that two events never interleave on
/// the wire. Probes bypass the write lock.
pub struct ConnectionHandle {
    id: ConnectionId,
    session_id: SessionId,
    connection: Box<dyn PushConnection>,
    open: AtomicBool,
    write_lock: Mutex<()>,
    connected_at: Instant,
}

impl ConnectionHandle {
    /// Wrap a transport connection for `session_id`.
    pub fn new(session_id: SessionId, connection: Box<dyn PushConnection>) -> Self {
        Self {
            id: ConnectionId::new(),
            session_id,
            connection,
            open: AtomicBool::new(true),
            write_lock: Mutex::new(()),
            connected_at: Instant::now(),
        }
    }

    /// Identity of this handle.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Session this handle serves.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Underlying transport name.
    pub fn transport(&self) -> &'static str {
        self.connection.transport()
    }

    /// Whether [`close`](Self::close) has not been called yet.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Time since the handle was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Deliver `frame`, bounding the whole write (including waiting for an
    /// earlier write on this handle) by `timeout`.
    pub async fn send(&self, frame: Frame, timeout: Duration) -> Result<(), TransportError> {
        match tokio::time::timeout(timeout, self.deliver(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                operation: "send",
                after: timeout,
            }),
        }
    }

    async fn deliver(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let _guard = self.write_lock.lock().await;
        self.connection.send(frame).await
    }

    /// Probe the peer, bounded by `timeout`.
    pub async fn probe(&self, timeout: Duration) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        match tokio::time::timeout(timeout, self.connection.probe()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                operation: "probe",
                after: timeout,
            }),
        }
    }

    /// Close the connection, bounded by `timeout`. Only the first call
    /// reaches the transport.
    pub async fn close(&self, timeout: Duration) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        match tokio::time::timeout(timeout, self.connection.close()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                operation: "close",
                after: timeout,
            }),
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("transport", &self.transport())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
