//! Session registry: at most one live connection per session, last writer wins.
//!
//! The map is guarded by a synchronous `RwLock` that is never held across an
//! `.await`. Closing a removed connection always happens after the lock is
//! released, bounded by the configured close timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use beacon_core::{ConnectionId, SessionId};
use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionHandle, PushConnection};
use crate::metrics::{
    PUSH_CONNECTIONS_ACTIVE, PUSH_CONNECTIONS_TOTAL, PUSH_EVICTIONS_TOTAL, PUSH_SUPERSEDED_TOTAL,
    set_gauge,
};

/// Live connections indexed by session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<ConnectionHandle>>>,
    close_timeout: Duration,
}

impl SessionRegistry {
    /// Empty registry closing removed connections within `close_timeout`.
    pub fn new(close_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            close_timeout,
        }
    }

    /// Register `connection` as the sole connection of `session_id`.
    ///
    /// Any connection already registered for the session is replaced
    /// atomically and then closed. Returns the id of the new handle.
    pub async fn register(
        &self,
        session_id: SessionId,
        connection: Box<dyn PushConnection>,
    ) -> ConnectionId {
        let handle = Arc::new(ConnectionHandle::new(session_id.clone(), connection));
        let connection_id = handle.id().clone();
        let transport = handle.transport();

        let previous = {
            let mut sessions = self.sessions.write();
            let previous = sessions.insert(session_id.clone(), handle);
            set_gauge(PUSH_CONNECTIONS_ACTIVE, sessions.len());
            previous
        };
        metrics::counter!(PUSH_CONNECTIONS_TOTAL, "transport" => transport).increment(1);
        info!(%session_id, %connection_id, transport, "push connection registered");

        if let Some(previous) = previous {
            metrics::counter!(PUSH_SUPERSEDED_TOTAL).increment(1);
            info!(
                %session_id,
                superseded = %previous.id(),
                "replacing existing connection for session"
            );
            self.close_handle(&previous, "superseded").await;
        }
        connection_id
    }

    /// Remove and close the connection of `session_id`. Returns whether one
    /// was registered.
    pub async fn unregister(&self, session_id: &SessionId) -> bool {
        let removed = self.remove_if(session_id, |_| true);
        match removed {
            Some(handle) => {
                debug!(%session_id, connection_id = %handle.id(), "push connection unregistered");
                self.close_handle(&handle, "unregistered").await;
                true
            }
            None => false,
        }
    }

    /// Remove the connection of `session_id` only if it is still
    /// `connection_id`. Used by transports reporting a disconnect, so that a
    /// late notice from a superseded connection never removes its successor.
    pub async fn unregister_connection(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> bool {
        let removed = self.remove_if(session_id, |h| h.id() == connection_id);
        match removed {
            Some(handle) => {
                info!(%session_id, %connection_id, "push connection disconnected");
                self.close_handle(&handle, "disconnected").await;
                true
            }
            None => {
                debug!(%session_id, %connection_id, "disconnect of stale connection ignored");
                false
            }
        }
    }

    /// Evict `handle` after a delivery or probe failure.
    ///
    /// Only removes the registry entry if it still refers to this exact
    /// handle. The handle is closed either way.
    pub async fn evict(&self, handle: &ConnectionHandle, reason: &'static str) -> bool {
        let removed = self
            .remove_if(handle.session_id(), |h| h.id() == handle.id())
            .is_some();
        if removed {
            metrics::counter!(PUSH_EVICTIONS_TOTAL, "reason" => reason).increment(1);
            warn!(
                session_id = %handle.session_id(),
                connection_id = %handle.id(),
                reason,
                "evicting push connection"
            );
        }
        self.close_handle(handle, reason).await;
        removed
    }

    /// Current connection of `session_id`.
    pub fn lookup(&self, session_id: &SessionId) -> Option<Arc<ConnectionHandle>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Point-in-time copy of every registered connection.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Remove and close every connection.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.write();
            let drained = sessions.drain().map(|(_, h)| h).collect();
            set_gauge(PUSH_CONNECTIONS_ACTIVE, 0);
            drained
        };
        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "closing all push connections");
        let _ = join_all(drained.iter().map(|h| self.close_handle(h, "shutdown"))).await;
    }

    fn remove_if(
        &self,
        session_id: &SessionId,
        predicate: impl FnOnce(&ConnectionHandle) -> bool,
    ) -> Option<Arc<ConnectionHandle>> {
        let mut sessions = self.sessions.write();
        let matches = sessions.get(session_id).is_some_and(|h| predicate(h.as_ref()));
        if !matches {
            return None;
        }
        let removed = sessions.remove(session_id);
        set_gauge(PUSH_CONNECTIONS_ACTIVE, sessions.len());
        removed
    }

    async fn close_handle(&self, handle: &ConnectionHandle, reason: &'static str) {
        if let Err(error) = handle.close(self.close_timeout).await {
            warn!(
                session_id = %handle.session_id(),
                connection_id = %handle.id(),
                reason,
                %error,
                "failed to close push connection"
            );
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockBehavior, mock_connection, session};

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = SessionRegistry::default();
        let (conn, _observer) = mock_connection(MockBehavior::Healthy);

        let id = registry.register(session("a"), conn).await;
        let handle = registry.lookup(&session("a")).unwrap();
        assert_eq!(handle.id(), &id);
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&session("b")).is_none());
    }

    #[tokio::test]
    async fn register_supersedes_and_closes_previous() {
        let registry = SessionRegistry::default();
        let (first, first_observer) = mock_connection(MockBehavior::Healthy);
        let (second, second_observer) = mock_connection(MockBehavior::Healthy);

        let first_id = registry.register(session("a"), first).await;
        let second_id = registry.register(session("a"), second).await;

        assert_ne!(first_id, second_id);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&session("a")).unwrap().id(), &second_id);
        assert_eq!(first_observer.closes(), 1);
        assert_eq!(second_observer.closes(), 0);
    }

    #[tokio::test]
    async fn unregister_removes_and_closes() {
        let registry = SessionRegistry::default();
        let (conn, observer) = mock_connection(MockBehavior::Healthy);
        let _ = registry.register(session("a"), conn).await;

        assert!(registry.unregister(&session("a")).await);
        assert!(registry.is_empty());
        assert_eq!(observer.closes(), 1);
        assert!(!registry.unregister(&session("a")).await);
    }

    #[tokio::test]
    async fn stale_disconnect_keeps_successor() {
        let registry = SessionRegistry::default();
        let (first, _first_observer) = mock_connection(MockBehavior::Healthy);
        let (second, second_observer) = mock_connection(MockBehavior::Healthy);

        let first_id = registry.register(session("a"), first).await;
        let second_id = registry.register(session("a"), second).await;

        assert!(!registry.unregister_connection(&session("a"), &first_id).await);
        assert_eq!(registry.lookup(&session("a")).unwrap().id(), &second_id);
        assert_eq!(second_observer.closes(), 0);

        assert!(registry.unregister_connection(&session("a"), &second_id).await);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn evicting_superseded_handle_keeps_successor() {
        let registry = SessionRegistry::default();
        let (first, _first_observer) = mock_connection(MockBehavior::Healthy);
        let (second, _second_observer) = mock_connection(MockBehavior::Healthy);

        let _ = registry.register(session("a"), first).await;
        let stale = registry.lookup(&session("a")).unwrap();
        let second_id = registry.register(session("a"), second).await;

        assert!(!registry.evict(&stale, "send_failed").await);
        assert_eq!(registry.lookup(&session("a")).unwrap().id(), &second_id);
    }

    #[tokio::test]
    async fn evict_removes_current_handle() {
        let registry = SessionRegistry::default();
        let (conn, observer) = mock_connection(MockBehavior::Healthy);
        let _ = registry.register(session("a"), conn).await;
        let handle = registry.lookup(&session("a")).unwrap();

        assert!(registry.evict(&handle, "probe_failed").await);
        assert!(registry.is_empty());
        assert!(!handle.is_open());
        assert_eq!(observer.closes(), 1);
    }

    #[tokio::test]
    async fn snapshot_is_point_in_time() {
        let registry = SessionRegistry::default();
        for name in ["a", "b", "c"] {
            let (conn, _observer) = mock_connection(MockBehavior::Healthy);
            let _ = registry.register(session(name), conn).await;
        }
        let snapshot = registry.snapshot();
        assert!(registry.unregister(&session("b")).await);

        assert_eq!(snapshot.len(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let registry = SessionRegistry::default();
        let mut observers = Vec::new();
        for name in ["a", "b"] {
            let (conn, observer) = mock_connection(MockBehavior::Healthy);
            let _ = registry.register(session(name), conn).await;
            observers.push(observer);
        }

        registry.close_all().await;
        assert!(registry.is_empty());
        assert!(observers.iter().all(|o| o.closes() == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registration_leaves_one_connection() {
        let registry = Arc::new(SessionRegistry::default());
        let mut tasks = Vec::new();
        let mut observers = Vec::new();
        for _ in 0..32 {
            let (conn, observer) = mock_connection(MockBehavior::Healthy);
            observers.push(observer);
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.register(session("shared"), conn).await
            }));
        }
        let ids: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(registry.len(), 1);
        let survivor = registry.lookup(&session("shared")).unwrap();
        assert!(ids.contains(survivor.id()));
        assert!(survivor.is_open());
        let closed: usize = observers.iter().map(|o| o.closes()).sum();
        assert_eq!(closed, 31);
    }
}
