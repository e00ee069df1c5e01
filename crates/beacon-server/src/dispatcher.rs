//! Event routing to one session (unicast) or every session (broadcast).
//!
//! Neither operation reports failure to its caller. A destination that fails
//! is logged, counted and evicted when the failure is the connection's fault,
//! while every other destination still receives the event.
//!
//! Broadcast encodes the event once into a [`SharedEncoding`] and gives each
//! destination its own reader over it. Every destination's write runs
//! concurrently under its own send timeout, so a slow reader only delays
//! itself and concurrent broadcasts never queue behind one another.

use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_core::{Frame, FrameError, PushEvent, SessionId, SharedEncoding};
use futures::StreamExt;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::connection::ConnectionHandle;
use crate::errors::TransportError;
use crate::metrics::{
    PUSH_BROADCAST_TARGETS, PUSH_DELIVERY_DURATION_SECONDS, PUSH_DELIVERY_FAILURES_TOTAL,
    PUSH_EVENTS_DELIVERED_TOTAL, PUSH_UNREGISTERED_TARGET_TOTAL,
};
use crate::registry::SessionRegistry;

/// Delivery tuning.
#[derive(Clone, Copy, Debug)]
pub struct DispatchConfig {
    /// Bound on one delivery to one destination.
    pub send_timeout: Duration,
    /// Target encoded chunk size.
    pub chunk_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for DispatchConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_timeout: config.send_timeout,
            chunk_size: config.chunk_size,
        }
    }
}

/// Routes events to registered connections.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Dispatcher delivering through `registry`.
    pub fn new(registry: Arc<SessionRegistry>, config: DispatchConfig) -> Self {
        Self { registry, config }
    }

    /// The registry this dispatcher delivers through.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Deliver `event` to the connection of `session_id`.
    ///
    /// An unknown session is logged as an error and otherwise ignored.
    pub async fn unicast(&self, session_id: &SessionId, event: PushEvent) {
        let Some(handle) = self.registry.lookup(session_id) else {
            metrics::counter!(PUSH_UNREGISTERED_TARGET_TOTAL).increment(1);
            error!(
                %session_id,
                event_type = %event.event_type,
                "The session \"{session_id}\" is not registered."
            );
            return;
        };

        let event_type = event.event_type.clone();
        let started = Instant::now();
        let frame = Frame::encode(event, self.config.chunk_size);
        match handle.send(frame, self.config.send_timeout).await {
            Ok(()) => {
                metrics::counter!(PUSH_EVENTS_DELIVERED_TOTAL, "mode" => "unicast").increment(1);
                metrics::histogram!(PUSH_DELIVERY_DURATION_SECONDS, "mode" => "unicast")
                    .record(started.elapsed().as_secs_f64());
                debug!(%session_id, %event_type, "event delivered");
            }
            Err(err) => self.handle_failure(&handle, &event_type, "unicast", &err).await,
        }
    }

    /// Deliver `event` to every connection registered when the call starts.
    ///
    /// Returns once every destination has either taken the event, failed or
    /// used up its send timeout.
    pub async fn broadcast(&self, event: PushEvent) {
        let targets = self.registry.snapshot();
        let event_type = event.event_type.clone();
        if targets.is_empty() {
            debug!(%event_type, "broadcast with no connected sessions");
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let width = targets.len() as f64;
        metrics::histogram!(PUSH_BROADCAST_TARGETS).record(width);

        let started = Instant::now();
        let encoding = SharedEncoding::new(event, self.config.chunk_size);
        let send_timeout = self.config.send_timeout;
        let deliveries: FuturesUnordered<_> = targets
            .into_iter()
            .map(|handle| {
                let frame = encoding.frame();
                async move {
                    let result = handle.send(frame, send_timeout).await;
                    (handle, result)
                }
            })
            .collect();
        let outcomes: Vec<_> = deliveries.collect().await;

        let mut delivered = 0_usize;
        let mut failures = Vec::new();
        for (handle, result) in outcomes {
            match result {
                Ok(()) => delivered += 1,
                Err(err) => failures.push((handle, err)),
            }
        }
        if failures
            .iter()
            .any(|(_, err)| matches!(err, TransportError::Frame(FrameError::Encode(_))))
        {
            error!(%event_type, "failed to encode broadcast event");
        }
        metrics::counter!(PUSH_EVENTS_DELIVERED_TOTAL, "mode" => "broadcast")
            .increment(delivered as u64);
        metrics::histogram!(PUSH_DELIVERY_DURATION_SECONDS, "mode" => "broadcast")
            .record(started.elapsed().as_secs_f64());
        debug!(
            %event_type,
            delivered,
            failed = failures.len(),
            "broadcast complete"
        );

        let _ = join_all(
            failures
                .iter()
                .map(|(handle, err)| self.handle_failure(handle, &event_type, "broadcast", err)),
        )
        .await;
    }

    async fn handle_failure(
        &self,
        handle: &ConnectionHandle,
        event_type: &str,
        mode: &'static str,
        err: &TransportError,
    ) {
        metrics::counter!(PUSH_DELIVERY_FAILURES_TOTAL, "mode" => mode).increment(1);
        if err.is_connection_fault() {
            warn!(
                session_id = %handle.session_id(),
                connection_id = %handle.id(),
                event_type,
                error = %err,
                "push delivery failed"
            );
            let _ = self.registry.evict(handle, "send_failed").await;
        } else {
            warn!(
                session_id = %handle.session_id(),
                event_type,
                error = %err,
                "push event dropped for session"
            );
        }
    }
}
