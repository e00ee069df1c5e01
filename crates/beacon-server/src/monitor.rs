//! Periodic liveness probing of every registered connection.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{PUSH_PROBE_FAILURES_TOTAL, PUSH_PROBES_TOTAL};
use crate::registry::SessionRegistry;

/// Probes all connections on a fixed period and evicts the ones that fail.
pub struct LivenessMonitor {
    registry: Arc<SessionRegistry>,
    interval: Duration,
    probe_timeout: Duration,
}

impl LivenessMonitor {
    /// Monitor over `registry`, ticking every `interval`.
    pub fn new(registry: Arc<SessionRegistry>, interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            registry,
            interval,
            probe_timeout,
        }
    }

    /// Probe period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe every connection registered now, concurrently, and evict each
    /// one whose probe fails or overruns. Returns the number evicted.
    pub async fn tick(&self) -> usize {
        let targets = self.registry.snapshot();
        if targets.is_empty() {
            return 0;
        }
        metrics::counter!(PUSH_PROBES_TOTAL).increment(targets.len() as u64);

        let timeout = self.probe_timeout;
        let results = join_all(targets.iter().map(|handle| handle.probe(timeout))).await;

        let failed: Vec<_> = targets
            .iter()
            .zip(results)
            .filter_map(|(handle, result)| result.err().map(|err| (handle, err)))
            .collect();
        if failed.is_empty() {
            debug!(probed = targets.len(), "liveness tick");
            return 0;
        }

        metrics::counter!(PUSH_PROBE_FAILURES_TOTAL).increment(failed.len() as u64);
        let evictions = failed.iter().map(|(handle, err)| {
            warn!(
                session_id = %handle.session_id(),
                connection_id = %handle.id(),
                error = %err,
                "liveness probe failed"
            );
            self.registry.evict(handle, "probe_failed")
        });
        let evicted = join_all(evictions).await.into_iter().filter(|e| *e).count();
        info!(probed = targets.len(), evicted, "liveness tick");
        evicted
    }

    /// Run [`tick`](Self::tick) every interval until `cancel` fires. The
    /// first tick happens one full interval after start.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // consume the immediate first tick
            let _ = ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = self.tick().await;
                    }
                }
            }
            debug!("liveness monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockBehavior, MockObserver, mock_connection, session};

    async fn connect(registry: &SessionRegistry, name: &str, behavior: MockBehavior) -> MockObserver {
        let (conn, observer) = mock_connection(behavior);
        let _ = registry.register(session(name), conn).await;
        observer
    }

    fn monitor(registry: &Arc<SessionRegistry>) -> Arc<LivenessMonitor> {
        Arc::new(LivenessMonitor::new(
            Arc::clone(registry),
            Duration::from_secs(60),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn tick_evicts_failed_probes_only() {
        let registry = Arc::new(SessionRegistry::default());
        let healthy = connect(&registry, "a", MockBehavior::Healthy).await;
        let dead = connect(&registry, "b", MockBehavior::FailProbe).await;

        let evicted = monitor(&registry).tick().await;

        assert_eq!(evicted, 1);
        assert!(registry.lookup(&session("a")).is_some());
        assert!(registry.lookup(&session("b")).is_none());
        assert_eq!(healthy.probes(), 1);
        assert_eq!(dead.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_bounds_hung_probe() {
        let registry = Arc::new(SessionRegistry::default());
        let _healthy = connect(&registry, "a", MockBehavior::Healthy).await;
        let _hung = connect(&registry, "hung", MockBehavior::StallProbe).await;

        let started = tokio::time::Instant::now();
        let evicted = monitor(&registry).tick().await;

        assert_eq!(evicted, 1);
        assert!(started.elapsed() <= Duration::from_secs(6));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_session_is_unregistered_for_dispatch() {
        let (logs, _guard) = beacon_core::logging::capture_logs();
        let registry = Arc::new(SessionRegistry::default());
        let mut hung = connect(&registry, "hung", MockBehavior::StallProbe).await;

        assert_eq!(monitor(&registry).tick().await, 1);

        let dispatcher = crate::dispatcher::Dispatcher::new(
            Arc::clone(&registry),
            crate::dispatcher::DispatchConfig::default(),
        );
        dispatcher.unicast(&session("hung"), beacon_core::PushEvent::bare("late")).await;
        assert!(hung.drain().is_empty());
        assert!(logs.has_event(tracing::Level::ERROR, "is not registered"));
    }

    #[tokio::test]
    async fn tick_on_empty_registry() {
        let registry = Arc::new(SessionRegistry::default());
        assert_eq!(monitor(&registry).tick().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_monitor_probes_each_interval() {
        let registry = Arc::new(SessionRegistry::default());
        let healthy = connect(&registry, "a", MockBehavior::Healthy).await;
        let cancel = CancellationToken::new();
        let task = monitor(&registry).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(healthy.probes(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(healthy.probes(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(healthy.probes(), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_monitor_stops_on_cancel() {
        let registry = Arc::new(SessionRegistry::default());
        let healthy = connect(&registry, "a", MockBehavior::Healthy).await;
        let cancel = CancellationToken::new();
        let task = monitor(&registry).spawn(cancel.clone());

        cancel.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(healthy.probes(), 0);
    }
}
