//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `GET /metrics`. Call once at startup
/// before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Set a gauge from a count.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn set_gauge(name: &'static str, value: usize) {
    metrics::gauge!(name).set(value as f64);
}

// Metric name constants to avoid typos across modules.

/// Connections registered total (counter, labels: transport).
pub const PUSH_CONNECTIONS_TOTAL: &str = "push_connections_total";
/// Currently registered connections (gauge).
pub const PUSH_CONNECTIONS_ACTIVE: &str = "push_connections_active";
/// Connections replaced by a newer one for the same session (counter).
pub const PUSH_SUPERSEDED_TOTAL: &str = "push_superseded_total";
/// Connections removed after a failure (counter, labels: reason).
pub const PUSH_EVICTIONS_TOTAL: &str = "push_evictions_total";
/// Events handed to one connection (counter, labels: mode). Socket
/// transports count an event once it is queued for their writer.
pub const PUSH_EVENTS_DELIVERED_TOTAL: &str = "push_events_delivered_total";
/// Failed deliveries (counter, labels: mode).
pub const PUSH_DELIVERY_FAILURES_TOTAL: &str = "push_delivery_failures_total";
/// Unicasts addressed to a session with no connection (counter).
pub const PUSH_UNREGISTERED_TARGET_TOTAL: &str = "push_unregistered_target_total";
/// Time to deliver one event (histogram, labels: mode).
pub const PUSH_DELIVERY_DURATION_SECONDS: &str = "push_delivery_duration_seconds";
/// Broadcast fan-out width (histogram).
pub const PUSH_BROADCAST_TARGETS: &str = "push_broadcast_targets";
/// Liveness probes issued (counter).
pub const PUSH_PROBES_TOTAL: &str = "push_probes_total";
/// Liveness probes that failed (counter).
pub const PUSH_PROBE_FAILURES_TOTAL: &str = "push_probe_failures_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn recorded_metrics_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(PUSH_PROBES_TOTAL).increment(3);
            set_gauge(PUSH_CONNECTIONS_ACTIVE, 2);
        });
        let output = handle.render();
        assert!(output.contains(PUSH_PROBES_TOTAL), "got: {output}");
        assert!(output.contains(PUSH_CONNECTIONS_ACTIVE), "got: {output}");
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            PUSH_CONNECTIONS_TOTAL,
            PUSH_CONNECTIONS_ACTIVE,
            PUSH_SUPERSEDED_TOTAL,
            PUSH_EVICTIONS_TOTAL,
            PUSH_EVENTS_DELIVERED_TOTAL,
            PUSH_DELIVERY_FAILURES_TOTAL,
            PUSH_UNREGISTERED_TARGET_TOTAL,
            PUSH_DELIVERY_DURATION_SECONDS,
            PUSH_BROADCAST_TARGETS,
            PUSH_PROBES_TOTAL,
            PUSH_PROBE_FAILURES_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
