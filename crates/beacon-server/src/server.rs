//! `PushServer`: axum router, listener and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use beacon_core::{PushEvent, SessionId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::dispatcher::{DispatchConfig, Dispatcher};
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::monitor::LivenessMonitor;
use crate::registry::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::transport;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live connections by session.
    pub registry: Arc<SessionRegistry>,
    /// Event routing.
    pub dispatcher: Arc<Dispatcher>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server was built.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Body of `POST /push/events`.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Optional payload.
    #[serde(default)]
    pub data: Option<Value>,
    /// Target session; absent means broadcast.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// Reply of `POST /push/events`.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// Always `true`; delivery itself is best-effort.
    pub accepted: bool,
    /// `"unicast"` or `"broadcast"`.
    pub mode: &'static str,
}

/// The push server.
pub struct PushServer {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    monitor: Arc<LivenessMonitor>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl PushServer {
    /// Build a server from `config`. Nothing is bound until [`listen`](Self::listen).
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.close_timeout));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            DispatchConfig::from(&config),
        ));
        let monitor = Arc::new(LivenessMonitor::new(
            Arc::clone(&registry),
            config.ping_interval,
            config.probe_timeout,
        ));
        Self {
            config: Arc::new(config),
            registry,
            dispatcher,
            monitor,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `GET /metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            dispatcher: Arc::clone(&self.dispatcher),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new()
            .route("/push", transport::push_route(self.config.backend))
            .route("/health", get(health_handler));
        if self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        if self.config.enable_publish_api {
            router = router.route("/push/events", post(publish_handler));
        }
        router
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener, then spawn the HTTP server and the liveness monitor.
    pub async fn listen(&self) -> Result<RunningServer, ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let app = self.router();
        let token = self.shutdown.token();
        self.shutdown.track(tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(%error, "push server stopped with error");
            }
        }));
        self.shutdown
            .track(Arc::clone(&self.monitor).spawn(self.shutdown.token()));

        info!(
            %local_addr,
            backend = %self.config.backend,
            ping_interval = ?self.monitor.interval(),
            "push server listening"
        );
        Ok(RunningServer {
            local_addr,
            shutdown: Arc::clone(&self.shutdown),
            registry: Arc::clone(&self.registry),
        })
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Dispatcher for in-process producers.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Liveness monitor.
    pub fn monitor(&self) -> &Arc<LivenessMonitor> {
        &self.monitor
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// A bound, serving push server.
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    registry: Arc<SessionRegistry>,
}

impl RunningServer {
    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting clients, close every registered connection, then wait
    /// up to `timeout` for the server tasks.
    pub async fn shutdown(self, timeout: Duration) {
        info!(addr = %self.local_addr, "push server shutting down");
        self.shutdown.shutdown();
        self.registry.close_all().await;
        self.shutdown.graceful_shutdown(Some(timeout)).await;
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.config.backend,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// POST /push/events
///
/// Waits for the dispatch to finish so that events from one producer keep
/// their order.
async fn publish_handler(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Response {
    if request.event_type.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "The field \"type\" must not be empty").into_response();
    }
    let event = match request.data {
        Some(data) => PushEvent::with_value(request.event_type, data),
        None => PushEvent::bare(request.event_type),
    };

    let mode = match request.session_id {
        Some(raw) => {
            let Ok(session_id) = SessionId::parse(&raw) else {
                return transport::missing_session();
            };
            state.dispatcher.unicast(&session_id, event).await;
            "unicast"
        }
        None => {
            state.dispatcher.broadcast(event).await;
            "broadcast"
        }
    };
    (
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            accepted: true,
            mode,
        }),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
