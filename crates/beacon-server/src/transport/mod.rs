//! Transport adapters serving `GET /push?sessionId=...`.
//!
//! Each adapter turns an accepted client into a [`PushConnection`] and
//! registers it, then reports its own disconnect back to the registry.
//!
//! [`PushConnection`]: crate::connection::PushConnection

pub mod sse;
pub mod websocket;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use beacon_core::SessionId;
use beacon_settings::PushBackend;
use serde::Deserialize;

use crate::server::AppState;

/// Body of the `400` returned when a client omits its session.
pub const MISSING_SESSION_MESSAGE: &str = "The query parameter \"sessionId\" is missing!";

/// Query string of `/push`.
#[derive(Debug, Default, Deserialize)]
pub struct PushQuery {
    /// Caller-chosen session identity.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

impl PushQuery {
    /// Validated session identity, or the `400` response to send instead.
    #[allow(clippy::result_large_err)]
    pub fn session(&self) -> Result<SessionId, Response> {
        self.session_id
            .as_deref()
            .and_then(|raw| SessionId::parse(raw).ok())
            .ok_or_else(missing_session)
    }
}

/// The `400` response for a missing or blank `sessionId`.
pub fn missing_session() -> Response {
    (StatusCode::BAD_REQUEST, MISSING_SESSION_MESSAGE).into_response()
}

/// Route handling `/push` for the configured backend.
pub(crate) fn push_route(backend: PushBackend) -> MethodRouter<AppState> {
    match backend {
        PushBackend::WebSocket => get(websocket::upgrade),
        PushBackend::Sse => get(sse::subscribe),
    }
}
