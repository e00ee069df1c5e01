//! Server-sent events transport.
//!
//! The response body is fed from a bounded queue of events. Closing the
//! connection ends the body; the client going away drops it, which reports
//! the disconnect to the registry.
//!
//! Liveness follows the body rather than the queue: a `:ping` only counts as
//! answered once the body has pulled it for writing, so a client that stops
//! reading fails its next check instead of filling the queue.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use beacon_core::{ConnectionId, Frame, SessionId};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::PushQuery;
use crate::connection::PushConnection;
use crate::errors::TransportError;
use crate::registry::SessionRegistry;
use crate::server::AppState;

/// Item queued for the response body.
#[derive(Debug)]
pub enum Outbound {
    /// One encoded event.
    Event(Event),
    /// A `:ping` keep-alive comment.
    Ping,
}

/// Registered side of one SSE client.
pub struct SseConnection {
    outbound: mpsc::Sender<Outbound>,
    answered: Arc<AtomicBool>,
    closed: CancellationToken,
    max_message_size: usize,
}

impl SseConnection {
    /// Connection writing to `outbound`; cancelling `closed` ends the stream.
    /// `answered` is set by the body each time it pulls a ping.
    pub fn new(
        outbound: mpsc::Sender<Outbound>,
        answered: Arc<AtomicBool>,
        closed: CancellationToken,
        max_message_size: usize,
    ) -> Self {
        Self {
            outbound,
            answered,
            closed,
            max_message_size,
        }
    }

    async fn enqueue(&self, item: Outbound) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(item)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl PushConnection for SseConnection {
    fn transport(&self) -> &'static str {
        "sse"
    }

    /// One frame becomes one `data:` event. Returns once the event is
    /// queued for the body, not once it reaches the client.
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let text = frame.collect_text(self.max_message_size).await?;
        self.enqueue(Outbound::Event(Event::default().data(text))).await
    }

    /// Queue a `:ping` comment. Fails while the previous ping is still
    /// waiting for the body, or once the client has gone away.
    async fn probe(&self) -> Result<(), TransportError> {
        if !self.answered.swap(false, Ordering::AcqRel) {
            return Err(TransportError::Unresponsive);
        }
        self.enqueue(Outbound::Ping).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.cancel();
        Ok(())
    }
}

/// Reports the end of the response body to the registry.
struct DisconnectGuard {
    registry: Arc<SessionRegistry>,
    session_id: SessionId,
    connection_id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let registry = Arc::clone(&self.registry);
        let session_id = self.session_id.clone();
        let connection_id = self.connection_id.clone();
        debug!(%session_id, %connection_id, "sse stream ended");
        let _ = runtime.spawn(async move {
            let _ = registry.unregister_connection(&session_id, &connection_id).await;
        });
    }
}

/// Body events drained from `rx` until `closed` fires. Pulling a ping marks
/// it answered.
fn body_events(
    rx: mpsc::Receiver<Outbound>,
    answered: Arc<AtomicBool>,
    closed: CancellationToken,
) -> impl Stream<Item = Event> + Send {
    ReceiverStream::new(rx)
        .take_until(closed.cancelled_owned())
        .map(move |item| match item {
            Outbound::Event(event) => event,
            Outbound::Ping => {
                answered.store(true, Ordering::Release);
                Event::default().comment("ping")
            }
        })
}

/// `GET /push` event-stream handler.
pub(crate) async fn subscribe(
    Query(query): Query<PushQuery>,
    State(state): State<AppState>,
) -> Response {
    let session_id = match query.session() {
        Ok(session_id) => session_id,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel(state.config.max_send_queue);
    let answered = Arc::new(AtomicBool::new(true));
    let closed = CancellationToken::new();
    let connection = SseConnection::new(
        tx,
        Arc::clone(&answered),
        closed.clone(),
        state.config.max_message_size,
    );
    let connection_id = state
        .registry
        .register(session_id.clone(), Box::new(connection))
        .await;

    let guard = DisconnectGuard {
        registry: Arc::clone(&state.registry),
        session_id,
        connection_id,
    };
    let stream = body_events(rx, answered, closed).map(move |event| {
        let _keep_alive = &guard;
        Ok::<_, Infallible>(event)
    });

    Sse::new(stream).into_response()
}
