//! `WebSocket` transport.
//!
//! Outbound traffic goes through a bounded queue drained by a writer task,
//! so a slow socket applies back-pressure to senders instead of buffering
//! without limit. The reader loop only watches for liveness signals and the
//! end of the connection; client payloads are ignored. Closing cancels both
//! loops, so a peer that stopped reading cannot pin the writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use beacon_core::{Frame, SessionId};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::PushQuery;
use crate::connection::PushConnection;
use crate::errors::TransportError;
use crate::server::AppState;

/// Time given to the closing handshake once the writer stops.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Registered side of one `WebSocket` client.
pub struct WsConnection {
    outbound: mpsc::Sender<Message>,
    alive: Arc<AtomicBool>,
    closed: CancellationToken,
    max_message_size: usize,
}

impl WsConnection {
    /// Connection writing to `outbound`. `alive` is raised by the reader
    /// whenever the peer shows signs of life; `closed` stops both loops.
    pub fn new(
        outbound: mpsc::Sender<Message>,
        alive: Arc<AtomicBool>,
        closed: CancellationToken,
        max_message_size: usize,
    ) -> Self {
        Self {
            outbound,
            alive,
            closed,
            max_message_size,
        }
    }

    async fn enqueue(&self, message: Message) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl PushConnection for WsConnection {
    fn transport(&self) -> &'static str {
        "websocket"
    }

    /// One frame becomes one text message.
    ///
    /// Returns once the message is queued for the writer task, not once it
    /// is written to the socket. A full queue holds the call until the writer
    /// makes room, which the handle's send timeout bounds.
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let text = frame.collect_text(self.max_message_size).await?;
        self.enqueue(Message::Text(text.into())).await
    }

    /// Fails if nothing was heard since the previous probe, otherwise sends
    /// a new ping.
    async fn probe(&self) -> Result<(), TransportError> {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return Err(TransportError::Unresponsive);
        }
        self.enqueue(Message::Ping(Bytes::new())).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.cancel();
        Ok(())
    }
}

/// `GET /push` upgrade handler. The session is checked before the upgrade
/// request itself.
pub(crate) async fn upgrade(
    Query(query): Query<PushQuery>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let session_id = match query.session() {
        Ok(session_id) => session_id,
        Err(response) => return response,
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| serve_socket(socket, session_id, state))
}

async fn serve_socket(socket: WebSocket, session_id: SessionId, state: AppState) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(state.config.max_send_queue);
    let alive = Arc::new(AtomicBool::new(true));
    let closed = CancellationToken::new();
    let connection = WsConnection::new(
        tx,
        Arc::clone(&alive),
        closed.clone(),
        state.config.max_message_size,
    );

    let connection_id = state
        .registry
        .register(session_id.clone(), Box::new(connection))
        .await;
    let writer = tokio::spawn(write_loop(sink, rx, closed.clone()));

    loop {
        let message = tokio::select! {
            () = closed.cancelled() => break,
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Pong(_) | Message::Ping(_))) => alive.store(true, Ordering::Release),
            Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                trace!(%session_id, "ignoring client payload");
            }
            Some(Ok(Message::Close(_)) | Err(_)) | None => break,
        }
    }

    debug!(%session_id, %connection_id, "websocket connection finished");
    let _ = state
        .registry
        .unregister_connection(&session_id, &connection_id)
        .await;
    closed.cancel();
    let _ = writer.await;
}

/// Drain the outbound queue into the socket until it fails or `closed`
/// fires, then close the socket.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    closed: CancellationToken,
) {
    let forward = async {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                return;
            }
        }
    };
    tokio::select! {
        () = forward => {}
        () = closed.cancelled() => {}
    }
    let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
}
