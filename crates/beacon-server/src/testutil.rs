//! Scriptable in-memory connection for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{Frame, FrameError, SessionId};
use tokio::sync::mpsc;

use crate::connection::PushConnection;
use crate::errors::TransportError;

/// How a [`MockConnection`] reacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MockBehavior {
    /// Reads every frame and records it.
    Healthy,
    /// Every send fails immediately without reading.
    FailSend,
    /// Sends never complete and never read.
    StallSend,
    /// Reads every frame, pausing before each chunk.
    SlowRead(Duration),
    /// Probes fail immediately.
    FailProbe,
    /// Probes never complete.
    StallProbe,
}

struct MockConnection {
    behavior: MockBehavior,
    frames: mpsc::UnboundedSender<String>,
    probes: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl PushConnection for MockConnection {
    fn transport(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        match self.behavior {
            MockBehavior::FailSend => Err(TransportError::Io("broken pipe".into())),
            MockBehavior::StallSend => std::future::pending().await,
            MockBehavior::SlowRead(pause) => {
                let mut frame = frame;
                let mut bytes = Vec::new();
                while let Some(chunk) = frame.next_chunk().await {
                    tokio::time::sleep(pause).await;
                    bytes.extend_from_slice(&chunk?);
                }
                let text = String::from_utf8(bytes)
                    .map_err(|_| TransportError::Frame(FrameError::InvalidUtf8))?;
                self.frames.send(text).map_err(|_| TransportError::Closed)
            }
            _ => {
                let text = frame.collect_text(usize::MAX).await?;
                self.frames.send(text).map_err(|_| TransportError::Closed)
            }
        }
    }

    async fn probe(&self) -> Result<(), TransportError> {
        let _ = self.probes.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            MockBehavior::FailProbe => Err(TransportError::Unresponsive),
            MockBehavior::StallProbe => std::future::pending().await,
            _ => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Test-side view of a mock connection.
pub(crate) struct MockObserver {
    frames: mpsc::UnboundedReceiver<String>,
    probes: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockObserver {
    /// Wait for the next delivered frame.
    pub(crate) async fn next_frame(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(30), self.frames.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("connection dropped")
    }

    /// Frames delivered so far, without waiting.
    pub(crate) fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            out.push(frame);
        }
        out
    }

    pub(crate) fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Build a boxed mock connection and its observer.
pub(crate) fn mock_connection(behavior: MockBehavior) -> (Box<dyn PushConnection>, MockObserver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let probes = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let connection = MockConnection {
        behavior,
        frames: tx,
        probes: Arc::clone(&probes),
        closes: Arc::clone(&closes),
    };
    let observer = MockObserver {
        frames: rx,
        probes,
        closes,
    };
    (Box::new(connection), observer)
}

pub(crate) fn session(raw: &str) -> SessionId {
    SessionId::parse(raw).expect("valid session id")
}
