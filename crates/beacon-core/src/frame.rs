//! Single-pass chunk source handed to exactly one connection.
//!
//! A [`Frame`] is either backed directly by an [`EventEncoder`] (unicast) or
//! by a [`SharedEncoding`] (broadcast, where one encoder pass serves many
//! destinations). Each shared reader keeps its own cursor, so the fastest
//! reader drives the encoder and slower readers replay the chunks it left
//! behind without holding anyone up. The consumer sees the same sequence of
//! chunks either way.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use parking_lot::Mutex;

use crate::encoder::EventEncoder;
use crate::errors::FrameError;
use crate::events::PushEvent;

enum Source {
    Encoder(EventEncoder),
    Shared {
        encoding: Arc<SharedEncoding>,
        cursor: usize,
    },
    Done,
}

/// The encoded form of one event for one destination.
pub struct Frame {
    event_type: Arc<str>,
    source: Source,
}

impl Frame {
    /// Frame that encodes `event` lazily as it is read.
    pub fn encode(event: PushEvent, chunk_size: usize) -> Self {
        Self {
            event_type: Arc::from(event.event_type.as_str()),
            source: Source::Encoder(EventEncoder::with_chunk_size(event, chunk_size)),
        }
    }

    /// Type tag of the event carried by this frame.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Next chunk, `None` once the event is complete.
    ///
    /// After an error or completion the frame yields nothing more.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, FrameError>> {
        let item = match &mut self.source {
            Source::Done => return None,
            Source::Encoder(encoder) => match encoder.next() {
                Some(Ok(chunk)) => return Some(Ok(chunk)),
                Some(Err(err)) => Some(Err(FrameError::from(err))),
                None => None,
            },
            Source::Shared { encoding, cursor } => match encoding.chunk_at(*cursor) {
                Some(Ok(chunk)) => {
                    *cursor += 1;
                    return Some(Ok(chunk));
                }
                other => other,
            },
        };
        self.source = Source::Done;
        item
    }

    /// Read the whole frame into one buffer, failing once it grows past
    /// `limit` bytes.
    pub async fn collect(mut self, limit: usize) -> Result<Bytes, FrameError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await {
            let chunk = chunk?;
            if out.len() + chunk.len() > limit {
                return Err(FrameError::TooLarge { limit });
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// Like [`collect`](Self::collect) but yields text.
    pub async fn collect_text(self, limit: usize) -> Result<String, FrameError> {
        let bytes = self.collect(limit).await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidUtf8)
    }

    /// Adapt into a [`Stream`] of chunks.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, FrameError>> + Send {
        futures::stream::unfold(self, |mut frame| async move {
            frame.next_chunk().await.map(|item| (item, frame))
        })
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            Source::Encoder(_) => "encoder",
            Source::Shared { .. } => "shared",
            Source::Done => "done",
        };
        f.debug_struct("Frame")
            .field("event_type", &self.event_type)
            .field("source", &source)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared encoding
// ─────────────────────────────────────────────────────────────────────────────

enum Progress {
    Encoding(EventEncoder),
    Complete,
    Failed,
}

struct EncodingState {
    progress: Progress,
    chunks: Vec<Bytes>,
}

/// One encoder pass over an event, read independently by any number of
/// frames.
///
/// Chunks are produced on demand by whichever reader gets furthest first and
/// retained until the last frame is dropped. Chunk `Bytes` are reference
/// counted, so the encoded event is held once no matter how many readers lag.
pub struct SharedEncoding {
    event_type: Arc<str>,
    state: Mutex<EncodingState>,
}

impl SharedEncoding {
    /// Prepare `event` for fan-out. Nothing is encoded until a frame is read.
    pub fn new(event: PushEvent, chunk_size: usize) -> Arc<Self> {
        Arc::new(Self {
            event_type: Arc::from(event.event_type.as_str()),
            state: Mutex::new(EncodingState {
                progress: Progress::Encoding(EventEncoder::with_chunk_size(event, chunk_size)),
                chunks: Vec::new(),
            }),
        })
    }

    /// A fresh reader positioned at the first chunk.
    pub fn frame(self: &Arc<Self>) -> Frame {
        Frame {
            event_type: Arc::clone(&self.event_type),
            source: Source::Shared {
                encoding: Arc::clone(self),
                cursor: 0,
            },
        }
    }

    /// Chunks encoded so far.
    pub fn encoded_chunks(&self) -> usize {
        self.state.lock().chunks.len()
    }

    /// Chunk `index`, encoding it first if no reader has reached it yet.
    ///
    /// The reader that hits an encoding failure gets the underlying error;
    /// every other reader sees [`FrameError::Aborted`] at the same position.
    fn chunk_at(&self, index: usize) -> Option<Result<Bytes, FrameError>> {
        let mut state = self.state.lock();
        if let Some(chunk) = state.chunks.get(index) {
            return Some(Ok(chunk.clone()));
        }
        let next = match &mut state.progress {
            Progress::Encoding(encoder) => encoder.next(),
            Progress::Complete => return None,
            Progress::Failed => return Some(Err(FrameError::Aborted)),
        };
        match next {
            Some(Ok(chunk)) => {
                state.chunks.push(chunk.clone());
                Some(Ok(chunk))
            }
            Some(Err(err)) => {
                state.progress = Progress::Failed;
                Some(Err(FrameError::from(err)))
            }
            None => {
                state.progress = Progress::Complete;
                None
            }
        }
    }
}

impl std::fmt::Debug for SharedEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEncoding")
            .field("event_type", &self.event_type)
            .field("encoded_chunks", &self.encoded_chunks())
            .finish()
    }
}
