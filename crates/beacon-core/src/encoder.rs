//! Lazy, chunked JSON encoding of a [`PushEvent`].
//!
//! The encoder walks the payload tree with an explicit work stack and only
//! materializes enough output to fill the next chunk. Peak memory is bounded
//! by the chunk size plus the depth of the tree, independent of the total
//! encoded length. Concatenating every chunk yields exactly the JSON text of
//! `{"type": <type>, "data": <data>}`, with `data` omitted when absent.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use crate::errors::EncodeError;
use crate::events::PushEvent;

/// Default upper bound for a single emitted chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

enum Step {
    Raw(&'static [u8]),
    Str(String),
    Value(Value),
    ArrayItems {
        items: std::vec::IntoIter<Value>,
        first: bool,
    },
    ObjectEntries {
        entries: serde_json::map::IntoIter,
        first: bool,
    },
}

/// Pull-based encoder yielding the JSON text of one event as a sequence of
/// byte chunks, each at most `chunk_size` long.
///
/// Single-pass: once exhausted (or after an error) it yields nothing more.
pub struct EventEncoder {
    stack: Vec<Step>,
    buf: BytesMut,
    chunk_size: usize,
    failed: bool,
}

impl EventEncoder {
    /// Encoder with [`DEFAULT_CHUNK_SIZE`].
    pub fn new(event: PushEvent) -> Self {
        Self::with_chunk_size(event, DEFAULT_CHUNK_SIZE)
    }

    /// Encoder emitting chunks of at most `chunk_size` bytes (minimum 1).
    pub fn with_chunk_size(event: PushEvent, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let mut stack = Vec::with_capacity(8);
        stack.push(Step::Raw(b"}"));
        if let Some(data) = event.data {
            stack.push(Step::Value(data));
            stack.push(Step::Raw(b",\"data\":"));
        }
        stack.push(Step::Str(event.event_type));
        stack.push(Step::Raw(b"{\"type\":"));

        Self {
            stack,
            buf: BytesMut::with_capacity(chunk_size),
            chunk_size,
            failed: false,
        }
    }

    /// Encode the whole event into one contiguous buffer.
    pub fn encode_all(event: PushEvent) -> Result<Bytes, EncodeError> {
        let mut out = BytesMut::new();
        for chunk in Self::new(event) {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }

    /// Configured chunk bound.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn write_json<T: serde::Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        serde_json::to_writer((&mut self.buf).writer(), value)?;
        Ok(())
    }

    /// Execute one unit of work from the stack.
    fn advance(&mut self) -> Result<(), EncodeError> {
        let Some(step) = self.stack.pop() else {
            return Ok(());
        };

        match step {
            Step::Raw(bytes) => self.buf.extend_from_slice(bytes),
            Step::Str(s) => self.write_json(&s)?,
            Step::Value(Value::Array(items)) => {
                self.buf.put_u8(b'[');
                self.stack.push(Step::ArrayItems {
                    items: items.into_iter(),
                    first: true,
                });
            }
            Step::Value(Value::Object(map)) => {
                self.buf.put_u8(b'{');
                self.stack.push(Step::ObjectEntries {
                    entries: map.into_iter(),
                    first: true,
                });
            }
            Step::Value(scalar) => self.write_json(&scalar)?,
            Step::ArrayItems { mut items, first } => match items.next() {
                Some(item) => {
                    if !first {
                        self.buf.put_u8(b',');
                    }
                    self.stack.push(Step::ArrayItems {
                        items,
                        first: false,
                    });
                    self.stack.push(Step::Value(item));
                }
                None => self.buf.put_u8(b']'),
            },
            Step::ObjectEntries { mut entries, first } => match entries.next() {
                Some((key, value)) => {
                    if !first {
                        self.buf.put_u8(b',');
                    }
                    self.write_json(&key)?;
                    self.buf.put_u8(b':');
                    self.stack.push(Step::ObjectEntries {
                        entries,
                        first: false,
                    });
                    self.stack.push(Step::Value(value));
                }
                None => self.buf.put_u8(b'}'),
            },
        }
        Ok(())
    }
}

impl Iterator for EventEncoder {
    type Item = Result<Bytes, EncodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        while self.buf.len() < self.chunk_size && !self.stack.is_empty() {
            if let Err(err) = self.advance() {
                self.failed = true;
                self.stack.clear();
                self.buf.clear();
                return Some(Err(err));
            }
        }

        if self.buf.is_empty() {
            return None;
        }
        let take = self.buf.len().min(self.chunk_size);
        Some(Ok(self.buf.split_to(take).freeze()))
    }
}
