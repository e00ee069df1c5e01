//! Push events: an opaque `(type, data)` pair.

use serde::Serialize;
use serde_json::Value;

use crate::errors::EncodeError;

/// One event destined for one or many client sessions.
///
/// The payload is never interpreted; it is carried as an untyped JSON tree
/// and may be arbitrarily large.
#[derive(Clone, Debug, PartialEq)]
pub struct PushEvent {
    /// Type tag, serialized as the `type` field.
    pub event_type: String,
    /// Optional payload, serialized as the `data` field when present.
    pub data: Option<Value>,
}

impl PushEvent {
    /// Build an event from any serializable payload.
    pub fn new<T: Serialize>(event_type: impl Into<String>, data: T) -> Result<Self, EncodeError> {
        Ok(Self {
            event_type: event_type.into(),
            data: Some(serde_json::to_value(data)?),
        })
    }

    /// Build an event from an already-converted JSON value.
    pub fn with_value(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data: Some(data),
        }
    }

    /// Build a type-only event with no payload.
    pub fn bare(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: None,
        }
    }
}
