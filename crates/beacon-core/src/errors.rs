//! Error types shared by the encoder, frames and identities.

use thiserror::Error;

/// Failure while turning an event into JSON bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The payload could not be converted to or written as JSON.
    #[error("failed to encode event payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure while reading a [`Frame`](crate::frame::Frame).
#[derive(Debug, Error)]
pub enum FrameError {
    /// Encoding of a shared event failed while another reader was
    /// producing it.
    #[error("frame aborted by producer")]
    Aborted,
    /// The encoded event exceeds what the consumer is willing to buffer.
    #[error("frame exceeds {limit} bytes")]
    TooLarge {
        /// Configured byte limit.
        limit: usize,
    },
    /// The encoded bytes are not valid UTF-8 text.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    /// Encoding failed while the frame was being produced.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl FrameError {
    /// Whether the failure lies with the event itself rather than with the
    /// destination consuming the frame. Such failures never justify dropping
    /// the destination.
    pub fn is_producer_fault(&self) -> bool {
        matches!(
            self,
            Self::Aborted | Self::TooLarge { .. } | Self::InvalidUtf8 | Self::Encode(_)
        )
    }
}

/// Invalid identity value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Session identities must contain at least one non-whitespace character.
    #[error("session id must not be empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_display() {
        let err = FrameError::TooLarge { limit: 1024 };
        assert_eq!(err.to_string(), "frame exceeds 1024 bytes");
    }

    #[test]
    fn producer_fault_classification() {
        assert!(FrameError::Aborted.is_producer_fault());
        assert!(FrameError::TooLarge { limit: 1 }.is_producer_fault());
        assert!(FrameError::InvalidUtf8.is_producer_fault());

        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: FrameError = EncodeError::from(json_err).into();
        assert!(err.is_producer_fault());
    }

    #[test]
    fn empty_id_display() {
        assert_eq!(IdError::Empty.to_string(), "session id must not be empty");
    }
}
