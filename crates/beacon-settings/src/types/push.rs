//! Push delivery settings.

use serde::{Deserialize, Serialize};

/// Transport clients use to receive pushed events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushBackend {
    /// Upgraded `WebSocket` connection.
    #[default]
    WebSocket,
    /// `text/event-stream` response.
    Sse,
}

impl PushBackend {
    /// Wire name used in settings and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Sse => "sse",
        }
    }
}

impl std::fmt::Display for PushBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PushBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::WebSocket),
            "sse" => Ok(Self::Sse),
            other => Err(format!("unknown push backend: {other}")),
        }
    }
}

/// Registry, dispatcher and liveness tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushSettings {
    /// Transport served on `/push`.
    pub backend: PushBackend,
    /// Period between liveness probes of every connection.
    pub ping_interval_ms: u64,
    /// Upper bound on a single probe.
    pub probe_timeout_ms: u64,
    /// Upper bound on delivering one event to one connection.
    pub send_timeout_ms: u64,
    /// Upper bound on closing a superseded or evicted connection.
    pub close_timeout_ms: u64,
    /// Target size of encoded chunks.
    pub chunk_size: usize,
    /// Outbound messages queued per connection before writes block.
    pub max_send_queue: usize,
    /// Largest single encoded event a connection will accept.
    pub max_message_size: usize,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            backend: PushBackend::WebSocket,
            ping_interval_ms: 60_000,
            probe_timeout_ms: 10_000,
            send_timeout_ms: 10_000,
            close_timeout_ms: 5_000,
            chunk_size: 16 * 1024,
            max_send_queue: 256,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_wire_names() {
        assert_eq!(serde_json::to_string(&PushBackend::WebSocket).unwrap(), "\"websocket\"");
        assert_eq!(serde_json::to_string(&PushBackend::Sse).unwrap(), "\"sse\"");
        let parsed: PushBackend = serde_json::from_str("\"sse\"").unwrap();
        assert_eq!(parsed, PushBackend::Sse);
    }

    #[test]
    fn backend_from_str() {
        assert_eq!("WebSocket".parse::<PushBackend>().unwrap(), PushBackend::WebSocket);
        assert_eq!("ws".parse::<PushBackend>().unwrap(), PushBackend::WebSocket);
        assert_eq!(" sse ".parse::<PushBackend>().unwrap(), PushBackend::Sse);
        assert!("polling".parse::<PushBackend>().is_err());
    }
}
