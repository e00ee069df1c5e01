//! HTTP listener settings.

use serde::{Deserialize, Serialize};

/// Where the push server listens and which optional routes it exposes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Expose `POST /push/events` for out-of-process producers.
    pub enable_publish_api: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5678,
            enable_publish_api: false,
        }
    }
}
