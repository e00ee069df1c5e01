//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format and `#[serde(default)]` so partial JSON fills the rest from
//! [`Default`].

mod logging;
mod push;
mod server;

pub use logging::*;
pub use push::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the Beacon push server.
///
/// ```json
/// {
///   "server": { "port": 5679 },
///   "push": { "backend": "sse", "pingIntervalMs": 30000 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeaconSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Connection registry, delivery and liveness settings.
    pub push: PushSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl Default for BeaconSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "beacon".to_string(),
            server: ServerSettings::default(),
            push: PushSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl BeaconSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let push = &self.push;
        let positive = [
            ("push.pingIntervalMs", push.ping_interval_ms),
            ("push.probeTimeoutMs", push.probe_timeout_ms),
            ("push.sendTimeoutMs", push.send_timeout_ms),
            ("push.closeTimeoutMs", push.close_timeout_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{key} must be positive")));
            }
        }
        if push.chunk_size == 0 {
            return Err(SettingsError::InvalidValue(
                "push.chunkSize must be positive".to_string(),
            ));
        }
        if push.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "push.maxSendQueue must be positive".to_string(),
            ));
        }
        if push.max_message_size < push.chunk_size {
            return Err(SettingsError::InvalidValue(
                "push.maxMessageSize must be at least push.chunkSize".to_string(),
            ));
        }
        if push.probe_timeout_ms >= push.ping_interval_ms {
            return Err(SettingsError::InvalidValue(
                "push.probeTimeoutMs must be shorter than push.pingIntervalMs".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::LogFormat;

    #[test]
    fn defaults() {
        let settings = BeaconSettings::default();
        assert_eq!(settings.name, "beacon");
        assert_eq!(settings.server.port, 5678);
        assert!(!settings.server.enable_publish_api);
        assert_eq!(settings.push.backend, PushBackend::WebSocket);
        assert_eq!(settings.push.ping_interval_ms, 60_000);
        assert_eq!(settings.push.chunk_size, 16 * 1024);
        assert_eq!(settings.logging.format, LogFormat::Compact);
        settings.validate().unwrap();
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(BeaconSettings::default()).unwrap();
        assert_eq!(json["push"]["pingIntervalMs"], 60_000);
        assert_eq!(json["push"]["backend"], "websocket");
        assert_eq!(json["server"]["enablePublishApi"], false);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: BeaconSettings =
            serde_json::from_str(r#"{"push": {"backend": "sse"}}"#).unwrap();
        assert_eq!(settings.push.backend, PushBackend::Sse);
        assert_eq!(settings.push.send_timeout_ms, 10_000);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut settings = BeaconSettings::default();
        settings.push.send_timeout_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("push.sendTimeoutMs"));
    }

    #[test]
    fn validate_rejects_probe_longer_than_interval() {
        let mut settings = BeaconSettings::default();
        settings.push.ping_interval_ms = 5_000;
        settings.push.probe_timeout_ms = 5_000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_message_limit_below_chunk() {
        let mut settings = BeaconSettings::default();
        settings.push.max_message_size = 1024;
        assert!(settings.validate().is_err());
    }
}
