//! Server configuration.

use std::time::Duration;

use beacon_settings::{BeaconSettings, PushBackend};

/// Runtime configuration for the push server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Transport served on `/push`.
    pub backend: PushBackend,
    /// Whether `POST /push/events` is routed.
    pub enable_publish_api: bool,
    /// Liveness probe period.
    pub ping_interval: Duration,
    /// Upper bound on a single probe.
    pub probe_timeout: Duration,
    /// Upper bound on one delivery to one connection.
    pub send_timeout: Duration,
    /// Upper bound on closing a superseded or evicted connection.
    pub close_timeout: Duration,
    /// Target encoded chunk size.
    pub chunk_size: usize,
    /// Outbound messages queued per connection.
    pub max_send_queue: usize,
    /// Largest encoded event accepted by a connection.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            backend: PushBackend::WebSocket,
            enable_publish_api: false,
            ping_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            chunk_size: beacon_core::DEFAULT_CHUNK_SIZE,
            max_send_queue: 256,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl From<&BeaconSettings> for ServerConfig {
    fn from(settings: &BeaconSettings) -> Self {
        let push = &settings.push;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            backend: push.backend,
            enable_publish_api: settings.server.enable_publish_api,
            ping_interval: Duration::from_millis(push.ping_interval_ms),
            probe_timeout: Duration::from_millis(push.probe_timeout_ms),
            send_timeout: Duration::from_millis(push.send_timeout_ms),
            close_timeout: Duration::from_millis(push.close_timeout_ms),
            chunk_size: push.chunk_size,
            max_send_queue: push.max_send_queue,
            max_message_size: push.max_message_size,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_ephemeral() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
        assert_eq!(cfg.ping_interval, Duration::from_secs(60));
    }

    #[test]
    fn from_settings_converts_units() {
        let mut settings = BeaconSettings::default();
        settings.server.port = 7000;
        settings.push.backend = PushBackend::Sse;
        settings.push.probe_timeout_ms = 2_500;
        settings.push.chunk_size = 4096;

        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:7000");
        assert_eq!(cfg.backend, PushBackend::Sse);
        assert_eq!(cfg.probe_timeout, Duration::from_millis(2_500));
        assert_eq!(cfg.ping_interval, Duration::from_secs(60));
        assert_eq!(cfg.chunk_size, 4096);
    }

    #[test]
    fn defaults_agree_with_settings_defaults() {
        let from_settings = ServerConfig::from(&BeaconSettings::default());
        let defaults = ServerConfig::default();
        assert_eq!(from_settings.send_timeout, defaults.send_timeout);
        assert_eq!(from_settings.close_timeout, defaults.close_timeout);
        assert_eq!(from_settings.max_send_queue, defaults.max_send_queue);
        assert_eq!(from_settings.max_message_size, defaults.max_message_size);
    }
}
