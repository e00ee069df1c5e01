//! # beacon-settings
//!
//! Layered configuration for the Beacon push server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BeaconSettings::default()`]
//! 2. **User file**: `~/.beacon/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `BEACON_*` overrides (highest priority)
//!
//! Command-line flags of the daemon are applied on top by the caller.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_is_under_beacon_dir() {
        let path = settings_path();
        assert!(path.ends_with(".beacon/settings.json"));
    }

    #[test]
    fn re_exports_work() {
        let settings = BeaconSettings::default();
        assert_eq!(settings.push.backend, PushBackend::WebSocket);
    }
}
