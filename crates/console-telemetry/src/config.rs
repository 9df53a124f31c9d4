// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Pipeline configuration.
//!
//! A [`TelemetryConfig`] is supplied once when the pipeline is configured
//! and is immutable for the pipeline's lifetime. Validation failures never
//! reach logging callers; they downgrade the pipeline to console-only
//! mode.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::device::DeviceSpec;
use crate::error::ConfigError;

/// Flush when this many entries are buffered. Overridable per config.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Periodic flush interval, so low-traffic periods never hold entries
/// indefinitely.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Delivery attempts per flush before the batch goes back to the buffer.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-request transport timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Overflow file name inside the durable storage directory.
pub const OVERFLOW_FILE_NAME: &str = "telemetry-overflow.json";

/// Immutable pipeline configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Collector base URL, e.g. `https://telemetry.example.com`.
    pub endpoint: String,
    /// Bearer credential sent with every batch.
    pub auth_token: String,
    /// Size-based flush trigger.
    pub batch_size: usize,
    /// Time-based flush trigger.
    pub flush_interval: Duration,
    /// Delivery attempts per flush before requeueing the batch.
    pub max_retries: u32,
    /// Per-request transport timeout.
    pub send_timeout: Duration,
    /// Mirror every entry to the local console.
    pub console_mirror: bool,
    /// When false the pipeline runs with a no-op transport; the buffer,
    /// scheduler, and overflow machinery still operate normally.
    pub transport_enabled: bool,
    /// Where the overflow file lives between an overflow event and the
    /// next startup.
    pub overflow_path: PathBuf,
    /// Platform facts snapshotted into every entry.
    pub device: DeviceSpec,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            endpoint: String::new(),
            auth_token: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            console_mirror: true,
            transport_enabled: true,
            overflow_path: PathBuf::from(OVERFLOW_FILE_NAME),
            device: DeviceSpec {
                hardware_id: "unknown".to_string(),
                os_version: "unknown".to_string(),
                app_version: env!("CARGO_PKG_VERSION").to_string(),
                build_number: "0".to_string(),
            },
        }
    }
}

impl TelemetryConfig {
    /// Builds a configuration from `TELEMETRY_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = TelemetryConfig::default();

        let batch_size = env::var("TELEMETRY_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.batch_size);
        let flush_interval = env::var("TELEMETRY_FLUSH_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(defaults.flush_interval, Duration::from_secs);
        let max_retries = env::var("TELEMETRY_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);
        let console_mirror = env::var("TELEMETRY_CONSOLE_MIRROR")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);
        let transport_enabled = env::var("TELEMETRY_TRANSPORT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);
        let overflow_path = env::var("TELEMETRY_OVERFLOW_PATH")
            .map_or(defaults.overflow_path, PathBuf::from);

        TelemetryConfig {
            endpoint: env::var("TELEMETRY_ENDPOINT").unwrap_or_default(),
            auth_token: env::var("TELEMETRY_AUTH_TOKEN").unwrap_or_default(),
            batch_size,
            flush_interval,
            max_retries,
            send_timeout: defaults.send_timeout,
            console_mirror,
            transport_enabled,
            overflow_path,
            device: defaults.device,
        }
    }

    /// Checks that the configuration is sufficient for shipping.
    ///
    /// A config that fails validation still works in console-only mode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if reqwest::Url::parse(&self.endpoint).is_err() {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.auth_token.trim().is_empty() {
            return Err(ConfigError::MissingAuthToken);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> TelemetryConfig {
        TelemetryConfig {
            endpoint: "https://telemetry.example.com".to_string(),
            auth_token: "token-123".to_string(),
            ..TelemetryConfig::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = TelemetryConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert!(config.console_mirror);
        assert!(config.transport_enabled);
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn missing_endpoint_fails_validation() {
        let config = TelemetryConfig {
            endpoint: String::new(),
            ..valid_config()
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingEndpoint));
    }

    #[test]
    fn malformed_endpoint_fails_validation() {
        let config = TelemetryConfig {
            endpoint: "not a url".to_string(),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn missing_auth_token_fails_validation() {
        let config = TelemetryConfig {
            auth_token: "  ".to_string(),
            ..valid_config()
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingAuthToken));
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let config = TelemetryConfig {
            batch_size: 0,
            ..valid_config()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatchSize));
    }
}
