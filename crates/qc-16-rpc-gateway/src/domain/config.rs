//! Gateway configuration with validation.

use crate::domain::error::ConfigError;
use crate::domain::setup::ServerSection;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listening ports
    pub server: ServerSection,
    /// JSON-RPC request limits
    pub rpc: RpcConfig,
    /// Resource accounting thresholds
    pub resources: ResourceConfig,
    /// Job scheduler configuration
    pub jobs: JobQueueConfig,
    /// Logging configuration
    pub telemetry: TelemetryConfig,
    /// Run without the peer network
    pub standalone: bool,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.max_request_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_size cannot be 0".into(),
            ));
        }

        if self.resources.drop_threshold <= 0 {
            return Err(ConfigError::InvalidLimit(
                "drop_threshold must be positive".into(),
            ));
        }

        if self.resources.warning_threshold > self.resources.drop_threshold {
            return Err(ConfigError::InvalidLimit(
                "warning_threshold cannot exceed drop_threshold".into(),
            ));
        }

        if self.resources.decay_window.as_secs() == 0 {
            return Err(ConfigError::InvalidTimeout(
                "decay_window must be at least 1s".into(),
            ));
        }

        if self.jobs.max_concurrent_client_jobs == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_concurrent_client_jobs cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// JSON-RPC request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Max request body size in bytes
    pub max_request_size: usize,
    /// Replies longer than this are truncated in debug logs
    pub max_logged_reply: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_request_size: 1_000_000,
            max_logged_reply: 10_000,
        }
    }
}

/// Resource accounting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Balance at which a consumer is warned
    pub warning_threshold: i64,
    /// Balance at which a consumer is disconnected
    pub drop_threshold: i64,
    /// Time over which accumulated cost decays
    #[serde(with = "humantime_serde")]
    pub decay_window: Duration,
    /// Idle entries older than this are forgotten
    #[serde(with = "humantime_serde")]
    pub expiration: Duration,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 5_000,
            drop_threshold: 15_000,
            decay_window: Duration::from_secs(32),
            expiration: Duration::from_secs(300),
        }
    }
}

/// Job scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobQueueConfig {
    /// Client RPC jobs allowed to run at once
    pub max_concurrent_client_jobs: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_client_jobs: 64,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rpc.max_request_size, 1_000_000);
        assert_eq!(config.resources.drop_threshold, 15_000);
    }

    #[test]
    fn test_zero_request_size() {
        let mut config = GatewayConfig::default();
        config.rpc.max_request_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));
    }

    #[test]
    fn test_warning_above_drop() {
        let mut config = GatewayConfig::default();
        config.resources.warning_threshold = 20_000;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));
    }

    #[test]
    fn test_zero_decay_window() {
        let mut config = GatewayConfig::default();
        config.resources.decay_window = Duration::from_millis(10);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_parse_duration_units() {
        use super::humantime_serde::parse_duration;
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("32s"), Ok(Duration::from_secs(32)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("7"), Ok(Duration::from_secs(7)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = serde_json::json!({
            "rpc": { "max_request_size": 4096 },
            "resources": { "decay_window": "10s" },
            "standalone": true
        });
        let config: GatewayConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.rpc.max_request_size, 4096);
        assert_eq!(config.rpc.max_logged_reply, 10_000);
        assert_eq!(config.resources.decay_window, Duration::from_secs(10));
        assert!(config.standalone);
    }
}
