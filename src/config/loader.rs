//! Configuration loader for the Arrow Flight destination
//!
//! This module handles loading configuration from a JSON spec, YAML files and
//! environment variables. All three go through [`SpecFile`], so defaults and
//! validation are identical whatever the source.

use crate::config::types::{
    ObservabilityConfig, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_SIZE_BYTES,
    DEFAULT_MAX_CALL_RECV_MSG_SIZE, DEFAULT_MAX_CALL_SEND_MSG_SIZE, DEFAULT_MAX_RETRIES,
};
use crate::config::DestinationConfig;
use crate::error::DestinationError;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Serialized configuration (JSON spec or YAML file)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecFile {
    pub addr: String,
    #[serde(default)]
    pub handshake: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_max_recv")]
    pub max_call_recv_msg_size: usize,
    #[serde(default = "default_max_send")]
    pub max_call_send_msg_size: usize,
    #[serde(default)]
    pub tls_enabled: bool,
    #[serde(default)]
    pub tls_server_name: Option<String>,
    #[serde(default)]
    pub tls_insecure_skip_verify: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_batch_size_bytes")]
    pub batch_size_bytes: u64,
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout: String,
    #[serde(default = "default_write_timeout")]
    pub write_timeout: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_close_timeout")]
    pub close_timeout: String,
    #[serde(default = "default_drain_retry_interval")]
    pub drain_retry_interval: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub observability: Option<ObservabilityConfig>,
}

fn default_max_recv() -> usize {
    DEFAULT_MAX_CALL_RECV_MSG_SIZE
}

fn default_max_send() -> usize {
    DEFAULT_MAX_CALL_SEND_MSG_SIZE
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_batch_size_bytes() -> u64 {
    DEFAULT_BATCH_SIZE_BYTES
}

fn default_batch_timeout() -> String {
    "60s".to_string()
}

fn default_write_timeout() -> String {
    "10s".to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_close_timeout() -> String {
    "10s".to_string()
}

fn default_drain_retry_interval() -> String {
    "1s".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SpecFile {
    /// Convert into a validated [`DestinationConfig`]
    pub fn into_config(self) -> Result<DestinationConfig, DestinationError> {
        let mut config = DestinationConfig::new(self.addr);
        config.handshake = self.handshake.map(SecretString::new);
        config.token = self.token.map(SecretString::new);
        config.max_call_recv_msg_size = self.max_call_recv_msg_size;
        config.max_call_send_msg_size = self.max_call_send_msg_size;
        config.tls_enabled = self.tls_enabled;
        config.tls_server_name = self.tls_server_name;
        config.tls_insecure_skip_verify = self.tls_insecure_skip_verify;
        config.batch_size = self.batch_size;
        config.batch_size_bytes = self.batch_size_bytes;
        config.batch_timeout = parse_duration("batch_timeout", &self.batch_timeout)?;
        config.write_timeout = parse_duration("write_timeout", &self.write_timeout)?;
        config.max_retries = self.max_retries;
        config.close_timeout = parse_duration("close_timeout", &self.close_timeout)?;
        config.drain_retry_interval =
            parse_duration("drain_retry_interval", &self.drain_retry_interval)?;
        config.log_level = self.log_level;
        config.observability = self.observability;

        config.validate()?;
        Ok(config)
    }
}

/// Parse a duration such as `500ms`, `10s`, `5m` or `1h`
pub fn parse_duration(field: &str, value: &str) -> Result<Duration, DestinationError> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let amount: u64 = number.parse().map_err(|_| {
        DestinationError::Configuration(format!(
            "{} must be a duration like '10s', got: '{}'",
            field, value
        ))
    })?;

    let seconds = |scale: u64| {
        amount.checked_mul(scale).ok_or_else(|| {
            DestinationError::Configuration(format!("{} is out of range: '{}'", field, value))
        })
    };

    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "s" | "" => Duration::from_secs(amount),
        "m" => Duration::from_secs(seconds(60)?),
        "h" => Duration::from_secs(seconds(3600)?),
        _ => {
            return Err(DestinationError::Configuration(format!(
                "{} has unknown unit '{}'",
                field, unit
            )))
        }
    };
    Ok(duration)
}

/// Load configuration from a JSON spec
///
/// This is the format the destination is configured with by its host.
pub fn load_from_json(spec: &[u8]) -> Result<DestinationConfig, DestinationError> {
    let file: SpecFile = serde_json::from_slice(spec).map_err(|e| {
        DestinationError::Configuration(format!("failed to unmarshal spec: {}", e))
    })?;
    file.into_config()
}

/// Load configuration from YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<DestinationConfig, DestinationError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        DestinationError::Configuration(format!(
            "Failed to read config file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;

    let file: SpecFile = serde_yaml::from_str(&content)
        .map_err(|e| DestinationError::Configuration(format!("Failed to parse YAML: {}", e)))?;
    file.into_config()
}

/// Load configuration from environment variables
///
/// Every field is read from `ARROWFLIGHT_<FIELD>` (upper case), e.g.
/// `ARROWFLIGHT_ADDR`, `ARROWFLIGHT_MAX_RETRIES`. Metrics export is enabled by
/// `ARROWFLIGHT_OTLP_ENDPOINT`.
pub fn load_from_env() -> Result<DestinationConfig, DestinationError> {
    let addr = std::env::var("ARROWFLIGHT_ADDR").map_err(|_| {
        DestinationError::Configuration(
            "ARROWFLIGHT_ADDR environment variable is required".to_string(),
        )
    })?;

    let mut file = SpecFile {
        addr,
        handshake: env("HANDSHAKE"),
        token: env("TOKEN"),
        max_call_recv_msg_size: env_parsed("MAX_CALL_RECV_MSG_SIZE")?
            .unwrap_or(DEFAULT_MAX_CALL_RECV_MSG_SIZE),
        max_call_send_msg_size: env_parsed("MAX_CALL_SEND_MSG_SIZE")?
            .unwrap_or(DEFAULT_MAX_CALL_SEND_MSG_SIZE),
        tls_enabled: env("TLS_ENABLED").as_deref() == Some("true"),
        tls_server_name: env("TLS_SERVER_NAME"),
        tls_insecure_skip_verify: env("TLS_INSECURE_SKIP_VERIFY").as_deref() == Some("true"),
        batch_size: env_parsed("BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE),
        batch_size_bytes: env_parsed("BATCH_SIZE_BYTES")?.unwrap_or(DEFAULT_BATCH_SIZE_BYTES),
        batch_timeout: env("BATCH_TIMEOUT").unwrap_or_else(default_batch_timeout),
        write_timeout: env("WRITE_TIMEOUT").unwrap_or_else(default_write_timeout),
        max_retries: env_parsed("MAX_RETRIES")?.unwrap_or(DEFAULT_MAX_RETRIES),
        close_timeout: env("CLOSE_TIMEOUT").unwrap_or_else(default_close_timeout),
        drain_retry_interval: env("DRAIN_RETRY_INTERVAL")
            .unwrap_or_else(default_drain_retry_interval),
        log_level: env("LOG_LEVEL").unwrap_or_else(default_log_level),
        observability: None,
    };

    if let Some(endpoint) = env("OTLP_ENDPOINT") {
        file.observability = Some(ObservabilityConfig {
            endpoint,
            export_interval_secs: env_parsed("OTLP_EXPORT_INTERVAL_SECS")?.unwrap_or(30),
        });
    }

    file.into_config()
}

fn env(field: &str) -> Option<String> {
    std::env::var(format!("ARROWFLIGHT_{}", field)).ok()
}

fn env_parsed<T: std::str::FromStr>(field: &str) -> Result<Option<T>, DestinationError> {
    match env(field) {
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            DestinationError::Configuration(format!(
                "ARROWFLIGHT_{} has an invalid value: '{}'",
                field, raw
            ))
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(spec: &str) -> Result<DestinationConfig, DestinationError> {
        load_from_json(spec.as_bytes())
    }

    #[test]
    fn test_addr_is_required() {
        assert!(load("{}").is_err());
        assert!(load(r#"{"addr": ""}"#).is_err());
        assert!(load(r#"{"addr": null}"#).is_err());
        assert!(load(r#"{"addr": 123}"#).is_err());
        assert!(load(r#"{"addr": "abc"}"#).is_ok());
    }

    #[test]
    fn test_batch_size_must_be_positive_integer() {
        assert!(load(r#"{"addr": "abc", "batch_size": 0}"#).is_err());
        assert!(load(r#"{"addr": "abc", "batch_size": -1}"#).is_err());
        assert!(load(r#"{"addr": "abc", "batch_size": 1.5}"#).is_err());
        assert!(load(r#"{"addr": "abc", "batch_size": null}"#).is_err());
        assert!(load(r#"{"addr": "abc", "batch_size": "123"}"#).is_err());
        assert_eq!(
            load(r#"{"addr": "abc", "batch_size": 123}"#)
                .unwrap()
                .batch_size,
            123
        );
    }

    #[test]
    fn test_batch_size_bytes_must_be_positive_integer() {
        assert!(load(r#"{"addr": "abc", "batch_size_bytes": 0}"#).is_err());
        assert!(load(r#"{"addr": "abc", "batch_size_bytes": null}"#).is_err());
        assert!(load(r#"{"addr": "abc", "batch_size_bytes": 123}"#).is_ok());
    }

    #[test]
    fn test_batch_timeout() {
        assert!(load(r#"{"addr": "abc", "batch_timeout": ""}"#).is_err());
        assert!(load(r#"{"addr": "abc", "batch_timeout": null}"#).is_err());
        let config = load(r#"{"addr": "abc", "batch_timeout": "30s"}"#).unwrap();
        assert_eq!(config.batch_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(load(r#"{"addr": "abc", "adress": "typo"}"#).is_err());
    }

    #[test]
    fn test_invalid_json_message() {
        let err = load("invalid").unwrap_err();
        assert!(err.to_string().contains("failed to unmarshal spec"));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(
            parse_duration("t", "250ms").unwrap(),
            Duration::from_millis(250)
        );
        assert_eq!(parse_duration("t", "10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("t", "2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("t", "1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("t", "7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("t", "10 parsecs").is_err());
        assert!(parse_duration("t", "s").is_err());

        let err = parse_duration("t", "307445734561825861m").unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(parse_duration("t", "5124095576030432h").is_err());
        assert!(load(r#"{"addr": "abc", "batch_timeout": "307445734561825861m"}"#).is_err());
    }
}
