//! Configuration types for the Arrow Flight destination
//!
//! This module defines the configuration structures and validation logic.

use crate::error::DestinationError;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_CALL_RECV_MSG_SIZE: usize = 4_000_000;
pub const DEFAULT_MAX_CALL_SEND_MSG_SIZE: usize = 2_147_483_647;
pub const DEFAULT_BATCH_SIZE: u64 = 10_000;
pub const DEFAULT_BATCH_SIZE_BYTES: u64 = 100_000_000;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DRAIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// OpenTelemetry metrics export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// OTLP gRPC endpoint, e.g. `http://localhost:4317`
    pub endpoint: String,
    /// Export interval in seconds (default: 30)
    #[serde(default = "default_export_interval")]
    pub export_interval_secs: u64,
}

fn default_export_interval() -> u64 {
    30
}

/// Complete configuration for a destination client
///
/// Connection settings, the thresholds handed to the external batcher, and the
/// timing knobs of the stream writer's retry protocol.
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    /// Address of the Flight service (`host:port` or `http(s)://host:port`)
    pub addr: String,
    /// Secret sent during the Flight handshake (optional)
    pub handshake: Option<SecretString>,
    /// Token attached to every call; replaced by the handshake response
    pub token: Option<SecretString>,
    /// Maximum message size in bytes the client can receive
    pub max_call_recv_msg_size: usize,
    /// Maximum message size in bytes the client can send
    pub max_call_send_msg_size: usize,
    pub tls_enabled: bool,
    /// Server name used to verify the hostname on returned certificates
    pub tls_server_name: Option<String>,
    pub tls_insecure_skip_verify: bool,
    /// Maximum rows per batch (external batcher)
    pub batch_size: u64,
    /// Maximum bytes per batch (external batcher)
    pub batch_size_bytes: u64,
    /// Maximum time a batch is held before flushing (external batcher)
    pub batch_timeout: Duration,
    /// Unit of the linear reconnect backoff
    pub write_timeout: Duration,
    /// Maximum attempts per batch when the stream keeps closing
    pub max_retries: u32,
    /// Upper bound on waiting for a stream's trailing acknowledgments
    pub close_timeout: Duration,
    /// Pause between receive attempts after a transient drain error
    pub drain_retry_interval: Duration,
    /// Log level filter for tracing (default: "info")
    pub log_level: String,
    /// Metrics export (optional)
    pub observability: Option<ObservabilityConfig>,
}

impl DestinationConfig {
    /// Create a new configuration with defaults
    ///
    /// # Example
    ///
    /// ```
    /// use arrow_flight_destination::DestinationConfig;
    ///
    /// let config = DestinationConfig::new("localhost:9090".to_string());
    /// assert_eq!(config.max_retries, 3);
    /// ```
    pub fn new(addr: String) -> Self {
        Self {
            addr,
            handshake: None,
            token: None,
            max_call_recv_msg_size: DEFAULT_MAX_CALL_RECV_MSG_SIZE,
            max_call_send_msg_size: DEFAULT_MAX_CALL_SEND_MSG_SIZE,
            tls_enabled: false,
            tls_server_name: None,
            tls_insecure_skip_verify: false,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_size_bytes: DEFAULT_BATCH_SIZE_BYTES,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            drain_retry_interval: DEFAULT_DRAIN_RETRY_INTERVAL,
            log_level: "info".to_string(),
            observability: None,
        }
    }

    /// Set the handshake secret
    pub fn with_handshake(mut self, handshake: String) -> Self {
        self.handshake = Some(SecretString::new(handshake));
        self
    }

    /// Set the static authentication token
    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(SecretString::new(token));
        self
    }

    /// Enable TLS
    ///
    /// # Arguments
    ///
    /// * `server_name` - Optional name to verify the server certificate against
    pub fn with_tls(mut self, server_name: Option<String>) -> Self {
        self.tls_enabled = true;
        self.tls_server_name = server_name;
        self
    }

    /// Set message size limits
    pub fn with_message_limits(mut self, max_recv: usize, max_send: usize) -> Self {
        self.max_call_recv_msg_size = max_recv;
        self.max_call_send_msg_size = max_send;
        self
    }

    /// Set retry configuration
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Maximum attempts per batch
    /// * `write_timeout` - Unit of the linear backoff between attempts
    pub fn with_retry_config(mut self, max_retries: u32, write_timeout: Duration) -> Self {
        self.max_retries = max_retries;
        self.write_timeout = write_timeout;
        self
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    pub fn with_drain_retry_interval(mut self, interval: Duration) -> Self {
        self.drain_retry_interval = interval;
        self
    }

    /// Set the thresholds used by the external batcher
    pub fn with_batching(mut self, rows: u64, bytes: u64, timeout: Duration) -> Self {
        self.batch_size = rows;
        self.batch_size_bytes = bytes;
        self.batch_timeout = timeout;
        self
    }

    /// Set metrics export configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability = Some(config);
        self
    }

    /// Endpoint URI for the gRPC channel
    ///
    /// Adds an `http://` or `https://` scheme (depending on TLS) when the
    /// address is a bare `host:port`.
    pub fn endpoint_uri(&self) -> String {
        let addr = self.addr.trim();
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else if self.tls_enabled {
            format!("https://{}", addr)
        } else {
            format!("http://{}", addr)
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if:
    /// - `addr` is empty or does not parse as a URI
    /// - any size, count or duration is zero
    /// - `log_level` is not a valid level
    pub fn validate(&self) -> Result<(), DestinationError> {
        if self.addr.trim().is_empty() {
            return Err(DestinationError::Configuration(
                "`addr` is required".to_string(),
            ));
        }

        let uri = self.endpoint_uri();
        let parsed = url::Url::parse(&uri).map_err(|e| {
            DestinationError::Configuration(format!("invalid addr '{}': {}", self.addr, e))
        })?;
        if parsed.host_str().is_none() {
            return Err(DestinationError::Configuration(format!(
                "addr '{}' has no host",
                self.addr
            )));
        }

        if self.max_call_recv_msg_size == 0 {
            return Err(DestinationError::Configuration(
                "max_call_recv_msg_size must be > 0".to_string(),
            ));
        }
        if self.max_call_send_msg_size == 0 {
            return Err(DestinationError::Configuration(
                "max_call_send_msg_size must be > 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(DestinationError::Configuration(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.batch_size_bytes == 0 {
            return Err(DestinationError::Configuration(
                "batch_size_bytes must be > 0".to_string(),
            ));
        }
        if self.batch_timeout.is_zero() {
            return Err(DestinationError::Configuration(
                "batch_timeout must be > 0".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(DestinationError::Configuration(
                "max_retries must be > 0".to_string(),
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(DestinationError::Configuration(
                "write_timeout must be > 0".to_string(),
            ));
        }
        if self.close_timeout.is_zero() {
            return Err(DestinationError::Configuration(
                "close_timeout must be > 0".to_string(),
            ));
        }
        if self.drain_retry_interval.is_zero() {
            return Err(DestinationError::Configuration(
                "drain_retry_interval must be > 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(DestinationError::Configuration(format!(
                "log_level must be one of {:?}, got: '{}'",
                VALID_LOG_LEVELS, self.log_level
            )));
        }

        if let Some(obs) = &self.observability {
            if !obs.endpoint.starts_with("https://") && !obs.endpoint.starts_with("http://") {
                return Err(DestinationError::Configuration(format!(
                    "observability endpoint must start with 'https://' or 'http://', got: '{}'",
                    obs.endpoint
                )));
            }
            if obs.export_interval_secs == 0 {
                return Err(DestinationError::Configuration(
                    "export_interval_secs must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
