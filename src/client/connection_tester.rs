//! Connection test used before a sync starts
//!
//! Parses and validates a JSON spec, then dials and authenticates once.

use crate::config::loader::load_from_json;
use crate::transport::{Connector, FlightConnector};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const INVALID_SPEC: &str = "INVALID_SPEC";
pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";

/// A failed connection test with a machine-readable code
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct TestConnectionError {
    pub code: &'static str,
    pub message: String,
}

/// Validate `spec` and connect to the configured service
///
/// # Errors
///
/// Returns `INVALID_SPEC` for unparsable or invalid specs and
/// `CONNECTION_FAILED` when dialing or the handshake fails.
pub async fn test_connection(spec: &[u8]) -> Result<(), TestConnectionError> {
    let config = load_from_json(spec).map_err(|e| TestConnectionError {
        code: INVALID_SPEC,
        message: e.to_string(),
    })?;
    let connector = FlightConnector::new(Arc::new(config));
    test_with_connector(&connector).await
}

/// Connect once with `connector` and close the connection again
pub async fn test_with_connector(connector: &dyn Connector) -> Result<(), TestConnectionError> {
    let connection = connector
        .connect()
        .await
        .map_err(|e| TestConnectionError {
            code: CONNECTION_FAILED,
            message: e.to_string(),
        })?;

    if let Err(e) = connection.close().await {
        warn!("Failed to close test connection: {}", e);
    }
    info!("Connection test succeeded");
    Ok(())
}
