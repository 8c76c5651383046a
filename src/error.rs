//! Error types for the Arrow Flight destination
//!
//! This module defines all error types used throughout the crate. Only
//! `StreamClosed` is considered transient; every other variant is fatal for
//! the operation that produced it.

use thiserror::Error;

/// Error type for destination operations
#[derive(Debug, Clone, Error)]
pub enum DestinationError {
    /// Invalid configuration error
    ///
    /// Occurs when configuration values are invalid or missing required fields.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection could not be established
    ///
    /// Occurs when dialing the Flight endpoint fails. Never retried on its own,
    /// but a reconnect during write retry may surface it again.
    #[error("Connection error: {0}")]
    Connect(String),

    /// Handshake with the Flight service failed
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Opening a DoPut stream failed
    #[error("Failed to open stream for table {table}: {reason}")]
    Open { table: String, reason: String },

    /// Arrow IPC encoding of a batch failed
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Encoded batch exceeds the configured send limit
    #[error("Encoded batch for table {table} is {size} bytes, exceeding the send limit of {limit} bytes")]
    MessageTooLarge {
        table: String,
        size: usize,
        limit: usize,
    },

    /// The remote end terminated the stream
    ///
    /// The only condition that drives the reconnect protocol.
    #[error("Stream closed for table {table}: {reason}")]
    StreamClosed { table: String, reason: String },

    /// Any other transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Closing a stream or connection failed or timed out
    #[error("Close error: {0}")]
    Close(String),

    /// A DoAction call failed
    #[error("Action {action} failed: {reason}")]
    Action { action: String, reason: String },

    /// Reading a table failed
    #[error("Read error: {0}")]
    Read(String),

    /// An insert failed after the retry protocol gave up
    ///
    /// Carries the error that ended the last attempt. `reconnects` counts the
    /// connection replacements that succeeded during the insert; `reconnect`
    /// is the error of the one that failed, if any.
    #[error("{}", write_failed_message(.table, .attempts, .cause, .reconnect))]
    WriteFailed {
        table: String,
        attempts: u32,
        reconnects: u32,
        cause: Box<DestinationError>,
        reconnect: Option<Box<DestinationError>>,
    },

    /// The writer is shutting down and accepts no new streams
    #[error("Writer is closed")]
    WriterClosed,

    /// Several independent failures, e.g. closing every stream on shutdown
    #[error("{}", join_messages(.0))]
    Multiple(Vec<DestinationError>),
}

fn write_failed_message(
    table: &str,
    attempts: &u32,
    cause: &DestinationError,
    reconnect: &Option<Box<DestinationError>>,
) -> String {
    match reconnect {
        Some(reconnect) => format!(
            "Write to table {} failed after {} attempt(s): {}; reconnect failed: {}",
            table, attempts, cause, reconnect
        ),
        None => format!(
            "Write to table {} failed after {} attempt(s): {}",
            table, attempts, cause
        ),
    }
}

fn join_messages(errors: &[DestinationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl DestinationError {
    /// Check if the error is retryable
    ///
    /// Returns true only for `StreamClosed`: encoding failures, oversize
    /// messages and other transport errors are deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DestinationError::StreamClosed { .. })
    }

    /// Combine a list of errors into one, if there are any
    pub fn join(mut errors: Vec<DestinationError>) -> Option<DestinationError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(DestinationError::Multiple(errors)),
        }
    }
}

impl From<tonic::transport::Error> for DestinationError {
    fn from(e: tonic::transport::Error) -> Self {
        DestinationError::Connect(e.to_string())
    }
}

impl From<arrow::error::ArrowError> for DestinationError {
    fn from(e: arrow::error::ArrowError) -> Self {
        DestinationError::Encoding(e.to_string())
    }
}
