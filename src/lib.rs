//! Arrow Flight Destination
//!
//! Streams Arrow `RecordBatch` data to a remote table service over Arrow
//! Flight `DoPut`, keeping one persistent stream per destination table.
//! Streams closed by the server are torn down, the shared connection is
//! replaced, and the write is retried with a bounded, linear backoff.
//!
//! # Features
//!
//! - One DoPut stream per table, opened lazily and reused
//! - Background draining of server acknowledgments
//! - Reconnect and retry on closed streams, deduplicated across writers
//! - Table migration, stale/record deletion and table reads as one-shot calls
//! - Flight handshake authentication and optional TLS
//! - `tracing` logging and OpenTelemetry metrics over OTLP
//!
//! # Example
//!
//! ```no_run
//! use arrow_flight_destination::{Batch, DestinationClient, DestinationConfig};
//! use arrow::record_batch::RecordBatch;
//!
//! # async fn example(record: RecordBatch) -> Result<(), arrow_flight_destination::DestinationError> {
//! let config = DestinationConfig::new("localhost:50051".to_string())
//!     .with_handshake("secret".to_string());
//! let client = DestinationClient::connect(config).await?;
//!
//! client.insert(&Batch::new("events", record)).await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod transport;
pub mod writer;

pub use client::{DestinationClient, WriteMessage};
pub use config::{DestinationConfig, ObservabilityConfig};
pub use error::DestinationError;
pub use writer::{Batch, StreamWriter};
