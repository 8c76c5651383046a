//! Common test utilities and mocks
//!
//! This module provides shared test infrastructure for all test modules.

#![allow(dead_code)]

mod mocks;

pub use mocks::*;

use arrow::array::{Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow_flight_destination::{Batch, DestinationClient, DestinationConfig};
use std::sync::Arc;
use std::time::Duration;

pub fn test_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
    ]))
}

/// A batch with one row per id, named `row-<id>`
pub fn create_test_record_batch(ids: &[i64]) -> RecordBatch {
    let names: Vec<String> = ids.iter().map(|id| format!("row-{}", id)).collect();
    RecordBatch::try_new(
        test_schema(),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(StringArray::from(names)),
        ],
    )
    .expect("Failed to create test RecordBatch")
}

pub fn batch(table: &str, ids: &[i64]) -> Batch {
    Batch::new(table, create_test_record_batch(ids))
}

/// Configuration with millisecond timings so retry paths run quickly
pub fn create_test_config() -> DestinationConfig {
    DestinationConfig::new("localhost:50051".to_string())
        .with_retry_config(3, Duration::from_millis(10))
        .with_close_timeout(Duration::from_millis(200))
        .with_drain_retry_interval(Duration::from_millis(5))
}

pub async fn create_test_client(connector: &MockConnector) -> DestinationClient {
    create_test_client_with(connector, create_test_config()).await
}

pub async fn create_test_client_with(
    connector: &MockConnector,
    config: DestinationConfig,
) -> DestinationClient {
    DestinationClient::with_connector(config, Arc::new(connector.clone()))
        .await
        .expect("Failed to create test client")
}

/// All `id` values across `batches`, in order
pub fn ids(batches: &[RecordBatch]) -> Vec<i64> {
    batches
        .iter()
        .flat_map(|b| {
            let column = b
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .expect("id column");
            (0..column.len()).map(|i| column.value(i)).collect::<Vec<_>>()
        })
        .collect()
}
