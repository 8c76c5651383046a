//! Example: stream a few batches to an Arrow Flight service
//!
//! Configuration comes from `ARROWFLIGHT_*` environment variables, e.g.
//!
//! ```text
//! ARROWFLIGHT_ADDR=localhost:50051 ARROWFLIGHT_HANDSHAKE=secret cargo run --example ingest
//! ```

use anyhow::Context;
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow_flight_destination::config::loader;
use arrow_flight_destination::observability::init_logging;
use arrow_flight_destination::{Batch, DestinationClient, WriteMessage};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = loader::load_from_env().context("failed to load configuration")?;
    init_logging(&config.log_level, false);

    let table = std::env::var("ARROWFLIGHT_TABLE").unwrap_or_else(|_| "events".to_string());
    let schema = Arc::new(
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("score", DataType::Float64, false),
        ])
        .with_metadata(HashMap::from([(
            arrow_flight_destination::writer::TABLE_NAME_METADATA_KEY.to_string(),
            table.clone(),
        )])),
    );

    let client = DestinationClient::connect(config)
        .await
        .context("failed to connect")?;

    let mut messages = vec![WriteMessage::MigrateTable {
        schema: Arc::clone(&schema),
        force: false,
    }];
    for chunk in 0..3i64 {
        let ids: Vec<i64> = (chunk * 100..chunk * 100 + 100).collect();
        let record = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Int64Array::from(ids.clone())),
                Arc::new(StringArray::from(
                    ids.iter().map(|i| format!("row-{}", i)).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(
                    ids.iter().map(|i| *i as f64 * 0.5).collect::<Vec<_>>(),
                )),
            ],
        )?;
        messages.push(WriteMessage::Insert(Batch::from_record(record)?));
    }
    messages.push(WriteMessage::DeleteStale {
        table: table.clone(),
        source_name: "ingest-example".to_string(),
        sync_time: Utc::now(),
    });

    client
        .write(futures::stream::iter(messages))
        .await
        .context("write failed")?;

    let batches = client.read_table(&table).await.context("read failed")?;
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    println!("Table {} now has {} row(s) in {} batch(es)", table, rows, batches.len());

    client.close().await.context("close failed")?;
    Ok(())
}
