//! Table read via GetFlightInfo + DoGet

use crate::error::DestinationError;
use crate::transport::Connection;
use arrow::record_batch::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::error::FlightError;
use arrow_flight::FlightDescriptor;
use futures::TryStreamExt;
use tracing::debug;

/// Fetch every batch of `table`, endpoint by endpoint
///
/// # Errors
///
/// Returns `Read` if the flight info cannot be fetched, an endpoint has no
/// ticket, or a DoGet stream fails to decode.
pub async fn read_table(
    connection: &dyn Connection,
    table: &str,
) -> Result<Vec<RecordBatch>, DestinationError> {
    debug!(table = %table, "Reading table");
    let descriptor = FlightDescriptor::new_path(vec![table.to_string()]);
    let info = connection.get_flight_info(descriptor).await?;

    let mut batches = Vec::new();
    for (index, endpoint) in info.endpoint.into_iter().enumerate() {
        let ticket = endpoint.ticket.ok_or_else(|| {
            DestinationError::Read(format!("endpoint {} of table {} has no ticket", index, table))
        })?;

        let data = connection.do_get(ticket).await?.map_err(FlightError::from);
        let mut stream = FlightRecordBatchStream::new_from_flight_data(data);
        while let Some(batch) = stream.try_next().await.map_err(|e| {
            DestinationError::Read(format!("failed to decode table {}: {}", table, e))
        })? {
            batches.push(batch);
        }
    }

    debug!(table = %table, batches = batches.len(), "Read table");
    Ok(batches)
}
