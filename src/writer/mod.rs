//! Streaming writer
//!
//! [`StreamWriter`] keeps one DoPut stream per destination table and drives
//! the retry/reconnect protocol when a stream is terminated by the server.
//!
//! An insert resolves (or opens) the table's [`StreamHandle`] and writes the
//! batch. If the write fails with `StreamClosed`, the handle is removed and
//! torn down, the shared connection is replaced (once, even if several
//! writers noticed the same failure), and the batch is retried on a fresh
//! handle after a linear backoff. Any other failure ends the insert at once.

pub mod batch;
pub mod drain;
pub mod encoder;
pub mod handle;
pub mod registry;
pub mod retry;

use crate::config::DestinationConfig;
use crate::error::DestinationError;
use crate::observability::WriterMetrics;
use crate::transport::ConnectionSlot;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use batch::{Batch, TABLE_NAME_METADATA_KEY};
pub use handle::{HandleSettings, StreamHandle};
pub use registry::WriterRegistry;
pub use retry::RetryPolicy;

pub struct StreamWriter {
    slot: Arc<ConnectionSlot>,
    registry: WriterRegistry,
    retry: RetryPolicy,
    metrics: WriterMetrics,
}

impl StreamWriter {
    pub fn new(
        slot: Arc<ConnectionSlot>,
        config: &DestinationConfig,
        metrics: WriterMetrics,
    ) -> Self {
        Self {
            slot,
            registry: WriterRegistry::new(HandleSettings::from_config(config), metrics.clone()),
            retry: RetryPolicy::from_config(config),
            metrics,
        }
    }

    pub fn registry(&self) -> &WriterRegistry {
        &self.registry
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Write one batch to its table's stream
    ///
    /// # Errors
    ///
    /// Returns `WriterClosed` once [`StreamWriter::close`] has started, else
    /// `WriteFailed` carrying the error that ended the last attempt. Only
    /// `StreamClosed` is retried, up to `max_retries` attempts in total.
    pub async fn insert(&self, batch: &Batch) -> Result<(), DestinationError> {
        if self.registry.is_closed() {
            return Err(DestinationError::WriterClosed);
        }
        let table = batch.table();
        let schema = batch.record().schema();
        let mut attempt: u32 = 1;
        let mut reconnects: u32 = 0;

        loop {
            let handle = match self.registry.get_or_create(table, &schema, &self.slot).await {
                Ok(handle) => handle,
                Err(e) => return Err(self.fail(table, attempt, reconnects, e, None)),
            };

            let closed = match handle.write(batch.record()).await {
                Ok(bytes) => {
                    self.metrics.record_batch_written(table, batch.num_rows(), bytes);
                    debug!(
                        table = %table,
                        attempt,
                        rows = batch.num_rows(),
                        bytes,
                        "Wrote batch"
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(self.fail(table, attempt, reconnects, e, None)),
            };

            warn!(table = %table, attempt, "Stream closed during write: {}", closed);
            self.metrics.record_stream_closed(table);
            self.registry.remove(table, &handle).await;
            handle.invalidate().await;

            match self.slot.reconnect(handle.generation()).await {
                Ok(generation) => {
                    reconnects += 1;
                    self.drop_stale(generation).await;
                }
                Err(e) => return Err(self.fail(table, attempt, reconnects, closed, Some(e))),
            }

            attempt += 1;
            if !self.retry.allows(attempt) {
                return Err(self.fail(table, attempt - 1, reconnects, closed, None));
            }

            let delay = self.retry.backoff(attempt - 1);
            info!(table = %table, attempt, "Retrying write in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Close every stream concurrently
    ///
    /// Inserts that have not opened their stream yet fail from here on.
    ///
    /// # Errors
    ///
    /// Returns the close errors joined together; every handle is attempted.
    pub async fn close(&self) -> Result<(), DestinationError> {
        let handles = self.registry.remove_all().await;
        info!("Closing {} stream(s)", handles.len());

        let errors: Vec<DestinationError> = join_all(handles.iter().map(|h| h.close()))
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        match DestinationError::join(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn drop_stale(&self, generation: u64) {
        let stale = self.registry.remove_stale(generation).await;
        if stale.is_empty() {
            return;
        }
        debug!(
            generation,
            "Tearing down {} stream(s) from the previous connection",
            stale.len()
        );
        join_all(stale.iter().map(|h| h.invalidate())).await;
    }

    fn fail(
        &self,
        table: &str,
        attempts: u32,
        reconnects: u32,
        cause: DestinationError,
        reconnect: Option<DestinationError>,
    ) -> DestinationError {
        self.metrics.record_write_failure(table);
        DestinationError::WriteFailed {
            table: table.to_string(),
            attempts,
            reconnects,
            cause: Box::new(cause),
            reconnect: reconnect.map(Box::new),
        }
    }
}
