//! Destination client
//!
//! [`DestinationClient`] owns the shared connection, the per-table stream
//! writer and, when configured, the metrics exporter. Inserts go through the
//! stream writer; table management and reads are one-shot calls on the
//! current connection.

pub mod actions;
pub mod connection_tester;
pub mod message;
pub mod read;

use crate::config::DestinationConfig;
use crate::error::DestinationError;
use crate::observability::{ObservabilityManager, WriterMetrics};
use crate::transport::{ConnectionSlot, Connector, FlightConnector};
use crate::writer::{Batch, StreamWriter};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use arrow_flight::Action;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use actions::DeleteRecord;
pub use message::WriteMessage;

pub struct DestinationClient {
    config: Arc<DestinationConfig>,
    slot: Arc<ConnectionSlot>,
    writer: StreamWriter,
    observability: Option<ObservabilityManager>,
}

impl DestinationClient {
    /// Connect to the Flight service named in `config`
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an invalid config, or the connect and
    /// handshake error.
    pub async fn connect(config: DestinationConfig) -> Result<Self, DestinationError> {
        config.validate()?;
        let connector = Arc::new(FlightConnector::new(Arc::new(config.clone())));
        Self::with_connector(config, connector).await
    }

    /// Build a client on top of an arbitrary [`Connector`]
    pub async fn with_connector(
        config: DestinationConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, DestinationError> {
        info!("Initializing destination client for {}", config.addr);
        config.validate()?;

        let observability = ObservabilityManager::new(config.observability.as_ref())?;
        let metrics = WriterMetrics::new();

        let slot = Arc::new(ConnectionSlot::establish(connector, metrics.clone()).await?);
        let writer = StreamWriter::new(Arc::clone(&slot), &config, metrics);

        Ok(Self {
            config: Arc::new(config),
            slot,
            writer,
            observability,
        })
    }

    pub fn config(&self) -> &DestinationConfig {
        &self.config
    }

    pub fn writer(&self) -> &StreamWriter {
        &self.writer
    }

    pub async fn insert(&self, batch: &Batch) -> Result<(), DestinationError> {
        self.writer.insert(batch).await
    }

    /// Insert batches in order, stopping at the first failure
    pub async fn insert_batch(&self, batches: &[Batch]) -> Result<(), DestinationError> {
        for batch in batches {
            self.writer.insert(batch).await?;
        }
        Ok(())
    }

    /// Apply a stream of write messages in order
    ///
    /// # Errors
    ///
    /// Returns the error of the first message that fails; later messages are
    /// not consumed.
    pub async fn write<S>(&self, messages: S) -> Result<(), DestinationError>
    where
        S: Stream<Item = WriteMessage> + Send,
    {
        futures::pin_mut!(messages);
        while let Some(message) = messages.next().await {
            let kind = message.kind();
            let result = match message {
                WriteMessage::MigrateTable { schema, force } => {
                    self.migrate_table(&schema, force).await.map(drop)
                }
                WriteMessage::Insert(batch) => self.insert(&batch).await,
                WriteMessage::DeleteStale {
                    table,
                    source_name,
                    sync_time,
                } => self
                    .delete_stale(&table, &source_name, sync_time)
                    .await
                    .map(drop),
                WriteMessage::DeleteRecord(request) => {
                    self.delete_record(request).await.map(drop)
                }
            };
            if let Err(e) = result {
                error!(kind, "Failed to apply write message: {}", e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Create or update the table described by `schema`
    pub async fn migrate_table(
        &self,
        schema: &Schema,
        force: bool,
    ) -> Result<Option<Bytes>, DestinationError> {
        debug!(force, "Migrating table");
        let action = actions::MigrateTable::new(schema, force)?.into_action();
        self.do_action(action).await
    }

    pub async fn delete_stale(
        &self,
        table: &str,
        source_name: &str,
        sync_time: DateTime<Utc>,
    ) -> Result<Option<Bytes>, DestinationError> {
        debug!(table = %table, source_name, %sync_time, "Deleting stale rows");
        let action = actions::DeleteStale::new(table, source_name, sync_time).into_action();
        self.do_action(action).await
    }

    pub async fn delete_record(
        &self,
        request: DeleteRecord,
    ) -> Result<Option<Bytes>, DestinationError> {
        debug!(table = %request.table_name, "Deleting records");
        self.do_action(request.into_action()).await
    }

    pub async fn read_table(&self, table: &str) -> Result<Vec<RecordBatch>, DestinationError> {
        let (_, connection) = self.slot.current().await;
        read::read_table(connection.as_ref(), table).await
    }

    async fn do_action(&self, action: Action) -> Result<Option<Bytes>, DestinationError> {
        let action_type = action.r#type.clone();
        let (_, connection) = self.slot.current().await;
        let body = connection.do_action(action).await?;
        if let Some(body) = &body {
            debug!(
                action = %action_type,
                body = %String::from_utf8_lossy(body),
                "Action result"
            );
        }
        Ok(body)
    }

    /// Close every stream, then the connection
    ///
    /// The connection is closed even when some streams fail to close; all
    /// failures are returned together.
    pub async fn close(&self) -> Result<(), DestinationError> {
        info!("Closing destination client");
        let mut errors = Vec::new();

        if let Err(e) = self.writer.close().await {
            warn!("Error closing streams: {}", e);
            match e {
                DestinationError::Multiple(inner) => errors.extend(inner),
                other => errors.push(other),
            }
        }
        if let Err(e) = self.slot.close().await {
            errors.push(e);
        }
        if let Some(observability) = &self.observability {
            if let Err(e) = observability.shutdown() {
                warn!("Error shutting down metrics export: {}", e);
            }
        }

        match DestinationError::join(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
