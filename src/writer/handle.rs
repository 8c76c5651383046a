//! Per-table stream handle

use crate::config::DestinationConfig;
use crate::error::DestinationError;
use crate::observability::WriterMetrics;
use crate::transport::{Connection, PutStream};
use crate::writer::drain::{self, DrainExit};
use crate::writer::encoder::{encoded_size, BatchEncoder};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow_flight::FlightData;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Timing and size limits applied to every handle
#[derive(Debug, Clone, Copy)]
pub struct HandleSettings {
    pub close_timeout: Duration,
    pub drain_retry_interval: Duration,
    pub max_message_size: usize,
}

impl HandleSettings {
    pub fn from_config(config: &DestinationConfig) -> Self {
        Self {
            close_timeout: config.close_timeout,
            drain_retry_interval: config.drain_retry_interval,
            max_message_size: config.max_call_send_msg_size,
        }
    }
}

struct HandleState {
    sender: Option<mpsc::Sender<FlightData>>,
    encoder: BatchEncoder,
}

/// One live DoPut stream bound to a table
///
/// Writes are serialized by an internal lock so batches leave in the order
/// `write` was called. The handle owns its drain task; dropping the handle
/// cancels it.
pub struct StreamHandle {
    table: String,
    generation: u64,
    state: Mutex<HandleState>,
    cancel: CancellationToken,
    drain: std::sync::Mutex<Option<JoinHandle<DrainExit>>>,
    settings: HandleSettings,
}

impl StreamHandle {
    /// Open a DoPut stream on `connection` and start draining it
    ///
    /// # Errors
    ///
    /// Returns the connection's open error.
    pub async fn open(
        table: &str,
        schema: SchemaRef,
        connection: &dyn Connection,
        generation: u64,
        settings: HandleSettings,
        metrics: WriterMetrics,
    ) -> Result<Self, DestinationError> {
        let PutStream { sender, acks } = connection.open_put_stream(table).await?;

        let cancel = CancellationToken::new();
        let drain = tokio::spawn(drain::run(
            table.to_string(),
            acks,
            cancel.clone(),
            settings.drain_retry_interval,
            metrics,
        ));

        Ok(Self {
            table: table.to_string(),
            generation,
            state: Mutex::new(HandleState {
                sender: Some(sender),
                encoder: BatchEncoder::bind(table, schema),
            }),
            cancel,
            drain: std::sync::Mutex::new(Some(drain)),
            settings,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Generation of the connection this stream was opened on
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Encode and send one batch, returning the number of bytes sent
    ///
    /// # Errors
    ///
    /// - `StreamClosed` if the handle was closed or the remote end terminated
    ///   the stream
    /// - `MessageTooLarge` if an encoded message exceeds the send limit; the
    ///   stream stays usable
    /// - `Encoding` if the batch cannot be encoded against the bound schema
    pub async fn write(&self, record: &RecordBatch) -> Result<usize, DestinationError> {
        let mut guard = self.state.lock().await;
        let HandleState { sender, encoder } = &mut *guard;

        let sender = match sender {
            Some(sender) => sender,
            None => return Err(self.closed("stream handle is closed")),
        };

        let messages = encoder.encode(record)?;
        let largest = messages.iter().map(encoded_size).max().unwrap_or(0);
        if largest > self.settings.max_message_size {
            encoder.discard_last();
            return Err(DestinationError::MessageTooLarge {
                table: self.table.clone(),
                size: largest,
                limit: self.settings.max_message_size,
            });
        }

        let mut sent = 0;
        for message in messages {
            let size = encoded_size(&message);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(self.closed("stream handle was torn down"));
                }
                result = sender.send(message) => {
                    result.map_err(|_| self.closed("remote end terminated the stream"))?;
                }
            }
            sent += size;
        }
        Ok(sent)
    }

    /// Finish the stream gracefully
    ///
    /// Signals end-of-output, then waits for the server to finish
    /// acknowledging. Both waits share one `close_timeout` deadline; past it
    /// the drain task is cancelled. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Close` if the deadline passed or the drain task panicked.
    pub async fn close(&self) -> Result<(), DestinationError> {
        let timeout = self.settings.close_timeout;
        let deadline = Instant::now() + timeout;

        match tokio::time::timeout_at(deadline, self.state.lock()).await {
            Ok(mut state) => drop(state.sender.take()),
            Err(_) => {
                warn!(table = %self.table, "Timed out waiting for an in-flight write, cancelling");
                self.cancel.cancel();
                if let Some(drain) = self.take_drain() {
                    let _ = drain.await;
                }
                return Err(DestinationError::Close(format!(
                    "stream for table {} was still writing after {:?}",
                    self.table, timeout
                )));
            }
        }

        let Some(mut drain) = self.take_drain() else {
            return Ok(());
        };

        match tokio::time::timeout_at(deadline, &mut drain).await {
            Ok(Ok(exit)) => {
                debug!(table = %self.table, ?exit, "Stream closed");
                Ok(())
            }
            Ok(Err(e)) => Err(DestinationError::Close(format!(
                "drain task for table {} failed: {}",
                self.table, e
            ))),
            Err(_) => {
                self.cancel.cancel();
                let _ = drain.await;
                Err(DestinationError::Close(format!(
                    "drain task for table {} did not finish within {:?}",
                    self.table, timeout
                )))
            }
        }
    }

    /// Tear the stream down immediately
    ///
    /// Used once the stream is known to be dead: the drain is cancelled
    /// without waiting for trailing acknowledgments, a write stalled on flow
    /// control gives up, and later writes fail with `StreamClosed`.
    pub async fn invalidate(&self) {
        self.cancel.cancel();
        if let Some(drain) = self.take_drain() {
            let _ = drain.await;
        }
        self.state.lock().await.sender.take();
        debug!(table = %self.table, generation = self.generation, "Stream invalidated");
    }

    fn take_drain(&self) -> Option<JoinHandle<DrainExit>> {
        self.drain
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn closed(&self, reason: &str) -> DestinationError {
        DestinationError::StreamClosed {
            table: self.table.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
