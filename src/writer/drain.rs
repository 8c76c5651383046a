//! Acknowledgment drain task
//!
//! Every stream handle runs one of these so the server's `PutResult`s are
//! always being read and the outbound side never stalls on unread responses.

use crate::observability::WriterMetrics;
use crate::transport::AckStream;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Why a drain task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainExit {
    Cancelled,
    EndOfStream,
    Failed(tonic::Code),
}

fn is_transient(code: tonic::Code) -> bool {
    matches!(code, tonic::Code::Unavailable | tonic::Code::ResourceExhausted)
}

/// Consume acknowledgments until cancelled, the stream ends, or a fatal error
pub async fn run(
    table: String,
    mut acks: AckStream,
    cancel: CancellationToken,
    retry_interval: Duration,
    metrics: WriterMetrics,
) -> DrainExit {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return DrainExit::Cancelled,
            next = acks.next() => next,
        };

        match next {
            None => {
                debug!(table = %table, "Acknowledgment stream ended");
                return DrainExit::EndOfStream;
            }
            Some(Ok(ack)) => {
                debug!(
                    table = %table,
                    app_metadata = %String::from_utf8_lossy(&ack.app_metadata),
                    "Received acknowledgment"
                );
                metrics.record_ack(&table);
            }
            Some(Err(status)) if is_transient(status.code()) => {
                warn!(
                    table = %table,
                    "Transient error receiving acknowledgment, retrying in {:?}: {}",
                    retry_interval,
                    status.message()
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return DrainExit::Cancelled,
                    _ = tokio::time::sleep(retry_interval) => {}
                }
            }
            Some(Err(status)) if status.code() == tonic::Code::Cancelled => {
                debug!(table = %table, "Acknowledgment stream cancelled");
                return DrainExit::Cancelled;
            }
            Some(Err(status)) => {
                error!(
                    table = %table,
                    code = ?status.code(),
                    "Failed to receive acknowledgment: {}",
                    status.message()
                );
                return DrainExit::Failed(status.code());
            }
        }
    }
}
