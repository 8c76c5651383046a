//! Shared connection slot
//!
//! Holds the current connection together with a generation number. Every
//! reconnect bumps the generation; a caller that observed generation `n`
//! and asks to reconnect only triggers a new dial if the slot is still at
//! `n`, so concurrent writers that saw the same closed stream reconnect once.

use crate::error::DestinationError;
use crate::observability::WriterMetrics;
use crate::transport::{Connection, Connector};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct Installed {
    generation: u64,
    connection: Arc<dyn Connection>,
}

/// The live connection, replaceable under an exclusive lock
pub struct ConnectionSlot {
    connector: Arc<dyn Connector>,
    current: RwLock<Installed>,
    metrics: WriterMetrics,
}

impl ConnectionSlot {
    /// Dial the first connection
    ///
    /// # Errors
    ///
    /// Returns whatever the connector returns; nothing is retried.
    pub async fn establish(
        connector: Arc<dyn Connector>,
        metrics: WriterMetrics,
    ) -> Result<Self, DestinationError> {
        let connection = connector.connect().await?;
        debug!("Initial connection established");
        Ok(Self {
            connector,
            current: RwLock::new(Installed {
                generation: 0,
                connection,
            }),
            metrics,
        })
    }

    /// The current connection and its generation
    pub async fn current(&self) -> (u64, Arc<dyn Connection>) {
        let installed = self.current.read().await;
        (installed.generation, Arc::clone(&installed.connection))
    }

    pub async fn generation(&self) -> u64 {
        self.current.read().await.generation
    }

    /// Replace the connection if it is still at generation `observed`
    ///
    /// Returns the generation in effect afterwards. The old connection is
    /// closed after the lock is released; a failure there is only logged.
    ///
    /// # Errors
    ///
    /// Returns the connector's error; the old connection stays installed.
    pub async fn reconnect(&self, observed: u64) -> Result<u64, DestinationError> {
        let (generation, old) = {
            let mut installed = self.current.write().await;
            if installed.generation != observed {
                debug!(
                    "Skipping reconnect: generation already advanced from {} to {}",
                    observed, installed.generation
                );
                return Ok(installed.generation);
            }

            let connection = self.connector.connect().await?;
            let old = std::mem::replace(&mut installed.connection, connection);
            installed.generation += 1;
            info!("Reconnected, connection generation {}", installed.generation);
            (installed.generation, old)
        };

        if let Err(e) = old.close().await {
            warn!("Failed to close previous connection: {}", e);
        }
        self.metrics.record_reconnect();
        Ok(generation)
    }

    /// Close the current connection
    pub async fn close(&self) -> Result<(), DestinationError> {
        let (_, connection) = self.current().await;
        connection.close().await
    }
}
