//! Table name to stream handle registry
//!
//! Lookups take the shared lock. Creation and removal take the exclusive
//! lock, and creation re-checks under it, so at most one handle per table is
//! ever live. Once [`WriterRegistry::remove_all`] has run, creation is
//! refused. Opening a stream happens while the exclusive lock is held,
//! which may briefly take the connection slot's read lock; the reconnect path
//! never takes this lock while holding the slot's.

use crate::error::DestinationError;
use crate::observability::WriterMetrics;
use crate::transport::ConnectionSlot;
use crate::writer::handle::{HandleSettings, StreamHandle};
use arrow::datatypes::SchemaRef;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct WriterRegistry {
    handles: RwLock<HashMap<String, Arc<StreamHandle>>>,
    closed: AtomicBool,
    settings: HandleSettings,
    metrics: WriterMetrics,
}

impl WriterRegistry {
    pub fn new(settings: HandleSettings, metrics: WriterMetrics) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            settings,
            metrics,
        }
    }

    pub async fn get(&self, table: &str) -> Option<Arc<StreamHandle>> {
        self.handles.read().await.get(table).cloned()
    }

    /// Return the live handle for `table`, opening one if there is none
    ///
    /// # Errors
    ///
    /// Returns the open error, or `WriterClosed` after `remove_all`; nothing
    /// is registered in either case.
    pub async fn get_or_create(
        &self,
        table: &str,
        schema: &SchemaRef,
        slot: &ConnectionSlot,
    ) -> Result<Arc<StreamHandle>, DestinationError> {
        if let Some(handle) = self.get(table).await {
            return Ok(handle);
        }

        let mut handles = self.handles.write().await;
        if let Some(handle) = handles.get(table) {
            return Ok(Arc::clone(handle));
        }
        if self.is_closed() {
            return Err(DestinationError::WriterClosed);
        }

        let (generation, connection) = slot.current().await;
        let handle = Arc::new(
            StreamHandle::open(
                table,
                Arc::clone(schema),
                connection.as_ref(),
                generation,
                self.settings,
                self.metrics.clone(),
            )
            .await?,
        );
        handles.insert(table.to_string(), Arc::clone(&handle));
        self.metrics.record_stream_open(table);
        info!(table = %table, generation, "Opened stream");
        Ok(handle)
    }

    /// Remove `table`'s entry if it is still `handle`
    ///
    /// Returns whether an entry was removed.
    pub async fn remove(&self, table: &str, handle: &Arc<StreamHandle>) -> bool {
        let mut handles = self.handles.write().await;
        match handles.get(table) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                handles.remove(table);
                true
            }
            _ => false,
        }
    }

    /// Remove and return every handle, and refuse to open new ones
    pub async fn remove_all(&self) -> Vec<Arc<StreamHandle>> {
        let mut handles = self.handles.write().await;
        self.closed.store(true, Ordering::SeqCst);
        handles.drain().map(|(_, handle)| handle).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Remove and return handles opened before connection `generation`
    pub async fn remove_stale(&self, generation: u64) -> Vec<Arc<StreamHandle>> {
        let mut handles = self.handles.write().await;
        let stale: Vec<String> = handles
            .iter()
            .filter(|(_, handle)| handle.generation() < generation)
            .map(|(table, _)| table.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|table| handles.remove(&table))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }

    /// Tables with a live handle, sorted
    pub async fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.handles.read().await.keys().cloned().collect();
        tables.sort();
        tables
    }
}
