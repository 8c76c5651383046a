//! Inbound write messages

use crate::client::actions::DeleteRecord;
use crate::writer::Batch;
use arrow::datatypes::SchemaRef;
use chrono::{DateTime, Utc};

/// One message from the upstream sync, handled in arrival order
#[derive(Debug, Clone)]
pub enum WriteMessage {
    /// Create or update a table to match `schema`
    MigrateTable { schema: SchemaRef, force: bool },
    Insert(Batch),
    /// Delete rows of `table` written by `source_name` before `sync_time`
    DeleteStale {
        table: String,
        source_name: String,
        sync_time: DateTime<Utc>,
    },
    DeleteRecord(DeleteRecord),
}

impl WriteMessage {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            WriteMessage::MigrateTable { .. } => "migrate_table",
            WriteMessage::Insert(_) => "insert",
            WriteMessage::DeleteStale { .. } => "delete_stale",
            WriteMessage::DeleteRecord(_) => "delete_record",
        }
    }
}
