//! Insert payload

use crate::error::DestinationError;
use arrow::record_batch::RecordBatch;

/// Schema metadata key naming the destination table
pub const TABLE_NAME_METADATA_KEY: &str = "cq:table_name";

/// A record batch bound for one destination table
#[derive(Debug, Clone)]
pub struct Batch {
    table: String,
    record: RecordBatch,
}

impl Batch {
    pub fn new(table: impl Into<String>, record: RecordBatch) -> Self {
        Self {
            table: table.into(),
            record,
        }
    }

    /// Build a batch whose table name is read from the schema metadata
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the schema has no `cq:table_name` entry.
    pub fn from_record(record: RecordBatch) -> Result<Self, DestinationError> {
        let table = record
            .schema_ref()
            .metadata()
            .get(TABLE_NAME_METADATA_KEY)
            .cloned()
            .ok_or_else(|| {
                DestinationError::Configuration(format!(
                    "schema metadata has no '{}' entry",
                    TABLE_NAME_METADATA_KEY
                ))
            })?;
        Ok(Self::new(table, record))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn record(&self) -> &RecordBatch {
        &self.record
    }

    pub fn num_rows(&self) -> usize {
        self.record.num_rows()
    }
}
