//! One-shot DoAction payloads
//!
//! Table management requests are sent as Flight actions whose bodies are
//! protobuf messages. Schemas and predicate values travel as Arrow IPC bytes.

use crate::error::DestinationError;
use arrow::datatypes::Schema;
use arrow::ipc::writer::StreamWriter as IpcStreamWriter;
use arrow::record_batch::RecordBatch;
use arrow_flight::Action;
use chrono::{DateTime, Utc};
use prost::Message;

pub const MIGRATE_TABLE: &str = "MigrateTable";
pub const DELETE_STALE: &str = "DeleteStale";
pub const DELETE_RECORD: &str = "DeleteRecord";

#[derive(Clone, PartialEq, Message)]
pub struct MigrateTable {
    /// IPC-encoded table schema
    #[prost(bytes = "vec", tag = "1")]
    pub table: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub migrate_force: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeleteStale {
    #[prost(string, tag = "1")]
    pub source_name: String,
    #[prost(message, optional, tag = "2")]
    pub sync_time: Option<prost_types::Timestamp>,
    #[prost(string, tag = "3")]
    pub table_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Operator {
    Eq = 0,
}

#[derive(Clone, PartialEq, Message)]
pub struct Predicate {
    #[prost(enumeration = "Operator", tag = "1")]
    pub operator: i32,
    #[prost(string, tag = "2")]
    pub column: String,
    /// IPC stream holding a single-row batch with the comparison value
    #[prost(bytes = "vec", tag = "3")]
    pub record: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum GroupingType {
    And = 0,
    Or = 1,
}

#[derive(Clone, PartialEq, Message)]
pub struct PredicatesGroup {
    #[prost(enumeration = "GroupingType", tag = "1")]
    pub grouping_type: i32,
    #[prost(message, repeated, tag = "2")]
    pub predicates: Vec<Predicate>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TableRelation {
    #[prost(string, tag = "1")]
    pub table_name: String,
    #[prost(string, tag = "2")]
    pub parent_table: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeleteRecord {
    #[prost(string, tag = "1")]
    pub table_name: String,
    #[prost(message, repeated, tag = "2")]
    pub where_clause: Vec<PredicatesGroup>,
    #[prost(message, repeated, tag = "3")]
    pub table_relations: Vec<TableRelation>,
}

impl MigrateTable {
    /// # Errors
    ///
    /// Returns `Encoding` if the schema cannot be serialized.
    pub fn new(schema: &Schema, migrate_force: bool) -> Result<Self, DestinationError> {
        Ok(Self {
            table: schema_to_bytes(schema)?,
            migrate_force,
        })
    }

    pub fn into_action(self) -> Action {
        Action::new(MIGRATE_TABLE, self.encode_to_vec())
    }
}

impl DeleteStale {
    pub fn new(table_name: &str, source_name: &str, sync_time: DateTime<Utc>) -> Self {
        Self {
            source_name: source_name.to_string(),
            sync_time: Some(prost_types::Timestamp {
                seconds: sync_time.timestamp(),
                nanos: sync_time.timestamp_subsec_nanos() as i32,
            }),
            table_name: table_name.to_string(),
        }
    }

    pub fn into_action(self) -> Action {
        Action::new(DELETE_STALE, self.encode_to_vec())
    }
}

impl Predicate {
    /// Build an equality predicate against the first row of `value`
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if `value` cannot be written as an IPC stream.
    pub fn equals(column: &str, value: &RecordBatch) -> Result<Self, DestinationError> {
        Ok(Self {
            operator: Operator::Eq as i32,
            column: column.to_string(),
            record: record_to_bytes(value)?,
        })
    }
}

impl DeleteRecord {
    pub fn into_action(self) -> Action {
        Action::new(DELETE_RECORD, self.encode_to_vec())
    }
}

/// Serialize a schema as an Arrow IPC stream with no batches
pub fn schema_to_bytes(schema: &Schema) -> Result<Vec<u8>, DestinationError> {
    let mut writer = IpcStreamWriter::try_new(Vec::new(), schema)?;
    writer.finish()?;
    Ok(writer.into_inner()?)
}

/// Serialize a batch as a complete Arrow IPC stream
pub fn record_to_bytes(record: &RecordBatch) -> Result<Vec<u8>, DestinationError> {
    let mut writer = IpcStreamWriter::try_new(Vec::new(), record.schema_ref())?;
    writer.write(record)?;
    writer.finish()?;
    Ok(writer.into_inner()?)
}
