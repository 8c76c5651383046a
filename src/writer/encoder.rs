//! Arrow IPC encoding for DoPut
//!
//! A [`BatchEncoder`] is bound to one table and schema. The first encoded
//! batch is preceded by the schema message carrying the table's flight
//! descriptor; dictionaries are tracked across batches so each is only sent
//! when it changes.

use crate::error::DestinationError;
use arrow::datatypes::SchemaRef;
use arrow::ipc::writer::{DictionaryTracker, IpcDataGenerator, IpcWriteOptions};
use arrow::record_batch::RecordBatch;
use arrow_flight::{FlightData, FlightDescriptor, SchemaAsIpc};

/// Stateful per-stream encoder
pub struct BatchEncoder {
    table: String,
    schema: SchemaRef,
    options: IpcWriteOptions,
    generator: IpcDataGenerator,
    dictionaries: DictionaryTracker,
    schema_sent: bool,
    last_included_schema: bool,
}

impl BatchEncoder {
    pub fn bind(table: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            table: table.into(),
            schema,
            options: IpcWriteOptions::default(),
            generator: IpcDataGenerator::default(),
            dictionaries: DictionaryTracker::new(false),
            schema_sent: false,
            last_included_schema: false,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Encode one batch into the FlightData messages to send, in order
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if the batch's fields differ from the bound schema
    /// or IPC encoding fails.
    pub fn encode(&mut self, batch: &RecordBatch) -> Result<Vec<FlightData>, DestinationError> {
        if batch.schema_ref().fields() != self.schema.fields() {
            return Err(DestinationError::Encoding(format!(
                "batch schema does not match the schema bound to table {}",
                self.table
            )));
        }

        let (encoded_dictionaries, encoded_batch) =
            self.generator
                .encoded_batch(batch, &mut self.dictionaries, &self.options)?;

        let mut messages = Vec::with_capacity(encoded_dictionaries.len() + 2);
        self.last_included_schema = !self.schema_sent;
        if !self.schema_sent {
            let schema: FlightData = SchemaAsIpc::new(self.schema.as_ref(), &self.options).into();
            messages.push(schema.with_descriptor(self.descriptor()));
            self.schema_sent = true;
        }
        messages.extend(encoded_dictionaries.into_iter().map(FlightData::from));
        messages.push(FlightData::from(encoded_batch));
        Ok(messages)
    }

    /// Forget the state recorded by the last [`encode`](Self::encode) call
    ///
    /// Used when the encoded messages were never sent. Dictionaries are
    /// re-sent with the next batch.
    pub fn discard_last(&mut self) {
        if self.last_included_schema {
            self.schema_sent = false;
            self.last_included_schema = false;
        }
        self.dictionaries = DictionaryTracker::new(false);
    }

    fn descriptor(&self) -> FlightDescriptor {
        FlightDescriptor::new_path(vec![self.table.clone()])
    }
}

/// Wire size of one message, excluding framing
pub fn encoded_size(message: &FlightData) -> usize {
    message.data_header.len() + message.data_body.len() + message.app_metadata.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    fn batch(ids: Vec<i64>) -> RecordBatch {
        let names: Vec<Option<String>> = ids.iter().map(|i| Some(format!("row-{}", i))).collect();
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_schema_sent_once_with_descriptor() {
        let mut encoder = BatchEncoder::bind("events", schema());

        let first = encoder.encode(&batch(vec![1, 2])).unwrap();
        assert_eq!(first.len(), 2);
        let descriptor = first[0].flight_descriptor.as_ref().unwrap();
        assert_eq!(descriptor.path, vec!["events".to_string()]);
        assert!(first[1].flight_descriptor.is_none());

        let second = encoder.encode(&batch(vec![3])).unwrap();
        assert_eq!(second.len(), 1);
        assert!(encoded_size(&second[0]) > 0);
    }

    #[test]
    fn test_discard_last_resends_schema() {
        let mut encoder = BatchEncoder::bind("events", schema());
        encoder.encode(&batch(vec![1])).unwrap();
        encoder.discard_last();

        let again = encoder.encode(&batch(vec![1])).unwrap();
        assert_eq!(again.len(), 2);
        assert!(again[0].flight_descriptor.is_some());
    }

    #[test]
    fn test_schema_mismatch() {
        let mut encoder = BatchEncoder::bind("events", schema());
        let other = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let record =
            RecordBatch::try_new(other, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        let err = encoder.encode(&record).unwrap_err();
        assert!(matches!(err, DestinationError::Encoding(_)));
    }
}
