//! Stream writer metric instruments
//!
//! Instruments come from the global `MeterProvider`; without one installed
//! (see [`crate::observability::ObservabilityManager`]) they are no-ops.

use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::{global, KeyValue};

/// Counters for the stream writer, all tagged with the destination table
#[derive(Clone)]
pub struct WriterMetrics {
    batches_written: Counter<u64>,
    rows_written: Counter<u64>,
    bytes_written: Counter<u64>,
    stream_opens: Counter<u64>,
    streams_closed: Counter<u64>,
    reconnects: Counter<u64>,
    acks_received: Counter<u64>,
    write_failures: Counter<u64>,
}

impl WriterMetrics {
    pub fn new() -> Self {
        let meter: Meter = global::meter("arrow-flight-destination");
        Self::from_meter(&meter)
    }

    /// Create instruments from an explicit [`Meter`].
    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            batches_written: meter
                .u64_counter("flight.writer.batches_written")
                .with_description("Record batches written to DoPut streams")
                .build(),
            rows_written: meter
                .u64_counter("flight.writer.rows_written")
                .with_description("Rows written to DoPut streams")
                .build(),
            bytes_written: meter
                .u64_counter("flight.writer.bytes_written")
                .with_description("Encoded bytes written to DoPut streams")
                .build(),
            stream_opens: meter
                .u64_counter("flight.writer.stream_opens")
                .with_description("DoPut streams opened")
                .build(),
            streams_closed: meter
                .u64_counter("flight.writer.streams_closed")
                .with_description("Writes that found the stream closed by the server")
                .build(),
            reconnects: meter
                .u64_counter("flight.writer.reconnects")
                .with_description("Connection replacements")
                .build(),
            acks_received: meter
                .u64_counter("flight.writer.acks_received")
                .with_description("PutResult acknowledgments drained")
                .build(),
            write_failures: meter
                .u64_counter("flight.writer.write_failures")
                .with_description("Inserts that failed after the retry protocol")
                .build(),
        }
    }

    pub fn record_batch_written(&self, table: &str, rows: usize, bytes: usize) {
        let attrs = [table_attr(table)];
        self.batches_written.add(1, &attrs);
        self.rows_written.add(rows as u64, &attrs);
        self.bytes_written.add(bytes as u64, &attrs);
    }

    pub fn record_stream_open(&self, table: &str) {
        self.stream_opens.add(1, &[table_attr(table)]);
    }

    pub fn record_stream_closed(&self, table: &str) {
        self.streams_closed.add(1, &[table_attr(table)]);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.add(1, &[]);
    }

    pub fn record_ack(&self, table: &str) {
        self.acks_received.add(1, &[table_attr(table)]);
    }

    pub fn record_write_failure(&self, table: &str) {
        self.write_failures.add(1, &[table_attr(table)]);
    }
}

impl Default for WriterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn table_attr(table: &str) -> KeyValue {
    KeyValue::new("table", table.to_string())
}
