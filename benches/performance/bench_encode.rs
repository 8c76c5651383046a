//! Performance benchmark for DoPut batch encoding
//!
//! Measures how long a bound encoder takes to turn a RecordBatch into
//! FlightData messages once the schema has been sent.

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow_flight_destination::writer::encoder::{encoded_size, BatchEncoder};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn create_test_batch(num_rows: usize) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("value", DataType::Int64, false),
    ]);

    let id_array = Int64Array::from((0..num_rows).map(|i| i as i64).collect::<Vec<_>>());
    let name_array = StringArray::from(
        (0..num_rows)
            .map(|i| format!("name_{}", i))
            .collect::<Vec<_>>(),
    );
    let value_array = Int64Array::from((0..num_rows).map(|i| (i * 7) as i64).collect::<Vec<_>>());

    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(id_array),
            Arc::new(name_array),
            Arc::new(value_array),
        ],
    )
    .unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for num_rows in [100, 1_000, 10_000] {
        let batch = create_test_batch(num_rows);
        let mut encoder = BatchEncoder::bind("bench", batch.schema());
        // Send the schema once so iterations measure steady-state batches.
        encoder.encode(&batch).unwrap();

        group.throughput(Throughput::Elements(num_rows as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_rows", num_rows)),
            &batch,
            |b, batch| {
                b.iter(|| {
                    let messages = encoder.encode(black_box(batch)).unwrap();
                    black_box(messages.iter().map(encoded_size).sum::<usize>())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
