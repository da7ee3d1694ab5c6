//! Benchmarks for identifier normalization and row loading
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use schema_tools::models::{FieldDefinition, Row, TableDefinition};
use schema_tools::naming::{to_display_form, to_storage_form};
use schema_tools::rows::load_rows;
use schema_tools::typemap::{GeometryKind, SchemaType};
use serde_json::json;

/// Generate distinct identifiers so most calls miss the memo cache
fn generate_identifiers(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("verlenging sluitingstijd {i} per jaar per m2"))
        .collect()
}

/// Benchmark both directions on a fixed identifier (served from the cache)
fn bench_cached_identifiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_identifiers");

    let test_cases = vec![
        ("short", "id"),
        ("camel", "numbers33InTheMiddle44"),
        ("snake", "numbers_33_in_the_middle_44"),
        ("relation", "brk_kadastrale_objecten:is_ontstaan_uit"),
    ];

    for (name, value) in test_cases {
        group.bench_with_input(BenchmarkId::new("display", name), &value, |b, value| {
            b.iter(|| black_box(to_display_form(value)));
        });
        group.bench_with_input(BenchmarkId::new("storage", name), &value, |b, value| {
            b.iter(|| black_box(to_storage_form(value)));
        });
    }

    group.finish();
}

/// Benchmark converting batches of new identifiers
fn bench_identifier_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("identifier_batches");

    for count in [100, 1000].iter() {
        let identifiers = generate_identifiers(*count);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("storage", count), &identifiers, |b, identifiers| {
            b.iter(|| {
                for identifier in identifiers {
                    let _ = black_box(to_storage_form(identifier));
                }
            });
        });
    }

    group.finish();
}

/// Benchmark preparing rows with geometries for insertion
fn bench_load_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_rows");

    let table = TableDefinition::new("containers")
        .with_field(FieldDefinition::new("id", SchemaType::Integer).required())
        .with_field(FieldDefinition::new("eigenschappen", SchemaType::Object))
        .with_field(FieldDefinition::new("geometry", SchemaType::Geometry(GeometryKind::Point)));

    for count in [100, 1000].iter() {
        let rows: Vec<Row> = (0..*count)
            .filter_map(|i| {
                json!({
                    "id": i,
                    "eigenschappen": {"fractie": "rest", "volume": i % 5},
                    "geometry": {"type": "Point", "coordinates": [120000 + i, 487000 + i]}
                })
                .as_object()
                .cloned()
            })
            .collect();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("rows", count), &rows, |b, rows| {
            b.iter(|| black_box(load_rows(&table, rows.clone(), 28992)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cached_identifiers,
    bench_identifier_batches,
    bench_load_rows
);
criterion_main!(benches);
