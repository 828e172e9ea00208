//! Dataset fingerprint benchmarks
//!
//! Measures SHA-1 fingerprinting of row-major and column-major arrays, since
//! column-major input pays for a reorder before hashing.
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Run with: cargo bench --bench fingerprint

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trueno_pipeline::fingerprint::{hash_array, Array, Layout};

const COLS: usize = 32;
const SIZES: [usize; 3] = [1_000, 10_000, 100_000]; // rows

#[allow(clippy::cast_precision_loss)]
fn matrix(rows: usize) -> Vec<f64> {
    (0..rows * COLS).map(|i| i as f64 * 0.5).collect()
}

fn bench_row_major(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint_row_major_f64");
    for rows in SIZES {
        let array = Array::new(vec![rows, COLS], matrix(rows)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &array, |b, array| {
            b.iter(|| hash_array(black_box(array)));
        });
    }
    group.finish();
}

fn bench_column_major(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint_column_major_f64");
    for rows in SIZES {
        let array = Array::with_layout(vec![rows, COLS], matrix(rows), Layout::ColumnMajor).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &array, |b, array| {
            b.iter(|| hash_array(black_box(array)));
        });
    }
    group.finish();
}

fn bench_labels_i64(c: &mut Criterion) {
    let labels: Vec<i64> = (0..100_000).map(|i| i % 3).collect();
    let array = Array::vector(labels);
    c.bench_function("fingerprint_labels_i64_100k", |b| {
        b.iter(|| hash_array(black_box(&array)));
    });
}

criterion_group!(benches, bench_row_major, bench_column_major, bench_labels_i64);
criterion_main!(benches);
