use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use statute_rag::index::FlatIndex;
use std::hint::black_box;

const DIMENSION: usize = 768;

/// Deterministic pseudo-random vectors so runs are comparable
fn vectors(count: usize) -> Vec<Vec<f32>> {
    let mut state: u32 = 0x9E37_79B9;
    (0..count)
        .map(|_| {
            (0..DIMENSION)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    (state % 2000) as f32 / 1000.0 - 1.0
                })
                .collect()
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_l2_search");
    for rows in [1_000, 10_000] {
        let data = vectors(rows + 1);
        let Some((query, rows_data)) = data.split_last() else {
            continue;
        };
        let Ok(index) = FlatIndex::build(rows_data.iter().cloned()) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::from_parameter(rows), &index, |b, index| {
            b.iter(|| index.search(black_box(query), black_box(3)));
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
