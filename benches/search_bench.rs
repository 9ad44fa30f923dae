//! Exact search benchmarks
//!
//! Measures the linear scan below and above the parallel threshold.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use projmatch::ProjectId;
use projmatch::vector::{Generation, VectorDimension};
use rand::Rng;
use std::hint::black_box;

const DIMENSION: usize = 384;

fn random_vector(rng: &mut impl Rng) -> Vec<f32> {
    (0..DIMENSION).map(|_| rng.random_range(-1.0..1.0)).collect()
}

fn create_generation(count: usize) -> Generation {
    let mut rng = rand::rng();
    let entries = (0..count).map(|i| {
        (
            ProjectId::new(i as u32 + 1).unwrap(),
            random_vector(&mut rng),
        )
    });
    Generation::from_entries(VectorDimension::new(DIMENSION).unwrap(), entries).unwrap()
}

fn bench_exact_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("exact_search");
    let mut rng = rand::rng();
    let query = random_vector(&mut rng);

    for count in [500, 5_000, 20_000] {
        let generation = create_generation(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &generation, |b, g| {
            b.iter(|| {
                let neighbors = g.search(black_box(&query), 8).unwrap();
                black_box(neighbors);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_exact_search);
criterion_main!(benches);
