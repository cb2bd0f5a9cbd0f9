/*
    Sum reduction over a large array, sequential fold against the engine
    with a few chunk thresholds.
*/
use criterion::{black_box, BenchmarkId, Criterion, SamplingMode};

use parloop::prelude::*;

fn sequential(a: &[i64]) -> i64 {
    a.iter().sum()
}

fn engine(a: &[i64], chunk: Option<i32>) -> i64 {
    let range = match chunk {
        Some(chunk) => IndexRange::new(0, a.len() as i32).chunk(chunk),
        None => IndexRange::new(0, a.len() as i32),
    };
    par_reduce(range, Reduction::new(|i: i32| a[i as usize], |x, y| x + y))
}

pub fn sum_reduction(criterion: &mut Criterion) {
    let a: Vec<i64> = (0..(1 << 20)).collect();

    let mut group = criterion.benchmark_group("Sum reduction");
    group.sampling_mode(SamplingMode::Auto).sample_size(10);

    group.bench_function(BenchmarkId::new("sequential", a.len()), |b| {
        b.iter(|| sequential(black_box(&a)))
    });
    group.bench_function(BenchmarkId::new("parloop", a.len()), |b| {
        b.iter(|| engine(black_box(&a), None))
    });
    for chunk in [1 << 10, 1 << 14] {
        group.bench_function(BenchmarkId::new("parloop-chunk", chunk), |b| {
            b.iter(|| engine(black_box(&a), Some(chunk)))
        });
    }
    group.finish();
}

criterion::criterion_group!(benches, sum_reduction);
