use criterion::{Criterion, criterion_group, criterion_main};
use ddp_rs_kernels::{cpu_add_assign, cpu_div_scalar, summarize};
use std::hint::black_box;

fn benchmark_add_assign(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_assign");
    let sizes = [1 << 10, 1 << 14, 1 << 18, 1 << 20];

    for &size in &sizes {
        let src = vec![0.5f32; size];
        let mut dst = vec![1.0f32; size];

        group.bench_function(format!("{}", size), |b| {
            b.iter(|| cpu_add_assign(black_box(&mut dst), black_box(&src)).unwrap())
        });
    }
    group.finish();
}

fn benchmark_div_scalar(c: &mut Criterion) {
    let mut group = c.benchmark_group("div_scalar");
    let sizes = [1 << 10, 1 << 14, 1 << 18, 1 << 20];

    for &size in &sizes {
        let mut buf = vec![3.0f32; size];

        group.bench_function(format!("{}", size), |b| {
            b.iter(|| cpu_div_scalar(black_box(&mut buf), black_box(1.0001)).unwrap())
        });
    }
    group.finish();
}

fn benchmark_summarize(c: &mut Criterion) {
    let values: Vec<f64> = (0..64).map(|i| 0.9 + i as f64 * 1e-7).collect();
    c.bench_function("summarize_64", |b| b.iter(|| summarize(black_box(&values))));
}

criterion_group!(
    benches,
    benchmark_add_assign,
    benchmark_div_scalar,
    benchmark_summarize
);
criterion_main!(benches);
