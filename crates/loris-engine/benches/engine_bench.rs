use criterion::{criterion_group, criterion_main, Criterion};

use loris_engine::{Analysis, AnalysisSettings};

fn bench_pipeline(c: &mut Criterion) {
    let single = include_str!("../../../benchmarks/single-counter.koat");
    let nested = include_str!("../../../benchmarks/nest-parallel.koat");

    c.bench_function("analyze single-counter", |b| {
        b.iter(|| {
            let mut its = loris_koat::parse_problem(single, "single-counter.koat").unwrap();
            Analysis::analyze(&mut its, AnalysisSettings::untimed())
        })
    });

    c.bench_function("analyze nest-parallel", |b| {
        b.iter(|| {
            let mut its = loris_koat::parse_problem(nested, "nest-parallel.koat").unwrap();
            Analysis::analyze(&mut its, AnalysisSettings::untimed())
        })
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
