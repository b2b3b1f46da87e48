use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use infomax::prelude::*;
use infomax_datasets::generate;
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

fn infomax_bench(c: &mut Criterion) {
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let frame_counts = vec![1000, 4000, 16000];

    let mut group = c.benchmark_group("infomax");
    group.sample_size(10);
    for frames in frame_counts.iter() {
        let (x, _) = generate::laplace_gaussian_mixture(6, 2, *frames, &mut rng);

        group.bench_with_input(BenchmarkId::new("single", frames), &x, |b, x| {
            let params = Infomax::params().random_state(1).max_steps(20);
            b.iter(|| black_box(params.fit(x)))
        });
        group.bench_with_input(BenchmarkId::new("partitioned", frames), &x, |b, x| {
            let params = Infomax::params()
                .random_state(1)
                .max_steps(20)
                .execution(Execution::Partitioned {
                    partitions: 4,
                    merge_interval: 5,
                });
            b.iter(|| black_box(params.fit(x)))
        });
        group.bench_with_input(BenchmarkId::new("extended", frames), &x, |b, x| {
            let params = Infomax::params()
                .random_state(1)
                .max_steps(20)
                .extended(Extended::Reestimate { interval: 1 });
            b.iter(|| black_box(params.fit(x)))
        });
    }
    group.finish();
}

criterion_group!(benches, infomax_bench);
criterion_main!(benches);
