//! Criterion comparison of the block product strategies.
//!
//! ```bash
//! cargo bench --bench executor_bench -- strategies/4x32
//! ```

use std::hint::black_box;

use blockmul::executor::Executor;
use blockmul::{BlockGrid, ExecutorConfig, Fanout, PoolExecutor, Strategy};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

const SHAPES: [(usize, usize); 3] = [(2, 32), (4, 32), (4, 64)];
const SEED: u64 = 42;

fn flops(n: usize, m: usize) -> u64 {
    let dim = (n * m) as u64;
    2 * dim * dim * dim
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategies");
    group.sample_size(10);

    for (n, m) in SHAPES {
        let a = BlockGrid::seeded(n, m, SEED).unwrap();
        let b = BlockGrid::seeded(n, m, SEED + 1).unwrap();
        group.throughput(Throughput::Elements(flops(n, m)));

        for strategy in Strategy::ALL {
            let executor = strategy.executor(&ExecutorConfig::default());
            let id = BenchmarkId::new(strategy.name(), format!("{n}x{m}"));
            group.bench_function(id, |bench| {
                bench.iter(|| executor.run(black_box(&a), black_box(&b)).unwrap())
            });
        }
    }
    group.finish();
}

fn bench_bounded_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    group.sample_size(10);

    let (n, m) = (6, 16);
    let a = BlockGrid::seeded(n, m, SEED).unwrap();
    let b = BlockGrid::seeded(n, m, SEED + 1).unwrap();

    for fanout in [Fanout::PerCell, Fanout::Bounded(2), Fanout::Bounded(8)] {
        let label = match fanout {
            Fanout::PerCell => "per-cell".to_string(),
            Fanout::Bounded(k) => format!("bounded-{k}"),
        };
        let config = ExecutorConfig::default().with_fanout(fanout);
        for strategy in [Strategy::SharedState, Strategy::Pipeline] {
            let executor = strategy.executor(&config);
            let id = BenchmarkId::new(strategy.name(), &label);
            group.bench_function(id, |bench| {
                bench.iter(|| executor.run(black_box(&a), black_box(&b)).unwrap())
            });
        }
    }
    group.finish();
}

fn bench_pool_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_workers");
    group.sample_size(10);

    let (n, m) = (4, 50);
    let a = BlockGrid::seeded(n, m, SEED).unwrap();
    let b = BlockGrid::seeded(n, m, SEED + 1).unwrap();

    for workers in [1, 2, 4, 8] {
        let pool = PoolExecutor::with_workers(workers);
        group.bench_function(BenchmarkId::from_parameter(workers), |bench| {
            bench.iter(|| pool.run(black_box(&a), black_box(&b)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_strategies,
    bench_bounded_fanout,
    bench_pool_workers
);
criterion_main!(benches);
