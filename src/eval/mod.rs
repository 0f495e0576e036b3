//! Timing harness: averages, speedup and efficiency sweeps.
//!
//! Everything here consumes the executors through the [`Executor`] trait.
//! Inputs are regenerated for every timed run from an explicit seed, so two
//! invocations with the same settings time the same matrices.

pub mod config;

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

pub use config::{BenchConfig, ConfigError};

use crate::block::BlockGrid;
use crate::dense::grid_matches_reference;
use crate::error::Error;
use crate::executor::{Executor, ExecutorConfig, PoolExecutor, SequentialExecutor, Strategy};

/// Why a measurement produced no timing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The executor returned an error.
    #[error(transparent)]
    Executor(#[from] Error),

    /// The first run disagreed with the dense reference.
    #[error("{method} result does not match the dense reference product")]
    Mismatch {
        /// Executor name.
        method: String,
    },

    /// Asked for zero timed runs.
    #[error("at least one timed run is required")]
    NoRuns,
}

/// Average wall-clock time of `executor.run` over `runs` fresh inputs.
///
/// Run `r` multiplies grids seeded with `seed + 2r` and `seed + 2r + 1`.
/// Only the first result is checked against the dense reference, so
/// validation cost stays out of later runs. Input generation is never timed.
///
/// # Errors
///
/// Returns [`EvalError`] on the first failing run; no partial average.
pub fn run_simulation(
    executor: &dyn Executor,
    n: usize,
    m: usize,
    runs: usize,
    seed: u64,
) -> Result<Duration, EvalError> {
    if runs == 0 {
        return Err(EvalError::NoRuns);
    }

    let name = executor.name();
    let mut total = Duration::ZERO;
    for run in 0..runs {
        let run_seed = seed.wrapping_add(2 * run as u64);
        let a = BlockGrid::seeded(n, m, run_seed)?;
        let b = BlockGrid::seeded(n, m, run_seed.wrapping_add(1))?;

        let start = Instant::now();
        let c = executor.run(&a, &b).inspect_err(|e| {
            warn!("{name} failed on {n}x{n} grid of {m}x{m} blocks: {e}");
        })?;
        let elapsed = start.elapsed();

        if run == 0 && !grid_matches_reference(&a, &b, &c) {
            warn!("{name} result does not match the dense reference");
            return Err(EvalError::Mismatch {
                method: name.to_string(),
            });
        }
        debug!("{name} run {run}: {elapsed:?}");
        total += elapsed;
    }

    Ok(Duration::from_secs_f64(total.as_secs_f64() / runs as f64))
}

/// `T1 / Tp`; zero when `tp` is zero.
pub fn speedup(t1: Duration, tp: Duration) -> f64 {
    if tp.is_zero() {
        0.0
    } else {
        t1.as_secs_f64() / tp.as_secs_f64()
    }
}

/// `Sp / workers`; zero when `workers` is zero.
pub fn efficiency(speedup: f64, workers: usize) -> f64 {
    if workers == 0 {
        0.0
    } else {
        speedup / workers as f64
    }
}

/// One timed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub method: String,
    pub n: usize,
    pub m: usize,
    pub workers: usize,
    pub tp: Result<Duration, EvalError>,
}

impl Measurement {
    /// Speedup against baseline `t1`, if this configuration produced a time.
    pub fn speedup(&self, t1: Duration) -> Option<f64> {
        self.tp.as_ref().ok().map(|&tp| speedup(t1, tp))
    }

    /// Efficiency against baseline `t1`, if this configuration produced a time.
    pub fn efficiency(&self, t1: Duration) -> Option<f64> {
        self.speedup(t1).map(|sp| efficiency(sp, self.workers))
    }
}

fn measure(executor: &dyn Executor, n: usize, m: usize, runs: usize, seed: u64) -> Measurement {
    Measurement {
        method: executor.name().to_string(),
        n,
        m,
        workers: executor.concurrency(n),
        tp: run_simulation(executor, n, m, runs, seed),
    }
}

/// Time every [`Strategy`] on the same `n`, `m`. The first entry is the
/// sequential baseline.
pub fn compare_strategies(
    n: usize,
    m: usize,
    runs: usize,
    seed: u64,
    config: &ExecutorConfig,
) -> Vec<Measurement> {
    Strategy::ALL
        .into_iter()
        .map(|strategy| measure(&*strategy.executor(config), n, m, runs, seed))
        .collect()
}

/// Sequential baseline time for `n`, `m`.
///
/// # Errors
///
/// Same as [`run_simulation`].
pub fn baseline(n: usize, m: usize, runs: usize, seed: u64) -> Result<Duration, EvalError> {
    run_simulation(&SequentialExecutor::new(), n, m, runs, seed)
}

/// Worker counts for the scalability sweep: 1, p, 2p, 4p and 7p for `cores`
/// = p, without duplicates.
pub fn worker_counts(cores: usize) -> Vec<usize> {
    let p = cores.max(1);
    let mut counts = vec![1, p, 2 * p, 4 * p, 7 * p];
    counts.dedup();
    counts
}

/// Time the pool on a fixed problem with each worker count.
pub fn scalability_sweep(
    n: usize,
    m: usize,
    workers: &[usize],
    runs: usize,
    seed: u64,
) -> Vec<Measurement> {
    workers
        .iter()
        .map(|&w| measure(&PoolExecutor::with_workers(w), n, m, runs, seed))
        .collect()
}

/// `(n, total / n)` for every `n` up to `max_n` that divides `total`.
pub fn chunk_splits(total: usize, max_n: usize) -> Vec<(usize, usize)> {
    (1..=max_n.min(total))
        .filter(|n| total % n == 0)
        .map(|n| (n, total / n))
        .collect()
}

/// Time the pool on the same dense size cut into different block grids.
pub fn chunk_sweep(
    splits: &[(usize, usize)],
    workers: usize,
    runs: usize,
    seed: u64,
) -> Vec<Measurement> {
    let pool = PoolExecutor::with_workers(workers);
    splits
        .iter()
        .map(|&(n, m)| measure(&pool, n, m, runs, seed))
        .collect()
}

/// Fastest measurement that produced a time.
pub fn fastest(measurements: &[Measurement]) -> Option<&Measurement> {
    measurements
        .iter()
        .filter_map(|meas| meas.tp.as_ref().ok().map(|tp| (tp, meas)))
        .min_by_key(|(tp, _)| **tp)
        .map(|(_, meas)| meas)
}
