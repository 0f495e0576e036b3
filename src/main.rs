//! Benchmark runner comparing the block product strategies.
//!
//! Settings come from `BLOCKMUL_*` environment variables (see
//! `blockmul::eval::config`). Logs go to stderr and honour `RUST_LOG`; the
//! tables go to stdout.

use std::time::Duration;

use anyhow::Context;
use blockmul::eval::{self, BenchConfig, Measurement};
use blockmul::executor::pool::default_worker_count;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BenchConfig::from_env().context("reading BLOCKMUL_* settings")?;
    let cores = default_worker_count();

    println!("=== Block Matrix Multiplication Benchmark ===\n");
    println!(
        "Cores detected: {}   Seed: {}   Runs: {}\n",
        cores, config.seed, config.runs
    );

    compare_section(&config);
    scalability_section(&config, cores);

    println!("Done.");
    Ok(())
}

fn compare_section(config: &BenchConfig) {
    println!("{}", "=".repeat(70));
    println!("STRATEGY COMPARISON (CPU-bound)");
    println!("{}", "=".repeat(70));

    let m = config.block_size;
    let executor_config = config.executor_config();
    for &n in &config.grid_sizes {
        let dim = n * m;
        println!("\n[{n}x{n} blocks of {m}x{m} -> matrix {dim}x{dim}]");
        println!("{}", "-".repeat(70));

        let results = eval::compare_strategies(n, m, config.runs, config.seed, &executor_config);
        let t1 = results.first().and_then(|r| r.tp.clone().ok());
        for result in &results {
            print_row(result, t1);
        }
    }
    println!();
}

fn scalability_section(config: &BenchConfig, cores: usize) {
    let total = config.total_size;
    let (n, m) = config.sweep_grid();

    println!("{}", "=".repeat(70));
    println!("SCALABILITY (pool)");
    println!("{}", "=".repeat(70));

    println!("\n[Workers] matrix {total}x{total}, {n}x{n} blocks of {m}x{m}");
    let t1 = match eval::baseline(n, m, config.sweep_runs, config.seed) {
        Ok(t1) => {
            println!(
                "  {:<24} Tp = {:>10.4} s",
                "sequential (T1)",
                t1.as_secs_f64()
            );
            t1
        }
        Err(e) => {
            println!("  sequential (T1)          ERROR: {e}");
            return;
        }
    };
    let counts = eval::worker_counts(cores);
    for result in eval::scalability_sweep(n, m, &counts, config.sweep_runs, config.seed) {
        print_row(&result, Some(t1));
    }

    println!("\n[Chunks] matrix {total}x{total}, {cores} workers");
    let splits = eval::chunk_splits(total, config.max_split);
    let chunks = eval::chunk_sweep(&splits, cores, config.sweep_runs, config.seed);
    for result in &chunks {
        let (n, m) = (result.n, result.m);
        let label = format!("{:>3} chunks (N={n}, {m}x{m})", n * n);
        match &result.tp {
            Ok(tp) => println!(
                "  {:<28} Tp = {:>10.4} s | Sp = {:>5.2}x",
                label,
                tp.as_secs_f64(),
                eval::speedup(t1, *tp)
            ),
            Err(e) => println!("  {label:<28} ERROR: {e}"),
        }
    }

    if let Some(best) = eval::fastest(&chunks) {
        let tp = best.tp.clone().unwrap_or_default();
        println!("\nBest configuration:");
        println!("  workers   : {} (hardware cores)", cores);
        println!(
            "  partition : {} chunks (N={} of {}x{} blocks)",
            best.n * best.n,
            best.n,
            best.m,
            best.m
        );
        println!("  Tp        : {:.4} s\n", tp.as_secs_f64());
    }
}

fn print_row(result: &Measurement, t1: Option<Duration>) {
    let label = format!("{} ({} workers)", result.method, result.workers);
    match (&result.tp, t1) {
        (Ok(tp), Some(t1)) => println!(
            "  {:<24} Tp = {:>10.4} s | Sp = {:>5.2}x | Ep = {:>6.1}%",
            label,
            tp.as_secs_f64(),
            eval::speedup(t1, *tp),
            eval::efficiency(eval::speedup(t1, *tp), result.workers) * 100.0
        ),
        (Ok(tp), None) => println!("  {:<24} Tp = {:>10.4} s", label, tp.as_secs_f64()),
        (Err(e), _) => println!("  {label:<24} ERROR: {e}"),
    }
}
