//! Fixed-size worker pool mapping over self-contained cell tasks.

use std::num::NonZeroUsize;
use std::thread;
use std::time::Instant;

use rayon::prelude::*;
use tracing::info;

use super::Executor;
use super::worker;
use crate::block::{self, Block, BlockGrid};
use crate::error::{Error, Result};
use crate::partition::{self, Kernel, TaskDescriptor};

/// Cores reported by the OS, falling back to 1.
pub fn default_worker_count() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Maps a flat list of [`TaskDescriptor`]s over a dedicated rayon pool.
///
/// The map is order-preserving, but placement never relies on it: each task
/// returns `(i, j, block)` and the result is scattered by that tag. This is
/// the only executor whose parallelism is set by the caller.
#[derive(Debug, Clone)]
pub struct PoolExecutor {
    worker_count: usize,
    chunk_size: usize,
    kernel: Kernel,
}

impl Default for PoolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolExecutor {
    /// Pool sized to the detected core count.
    pub fn new() -> Self {
        Self::with_workers(default_worker_count())
    }

    /// Pool with exactly `worker_count` threads (at least one).
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
            chunk_size: 1,
            kernel: block::multiply,
        }
    }

    /// Minimum number of consecutive tasks a worker takes at once.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Replace the block kernel.
    #[must_use]
    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Run an explicit task list for an `n`×`n` grid of `m`×`m` blocks.
    ///
    /// Tasks may come in any order; each result lands at its own `(i, j)`.
    ///
    /// # Errors
    ///
    /// - [`Error::ThreadPool`] if the pool cannot be built.
    /// - [`Error::WorkerFailure`] if a task panics, a cell is produced twice
    ///   or never, or a tag falls outside the grid.
    /// - [`Error::ShapeMismatch`] if a result block is not `m`×`m`.
    pub fn run_tasks(&self, tasks: Vec<TaskDescriptor>, n: usize, m: usize) -> Result<BlockGrid> {
        if n == 0 || m == 0 {
            return Err(Error::InvalidDimensions { n, m });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count)
            .thread_name(|i| format!("blockmul-pool-{i}"))
            .build()
            .map_err(|e| Error::ThreadPool {
                message: e.to_string(),
            })?;

        let kernel = self.kernel;
        let chunk_size = self.chunk_size;
        let tagged = pool.install(|| {
            tasks
                .into_par_iter()
                .with_min_len(chunk_size)
                .map(|task| {
                    let cell = task.cell();
                    worker::guarded(cell, || task.run(kernel))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        scatter(tagged, n, m)
    }
}

/// Place tagged results into a grid by their `(i, j)` tag.
fn scatter(tagged: Vec<(usize, usize, Block)>, n: usize, m: usize) -> Result<BlockGrid> {
    let mut slots: Vec<Option<Block>> = vec![None; n * n];
    for (i, j, block) in tagged {
        if i >= n || j >= n {
            return Err(Error::worker((i, j), "result tagged outside the grid"));
        }
        if block.side() != m {
            return Err(Error::block_mismatch(m, block.side()));
        }
        let slot = &mut slots[i * n + j];
        if slot.is_some() {
            return Err(Error::worker((i, j), "cell produced twice"));
        }
        *slot = Some(block);
    }

    let cells = slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.ok_or_else(|| Error::worker((idx / n, idx % n), "no task for cell"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(BlockGrid::from_cells(n, m, cells))
}

impl Executor for PoolExecutor {
    fn name(&self) -> &'static str {
        "pool"
    }

    fn run(&self, a: &BlockGrid, b: &BlockGrid) -> Result<BlockGrid> {
        a.check_conformable(b)?;
        let (n, m) = (a.blocks_per_side(), a.block_side());
        let start = Instant::now();

        let grid = self.run_tasks(partition::tasks(a, b), n, m)?;

        info!(
            "pool product done: {}x{} grid of {}x{} blocks, {} workers, chunk {}, {:.3}ms",
            n,
            n,
            m,
            m,
            self.worker_count,
            self.chunk_size,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(grid)
    }

    fn concurrency(&self, _n: usize) -> usize {
        self.worker_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::grid_matches_reference;

    fn exploding(_: &Block, _: &Block) -> Result<Block> {
        panic!("kernel exploded")
    }

    #[test]
    fn test_matches_reference() {
        let a = BlockGrid::seeded(3, 5, 31).unwrap();
        let b = BlockGrid::seeded(3, 5, 32).unwrap();

        let c = PoolExecutor::with_workers(2).run(&a, &b).unwrap();

        assert!(grid_matches_reference(&a, &b, &c));
    }

    #[test]
    fn test_reversed_tasks_scatter_correctly() {
        let a = BlockGrid::seeded(3, 2, 33).unwrap();
        let b = BlockGrid::seeded(3, 2, 34).unwrap();
        let mut tasks = partition::tasks(&a, &b);
        tasks.reverse();

        let pool = PoolExecutor::with_workers(3);
        let c = pool.run_tasks(tasks, 3, 2).unwrap();

        assert!(grid_matches_reference(&a, &b, &c));
    }

    #[test]
    fn test_chunked_matches_unchunked() {
        let a = BlockGrid::seeded(4, 3, 35).unwrap();
        let b = BlockGrid::seeded(4, 3, 36).unwrap();

        let plain = PoolExecutor::with_workers(4).run(&a, &b).unwrap();
        let chunked = PoolExecutor::with_workers(4)
            .with_chunk_size(5)
            .run(&a, &b)
            .unwrap();

        assert_eq!(plain, chunked);
    }

    #[test]
    fn test_missing_task_is_reported() {
        let a = BlockGrid::seeded(2, 1, 1).unwrap();
        let mut tasks = partition::tasks(&a, &a);
        tasks.pop();

        let err = PoolExecutor::with_workers(2)
            .run_tasks(tasks, 2, 1)
            .unwrap_err();

        assert_eq!(err, Error::worker((1, 1), "no task for cell"));
    }

    #[test]
    fn test_duplicate_task_is_reported() {
        let a = BlockGrid::seeded(2, 1, 1).unwrap();
        let mut tasks = partition::tasks(&a, &a);
        tasks.push(tasks[0].clone());

        assert!(matches!(
            PoolExecutor::with_workers(2).run_tasks(tasks, 2, 1),
            Err(Error::WorkerFailure { .. })
        ));
    }

    #[test]
    fn test_panicking_task_is_worker_failure() {
        let a = BlockGrid::seeded(2, 2, 1).unwrap();
        let exec = PoolExecutor::with_workers(2).with_kernel(exploding);

        assert!(matches!(exec.run(&a, &a), Err(Error::WorkerFailure { .. })));
    }

    #[test]
    fn test_worker_count_floor() {
        assert_eq!(PoolExecutor::with_workers(0).worker_count(), 1);
        assert!(PoolExecutor::new().worker_count() >= 1);
    }
}
