//! Workers publishing into a shared table of write-once result slots.
//!
//! The table is allocated once per run with one slot per output cell. Each
//! worker owns the slots of the cells it computes; the caller reads the
//! table only after every worker has been joined.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use tracing::{debug, info};

use super::worker::{self, Deadline, TaskQueue, Worker};
use super::{Executor, ExecutorConfig, Fanout};
use crate::block::{self, Block, BlockGrid};
use crate::error::{Error, Result};
use crate::partition::{self, Kernel, TaskDescriptor};

/// Pre-sized table of result slots indexed by cell, `i * n + j`.
#[derive(Debug, Clone)]
pub struct ResultTable {
    n: usize,
    slots: Vec<OnceLock<Block>>,
}

impl ResultTable {
    /// Empty table for an `n`×`n` grid.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            slots: (0..n * n).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Store the result for `cell`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerFailure`] if the cell is out of range or its
    /// slot was already written.
    pub fn publish(&self, cell: (usize, usize), block: Block) -> Result<()> {
        let (i, j) = cell;
        let slot = (i < self.n && j < self.n)
            .then(|| &self.slots[i * self.n + j])
            .ok_or_else(|| Error::worker(cell, "cell outside result table"))?;
        slot.set(block)
            .map_err(|_| Error::worker(cell, "result slot written twice"))
    }

    /// Number of slots holding a result.
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_some()).count()
    }

    /// Move every result into a grid of `m`×`m` blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerFailure`] naming the first empty slot.
    pub fn into_grid(self, m: usize) -> Result<BlockGrid> {
        let n = self.n;
        let cells = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.into_inner()
                    .ok_or_else(|| Error::worker((idx / n, idx % n), "no result published"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BlockGrid::from_cells(n, m, cells))
    }
}

/// Computes each cell on its own worker and collects results through a
/// [`ResultTable`].
///
/// With [`Fanout::PerCell`] exactly N² threads are started, all at once.
/// With [`Fanout::Bounded`] a fixed number of threads pull cells from a
/// queue; either way each cell is written by exactly one worker.
#[derive(Debug, Clone)]
pub struct SharedStateExecutor {
    config: ExecutorConfig,
    kernel: Kernel,
}

impl Default for SharedStateExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl SharedStateExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            kernel: block::multiply,
        }
    }

    /// Replace the block kernel.
    #[must_use]
    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    fn spawn_per_cell(
        &self,
        tasks: Vec<TaskDescriptor>,
        table: &Arc<ResultTable>,
        deadline: &Deadline,
    ) -> Result<Vec<Worker<()>>> {
        let kernel = self.kernel;
        let poll = self.config.poll_interval;
        worker::spawn_all(tasks, deadline, poll, |task| {
            let cell = task.cell();
            let table = Arc::clone(table);
            let name = format!("shared-{}-{}", cell.0, cell.1);
            Worker::spawn(name, Some(cell), move || {
                let block = worker::guarded(cell, || task.compute(kernel))?;
                table.publish(cell, block)
            })
        })
    }

    fn spawn_bounded(
        &self,
        tasks: Vec<TaskDescriptor>,
        table: &Arc<ResultTable>,
        threads: usize,
        deadline: &Deadline,
    ) -> Result<Vec<Worker<()>>> {
        let kernel = self.kernel;
        let poll = self.config.poll_interval;
        let queue = Arc::new(TaskQueue::new(tasks));
        debug!("queued {} cells for {} shared-state workers", queue.len(), threads);
        worker::spawn_all(0..threads, deadline, poll, |w| {
            let queue = Arc::clone(&queue);
            let table = Arc::clone(table);
            Worker::spawn(format!("shared-worker-{w}"), None, move || {
                while let Some(task) = queue.pop() {
                    let cell = task.cell();
                    let block = worker::guarded(cell, || task.compute(kernel))?;
                    table.publish(cell, block)?;
                }
                Ok(())
            })
        })
    }
}

impl Executor for SharedStateExecutor {
    fn name(&self) -> &'static str {
        "shared-state"
    }

    fn run(&self, a: &BlockGrid, b: &BlockGrid) -> Result<BlockGrid> {
        a.check_conformable(b)?;
        let (n, m) = (a.blocks_per_side(), a.block_side());
        let start = Instant::now();
        let deadline = Deadline::start(self.config.deadline);

        let table = Arc::new(ResultTable::new(n));
        let tasks = partition::tasks(a, b);
        let threads = self.concurrency(n);
        let workers = match self.config.fanout {
            Fanout::PerCell => self.spawn_per_cell(tasks, &table, &deadline)?,
            Fanout::Bounded(_) => self.spawn_bounded(tasks, &table, threads, &deadline)?,
        };

        worker::join_all(workers, &deadline, self.config.poll_interval)?;
        debug!("harvesting {}/{} result slots", table.filled(), n * n);

        // Every worker has exited, so this is normally the last handle.
        let table = Arc::try_unwrap(table)
            .unwrap_or_else(|shared| shared.as_ref().clone());
        let grid = table.into_grid(m)?;

        info!(
            "shared-state product done: {}x{} grid of {}x{} blocks, {} workers, {:.3}ms",
            n,
            n,
            m,
            m,
            threads,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(grid)
    }

    fn concurrency(&self, n: usize) -> usize {
        self.config.fanout.threads(n * n)
    }
}
