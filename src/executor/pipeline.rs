//! Producers streaming partial products to a reducing caller.
//!
//! Every output cell gets its own unbounded FIFO channel. A producer pushes
//! `A[i][k] * B[k][j]` for each `k` as soon as it is computed; the caller
//! pulls exactly N blocks per channel, cell by cell, and sums them while the
//! producers are still running. Producers are joined only after every cell
//! has been reduced.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::worker::{self, Deadline, TaskQueue, Worker};
use super::{Executor, ExecutorConfig, Fanout};
use crate::block::{self, Block, BlockGrid};
use crate::error::{Error, Result};
use crate::partition::{self, Kernel, TaskDescriptor};

/// How long a failed run waits for producers to exit so their own error can
/// be reported.
const FAILURE_GRACE: Duration = Duration::from_millis(250);

/// One cell's work plus the sending half of its channel.
type Job = (TaskDescriptor, Sender<Block>);

/// Producer/consumer block product over per-cell channels.
///
/// Every pull is bounded by the configured deadline and re-checks producer
/// liveness each poll interval, so a crashed producer surfaces as
/// [`Error::WorkerFailure`] and a stalled one as [`Error::Timeout`] instead of
/// blocking forever.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    config: ExecutorConfig,
    kernel: Kernel,
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl PipelineExecutor {
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

    fn spawn_producers(
        &self,
        jobs: Vec<Job>,
        n: usize,
        deadline: &Deadline,
    ) -> Result<Vec<Worker<()>>> {
        let kernel = self.kernel;
        let poll = self.config.poll_interval;
        match self.config.fanout {
            Fanout::PerCell => worker::spawn_all(jobs, deadline, poll, |(task, tx)| {
                let cell = task.cell();
                let name = format!("producer-{}-{}", cell.0, cell.1);
                Worker::spawn(name, Some(cell), move || produce(&task, &tx, kernel))
            }),
            Fanout::Bounded(_) => {
                let threads = self.concurrency(n);
                let queue = Arc::new(TaskQueue::new(jobs));
                debug!("queued {} cells for {} producers", queue.len(), threads);
                worker::spawn_all(0..threads, deadline, poll, |w| {
                    let queue = Arc::clone(&queue);
                    Worker::spawn(format!("producer-{w}"), None, move || {
                        while let Some((task, tx)) = queue.pop() {
                            produce(&task, &tx, kernel)?;
                        }
                        Ok(())
                    })
                })
            }
        }
    }

    /// Pull and sum exactly `n` partial products for every cell, in
    /// row-major order.
    fn reduce_all(
        &self,
        receivers: &[Receiver<Block>],
        producers: &[Worker<()>],
        deadline: &Deadline,
        n: usize,
        m: usize,
    ) -> Result<Vec<Block>> {
        let mut cells = Vec::with_capacity(receivers.len());
        for (idx, rx) in receivers.iter().enumerate() {
            let cell = (idx / n, idx % n);
            let mut acc = Block::zeros(m);
            for received in 0..n {
                let partial = match self.pull(rx, producers, deadline) {
                    Ok(partial) => partial,
                    Err(PullError::Timeout) => return Err(deadline.timeout()),
                    Err(PullError::Closed) => {
                        let message = format!("closed after {received} of {n} partials");
                        return Err(Error::worker(cell, message));
                    }
                };
                acc = block::add(&acc, &partial)?;
            }
            debug!("reduced cell ({}, {})", cell.0, cell.1);
            cells.push(acc);
        }
        Ok(cells)
    }

    fn pull(
        &self,
        rx: &Receiver<Block>,
        producers: &[Worker<()>],
        deadline: &Deadline,
    ) -> std::result::Result<Block, PullError> {
        loop {
            match rx.recv_timeout(deadline.next_wait(self.config.poll_interval)) {
                Ok(partial) => return Ok(partial),
                Err(RecvTimeoutError::Disconnected) => return Err(PullError::Closed),
                Err(RecvTimeoutError::Timeout) => {
                    if deadline.expired() {
                        return Err(PullError::Timeout);
                    }
                    if producers.iter().all(Worker::is_finished) {
                        // Every producer is gone; whatever is buffered is all there is.
                        return rx.try_recv().map_err(|_| PullError::Closed);
                    }
                }
            }
        }
    }
}

enum PullError {
    Timeout,
    Closed,
}

/// Compute each partial product of `task` and send it as soon as it exists.
fn produce(task: &TaskDescriptor, tx: &Sender<Block>, kernel: Kernel) -> Result<()> {
    let cell = task.cell();
    for (a, b) in task.a_row.iter().zip(&task.b_col) {
        let partial = worker::guarded(cell, || kernel(a, b))?;
        if tx.send(partial).is_err() {
            // Receiver dropped: the run was abandoned.
            return Ok(());
        }
    }
    Ok(())
}

impl Executor for PipelineExecutor {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn run(&self, a: &BlockGrid, b: &BlockGrid) -> Result<BlockGrid> {
        a.check_conformable(b)?;
        let (n, m) = (a.blocks_per_side(), a.block_side());
        let start = Instant::now();
        let deadline = Deadline::start(self.config.deadline);

        let (jobs, receivers): (Vec<Job>, Vec<Receiver<Block>>) = partition::tasks(a, b)
            .into_iter()
            .map(|task| {
                let (tx, rx) = mpsc::channel();
                ((task, tx), rx)
            })
            .unzip();
        let producers = self.spawn_producers(jobs, n, &deadline)?;

        let cells = match self.reduce_all(&receivers, &producers, &deadline, n, m) {
            Ok(cells) => cells,
            Err(e @ Error::Timeout { .. }) => return Err(e),
            Err(e) => {
                warn!("pipeline reduction failed: {}", e);
                // Prefer the producer's own error over the symptom seen on the channel.
                return Err(worker::first_failure(producers, FAILURE_GRACE).unwrap_or(e));
            }
        };

        worker::join_all(producers, &deadline, self.config.poll_interval)?;

        info!(
            "pipeline product done: {}x{} grid of {}x{} blocks, {} producers, {:.3}ms",
            n,
            n,
            m,
            m,
            self.concurrency(n),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(BlockGrid::from_cells(n, m, cells))
    }

    fn concurrency(&self, n: usize) -> usize {
        self.config.fanout.threads(n * n)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::dense::grid_matches_reference;

    fn exploding(_: &Block, _: &Block) -> Result<Block> {
        panic!("kernel exploded")
    }

    fn sluggish(a: &Block, b: &Block) -> Result<Block> {
        thread::sleep(Duration::from_millis(300));
        block::multiply(a, b)
    }

    fn mismatched(_: &Block, _: &Block) -> Result<Block> {
        Err(Error::block_mismatch(2, 3))
    }

    #[test]
    fn test_per_cell_matches_reference() {
        let a = BlockGrid::seeded(3, 3, 21).unwrap();
        let b = BlockGrid::seeded(3, 3, 22).unwrap();

        let c = PipelineExecutor::default().run(&a, &b).unwrap();

        assert!(grid_matches_reference(&a, &b, &c));
    }

    #[test]
    fn test_bounded_matches_reference() {
        let a = BlockGrid::seeded(4, 2, 23).unwrap();
        let b = BlockGrid::seeded(4, 2, 24).unwrap();
        let config = ExecutorConfig::default().with_fanout(Fanout::Bounded(2));

        let c = PipelineExecutor::new(config).run(&a, &b).unwrap();

        assert!(grid_matches_reference(&a, &b, &c));
    }

    #[test]
    fn test_crashed_producer_is_worker_failure() {
        let a = BlockGrid::seeded(2, 2, 1).unwrap();
        let exec = PipelineExecutor::default().with_kernel(exploding);

        assert!(matches!(exec.run(&a, &a), Err(Error::WorkerFailure { .. })));
    }

    #[test]
    fn test_crashed_bounded_producer_is_worker_failure() {
        let a = BlockGrid::seeded(3, 1, 1).unwrap();
        let config = ExecutorConfig::default().with_fanout(Fanout::Bounded(2));
        let exec = PipelineExecutor::new(config).with_kernel(exploding);

        assert!(matches!(exec.run(&a, &a), Err(Error::WorkerFailure { .. })));
    }

    #[test]
    fn test_producer_error_is_propagated() {
        let a = BlockGrid::seeded(2, 2, 1).unwrap();
        let exec = PipelineExecutor::default().with_kernel(mismatched);

        assert_eq!(exec.run(&a, &a).unwrap_err(), Error::block_mismatch(2, 3));
    }

    #[test]
    fn test_stalled_producer_times_out() {
        let a = BlockGrid::seeded(2, 2, 1).unwrap();
        let deadline = Duration::from_millis(30);
        let config = ExecutorConfig::default().with_deadline(deadline);
        let exec = PipelineExecutor::new(config).with_kernel(sluggish);

        assert!(matches!(exec.run(&a, &a), Err(Error::Timeout { .. })));
    }
}
