//! Single-threaded block product.

use std::time::Instant;

use tracing::info;

use super::Executor;
use crate::block::{self, BlockGrid};
use crate::error::Result;
use crate::partition::{self, Kernel};

/// Computes every cell in the calling thread, one after another.
///
/// Deterministic: the partial products of each cell are added in increasing
/// `k`, so repeated runs are bit-for-bit identical.
#[derive(Debug, Clone)]
pub struct SequentialExecutor {
    kernel: Kernel,
}

impl Default for SequentialExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialExecutor {
    pub fn new() -> Self {
        Self {
            kernel: block::multiply,
        }
    }

    /// Replace the block kernel.
    #[must_use]
    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }
}

impl Executor for SequentialExecutor {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn run(&self, a: &BlockGrid, b: &BlockGrid) -> Result<BlockGrid> {
        a.check_conformable(b)?;
        let (n, m) = (a.blocks_per_side(), a.block_side());
        let start = Instant::now();

        let mut cells = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                cells.push(partition::accumulate(
                    partition::operand_pairs(a, b, i, j),
                    m,
                    self.kernel,
                )?);
            }
        }

        info!(
            "sequential product done: {}x{} grid of {}x{} blocks in {:.3}ms",
            n,
            n,
            m,
            m,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(BlockGrid::from_cells(n, m, cells))
    }

    fn concurrency(&self, _n: usize) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::dense::grid_matches_reference;
    use crate::error::Error;

    #[test]
    fn test_matches_dense_reference() {
        for (n, m) in [(1, 1), (2, 2), (3, 4), (4, 3)] {
            let a = BlockGrid::seeded(n, m, 100 + n as u64).unwrap();
            let b = BlockGrid::seeded(n, m, 200 + m as u64).unwrap();

            let c = SequentialExecutor::new().run(&a, &b).unwrap();

            assert!(grid_matches_reference(&a, &b, &c), "n={n} m={m}");
        }
    }

    #[test]
    fn test_identity_grid() {
        let a = BlockGrid::seeded(3, 2, 5).unwrap();
        let id = BlockGrid::from_fn(3, 2, |i, j| {
            Block::from_fn(2, |r, c| if i == j && r == c { 1.0 } else { 0.0 })
        })
        .unwrap();

        assert_eq!(SequentialExecutor::new().run(&a, &id).unwrap(), a);
    }

    #[test]
    fn test_rejects_mismatched_grids() {
        let a = BlockGrid::zeros(2, 2).unwrap();
        let b = BlockGrid::zeros(2, 3).unwrap();
        assert!(matches!(
            SequentialExecutor::new().run(&a, &b),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
