//! Block matrix multiplication across worker threads, four ways.
//!
//! I built this to see how much the coordination pattern matters when the
//! work itself is embarrassingly parallel. Every output block
//! `C[i][j] = sum_k A[i][k] * B[k][j]` is independent, so the only thing that
//! changes between strategies is how cells are handed out and how results
//! come back: shared write-once slots, per-cell channels, or a pool with
//! tagged results.
//!
//! ## Usage
//!
//! ```
//! use blockmul::{BlockGrid, multiply};
//!
//! let a = BlockGrid::seeded(2, 8, 1).unwrap();
//! let b = BlockGrid::seeded(2, 8, 2).unwrap();
//!
//! let c = multiply(&a, &b).unwrap();
//! assert_eq!(c.dim(), 16);
//! ```
//!
//! To spread the cells over a fixed number of workers:
//!
//! ```
//! use blockmul::{BlockGrid, multiply_parallel};
//!
//! let a = BlockGrid::seeded(4, 8, 1).unwrap();
//! let b = BlockGrid::seeded(4, 8, 2).unwrap();
//!
//! let c = multiply_parallel(&a, &b, 4).unwrap();
//! assert_eq!(c.blocks_per_side(), 4);
//! ```
//!
//! Any strategy can be picked at runtime through [`Strategy`]:
//!
//! ```
//! use blockmul::{BlockGrid, ExecutorConfig, Strategy};
//! use blockmul::dense::grid_matches_reference;
//!
//! let a = BlockGrid::seeded(2, 4, 7).unwrap();
//! let b = BlockGrid::seeded(2, 4, 8).unwrap();
//!
//! for strategy in Strategy::ALL {
//!     let c = strategy.executor(&ExecutorConfig::default()).run(&a, &b).unwrap();
//!     assert!(grid_matches_reference(&a, &b, &c));
//! }
//! ```
//!
//! ## What's inside
//!
//! - Scalar i-j-k block kernel (deliberately slow, it is the workload)
//! - Sequential baseline
//! - Shared-state, pipeline and pool executors
//! - Deadlines and liveness checks instead of silent hangs
//! - An evaluation harness for speedup and efficiency sweeps

pub mod block;
pub mod dense;
pub mod error;
pub mod eval;
pub mod executor;
pub mod partition;

pub use block::{Block, BlockGrid};
pub use error::{Error, Result};
pub use executor::{
    Executor, ExecutorConfig, Fanout, PipelineExecutor, PoolExecutor, SequentialExecutor,
    SharedStateExecutor, Strategy,
};
pub use partition::TaskDescriptor;

/// Block product `C = A * B`, computed in the calling thread.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the grids differ in N or M.
pub fn multiply(a: &BlockGrid, b: &BlockGrid) -> Result<BlockGrid> {
    SequentialExecutor::new().run(a, b)
}

/// Same as [`multiply`] but spreads the cells over a pool of `num_workers`
/// threads.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] for non-conformable grids,
/// [`Error::ThreadPool`] if the pool cannot start, and
/// [`Error::WorkerFailure`] if a worker dies.
pub fn multiply_parallel(a: &BlockGrid, b: &BlockGrid, num_workers: usize) -> Result<BlockGrid> {
    PoolExecutor::with_workers(num_workers).run(a, b)
}
