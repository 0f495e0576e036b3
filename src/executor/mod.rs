//! Interchangeable strategies for computing a block product.
//!
//! All four produce the same grid; they differ only in how output cells are
//! farmed out and how results come back:
//!
//! - [`SequentialExecutor`]: everything in the calling thread. Timing
//!   baseline and correctness oracle.
//! - [`SharedStateExecutor`]: workers write into write-once result slots.
//! - [`PipelineExecutor`]: producers stream partial products over per-cell
//!   channels while the caller reduces them.
//! - [`PoolExecutor`]: a fixed-size pool maps over self-contained tasks and
//!   the caller scatters tagged results.

pub mod pipeline;
pub mod pool;
pub mod sequential;
pub mod shared_state;
pub(crate) mod worker;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use pipeline::PipelineExecutor;
pub use pool::PoolExecutor;
pub use sequential::SequentialExecutor;
pub use shared_state::SharedStateExecutor;

use crate::block::BlockGrid;
use crate::error::Result;

/// A block matrix multiplication strategy.
pub trait Executor: Send + Sync {
    /// Short human-readable name for reports.
    fn name(&self) -> &'static str;

    /// Compute `a * b`.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::ShapeMismatch`] if the grids are not conformable.
    /// - [`crate::Error::WorkerFailure`] or [`crate::Error::Timeout`] from
    ///   parallel strategies.
    fn run(&self, a: &BlockGrid, b: &BlockGrid) -> Result<BlockGrid>;

    /// Worker threads used for a product with `n` blocks per side. Used as
    /// the divisor when computing efficiency.
    fn concurrency(&self, n: usize) -> usize;
}

/// How many threads the shared-state and pipeline executors start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fanout {
    /// One thread per output cell, N² in total, started without throttling.
    PerCell,
    /// At most this many threads draining a shared queue of cells.
    Bounded(usize),
}

impl Fanout {
    /// Threads started for `cells` output cells.
    pub fn threads(self, cells: usize) -> usize {
        match self {
            Self::PerCell => cells,
            Self::Bounded(limit) => limit.clamp(1, cells.max(1)),
        }
    }
}

/// Settings shared by the thread-spawning executors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Thread fan-out policy.
    pub fanout: Fanout,

    /// Upper bound on a whole `run` call. `None` waits as long as workers
    /// are alive.
    pub deadline: Option<Duration>,

    /// How often blocked waits wake up to check the deadline and whether
    /// workers are still alive.
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            fanout: Fanout::PerCell,
            deadline: None,
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn with_fanout(mut self, fanout: Fanout) -> Self {
        self.fanout = fanout;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }
}

/// Selects one of the four executors by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Sequential,
    SharedState,
    Pipeline,
    Pool,
}

impl Strategy {
    /// Every strategy, baseline first.
    pub const ALL: [Strategy; 4] = [
        Strategy::Sequential,
        Strategy::SharedState,
        Strategy::Pipeline,
        Strategy::Pool,
    ];

    /// Build the executor for this strategy. The pool uses every detected core.
    pub fn executor(self, config: &ExecutorConfig) -> Box<dyn Executor> {
        match self {
            Self::Sequential => Box::new(SequentialExecutor::new()),
            Self::SharedState => Box::new(SharedStateExecutor::new(config.clone())),
            Self::Pipeline => Box::new(PipelineExecutor::new(config.clone())),
            Self::Pool => Box::new(PoolExecutor::new()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::SharedState => "shared-state",
            Self::Pipeline => "pipeline",
            Self::Pool => "pool",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown strategy '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_threads() {
        assert_eq!(Fanout::PerCell.threads(16), 16);
        assert_eq!(Fanout::Bounded(4).threads(16), 4);
        assert_eq!(Fanout::Bounded(64).threads(16), 16);
        assert_eq!(Fanout::Bounded(0).threads(16), 1);
    }

    #[test]
    fn test_strategy_names_roundtrip() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>(), Ok(strategy));
            let executor = strategy.executor(&ExecutorConfig::default());
            assert_eq!(executor.name(), strategy.name());
        }
        assert!("gpu".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.fanout, Fanout::PerCell);
        assert_eq!(config.deadline, None);

        let config = config
            .with_deadline(Duration::from_secs(2))
            .with_poll_interval(Duration::ZERO);
        assert_eq!(config.deadline, Some(Duration::from_secs(2)));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }
}
