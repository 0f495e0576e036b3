//! Error types shared by every executor.

use std::time::Duration;

use thiserror::Error;

/// Errors from block arithmetic and executor runs.
///
/// Every variant aborts the current `run` call; executors never hand back a
/// partially filled grid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Operands are not conformable.
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch {
        /// Shape the operation required.
        expected: String,
        /// Shape it was given.
        found: String,
    },

    /// Grid or block dimension is zero.
    #[error("invalid dimensions: grid {n}x{n} of {m}x{m} blocks (both must be >= 1)")]
    InvalidDimensions {
        /// Blocks per grid side.
        n: usize,
        /// Block side length.
        m: usize,
    },

    /// A worker died or finished without producing its result.
    ///
    /// Only unwinding panics are caught. Workers are threads in this process,
    /// so `std::process::abort`, a stack overflow, or running out of memory
    /// takes the whole process down instead of surfacing here.
    #[error("worker for {} failed: {message}", describe_cell(.cell))]
    WorkerFailure {
        /// Output cell the worker was handling, if known.
        cell: Option<(usize, usize)>,
        /// Panic payload or reason.
        message: String,
    },

    /// A join or channel pull exceeded the configured deadline.
    #[error("timed out after {waited:?} waiting for workers")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The worker pool could not be built.
    #[error("failed to build worker pool: {message}")]
    ThreadPool {
        /// Error message from the pool builder.
        message: String,
    },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn block_mismatch(expected: usize, found: usize) -> Self {
        Self::ShapeMismatch {
            expected: format!("{expected}x{expected} block"),
            found: format!("{found}x{found} block"),
        }
    }

    pub(crate) fn worker(cell: (usize, usize), message: impl Into<String>) -> Self {
        Self::WorkerFailure {
            cell: Some(cell),
            message: message.into(),
        }
    }
}

fn describe_cell(cell: &Option<(usize, usize)>) -> String {
    match cell {
        Some((i, j)) => format!("cell ({i}, {j})"),
        None => "unknown cell".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_failure_message_names_cell() {
        let err = Error::worker((1, 2), "boom");
        assert_eq!(err.to_string(), "worker for cell (1, 2) failed: boom");

        let err = Error::WorkerFailure {
            cell: None,
            message: "exited".into(),
        };
        assert_eq!(err.to_string(), "worker for unknown cell failed: exited");
    }

    #[test]
    fn test_block_mismatch_message() {
        let err = Error::block_mismatch(3, 4);
        assert_eq!(
            err.to_string(),
            "shape mismatch: expected 3x3 block, found 4x4 block"
        );
    }
}
