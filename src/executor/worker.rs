//! Thread plumbing shared by the shared-state and pipeline executors.
//!
//! Workers are named OS threads that return `Result<T>`. Panics inside a
//! unit of work are caught at the cell boundary (see [`guarded`]) so the
//! parent learns which cell failed instead of getting a bare join error.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A spawned worker thread.
pub(crate) struct Worker<T> {
    cell: Option<(usize, usize)>,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Worker<T> {
    /// Spawn `body` on a thread called `name`.
    ///
    /// `cell` is the output cell this worker owns, if it owns exactly one.
    /// Spawn failures (thread limits) are reported as [`Error::WorkerFailure`].
    pub(crate) fn spawn<F>(name: String, cell: Option<(usize, usize)>, body: F) -> Result<Self>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|e| {
                warn!("failed to spawn worker {}: {}", name, e);
                Error::WorkerFailure {
                    cell,
                    message: format!("could not spawn thread: {e}"),
                }
            })?;
        debug!("spawned worker {}", name);
        Ok(Self { cell, handle })
    }
}

impl<T> Worker<T> {
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the thread exits and return what it produced.
    pub(crate) fn join(self) -> Result<T> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => Err(Error::WorkerFailure {
                cell: self.cell,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

/// Wall-clock budget for one `run` call. `None` waits forever.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub(crate) fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Time left, or `None` when unbounded.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.limit
            .map(|limit| limit.saturating_sub(self.started.elapsed()))
    }

    pub(crate) fn expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }

    /// How long to block before re-checking liveness.
    pub(crate) fn next_wait(&self, poll: Duration) -> Duration {
        self.remaining().map_or(poll, |r| r.min(poll))
    }

    pub(crate) fn timeout(&self) -> Error {
        let waited = self.started.elapsed();
        warn!("gave up waiting for workers after {:?}", waited);
        Error::Timeout { waited }
    }
}

/// FIFO of pending jobs drained by a bounded set of workers.
pub(crate) struct TaskQueue<J> {
    jobs: Mutex<VecDeque<J>>,
}

impl<J> TaskQueue<J> {
    pub(crate) fn new(jobs: impl IntoIterator<Item = J>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into_iter().collect()),
        }
    }

    pub(crate) fn pop(&self) -> Option<J> {
        self.jobs.lock().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.lock().len()
    }
}

/// Run one cell's work, turning a panic into [`Error::WorkerFailure`] for `cell`.
pub(crate) fn guarded<T>(cell: (usize, usize), work: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        warn!("worker for cell {cell:?} panicked: {message}");
        Err(Error::worker(cell, message))
    })
}

/// Spawn one worker per item through `spawn`.
///
/// If a spawn fails, the workers already started are joined (within
/// `deadline`) before the spawn error is returned.
pub(crate) fn spawn_all<I, T, F>(
    items: I,
    deadline: &Deadline,
    poll: Duration,
    mut spawn: F,
) -> Result<Vec<Worker<T>>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Result<Worker<T>>,
{
    let mut workers = Vec::new();
    for item in items {
        match spawn(item) {
            Ok(worker) => workers.push(worker),
            Err(e) => {
                warn!("spawn failed, joining {} started workers", workers.len());
                if let Err(join_err) = join_all(workers, deadline, poll) {
                    debug!("started worker also failed: {}", join_err);
                }
                return Err(e);
            }
        }
    }
    Ok(workers)
}

/// Join every worker, waiting no longer than `deadline`.
///
/// All workers are joined even after one fails, so no thread outlives the
/// call unless the deadline expires first. On timeout the remaining threads
/// are detached.
pub(crate) fn join_all<T>(
    workers: Vec<Worker<T>>,
    deadline: &Deadline,
    poll: Duration,
) -> Result<Vec<T>> {
    if deadline.remaining().is_some() {
        while !workers.iter().all(Worker::is_finished) {
            if deadline.expired() {
                return Err(deadline.timeout());
            }
            thread::sleep(deadline.next_wait(poll));
        }
    }

    let mut results = Vec::with_capacity(workers.len());
    let mut failure = None;
    for worker in workers {
        match worker.join() {
            Ok(value) => results.push(value),
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    failure.map_or(Ok(results), Err)
}

/// First error reported by a worker that has exited, allowing `grace` for
/// workers that are still unwinding. Workers still running afterwards are
/// detached.
pub(crate) fn first_failure<T>(mut workers: Vec<Worker<T>>, grace: Duration) -> Option<Error> {
    let until = Instant::now() + grace;
    loop {
        let (finished, running): (Vec<_>, Vec<_>) =
            workers.into_iter().partition(Worker::is_finished);
        for worker in finished {
            if let Err(e) = worker.join() {
                return Some(e);
            }
        }
        if running.is_empty() || Instant::now() >= until {
            return None;
        }
        workers = running;
        thread::sleep(Duration::from_millis(1));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_guarded_catches_panic() {
        let result: Result<()> = guarded((3, 4), || panic!("kernel exploded"));
        match result {
            Err(Error::WorkerFailure { cell, message }) => {
                assert_eq!(cell, Some((3, 4)));
                assert_eq!(message, "kernel exploded");
            }
            other => panic!("expected WorkerFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_guarded_passes_through_result() {
        assert_eq!(guarded((0, 0), || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_join_all_collects_in_spawn_order() {
        let workers: Vec<Worker<usize>> = (0..4)
            .map(|i| Worker::spawn(format!("t{i}"), None, move || Ok(i)).unwrap())
            .collect();

        let deadline = Deadline::start(None);
        let out = join_all(workers, &deadline, Duration::from_millis(1)).unwrap();
        assert_eq!(out, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_join_all_reports_failure() {
        let fail = || -> Result<()> { Err(Error::worker((0, 1), "nope")) };
        let workers = vec![
            Worker::spawn("ok".into(), Some((0, 0)), || Ok(())).unwrap(),
            Worker::spawn("bad".into(), Some((0, 1)), fail).unwrap(),
        ];

        let deadline = Deadline::start(None);
        let err = join_all(workers, &deadline, Duration::from_millis(1));
        assert_eq!(err, Err(Error::worker((0, 1), "nope")));
    }

    #[test]
    fn test_join_all_times_out() {
        let sleepy = Worker::spawn("sleepy".into(), None, || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap();

        let deadline = Deadline::start(Some(Duration::from_millis(20)));
        let err = join_all(vec![sleepy], &deadline, Duration::from_millis(5));
        assert!(matches!(err, Err(Error::Timeout { .. })));
    }

    #[test]
    fn test_spawn_all_joins_started_workers_on_spawn_error() {
        let done = Arc::new(AtomicUsize::new(0));
        let deadline = Deadline::start(None);

        let result = spawn_all(0..4, &deadline, Duration::from_millis(1), |i| {
            if i == 2 {
                return Err(Error::worker((0, i), "could not spawn thread"));
            }
            let done = Arc::clone(&done);
            Worker::spawn(format!("slow-{i}"), None, move || {
                thread::sleep(Duration::from_millis(50));
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let err = result.err();
        assert_eq!(err, Some(Error::worker((0, 2), "could not spawn thread")));
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_spawn_all_keeps_every_worker() {
        let deadline = Deadline::start(None);
        let poll = Duration::from_millis(1);
        let spawn = |i: i32| Worker::spawn(format!("w{i}"), None, move || Ok(i * 2));
        let workers = spawn_all(0..3, &deadline, poll, spawn).unwrap();

        assert_eq!(join_all(workers, &deadline, poll).unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn test_task_queue_is_fifo() {
        let queue = TaskQueue::new([1, 2, 3]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_first_failure_finds_error() {
        let dead = || -> Result<()> { Err(Error::worker((1, 1), "dead")) };
        let workers = vec![
            Worker::spawn("fine".into(), None, || Ok(())).unwrap(),
            Worker::spawn("broken".into(), Some((1, 1)), dead).unwrap(),
        ];

        let err = first_failure(workers, Duration::from_secs(1));
        assert_eq!(err, Some(Error::worker((1, 1), "dead")));
    }

    #[test]
    fn test_unbounded_deadline_never_expires() {
        let deadline = Deadline::start(None);
        assert!(!deadline.expired());
        let poll = Duration::from_millis(5);
        assert_eq!(deadline.next_wait(poll), poll);
    }
}
