use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::runner::aggregator::{Phase, ResultAggregator};
use crate::runner::backend::{EventSink, ExecutionEngine, NodeFilter};
use crate::runner::context;
use crate::runner::partition::FixtureTask;
use crate::runner::queue::WorkQueue;
use crate::runner::result::Outcome;

/// Default pool size: twice the number of logical CPUs.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

/// What the pool did during one drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Workers actually started.
    pub workers: usize,
    /// Fixtures executed, per worker.
    pub executed: Vec<usize>,
}

impl PoolStats {
    pub fn total(&self) -> usize {
        self.executed.iter().sum()
    }
}

/// Shared collaborators every worker reads.
#[derive(Clone, Copy)]
pub struct Workload<'a> {
    pub engine: &'a dyn ExecutionEngine,
    pub filter: &'a dyn NodeFilter,
    pub sink: &'a dyn EventSink,
    pub aggregator: &'a ResultAggregator,
}

/// Fixed-size pool of OS threads draining one [`WorkQueue`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    /// A pool of `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run every queued fixture, returning once all workers have stopped.
    ///
    /// Each worker pulls until the queue is empty. No task is run twice and,
    /// because fixture panics are turned into error outcomes, none is lost.
    pub fn drain(&self, queue: &WorkQueue, work: Workload<'_>) -> PoolStats {
        let executed = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.size);
            for index in 0..self.size {
                let spawned = thread::Builder::new()
                    .name(format!("paratest-worker-{index}"))
                    .spawn_scoped(scope, move || worker_loop(index, queue, work));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => warn!(worker = index, "failed to start worker: {e}"),
                }
            }

            if handles.is_empty() {
                warn!("no worker threads started; draining on the calling thread");
                return vec![worker_loop(0, queue, work)];
            }

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|payload| {
                        error!("worker terminated abnormally: {}", panic_message(&*payload));
                        0
                    })
                })
                .collect::<Vec<usize>>()
        });

        PoolStats {
            workers: executed.len(),
            executed,
        }
    }
}

fn worker_loop(index: usize, queue: &WorkQueue, work: Workload<'_>) -> usize {
    let mut count = 0;
    while let Some(task) = queue.try_dequeue() {
        let outcome = run_fixture(&task, work);
        work.aggregator.publish(Phase::Concurrent, outcome);
        count += 1;
    }
    debug!(worker = index, fixtures = count, "worker drained queue");
    count
}

/// Run one fixture on the current thread with a fresh execution context.
///
/// A panic escaping the engine is recorded as an error outcome for the
/// fixture instead of unwinding into the scheduler.
pub(crate) fn run_fixture(task: &FixtureTask, work: Workload<'_>) -> Outcome {
    let _guard = work.engine.save_context();
    context::set_fixture(&task.root.full_name);
    debug!(fixture = %task.root.full_name, "fixture started");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        work.engine.run(&task.root, work.sink, work.filter)
    }));

    let outcome = result.unwrap_or_else(|payload| {
        let message = panic_message(&*payload);
        error!(fixture = %task.root.full_name, "fixture panicked: {message}");
        Outcome::error(
            &task.root,
            Duration::ZERO,
            format!("fixture panicked: {message}"),
            None,
        )
    });
    debug!(fixture = %task.root.full_name, status = %outcome.status, "fixture finished");
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
