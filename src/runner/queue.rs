use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::runner::partition::FixtureTask;

/// Shared FIFO of concurrent fixtures, drained to empty by the worker pool.
///
/// Filled once before workers start; never refilled. An empty dequeue is
/// final, so workers simply stop when they see one.
#[derive(Debug, Default)]
pub struct WorkQueue {
    tasks: Mutex<VecDeque<FixtureTask>>,
}

impl WorkQueue {
    pub fn new(tasks: impl IntoIterator<Item = FixtureTask>) -> Self {
        Self {
            tasks: Mutex::new(tasks.into_iter().collect()),
        }
    }

    /// Pop the front task, or `None` once the queue is drained.
    pub fn try_dequeue(&self) -> Option<FixtureTask> {
        self.tasks.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}
