use crate::runner::node::TestNode;
use crate::runner::queue::WorkQueue;

/// A schedulable unit: one top-level fixture subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureTask {
    /// Position in discovery order.
    pub order: usize,
    pub root: TestNode,
}

/// Fixtures split by scheduling group.
#[derive(Debug, Default)]
pub struct Partition {
    pub concurrent: WorkQueue,
    /// In discovery order.
    pub sequential: Vec<FixtureTask>,
}

impl Partition {
    pub fn total(&self) -> usize {
        self.concurrent.len() + self.sequential.len()
    }
}

/// Classify fixtures by their `parallelizable` flag.
///
/// Fixtures named `excluded` (the caller's own fixture) are dropped so a
/// runner never re-runs itself.
pub fn partition(fixtures: Vec<TestNode>, excluded: Option<&str>) -> Partition {
    let mut concurrent = Vec::new();
    let mut sequential = Vec::new();

    let eligible = fixtures
        .into_iter()
        .filter(|f| excluded != Some(f.full_name.as_str()));

    for (order, root) in eligible.enumerate() {
        let task = FixtureTask { order, root };
        if task.root.parallelizable {
            concurrent.push(task);
        } else {
            sequential.push(task);
        }
    }

    Partition {
        concurrent: WorkQueue::new(concurrent),
        sequential,
    }
}
