use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::trace;

use crate::runner::aggregator::ResultAggregator;
use crate::runner::backend::{EventSink, NodeFilter, RunEvent};
use crate::runner::node::{NodeId, RunState, TestNode};

/// Rejects ignored and explicit nodes, counting each rejection once.
///
/// A node's effective state is the more restrictive of its own and the
/// state inherited from its parent. Rejections are recorded on the
/// aggregator's skip counter and announced to the sink. Asking twice about
/// the same node gives the same answer without counting it again.
pub struct RunStateFilter<'a> {
    aggregator: &'a ResultAggregator,
    sink: &'a dyn EventSink,
    rejected: Mutex<HashSet<NodeId>>,
}

impl<'a> RunStateFilter<'a> {
    pub fn new(aggregator: &'a ResultAggregator, sink: &'a dyn EventSink) -> Self {
        Self {
            aggregator,
            sink,
            rejected: Mutex::new(HashSet::new()),
        }
    }

    fn reject(&self, node: &TestNode, state: RunState) {
        let first = self.rejected.lock().insert(node.id);
        if first {
            trace!(node = %node.full_name, %state, "filtered out");
            self.aggregator.record_skip();
            self.sink.emit(RunEvent::Skipped { node, state });
        }
    }
}

impl NodeFilter for RunStateFilter<'_> {
    fn matches(&self, node: &TestNode, inherited: RunState) -> bool {
        let state = node.run_state.restrict(inherited);
        if state.suppresses() {
            self.reject(node, state);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::backend::NullSink;

    #[derive(Default)]
    struct SkipLog {
        states: Mutex<Vec<RunState>>,
    }

    impl EventSink for SkipLog {
        fn emit(&self, event: RunEvent<'_>) {
            if let RunEvent::Skipped { state, .. } = event {
                self.states.lock().push(state);
            }
        }
    }

    fn case(id: u64, state: RunState) -> TestNode {
        TestNode::case(NodeId(id), "fx::t").with_run_state(state)
    }

    // ── own state ──────────────────────────────────────────

    #[test]
    fn normal_node_is_accepted() {
        let agg = ResultAggregator::new();
        let filter = RunStateFilter::new(&agg, &NullSink);
        assert!(filter.matches(&case(1, RunState::Normal), RunState::Normal));
        assert_eq!(agg.skipped(), 0);
    }

    #[test]
    fn ignored_node_is_rejected_and_counted() {
        let agg = ResultAggregator::new();
        let log = SkipLog::default();
        let filter = RunStateFilter::new(&agg, &log);
        assert!(!filter.matches(&case(1, RunState::Ignored), RunState::Normal));
        assert_eq!(agg.skipped(), 1);
        assert_eq!(*log.states.lock(), vec![RunState::Ignored]);
    }

    #[test]
    fn explicit_node_is_rejected_and_counted() {
        let agg = ResultAggregator::new();
        let log = SkipLog::default();
        let filter = RunStateFilter::new(&agg, &log);
        assert!(!filter.matches(&case(1, RunState::Explicit), RunState::Normal));
        assert_eq!(agg.skipped(), 1);
        assert_eq!(*log.states.lock(), vec![RunState::Explicit]);
    }

    // ── inherited state ────────────────────────────────────

    #[test]
    fn inherited_ignored_rejects_normal_child() {
        let agg = ResultAggregator::new();
        let filter = RunStateFilter::new(&agg, &NullSink);
        assert!(!filter.matches(&case(1, RunState::Normal), RunState::Ignored));
        assert_eq!(agg.skipped(), 1);
    }

    #[test]
    fn inherited_explicit_rejects_normal_child() {
        let agg = ResultAggregator::new();
        let filter = RunStateFilter::new(&agg, &NullSink);
        assert!(!filter.pass(&case(1, RunState::Normal), RunState::Explicit));
        assert_eq!(agg.skipped(), 1);
    }

    #[test]
    fn ignored_reported_before_explicit() {
        let agg = ResultAggregator::new();
        let log = SkipLog::default();
        let filter = RunStateFilter::new(&agg, &log);
        filter.matches(&case(1, RunState::Explicit), RunState::Ignored);
        assert_eq!(*log.states.lock(), vec![RunState::Ignored]);
    }

    // ── counting ───────────────────────────────────────────

    #[test]
    fn match_then_pass_counts_once() {
        let agg = ResultAggregator::new();
        let log = SkipLog::default();
        let filter = RunStateFilter::new(&agg, &log);
        let node = case(7, RunState::Ignored);
        assert!(!filter.matches(&node, RunState::Normal));
        assert!(!filter.pass(&node, RunState::Normal));
        assert_eq!(agg.skipped(), 1);
        assert_eq!(log.states.lock().len(), 1);
    }

    #[test]
    fn distinct_nodes_each_counted() {
        let agg = ResultAggregator::new();
        let filter = RunStateFilter::new(&agg, &NullSink);
        filter.matches(&case(1, RunState::Ignored), RunState::Normal);
        filter.matches(&case(2, RunState::Explicit), RunState::Normal);
        filter.matches(&case(3, RunState::Normal), RunState::Normal);
        assert_eq!(agg.skipped(), 2);
    }

    #[test]
    fn concurrent_rejections_are_exact() {
        let agg = ResultAggregator::new();
        let filter = RunStateFilter::new(&agg, &NullSink);
        std::thread::scope(|s| {
            for worker in 0..4u64 {
                let filter = &filter;
                s.spawn(move || {
                    for i in 0..100u64 {
                        filter.matches(&case(worker * 1000 + i, RunState::Ignored), RunState::Normal);
                    }
                });
            }
        });
        assert_eq!(agg.skipped(), 400);
    }
}
