use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::runner::context::{self, ContextGuard, ExecContext};
use crate::runner::node::{NodeId, NodeKind, RunState, TestNode};
use crate::runner::result::Outcome;

/// A discoverable unit inside a test binary, before it is built into a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Fixture path, e.g. `net::codec`.
    pub name: String,
    pub cases: Vec<CaseDescriptor>,
}

/// A single test case listed by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseDescriptor {
    pub full_name: String,
    /// Marked ignored by the binary itself.
    pub ignored: bool,
}

/// Finds fixtures in a test binary and builds them into node trees.
pub trait DiscoveryEngine: Send + Sync {
    /// Enumerate every type in the binary.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] listing one [`LoadFailure`] per cause when the
    /// binary cannot be loaded or enumerated. This is fatal for the run.
    fn types(&self, binary: &Path) -> Result<Vec<TypeDescriptor>, DiscoveryError>;

    /// Whether `ty` describes a buildable fixture.
    fn can_build_from(&self, ty: &TypeDescriptor) -> bool;

    /// Build the node tree for `ty`, capability flags and run-states included.
    fn build_from(&self, ty: &TypeDescriptor) -> TestNode;
}

/// Runs node trees and reports progress to an [`EventSink`].
///
/// Engines implement [`ExecutionEngine::run_case`]; the tree walk, filter
/// gating and event emission are shared through [`execute_tree`].
pub trait ExecutionEngine: Send + Sync {
    /// One-time global setup. Called exactly once, before any fixture is built.
    fn initialize(&self);

    /// Install a fresh execution context on the calling thread.
    fn save_context(&self) -> ContextGuard {
        context::save(ExecContext::default())
    }

    /// Run a single test case.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] if the execution infrastructure fails. A
    /// failing assertion is not an error; it is an [`Outcome`] with
    /// `OutcomeStatus::Failure`.
    fn run_case(&self, case: &TestNode) -> Result<Outcome, ExecutionError>;

    /// Run a node subtree, consulting `filter` once per node.
    fn run(&self, node: &TestNode, sink: &dyn EventSink, filter: &dyn NodeFilter) -> Outcome {
        execute_tree(self, node, RunState::Normal, sink, filter)
    }
}

/// Decides whether a node is eligible to run.
pub trait NodeFilter: Sync {
    /// `inherited` is the parent's effective run-state.
    fn matches(&self, node: &TestNode, inherited: RunState) -> bool;

    /// Same decision as [`NodeFilter::matches`], used by the tree walk.
    fn pass(&self, node: &TestNode, inherited: RunState) -> bool {
        self.matches(node, inherited)
    }
}

/// Notifications emitted while a run is in progress.
#[derive(Debug, Clone, Copy)]
pub enum RunEvent<'a> {
    TestFinished(&'a Outcome),
    SuiteFinished(&'a Outcome),
    Skipped { node: &'a TestNode, state: RunState },
}

/// Receives [`RunEvent`]s, possibly from several threads at once.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent<'_>);
}

/// Sink that drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RunEvent<'_>) {}
}

/// Walk `node`, running accepted cases through `engine`.
///
/// A rejected node is not run; its whole subtree becomes skipped outcomes and
/// each descendant still goes through the filter once, with the inherited
/// state, so that it is counted.
pub fn execute_tree<E: ExecutionEngine + ?Sized>(
    engine: &E,
    node: &TestNode,
    inherited: RunState,
    sink: &dyn EventSink,
    filter: &dyn NodeFilter,
) -> Outcome {
    if !filter.pass(node, inherited) {
        return skip_tree(node, inherited, filter);
    }

    match node.kind {
        NodeKind::Case => {
            let outcome = engine.run_case(node).unwrap_or_else(|e| {
                Outcome::error(node, Duration::ZERO, e.to_string(), e.detail)
            });
            sink.emit(RunEvent::TestFinished(&outcome));
            outcome
        }
        NodeKind::Suite => {
            let start = Instant::now();
            let effective = node.run_state.restrict(inherited);
            let children = node
                .children
                .iter()
                .map(|child| execute_tree(engine, child, effective, sink, filter))
                .collect();
            let outcome = Outcome::suite(node, children, start.elapsed());
            sink.emit(RunEvent::SuiteFinished(&outcome));
            outcome
        }
    }
}

fn skip_tree(node: &TestNode, inherited: RunState, filter: &dyn NodeFilter) -> Outcome {
    let state = node.run_state.restrict(inherited);
    let mut outcome = Outcome::skipped(node, state);
    outcome.children = node
        .children
        .iter()
        .map(|child| {
            let accepted = filter.pass(child, state);
            debug_assert!(!accepted, "child of a rejected node was accepted");
            skip_tree(child, state, filter)
        })
        .collect();
    outcome
}

/// Monotonic [`NodeId`] source for discovery engines.
#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> NodeId {
        NodeId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Fatal failure while enumerating a test binary.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct DiscoveryError {
    pub kind: DiscoveryErrorKind,
    pub message: String,
    /// Every underlying cause.
    pub failures: Vec<LoadFailure>,
}

/// Classification of discovery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryErrorKind {
    /// The binary could not be found or started.
    #[error("binary not loadable")]
    BinaryNotLoadable,
    /// The binary ran but its listing could not be read.
    #[error("type load failed")]
    TypeLoadFailed,
}

/// A single cause of a [`DiscoveryError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub message: String,
    pub trace: Option<String>,
    /// Loader diagnostics for file-not-found causes (resolved path, search dir).
    pub loader_log: Option<String>,
}

/// Infrastructure failure of an execution engine.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

/// Classification of execution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionErrorKind {
    #[error("spawn failed")]
    SpawnFailed,
    #[error("missing result")]
    MissingResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::aggregator::ResultAggregator;
    use crate::runner::filter::RunStateFilter;
    use crate::runner::result::OutcomeStatus;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    // -- Mock engine and filter --

    struct ScriptedEngine {
        fail: &'static str,
        broken: &'static str,
    }

    impl ExecutionEngine for ScriptedEngine {
        fn initialize(&self) {}

        fn run_case(&self, case: &TestNode) -> Result<Outcome, ExecutionError> {
            if case.name == self.broken {
                return Err(ExecutionError {
                    kind: ExecutionErrorKind::SpawnFailed,
                    message: "no such file".into(),
                    detail: Some("os error 2".into()),
                });
            }
            if case.name == self.fail {
                Ok(Outcome::failure(case, Duration::ZERO, "boom", None))
            } else {
                Ok(Outcome::success(case, Duration::ZERO))
            }
        }
    }

    #[derive(Default)]
    struct CountingFilter {
        calls: AtomicUsize,
    }

    impl NodeFilter for CountingFilter {
        fn matches(&self, node: &TestNode, inherited: RunState) -> bool {
            self.calls.fetch_add(1, Ordering::Relaxed);
            !node.run_state.restrict(inherited).suppresses()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: RunEvent<'_>) {
            let line = match event {
                RunEvent::TestFinished(o) => format!("test {}", o.name),
                RunEvent::SuiteFinished(o) => format!("suite {}", o.name),
                RunEvent::Skipped { node, state } => format!("skip {} {state}", node.full_name),
            };
            self.events.lock().push(line);
        }
    }

    fn engine() -> ScriptedEngine {
        ScriptedEngine {
            fail: "b",
            broken: "c",
        }
    }

    fn fixture(state: RunState) -> TestNode {
        TestNode::suite(
            NodeId(1),
            "fx",
            vec![
                TestNode::case(NodeId(2), "fx::a"),
                TestNode::case(NodeId(3), "fx::b"),
                TestNode::case(NodeId(4), "fx::c"),
            ],
        )
        .with_run_state(state)
    }

    // ── execute_tree ───────────────────────────────────────

    #[test]
    fn runs_every_case_once() {
        let filter = CountingFilter::default();
        let sink = RecordingSink::default();
        let outcome = engine().run(&fixture(RunState::Normal), &sink, &filter);
        assert_eq!(outcome.children.len(), 3);
        assert_eq!(filter.calls.load(Ordering::Relaxed), 4);
        assert_eq!(
            *sink.events.lock(),
            vec!["test fx::a", "test fx::b", "test fx::c", "suite fx"]
        );
    }

    #[test]
    fn engine_error_becomes_error_outcome() {
        let outcome = engine().run(
            &fixture(RunState::Normal),
            &NullSink,
            &CountingFilter::default(),
        );
        let broken = &outcome.children[2];
        assert_eq!(broken.status, OutcomeStatus::Error);
        assert_eq!(broken.message.as_deref(), Some("spawn failed: no such file"));
        assert_eq!(broken.trace.as_deref(), Some("os error 2"));
        assert_eq!(outcome.status, OutcomeStatus::Error);
    }

    #[test]
    fn rejected_suite_skips_whole_subtree() {
        let filter = CountingFilter::default();
        let sink = RecordingSink::default();
        let outcome = engine().run(&fixture(RunState::Ignored), &sink, &filter);
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert!(
            outcome
                .children
                .iter()
                .all(|c| c.status == OutcomeStatus::Skipped)
        );
        // The suite and each of its cases pass through the filter once.
        assert_eq!(filter.calls.load(Ordering::Relaxed), 4);
        assert!(sink.events.lock().is_empty());
    }

    #[test]
    fn rejected_case_inside_running_suite() {
        let mut node = fixture(RunState::Normal);
        node.children[0].run_state = RunState::Explicit;
        let outcome = engine().run(&node, &NullSink, &CountingFilter::default());
        assert_eq!(outcome.children[0].status, OutcomeStatus::Skipped);
        assert_eq!(outcome.children[0].message.as_deref(), Some("explicit"));
        assert_eq!(outcome.children[1].status, OutcomeStatus::Failure);
    }

    #[derive(Default)]
    struct RunLog {
        ran: Mutex<Vec<String>>,
    }

    impl ExecutionEngine for RunLog {
        fn initialize(&self) {}

        fn run_case(&self, case: &TestNode) -> Result<Outcome, ExecutionError> {
            self.ran.lock().push(case.full_name.clone());
            Ok(Outcome::success(case, Duration::ZERO))
        }
    }

    #[test]
    fn ignored_state_reaches_grandchildren() {
        let tree = TestNode::suite(
            NodeId(1),
            "net",
            vec![TestNode::suite(
                NodeId(2),
                "net::tcp",
                vec![TestNode::case(NodeId(3), "net::tcp::connects")],
            )],
        )
        .with_run_state(RunState::Ignored);

        let engine = RunLog::default();
        let aggregator = ResultAggregator::new();
        let filter = RunStateFilter::new(&aggregator, &NullSink);
        let outcome = engine.run(&tree, &NullSink, &filter);

        assert!(engine.ran.lock().is_empty());
        let statuses: Vec<OutcomeStatus> = outcome.flatten().iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![OutcomeStatus::Skipped; 3]);
        assert_eq!(outcome.children[0].children[0].message.as_deref(), Some("ignored"));
        assert_eq!(aggregator.skipped(), 3);
    }

    #[test]
    fn explicit_state_reaches_grandchildren_under_normal_root() {
        let tree = TestNode::suite(
            NodeId(1),
            "net",
            vec![
                TestNode::suite(
                    NodeId(2),
                    "net::tcp",
                    vec![TestNode::case(NodeId(3), "net::tcp::connects")],
                )
                .with_run_state(RunState::Explicit),
                TestNode::case(NodeId(4), "net::resolves"),
            ],
        );

        let engine = RunLog::default();
        let aggregator = ResultAggregator::new();
        let filter = RunStateFilter::new(&aggregator, &NullSink);
        let outcome = engine.run(&tree, &NullSink, &filter);

        assert_eq!(*engine.ran.lock(), vec!["net::resolves"]);
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(aggregator.skipped(), 2);
    }

    // ── IdSequence / errors ────────────────────────────────

    #[test]
    fn id_sequence_is_monotonic() {
        let ids = IdSequence::new();
        assert_eq!(ids.next(), NodeId(1));
        assert_eq!(ids.next(), NodeId(2));
    }

    #[test]
    fn discovery_error_display() {
        let err = DiscoveryError {
            kind: DiscoveryErrorKind::BinaryNotLoadable,
            message: "target/debug/deps/codec-1a2b".into(),
            failures: vec![],
        };
        assert_eq!(
            err.to_string(),
            "binary not loadable: target/debug/deps/codec-1a2b"
        );
        assert_eq!(
            DiscoveryErrorKind::TypeLoadFailed.to_string(),
            "type load failed"
        );
    }

    #[test]
    fn execution_error_display() {
        let err = ExecutionError {
            kind: ExecutionErrorKind::MissingResult,
            message: "no result line for fx::a".into(),
            detail: None,
        };
        assert_eq!(err.to_string(), "missing result: no result line for fx::a");
    }
}
