use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info};

use crate::runner::aggregator::{Phase, ResultAggregator};
use crate::runner::backend::{DiscoveryEngine, DiscoveryError, EventSink, ExecutionEngine, LoadFailure};
use crate::runner::display::{format_report, format_run_header};
use crate::runner::filter::RunStateFilter;
use crate::runner::node::TestNode;
use crate::runner::partition::partition;
use crate::runner::pool::{PoolStats, WorkerPool, Workload, default_worker_count, run_fixture};
use crate::runner::result::Outcome;
use crate::runner::summary::{RunSummary, failing_leaves};

/// Configuration for a test run. Built once by the caller, never mutated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Test binary to run.
    pub binary: PathBuf,
    /// Worker threads for the concurrent phase.
    pub worker_count: usize,
    /// Fixture belonging to the caller itself; never run.
    pub excluded_fixture: Option<String>,
}

impl RunConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            worker_count: default_worker_count(),
            excluded_fixture: None,
        }
    }
}

/// The parallel test runner.
///
/// Discovers fixtures, runs parallelizable ones on a worker pool, then runs
/// the rest in discovery order on the calling thread, and summarizes.
pub struct ParallelRunner<'a> {
    config: RunConfig,
    discovery: &'a dyn DiscoveryEngine,
    engine: &'a dyn ExecutionEngine,
    init: Once,
}

impl<'a> ParallelRunner<'a> {
    pub fn new(
        config: RunConfig,
        discovery: &'a dyn DiscoveryEngine,
        engine: &'a dyn ExecutionEngine,
    ) -> Self {
        Self {
            config,
            discovery,
            engine,
            init: Once::new(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute every fixture in the configured binary.
    ///
    /// 1. Initialize the execution engine (once per runner)
    /// 2. Discover fixtures
    /// 3. Partition into concurrent and sequential groups
    /// 4. Drain the concurrent group on the worker pool and join
    /// 5. Run the sequential group on this thread, in discovery order
    /// 6. Summarize
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] only when discovery fails. Test failures are
    /// reported in the returned [`TestRunResult`].
    pub fn run(&self, sink: &dyn EventSink) -> Result<TestRunResult, RunError> {
        let start = Instant::now();

        // 1. Init
        self.init.call_once(|| self.engine.initialize());
        let aggregator = ResultAggregator::new();

        // 2. Discover
        let fixtures = self.discover()?;

        // 3. Partition
        let partition = partition(fixtures, self.config.excluded_fixture.as_deref());
        let pool = WorkerPool::new(self.config.worker_count);
        info!(
            "{}: {} concurrent, {} sequential fixtures",
            format_run_header(&self.name(), pool.size()),
            partition.concurrent.len(),
            partition.sequential.len()
        );

        let pool_stats = {
            let filter = RunStateFilter::new(&aggregator, sink);
            let work = Workload {
                engine: self.engine,
                filter: &filter,
                sink,
                aggregator: &aggregator,
            };

            // 4. Concurrent phase
            let stats = pool.drain(&partition.concurrent, work);
            info!(
                workers = stats.workers,
                fixtures = stats.total(),
                "concurrent phase joined"
            );

            // 5. Sequential phase
            for task in &partition.sequential {
                let outcome = run_fixture(task, work);
                aggregator.publish(Phase::Sequential, outcome);
            }
            info!(fixtures = partition.sequential.len(), "sequential phase finished");
            stats
        };

        // 6. Summarize
        let skipped = aggregator.skipped();
        let (phases, outcomes): (Vec<Phase>, Vec<Outcome>) = aggregator
            .into_published()
            .into_iter()
            .map(|p| (p.phase, p.outcome))
            .unzip();
        let summary = RunSummary::from_outcomes(&outcomes, skipped);
        let report = format_report(&summary, &failing_leaves(&outcomes));

        Ok(TestRunResult {
            root: Outcome::composite(&self.name(), outcomes),
            phases,
            summary,
            report,
            pool: pool_stats,
            total_duration: start.elapsed(),
        })
    }

    /// Build every fixture in the binary, logging each cause on failure.
    fn discover(&self) -> Result<Vec<TestNode>, RunError> {
        let types = self.discovery.types(&self.config.binary).map_err(|e| {
            log_discovery_failure(&e);
            RunError::from(e)
        })?;

        Ok(types
            .iter()
            .filter(|ty| self.discovery.can_build_from(ty))
            .map(|ty| self.discovery.build_from(ty))
            .collect())
    }

    fn name(&self) -> String {
        binary_name(&self.config.binary)
    }
}

fn log_discovery_failure(err: &DiscoveryError) {
    error!("{err}");
    for failure in &err.failures {
        error!(
            message = %failure.message,
            trace = failure.trace.as_deref().unwrap_or(""),
            loader_log = failure.loader_log.as_deref().unwrap_or(""),
            "loader failure"
        );
    }
}

/// File stem of a test binary, used as the run's name.
pub fn binary_name(binary: &Path) -> String {
    binary
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| binary.display().to_string())
}

/// The complete result of a test run.
#[derive(Debug, Clone)]
pub struct TestRunResult {
    /// Composite outcome whose children are every published fixture outcome.
    pub root: Outcome,
    /// Scheduling phase of each child of `root`, index-aligned.
    pub phases: Vec<Phase>,
    pub summary: RunSummary,
    /// Rendered failure listing and counts.
    pub report: String,
    pub pool: PoolStats,
    pub total_duration: Duration,
}

/// Error from the runner orchestration layer.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RunError {
    pub kind: RunErrorKind,
    pub message: String,
    /// Underlying loader failures, one per cause.
    pub failures: Vec<LoadFailure>,
}

impl From<DiscoveryError> for RunError {
    fn from(e: DiscoveryError) -> Self {
        Self {
            kind: RunErrorKind::DiscoveryFailed,
            message: e.to_string(),
            failures: e.failures,
        }
    }
}

/// Classification of runner errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunErrorKind {
    /// The binary's fixtures could not be enumerated.
    #[error("discovery failed")]
    DiscoveryFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use crate::runner::backend::{
        CaseDescriptor, DiscoveryErrorKind, ExecutionError, IdSequence, NullSink, TypeDescriptor,
    };
    use crate::runner::node::RunState;
    use crate::runner::result::OutcomeStatus;

    // -- Mock collaborators for executor tests --

    struct MockDiscovery {
        types: Vec<TypeDescriptor>,
        parallel: Vec<&'static str>,
        explicit: Vec<&'static str>,
        fail: bool,
        ids: IdSequence,
    }

    impl MockDiscovery {
        fn new(types: Vec<TypeDescriptor>) -> Self {
            Self {
                types,
                parallel: vec![],
                explicit: vec![],
                fail: false,
                ids: IdSequence::new(),
            }
        }
    }

    impl DiscoveryEngine for MockDiscovery {
        fn types(&self, _binary: &Path) -> Result<Vec<TypeDescriptor>, DiscoveryError> {
            if self.fail {
                return Err(DiscoveryError {
                    kind: DiscoveryErrorKind::TypeLoadFailed,
                    message: "2 types failed to load".into(),
                    failures: vec![
                        LoadFailure {
                            message: "missing dependency libfoo.so".into(),
                            trace: Some("at loader".into()),
                            loader_log: Some("searched /usr/lib".into()),
                        },
                        LoadFailure {
                            message: "bad symbol table".into(),
                            trace: None,
                            loader_log: None,
                        },
                    ],
                });
            }
            Ok(self.types.clone())
        }

        fn can_build_from(&self, ty: &TypeDescriptor) -> bool {
            !ty.cases.is_empty()
        }

        fn build_from(&self, ty: &TypeDescriptor) -> TestNode {
            let children = ty
                .cases
                .iter()
                .map(|c| {
                    let state = if c.ignored {
                        RunState::Ignored
                    } else {
                        RunState::Normal
                    };
                    TestNode::case(self.ids.next(), &c.full_name).with_run_state(state)
                })
                .collect();
            let state = if self.explicit.contains(&ty.name.as_str()) {
                RunState::Explicit
            } else {
                RunState::Normal
            };
            TestNode::suite(self.ids.next(), &ty.name, children)
                .with_run_state(state)
                .parallelizable(self.parallel.contains(&ty.name.as_str()))
        }
    }

    #[derive(Default)]
    struct MockEngine {
        inits: AtomicUsize,
        runs: Mutex<HashMap<String, usize>>,
        failing: Vec<&'static str>,
    }

    impl ExecutionEngine for MockEngine {
        fn initialize(&self) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn run_case(&self, case: &TestNode) -> Result<Outcome, ExecutionError> {
            *self.runs.lock().entry(case.full_name.clone()).or_default() += 1;
            if self.failing.contains(&case.full_name.as_str()) {
                Ok(Outcome::failure(
                    case,
                    Duration::from_millis(1),
                    "assertion failed",
                    Some("trace".into()),
                ))
            } else {
                Ok(Outcome::success(case, Duration::from_millis(1)))
            }
        }
    }

    fn ty(name: &str, cases: &[(&str, bool)]) -> TypeDescriptor {
        TypeDescriptor {
            name: name.into(),
            cases: cases
                .iter()
                .map(|(c, ignored)| CaseDescriptor {
                    full_name: format!("{name}::{c}"),
                    ignored: *ignored,
                })
                .collect(),
        }
    }

    fn three_parallel_one_sequential() -> MockDiscovery {
        let mut discovery = MockDiscovery::new(vec![
            ty("alpha", &[("a1", false), ("a2", false)]),
            ty("beta", &[("b1", false), ("b2", false)]),
            ty("gamma", &[("g1", false), ("g2", false)]),
            ty("serial", &[("s1", false)]),
        ]);
        discovery.parallel = vec!["alpha", "beta", "gamma"];
        discovery
    }

    fn config(workers: usize) -> RunConfig {
        RunConfig {
            worker_count: workers,
            ..RunConfig::new("target/debug/deps/codec-1a2b")
        }
    }

    // ── happy path ─────────────────────────────────────────

    #[test]
    fn run_config_defaults() {
        let config = RunConfig::new("bin/tests");
        assert!(config.worker_count >= 2);
        assert!(config.excluded_fixture.is_none());
    }

    #[test]
    fn all_passing_fixtures() {
        let discovery = three_parallel_one_sequential();
        let engine = MockEngine::default();
        let runner = ParallelRunner::new(config(4), &discovery, &engine);
        let result = runner.run(&NullSink).unwrap();
        assert_eq!(result.summary.passed, 7);
        assert_eq!(result.summary.failed_or_errored(), 0);
        assert_eq!(result.summary.skipped, 0);
        assert_eq!(result.root.children.len(), 4);
        assert_eq!(result.root.name, "codec-1a2b");
        assert!(result.summary.success());
    }

    #[test]
    fn every_case_runs_exactly_once() {
        let discovery = three_parallel_one_sequential();
        let engine = MockEngine::default();
        ParallelRunner::new(config(8), &discovery, &engine)
            .run(&NullSink)
            .unwrap();
        let runs = engine.runs.lock();
        assert_eq!(runs.len(), 7);
        assert!(runs.values().all(|&n| n == 1));
    }

    #[test]
    fn initialize_runs_once_per_runner() {
        let discovery = three_parallel_one_sequential();
        let engine = MockEngine::default();
        let runner = ParallelRunner::new(config(2), &discovery, &engine);
        runner.run(&NullSink).unwrap();
        runner.run(&NullSink).unwrap();
        assert_eq!(engine.inits.load(Ordering::SeqCst), 1);
    }

    // ── ordering ───────────────────────────────────────────

    #[test]
    fn sequential_outcomes_follow_concurrent_ones() {
        let mut discovery = MockDiscovery::new(vec![
            ty("s1", &[("t", false)]),
            ty("p1", &[("t", false)]),
            ty("s2", &[("t", false)]),
            ty("p2", &[("t", false)]),
        ]);
        discovery.parallel = vec!["p1", "p2"];
        let engine = MockEngine::default();
        let result = ParallelRunner::new(config(4), &discovery, &engine)
            .run(&NullSink)
            .unwrap();
        assert_eq!(
            result.phases,
            vec![
                Phase::Concurrent,
                Phase::Concurrent,
                Phase::Sequential,
                Phase::Sequential
            ]
        );
        assert_eq!(result.root.children[2].name, "s1");
        assert_eq!(result.root.children[3].name, "s2");
    }

    // ── filtering ──────────────────────────────────────────

    #[test]
    fn ignored_case_is_skipped_and_counted() {
        let mut discovery = MockDiscovery::new(vec![
            ty("alpha", &[("a1", false), ("a2", true)]),
            ty("serial", &[("s1", false)]),
        ]);
        discovery.parallel = vec!["alpha"];
        let engine = MockEngine::default();
        let result = ParallelRunner::new(config(2), &discovery, &engine)
            .run(&NullSink)
            .unwrap();
        assert_eq!(result.summary.passed, 2);
        assert_eq!(result.summary.skipped, 1);
        assert!(!engine.runs.lock().contains_key("alpha::a2"));
    }

    #[test]
    fn explicit_fixture_skips_all_its_nodes() {
        let mut discovery = MockDiscovery::new(vec![
            ty("soak", &[("long1", false), ("long2", false)]),
            ty("serial", &[("s1", false)]),
        ]);
        discovery.explicit = vec!["soak"];
        let engine = MockEngine::default();
        let result = ParallelRunner::new(config(2), &discovery, &engine)
            .run(&NullSink)
            .unwrap();
        // The fixture and both of its cases.
        assert_eq!(result.summary.skipped, 3);
        assert_eq!(result.summary.passed, 1);
        assert_eq!(result.root.children[0].status, OutcomeStatus::Skipped);
    }

    #[test]
    fn excluded_fixture_never_runs() {
        let discovery = three_parallel_one_sequential();
        let engine = MockEngine::default();
        let cfg = RunConfig {
            excluded_fixture: Some("serial".into()),
            ..config(2)
        };
        let result = ParallelRunner::new(cfg, &discovery, &engine)
            .run(&NullSink)
            .unwrap();
        assert_eq!(result.root.children.len(), 3);
        assert_eq!(result.summary.passed, 6);
    }

    #[test]
    fn unbuildable_types_are_ignored() {
        let discovery = MockDiscovery::new(vec![ty("empty", &[]), ty("one", &[("t", false)])]);
        let engine = MockEngine::default();
        let result = ParallelRunner::new(config(2), &discovery, &engine)
            .run(&NullSink)
            .unwrap();
        assert_eq!(result.root.children.len(), 1);
    }

    // ── failures ───────────────────────────────────────────

    #[test]
    fn failures_reported_not_raised() {
        let discovery = three_parallel_one_sequential();
        let engine = MockEngine {
            failing: vec!["beta::b2", "serial::s1"],
            ..MockEngine::default()
        };
        let result = ParallelRunner::new(config(3), &discovery, &engine)
            .run(&NullSink)
            .unwrap();
        assert_eq!(result.summary.passed, 5);
        assert_eq!(result.summary.failed, 2);
        assert!(result.report.contains("beta::b2 failed"));
        assert!(result.report.contains("serial::s1 failed"));
        assert!(
            result
                .report
                .contains("ParallelTestRunner finished: 5 passed, 2 failed, 0 skipped.")
        );
    }

    #[test]
    fn discovery_failure_is_fatal() {
        let mut discovery = three_parallel_one_sequential();
        discovery.fail = true;
        let engine = MockEngine::default();
        let err = ParallelRunner::new(config(2), &discovery, &engine)
            .run(&NullSink)
            .unwrap_err();
        assert_eq!(err.kind, RunErrorKind::DiscoveryFailed);
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].message, "missing dependency libfoo.so");
        assert!(engine.runs.lock().is_empty());
    }

    #[test]
    fn run_error_display() {
        let err = RunError {
            kind: RunErrorKind::DiscoveryFailed,
            message: "type load failed: bad listing".into(),
            failures: vec![],
        };
        assert_eq!(
            err.to_string(),
            "discovery failed: type load failed: bad listing"
        );
    }

    #[test]
    fn binary_name_uses_file_stem() {
        assert_eq!(binary_name(Path::new("target/debug/deps/codec-1a2b")), "codec-1a2b");
        assert_eq!(binary_name(Path::new("tests.exe")), "tests");
    }
}
