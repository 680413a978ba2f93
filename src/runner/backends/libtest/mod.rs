//! Backend for test binaries built on Rust's built-in test harness.
//!
//! Discovery lists the binary's tests and groups them into one fixture per
//! module path. Execution runs each case in its own process with
//! `--exact <name> --test-threads 1` and parses the result line.

pub mod discover;
pub mod output;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::ProjectConfig;
use crate::runner::backend::{
    DiscoveryEngine, DiscoveryError, ExecutionEngine, ExecutionError, ExecutionErrorKind,
    IdSequence, TypeDescriptor,
};
use crate::runner::context::{self, ContextGuard, ExecContext};
use crate::runner::executor::binary_name;
use crate::runner::node::{RunState, TestNode};
use crate::runner::result::Outcome;

use self::output::{CaseStatus, find_case, parse_output};

/// Discovers fixtures by asking the binary for its test list.
pub struct LibtestDiscovery {
    config: ProjectConfig,
    ids: IdSequence,
}

impl LibtestDiscovery {
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            config,
            ids: IdSequence::new(),
        }
    }

    fn case_state(&self, full_name: &str, listed_ignored: bool) -> RunState {
        let listed = if listed_ignored {
            RunState::Ignored
        } else {
            RunState::Normal
        };
        self.config.run_state(full_name).restrict(listed)
    }
}

impl DiscoveryEngine for LibtestDiscovery {
    fn types(&self, binary: &Path) -> Result<Vec<TypeDescriptor>, DiscoveryError> {
        let tests = discover::list_tests(binary)?;
        let types = discover::group_by_module(&tests, &binary_name(binary));
        debug!(tests = tests.len(), fixtures = types.len(), "listed tests");
        Ok(types)
    }

    fn can_build_from(&self, ty: &TypeDescriptor) -> bool {
        !ty.cases.is_empty()
    }

    fn build_from(&self, ty: &TypeDescriptor) -> TestNode {
        let cases = ty
            .cases
            .iter()
            .map(|c| {
                TestNode::case(self.ids.next(), &c.full_name)
                    .with_run_state(self.case_state(&c.full_name, c.ignored))
            })
            .collect();
        TestNode::suite(self.ids.next(), &ty.name, cases)
            .with_run_state(self.config.run_state(&ty.name))
            .parallelizable(self.config.is_parallelizable(&ty.name))
    }
}

/// Runs each case as its own process of the test binary.
pub struct LibtestEngine {
    binary: PathBuf,
    resolved: OnceLock<PathBuf>,
}

impl LibtestEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            resolved: OnceLock::new(),
        }
    }

    /// Absolute path of the binary; children run from other directories.
    fn resolved(&self) -> &Path {
        self.resolved.get_or_init(|| resolve_binary(&self.binary))
    }

    fn spawn_case(&self, case: &TestNode) -> Result<(std::process::Output, Duration), ExecutionError> {
        let ctx = context::current();
        let mut cmd = Command::new(self.resolved());
        cmd.arg(&case.full_name)
            .args(["--exact", "--test-threads", "1"])
            .envs(&ctx.env);
        if let Some(dir) = ctx.working_dir() {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let output = cmd.output().map_err(|e| ExecutionError {
            kind: ExecutionErrorKind::SpawnFailed,
            message: format!("failed to run {}: {e}", self.resolved().display()),
            detail: None,
        })?;
        Ok((output, start.elapsed()))
    }
}

fn resolve_binary(binary: &Path) -> PathBuf {
    std::fs::canonicalize(binary)
        .or_else(|_| std::path::absolute(binary))
        .unwrap_or_else(|_| binary.to_path_buf())
}

impl ExecutionEngine for LibtestEngine {
    fn initialize(&self) {
        info!(binary = %self.resolved().display(), "libtest engine ready");
    }

    fn save_context(&self) -> ContextGuard {
        let dir = self
            .resolved()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        context::save(ExecContext::new(dir))
    }

    fn run_case(&self, case: &TestNode) -> Result<Outcome, ExecutionError> {
        let (output, elapsed) = self.spawn_case(case)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let reports = parse_output(&stdout);

        let Some(report) = find_case(&reports, &case.full_name) else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(ExecutionError {
                kind: ExecutionErrorKind::MissingResult,
                message: format!(
                    "no result for {} (exit status {})",
                    case.full_name, output.status
                ),
                detail: (!stderr.trim().is_empty()).then_some(stderr),
            });
        };

        let mut outcome = match report.status {
            CaseStatus::Ok => Outcome::success(case, elapsed),
            CaseStatus::Failed => Outcome::failure(
                case,
                elapsed,
                report.message.clone().unwrap_or_else(|| "test failed".into()),
                (!report.section.is_empty()).then(|| report.section.clone()),
            ),
            // Ignored cases are filtered out before they reach here, so the
            // listing and the binary disagree.
            CaseStatus::Ignored => Outcome::error(
                case,
                elapsed,
                format!(
                    "{} reported ignored at run time but was not listed as ignored",
                    case.full_name
                ),
                None,
            ),
        };
        outcome.stdout = stdout.into_owned();
        Ok(outcome)
    }
}
