use std::io::Write;

use parking_lot::Mutex;

use crate::runner::backend::{EventSink, RunEvent};
use crate::runner::node::RunState;
use crate::runner::result::{Outcome, OutcomeStatus};
use crate::runner::summary::RunSummary;

const RULE_MINOR: &str = "------------------------------------------------";
const RULE_MAJOR: &str = "=================================================";

/// One progress character per finished or filtered test.
pub fn progress_char(event: &RunEvent<'_>) -> Option<char> {
    match event {
        RunEvent::TestFinished(outcome) => Some(match outcome.status {
            OutcomeStatus::Success => '.',
            OutcomeStatus::Failure => 'F',
            OutcomeStatus::Error => 'E',
            OutcomeStatus::Skipped => 'S',
        }),
        RunEvent::Skipped { state, .. } => Some(match state {
            RunState::Explicit => 'X',
            _ => 'I',
        }),
        RunEvent::SuiteFinished(_) => None,
    }
}

/// Event sink printing the running progress indicator.
pub struct ProgressSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ProgressSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl ProgressSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> EventSink for ProgressSink<W> {
    fn emit(&self, event: RunEvent<'_>) {
        if let Some(c) = progress_char(&event) {
            let mut out = self.out.lock();
            // Progress output is best effort.
            let _ = write!(out, "{c}");
            let _ = out.flush();
        }
    }
}

/// Format the failure listing and final counts printed after a run.
pub fn format_report(summary: &RunSummary, failures: &[&Outcome]) -> String {
    let mut out = String::from("\n");

    for failure in failures {
        out.push_str(RULE_MINOR);
        out.push('\n');
        out.push_str(&format!("{} failed\n", failure.name));
        if let Some(message) = &failure.message {
            out.push_str(message);
            out.push('\n');
        }
        if let Some(trace) = &failure.trace {
            out.push_str(trace);
            out.push('\n');
        }
    }

    out.push_str(RULE_MAJOR);
    out.push('\n');
    out.push_str(&format_counts(summary));
    out.push('\n');
    out.push_str(RULE_MAJOR);
    out.push('\n');
    out
}

/// The one-line pass/fail/skip tally.
pub fn format_counts(summary: &RunSummary) -> String {
    format!(
        "ParallelTestRunner finished: {} passed, {} failed, {} skipped.",
        summary.passed,
        summary.failed_or_errored(),
        summary.skipped
    )
}

/// Format the run header line.
pub fn format_run_header(binary: &str, workers: usize) -> String {
    format!("Running tests from {binary} ({workers} workers)")
}
