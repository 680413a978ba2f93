use serde::{Deserialize, Serialize};

use crate::runner::node::NodeKind;
use crate::runner::result::Outcome;
use crate::runner::summary::RunSummary;

/// Serializable test run result for emitter output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunReport {
    pub run: RunMetadata,
    pub fixtures: Vec<OutcomeReport>,
    pub summary: SummaryReport,
}

/// Metadata about the run execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub name: String,
    pub duration_ms: u64,
}

/// One outcome in the report, with its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub name: String,
    pub kind: String,
    pub status: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutcomeReport>,
}

/// Summary statistics in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub success: bool,
}

/// Convert a run's root outcome and summary into a serializable [`TestRunReport`].
pub fn to_report(root: &Outcome, summary: &RunSummary) -> TestRunReport {
    TestRunReport {
        run: RunMetadata {
            name: root.name.clone(),
            duration_ms: millis(root),
        },
        fixtures: root.children.iter().map(outcome_report).collect(),
        summary: SummaryReport {
            passed: summary.passed,
            failed: summary.failed,
            errors: summary.errors,
            skipped: summary.skipped,
            success: summary.success(),
        },
    }
}

fn outcome_report(outcome: &Outcome) -> OutcomeReport {
    OutcomeReport {
        name: outcome.name.clone(),
        kind: match outcome.kind {
            NodeKind::Suite => "suite",
            NodeKind::Case => "case",
        }
        .to_owned(),
        status: outcome.status.to_string(),
        duration_ms: millis(outcome),
        message: outcome.message.clone(),
        trace: outcome.trace.clone(),
        children: outcome.children.iter().map(outcome_report).collect(),
    }
}

fn millis(outcome: &Outcome) -> u64 {
    u64::try_from(outcome.duration.as_millis()).unwrap_or(u64::MAX)
}
