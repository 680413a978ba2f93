use crate::runner::result::{Outcome, OutcomeStatus};

/// Pass/fail/skip counts for a finished run.
///
/// Only leaf outcomes are counted; suites are containers. Skipped leaves are
/// excluded from pass/fail and `skipped` comes from the filter's counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl RunSummary {
    /// Walk the outcome forest and count leaves.
    pub fn from_outcomes(outcomes: &[Outcome], skipped: usize) -> Self {
        let mut summary = Self {
            skipped,
            ..Self::default()
        };
        for leaf in outcomes.iter().flat_map(Outcome::flatten).filter(|o| o.is_leaf()) {
            match leaf.status {
                OutcomeStatus::Success => summary.passed += 1,
                OutcomeStatus::Failure => summary.failed += 1,
                OutcomeStatus::Error => summary.errors += 1,
                OutcomeStatus::Skipped => {}
            }
        }
        summary
    }

    /// Failures and errors together.
    pub fn failed_or_errored(&self) -> usize {
        self.failed + self.errors
    }

    /// Whether the run was fully successful (no failures or errors).
    pub fn success(&self) -> bool {
        self.failed_or_errored() == 0
    }

    /// Leaf outcomes that ran.
    pub fn executed(&self) -> usize {
        self.passed + self.failed_or_errored()
    }
}

/// Failing and errored leaves in walk order.
pub fn failing_leaves(outcomes: &[Outcome]) -> Vec<&Outcome> {
    outcomes
        .iter()
        .flat_map(Outcome::flatten)
        .filter(|o| o.is_leaf() && o.status.is_failure_or_error())
        .collect()
}
