use std::fmt;
use std::time::Duration;

use crate::runner::node::{NodeKind, RunState, TestNode};

/// The outcome of running a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Failure,
    Error,
    Skipped,
}

impl OutcomeStatus {
    pub fn is_failure_or_error(self) -> bool {
        matches!(self, Self::Failure | Self::Error)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Error => write!(f, "error"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of running one node, mirroring the node tree through `children`.
///
/// An outcome with no children is a leaf. Outcomes are never mutated once
/// they have been published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub name: String,
    pub kind: NodeKind,
    pub status: OutcomeStatus,
    pub duration: Duration,
    pub message: Option<String>,
    pub trace: Option<String>,
    pub stdout: String,
    pub children: Vec<Outcome>,
}

impl Outcome {
    fn new(node: &TestNode, status: OutcomeStatus, duration: Duration) -> Self {
        Self {
            name: node.full_name.clone(),
            kind: node.kind,
            status,
            duration,
            message: None,
            trace: None,
            stdout: String::new(),
            children: Vec::new(),
        }
    }

    /// Create a passing result.
    pub fn success(node: &TestNode, duration: Duration) -> Self {
        Self::new(node, OutcomeStatus::Success, duration)
    }

    /// Create a failing result (an assertion did not hold).
    pub fn failure(
        node: &TestNode,
        duration: Duration,
        message: impl Into<String>,
        trace: Option<String>,
    ) -> Self {
        let mut outcome = Self::new(node, OutcomeStatus::Failure, duration);
        outcome.message = Some(message.into());
        outcome.trace = trace;
        outcome
    }

    /// Create an errored result (the test could not be run to completion).
    pub fn error(
        node: &TestNode,
        duration: Duration,
        message: impl Into<String>,
        trace: Option<String>,
    ) -> Self {
        let mut outcome = Self::new(node, OutcomeStatus::Error, duration);
        outcome.message = Some(message.into());
        outcome.trace = trace;
        outcome
    }

    /// Create a skipped result with zero duration.
    pub fn skipped(node: &TestNode, state: RunState) -> Self {
        let mut outcome = Self::new(node, OutcomeStatus::Skipped, Duration::ZERO);
        outcome.message = Some(state.to_string());
        outcome
    }

    /// Create a suite result whose status is derived from its children.
    ///
    /// Failure or error below makes the suite fail; a suite where nothing
    /// ran is skipped.
    pub fn suite(node: &TestNode, children: Vec<Outcome>, duration: Duration) -> Self {
        let status = suite_status(&children);
        let mut outcome = Self::new(node, status, duration);
        outcome.children = children;
        outcome
    }

    /// The top-level composite holding every published outcome.
    pub fn composite(name: &str, children: Vec<Outcome>) -> Self {
        let duration = children.iter().map(|c| c.duration).sum();
        Self {
            name: name.to_owned(),
            kind: NodeKind::Suite,
            status: suite_status(&children),
            duration,
            message: None,
            trace: None,
            stdout: String::new(),
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// This outcome followed by all descendants, depth-first.
    pub fn flatten(&self) -> Vec<&Outcome> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(outcome) = stack.pop() {
            out.push(outcome);
            stack.extend(outcome.children.iter().rev());
        }
        out
    }
}

fn suite_status(children: &[Outcome]) -> OutcomeStatus {
    if children.iter().any(|c| c.status == OutcomeStatus::Error) {
        OutcomeStatus::Error
    } else if children.iter().any(|c| c.status == OutcomeStatus::Failure) {
        OutcomeStatus::Failure
    } else if children.iter().all(|c| c.status == OutcomeStatus::Skipped) {
        OutcomeStatus::Skipped
    } else {
        OutcomeStatus::Success
    }
}
