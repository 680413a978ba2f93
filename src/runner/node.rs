use std::fmt;

/// Unique identity of a discovered node within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a node groups other nodes or is a single runnable test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Suite,
    Case,
}

/// Controls whether a node executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Normal,
    Ignored,
    Explicit,
}

impl RunState {
    /// The more restrictive of `self` and a state inherited from a parent.
    ///
    /// Ignored outranks Explicit, which outranks Normal.
    pub fn restrict(self, inherited: RunState) -> RunState {
        match (self, inherited) {
            (Self::Ignored, _) | (_, Self::Ignored) => Self::Ignored,
            (Self::Explicit, _) | (_, Self::Explicit) => Self::Explicit,
            _ => Self::Normal,
        }
    }

    /// Whether this state suppresses execution.
    pub fn suppresses(self) -> bool {
        self != Self::Normal
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Ignored => write!(f, "ignored"),
            Self::Explicit => write!(f, "explicit"),
        }
    }
}

/// A discovered fixture or test case.
///
/// Nodes are produced by a discovery engine and only read by the scheduler.
/// Parent linkage is expressed by the tree walk: whoever descends into
/// `children` carries the parent's effective [`RunState`] along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestNode {
    pub id: NodeId,
    /// Short name (e.g. the test function name).
    pub name: String,
    /// Fully qualified path (e.g. `net::codec::decodes_frames`).
    pub full_name: String,
    pub kind: NodeKind,
    pub run_state: RunState,
    /// Safe to run concurrently with sibling fixtures. Only read at fixture level.
    pub parallelizable: bool,
    pub children: Vec<TestNode>,
}

impl TestNode {
    /// Create a fixture node.
    pub fn suite(id: NodeId, full_name: &str, children: Vec<TestNode>) -> Self {
        Self {
            id,
            name: short_name(full_name).to_owned(),
            full_name: full_name.to_owned(),
            kind: NodeKind::Suite,
            run_state: RunState::Normal,
            parallelizable: false,
            children,
        }
    }

    /// Create a test case node.
    pub fn case(id: NodeId, full_name: &str) -> Self {
        Self {
            id,
            name: short_name(full_name).to_owned(),
            full_name: full_name.to_owned(),
            kind: NodeKind::Case,
            run_state: RunState::Normal,
            parallelizable: false,
            children: Vec::new(),
        }
    }

    pub fn with_run_state(mut self, run_state: RunState) -> Self {
        self.run_state = run_state;
        self
    }

    pub fn parallelizable(mut self, parallelizable: bool) -> Self {
        self.parallelizable = parallelizable;
        self
    }

    pub fn is_suite(&self) -> bool {
        self.kind == NodeKind::Suite
    }

    /// Depth-first, pre-order iteration over this node and all descendants.
    pub fn walk(&self) -> Vec<&TestNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Number of test cases in this subtree.
    pub fn count_cases(&self) -> usize {
        self.walk()
            .into_iter()
            .filter(|n| n.kind == NodeKind::Case)
            .count()
    }
}

fn short_name(full_name: &str) -> &str {
    full_name.rsplit("::").next().unwrap_or(full_name)
}
