use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::runner::result::Outcome;

/// Which scheduling phase published an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Concurrent,
    Sequential,
}

/// A published top-level outcome with its publication order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Position in the global publish order, starting at 0.
    pub seq: usize,
    pub phase: Phase,
    pub outcome: Outcome,
}

/// Thread-safe, append-only sink for fixture outcomes.
///
/// Workers and the sequential runner publish concurrently; every publish is
/// a single locked append. Also owns the run's skip counter.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    entries: Mutex<Vec<Published>>,
    skipped: AtomicUsize,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one top-level outcome. Returns its sequence number.
    pub fn publish(&self, phase: Phase, outcome: Outcome) -> usize {
        let mut entries = self.entries.lock();
        let seq = entries.len();
        entries.push(Published {
            seq,
            phase,
            outcome,
        });
        seq
    }

    /// Copy of everything published so far, in publish order.
    pub fn snapshot(&self) -> Vec<Published> {
        self.entries.lock().clone()
    }

    /// Consume the aggregator, yielding entries in publish order.
    pub fn into_published(self) -> Vec<Published> {
        self.entries.into_inner()
    }

    /// Consume the aggregator, yielding outcomes in publish order.
    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.into_published()
            .into_iter()
            .map(|p| p.outcome)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }
}
