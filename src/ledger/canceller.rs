//! Cycle cancellation
//!
//! Finds debt loops in a snapshot with a breadth-first search per debt edge
//! and asks the ledger to cancel each loop by its smallest edge. The
//! snapshot is never re-read or patched during a sweep; overlapping loops
//! race at the ledger, which rejects any cancellation whose edges no longer
//! hold the amount.

use super::graph::{DebtGraph, creditors_of};
use crate::chain::{Address, Amount, CyclePath, Ledger};
use crate::config::SweepConfig;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOptions {
    /// Submit each distinct loop once, whatever edge it was found from
    pub dedupe_cycles: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            dedupe_cycles: true,
        }
    }
}

impl From<&SweepConfig> for SweepOptions {
    fn from(config: &SweepConfig) -> Self {
        Self {
            dedupe_cycles: config.dedupe_cycles,
        }
    }
}

/// Terminal state of one submitted cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CancellationOutcome {
    Cancelled { cycle: CyclePath },
    Rejected { cycle: CyclePath, reason: String },
}

impl CancellationOutcome {
    pub fn cycle(&self) -> &CyclePath {
        match self {
            CancellationOutcome::Cancelled { cycle } => cycle,
            CancellationOutcome::Rejected { cycle, .. } => cycle,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CancellationOutcome::Cancelled { .. })
    }
}

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub outcomes: Vec<CancellationOutcome>,
}

impl SweepReport {
    /// Loops the ledger confirmed as cancelled
    pub fn cancelled(&self) -> impl Iterator<Item = &CyclePath> {
        self.outcomes
            .iter()
            .filter(|o| o.is_cancelled())
            .map(CancellationOutcome::cycle)
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled().count()
    }

    pub fn rejected_count(&self) -> usize {
        self.outcomes.len() - self.cancelled_count()
    }

    /// Debt removed from each edge of the confirmed loops, summed per edge.
    /// Only confirmed cancellations count.
    pub fn cancelled_per_edge(&self) -> HashMap<(Address, Address), Amount> {
        let mut per_edge = HashMap::new();
        for cycle in self.cancelled() {
            for (debtor, creditor) in cycle.edges() {
                *per_edge
                    .entry((debtor.clone(), creditor.clone()))
                    .or_insert(0) += cycle.amount;
            }
        }
        per_edge
    }

    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Breadth-first search for a shortest path from `start` to `end`.
///
/// `neighbors` must be pure. Each node is expanded at most once, so loops
/// that do not pass through `end` cannot trap the search. Returns the path
/// including both endpoints.
pub fn bfs_path<'a, F>(start: &'a Address, end: &Address, neighbors: F) -> Option<Vec<Address>>
where
    F: Fn(&Address) -> Vec<&'a Address>,
{
    let mut parents: HashMap<&'a Address, &'a Address> = HashMap::new();
    let mut seen: HashSet<&'a Address> = HashSet::from([start]);
    let mut queue: VecDeque<&'a Address> = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        if node == end {
            let mut path = vec![node.clone()];
            let mut current = node;
            while let Some(&prev) = parents.get(current) {
                path.push(prev.clone());
                current = prev;
            }
            path.reverse();
            return Some(path);
        }

        for next in neighbors(node) {
            if seen.insert(next) {
                parents.insert(next, node);
                queue.push_back(next);
            }
        }
    }

    None
}

/// Smallest edge weight along the loop, wrap edge included
pub fn min_cycle_amount(graph: &DebtGraph, participants: &[Address]) -> Amount {
    let n = participants.len();
    (0..n)
        .map(|i| graph.debt(&participants[i], &participants[(i + 1) % n]))
        .min()
        .unwrap_or(0)
}

/// Every loop reachable through each debt edge `i -> j` of the snapshot.
///
/// Self edges are never searched. Without dedupe the same loop is reported
/// once per edge it was found from.
pub fn find_cycle_candidates(graph: &DebtGraph, options: SweepOptions) -> Vec<CyclePath> {
    let mut candidates = Vec::new();
    let mut seen_loops = HashSet::new();

    for i in graph.participants() {
        for j in creditors_of(graph, i) {
            if i == j {
                continue;
            }

            let Some(path) = bfs_path(j, i, |node| creditors_of(graph, node)) else {
                continue;
            };

            // path is j -> ... -> i; the loop is i -> j -> ... with i wrapping
            let mut participants = Vec::with_capacity(path.len());
            participants.push(i.clone());
            participants.extend(path[..path.len() - 1].iter().cloned());

            let amount = min_cycle_amount(graph, &participants);
            if amount == 0 {
                continue;
            }
            let cycle = CyclePath {
                participants,
                amount,
            };

            if options.dedupe_cycles && !seen_loops.insert(cycle.canonical_key()) {
                tracing::trace!("Skipping rediscovered loop {}", cycle);
                continue;
            }
            candidates.push(cycle);
        }
    }

    candidates
}

/// Submit every candidate concurrently and wait until all have settled.
///
/// A rejected cancellation is logged and kept in the report; nothing is
/// retried.
pub async fn submit_cancellations(
    ledger: &dyn Ledger,
    candidates: Vec<CyclePath>,
) -> Vec<CancellationOutcome> {
    let submissions = candidates.into_iter().map(|cycle| async move {
        match ledger.cancel_cycle(&cycle).await {
            Ok(()) => {
                tracing::info!("Cancelled debt loop {}", cycle);
                CancellationOutcome::Cancelled { cycle }
            }
            Err(e) => {
                tracing::warn!("Cancellation of {} rejected: {}", cycle, e);
                CancellationOutcome::Rejected {
                    cycle,
                    reason: e.to_string(),
                }
            }
        }
    });

    join_all(submissions).await
}

/// Find and cancel the loops of one snapshot
pub async fn sweep(ledger: &dyn Ledger, graph: &DebtGraph, options: SweepOptions) -> SweepReport {
    if !graph.has_cycles() {
        tracing::debug!("Snapshot has no debt loops");
        return SweepReport::default();
    }

    let candidates = find_cycle_candidates(graph, options);
    tracing::debug!("Submitting {} cycle cancellations", candidates.len());

    let report = SweepReport {
        outcomes: submit_cancellations(ledger, candidates).await,
    };
    tracing::info!(
        cancelled = report.cancelled_count(),
        rejected = report.rejected_count(),
        "Sweep complete"
    );
    report
}
