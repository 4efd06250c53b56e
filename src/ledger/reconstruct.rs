//! State reconstruction
//!
//! Participants come from the full call history; debts come from the
//! ledger itself, one pairwise query per ordered pair of participants.

use super::graph::DebtGraph;
use crate::chain::abi::ADD_IOU;
use crate::chain::{Address, Event, Ledger};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;

/// Everyone who ever sent or received an IOU
pub fn list_participants(events: &[Event]) -> BTreeSet<Address> {
    let mut participants = BTreeSet::new();
    for event in events.iter().filter(|e| e.function == ADD_IOU) {
        if let Some(creditor) = event.counterparty() {
            participants.insert(creditor.clone());
        }
        participants.insert(event.sender.clone());
    }
    participants
}

/// Query the ledger for every ordered pair of distinct participants and
/// build a snapshot.
///
/// At most `max_concurrent` queries are in flight. A failed query leaves its
/// edge out of the snapshot.
pub async fn rebuild_graph(
    ledger: &dyn Ledger,
    participants: &BTreeSet<Address>,
    max_concurrent: usize,
) -> DebtGraph {
    let mut graph = DebtGraph::new();
    for participant in participants {
        graph.add_participant(participant);
    }

    let pairs = participants.iter().flat_map(|debtor| {
        participants
            .iter()
            .filter(move |creditor| *creditor != debtor)
            .map(move |creditor| (debtor, creditor))
    });

    let results: Vec<_> = stream::iter(pairs)
        .map(|(debtor, creditor)| async move {
            let result = ledger.pairwise_debt(debtor, creditor).await;
            (debtor, creditor, result)
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    let mut failed = 0usize;
    for (debtor, creditor, result) in results {
        match result {
            Ok(amount) => graph.set_debt(debtor, creditor, amount),
            Err(e) => {
                failed += 1;
                tracing::warn!("Debt lookup {} -> {} failed: {}", debtor, creditor, e);
            }
        }
    }

    let stats = graph.stats();
    tracing::debug!(
        participants = stats.participants,
        debts = stats.debts,
        failed_queries = failed,
        "Rebuilt debt graph"
    );

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChain, sample_participants};
    use crate::chain::CallArg;

    fn add_event(sender: &str, creditor: &str, timestamp: u64) -> Event {
        Event {
            sender: Address::new(sender),
            function: ADD_IOU.to_string(),
            args: vec![CallArg::Address(Address::new(creditor)), CallArg::Uint(1)],
            timestamp,
            block_number: timestamp,
            tx_hash: format!("0x{:x}", timestamp),
        }
    }

    #[test]
    fn test_participants_are_union_of_senders_and_creditors() {
        let events = vec![
            add_event("0xAA", "0xBB", 3),
            add_event("0xbb", "0xCc", 2),
            add_event("0xaa", "0xbb", 1),
        ];

        let participants = list_participants(&events);
        let expected: BTreeSet<Address> = ["0xaa", "0xbb", "0xcc"]
            .into_iter()
            .map(Address::new)
            .collect();
        assert_eq!(participants, expected);
    }

    #[test]
    fn test_participants_ignore_other_calls() {
        let mut cancel = add_event("0xdd", "0xee", 1);
        cancel.function = "checkAndRemoveCycle".to_string();

        let participants = list_participants(&[cancel, add_event("0xaa", "0xbb", 2)]);
        assert_eq!(participants.len(), 2);
        assert!(!participants.contains(&Address::new("0xdd")));
    }

    #[test]
    fn test_no_events_no_participants() {
        assert!(list_participants(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_matches_ledger() {
        let chain = MockChain::with_sample_history().unwrap();
        let p = sample_participants();
        let participants: BTreeSet<Address> = p.iter().cloned().collect();

        let graph = rebuild_graph(&chain, &participants, 3).await;

        assert_eq!(graph.participants().count(), 4);
        assert_eq!(graph.graph.edge_count(), 4);
        assert_eq!(graph.debt(&p[0], &p[1]), 10);
        assert_eq!(graph.debt(&p[1], &p[2]), 5);
        assert_eq!(graph.debt(&p[2], &p[0]), 5);
        assert_eq!(graph.debt(&p[0], &p[3]), 3);
        assert_eq!(graph.total_owed(&p[0]), 13);
        assert_eq!(graph.total_owed(&p[3]), 0);
    }

    #[tokio::test]
    async fn test_failed_queries_leave_edges_out() {
        let chain = MockChain::with_sample_history().unwrap();
        chain.set_fail_queries(true);
        let participants: BTreeSet<Address> = sample_participants().into_iter().collect();

        let graph = rebuild_graph(&chain, &participants, 0).await;

        assert_eq!(graph.participants().count(), 4);
        assert_eq!(graph.graph.edge_count(), 0);
    }
}
