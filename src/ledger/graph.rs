use crate::chain::{Address, Amount};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::BTreeMap;

/// A point-in-time snapshot of who owes whom.
///
/// Nodes are participants, edges carry the positive amount the source owes
/// the target. Zero amounts are never stored, so "no edge" and "owes 0" are
/// the same thing. The snapshot is rebuilt wholesale from the ledger on each
/// pass and never patched afterwards.
#[derive(Debug, Clone, Default)]
pub struct DebtGraph {
    /// The underlying graph structure.
    pub graph: DiGraph<Address, Amount>,

    /// Participant to node lookup. Ordered so that every traversal of the
    /// snapshot is deterministic.
    pub index: BTreeMap<Address, NodeIndex>,
}

impl DebtGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant if it is not yet known.
    pub fn add_participant(&mut self, participant: &Address) -> NodeIndex {
        if let Some(&idx) = self.index.get(participant) {
            return idx;
        }
        let idx = self.graph.add_node(participant.clone());
        self.index.insert(participant.clone(), idx);
        idx
    }

    /// Sets the amount `debtor` owes `creditor`. Both become participants
    /// even when the amount is zero.
    pub fn set_debt(&mut self, debtor: &Address, creditor: &Address, amount: Amount) {
        let from = self.add_participant(debtor);
        let to = self.add_participant(creditor);

        match (self.graph.find_edge(from, to), amount) {
            (Some(edge), 0) => {
                self.graph.remove_edge(edge);
            }
            (Some(edge), amount) => self.graph[edge] = amount,
            (None, 0) => {}
            (None, amount) => {
                self.graph.add_edge(from, to, amount);
            }
        }
    }

    pub fn debt(&self, debtor: &Address, creditor: &Address) -> Amount {
        match (self.index.get(debtor), self.index.get(creditor)) {
            (Some(&from), Some(&to)) => self
                .graph
                .find_edge(from, to)
                .map(|edge| self.graph[edge])
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Sum of the participant's outgoing edges
    pub fn total_owed(&self, participant: &Address) -> Amount {
        self.index
            .get(participant)
            .map(|&idx| {
                self.graph
                    .edges_directed(idx, Direction::Outgoing)
                    .map(|edge| *edge.weight())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// All participants in address order
    pub fn participants(&self) -> impl Iterator<Item = &Address> {
        self.index.keys()
    }

    pub fn contains(&self, participant: &Address) -> bool {
        self.index.contains_key(participant)
    }

    /// All (debtor, creditor, amount) edges in address order
    pub fn debts(&self) -> Vec<(&Address, &Address, Amount)> {
        let mut debts: Vec<_> = self
            .graph
            .edge_references()
            .map(|edge| {
                (
                    &self.graph[edge.source()],
                    &self.graph[edge.target()],
                    *edge.weight(),
                )
            })
            .collect();
        debts.sort();
        debts
    }

    /// Whether any debt loop exists
    pub fn has_cycles(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Export to DOT format for Graphviz
    pub fn to_dot(&self) -> String {
        let mut dot = "digraph DebtGraph {\n".to_string();
        dot.push_str("  rankdir=LR;\n");
        dot.push_str("  node [shape=box, style=filled, fillcolor=\"lightblue\"];\n\n");

        for participant in self.participants() {
            dot.push_str(&format!(
                "  \"{}\" [label=\"{}\\ntotal {}\"];\n",
                participant,
                participant.short(),
                self.total_owed(participant)
            ));
        }

        dot.push('\n');

        for (debtor, creditor, amount) in self.debts() {
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                debtor, creditor, amount
            ));
        }

        dot.push_str("}\n");
        dot
    }

    /// Get graph statistics
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            participants: self.graph.node_count(),
            debts: self.graph.edge_count(),
            total_outstanding: self.graph.edge_weights().sum(),
            has_cycles: self.has_cycles(),
        }
    }
}

/// Positive-weight out-neighbors of `node` in the snapshot, in address order.
///
/// This is the neighbor function of the cycle search; it depends on nothing
/// but its arguments.
pub fn creditors_of<'a>(graph: &'a DebtGraph, node: &Address) -> Vec<&'a Address> {
    let Some(&idx) = graph.index.get(node) else {
        return Vec::new();
    };
    let mut creditors: Vec<&Address> = graph
        .graph
        .edges_directed(idx, Direction::Outgoing)
        .filter(|edge| *edge.weight() > 0)
        .map(|edge| &graph.graph[edge.target()])
        .collect();
    creditors.sort();
    creditors
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub participants: usize,
    pub debts: usize,
    pub total_outstanding: Amount,
    pub has_cycles: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(name: &str) -> Address {
        Address::new(name)
    }

    fn triangle() -> DebtGraph {
        let mut graph = DebtGraph::new();
        graph.set_debt(&addr("a"), &addr("b"), 10);
        graph.set_debt(&addr("b"), &addr("c"), 5);
        graph.set_debt(&addr("c"), &addr("a"), 5);
        graph
    }

    #[test]
    fn test_empty_graph() {
        let graph = DebtGraph::new();
        assert_eq!(graph.graph.node_count(), 0);
        assert_eq!(graph.total_owed(&addr("a")), 0);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn test_zero_debt_keeps_participants_but_no_edge() {
        let mut graph = DebtGraph::new();
        graph.set_debt(&addr("a"), &addr("b"), 0);

        assert!(graph.contains(&addr("a")));
        assert!(graph.contains(&addr("b")));
        assert_eq!(graph.graph.edge_count(), 0);

        graph.set_debt(&addr("a"), &addr("b"), 4);
        graph.set_debt(&addr("a"), &addr("b"), 0);
        assert_eq!(graph.graph.edge_count(), 0);
        assert_eq!(graph.debt(&addr("a"), &addr("b")), 0);
    }

    #[test]
    fn test_total_is_sum_of_outgoing_edges() {
        let mut graph = triangle();
        graph.set_debt(&addr("a"), &addr("d"), 3);

        assert_eq!(graph.total_owed(&addr("a")), 13);
        assert_eq!(graph.total_owed(&addr("d")), 0);
        for participant in graph.participants() {
            let sum: Amount = creditors_of(&graph, participant)
                .into_iter()
                .map(|c| graph.debt(participant, c))
                .sum();
            assert_eq!(graph.total_owed(participant), sum);
        }
    }

    #[test]
    fn test_creditors_are_sorted_and_positive() {
        let mut graph = DebtGraph::new();
        graph.set_debt(&addr("a"), &addr("c"), 1);
        graph.set_debt(&addr("a"), &addr("b"), 2);
        graph.set_debt(&addr("a"), &addr("d"), 0);

        let creditors = creditors_of(&graph, &addr("a"));
        assert_eq!(creditors, vec![&addr("b"), &addr("c")]);
        assert!(creditors_of(&graph, &addr("zzz")).is_empty());
    }

    #[test]
    fn test_cycle_detection() {
        assert!(triangle().has_cycles());

        let mut chain = DebtGraph::new();
        chain.set_debt(&addr("a"), &addr("b"), 1);
        chain.set_debt(&addr("b"), &addr("c"), 1);
        assert!(!chain.has_cycles());
    }

    #[test]
    fn test_to_dot_output() {
        let dot = triangle().to_dot();
        assert!(dot.contains("digraph DebtGraph"));
        assert!(dot.contains("\"a\" -> \"b\" [label=\"10\"]"));
        assert!(dot.contains("total 10"));
    }

    #[test]
    fn test_graph_stats() {
        let stats = triangle().stats();
        assert_eq!(
            stats,
            GraphStats {
                participants: 3,
                debts: 3,
                total_outstanding: 20,
                has_cycles: true,
            }
        );
    }
}
