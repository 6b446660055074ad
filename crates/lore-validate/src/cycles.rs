//! Cycle detection over the structural subgraph.
//!
//! Depth-first traversal with an explicit stack instead of recursion, so
//! arbitrarily deep prerequisite chains cannot overflow the call stack.
//! Every node is finished exactly once across all traversals, so the whole
//! pass is O(V + E).

use std::collections::HashMap;

use crate::candidate::CandidateRelationship;

/// A back edge found during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// Index of the relationship that closes the cycle.
    pub edge_index: usize,
    /// Node ids along the cycle, first node repeated at the end.
    pub path: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Find cycles among relationships whose resolved kind is structural.
///
/// Self-loops are ignored; they are reported by their own rule. Nodes are
/// visited in first-appearance order, so results are deterministic.
pub fn find_structural_cycles(relationships: &[CandidateRelationship]) -> Vec<Cycle> {
    let mut order: Vec<&str> = Vec::new();
    let mut adjacency: HashMap<&str, Vec<(&str, usize)>> = HashMap::new();

    for (index, rel) in relationships.iter().enumerate() {
        let (Some(source), Some(target)) = (rel.source_id(), rel.target_id()) else {
            continue;
        };
        if source == target || !rel.resolved_kind().is_some_and(|k| k.is_structural()) {
            continue;
        }
        for node in [source, target] {
            if !adjacency.contains_key(node) {
                adjacency.insert(node, Vec::new());
                order.push(node);
            }
        }
        adjacency.entry(source).or_default().push((target, index));
    }

    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(order.len());
    let mut cycles = Vec::new();

    for &start in &order {
        if marks.contains_key(start) {
            continue;
        }

        // (node, index of the next outgoing edge to examine)
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        let mut path: Vec<&str> = vec![start];
        marks.insert(start, Mark::OnStack);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let edges = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);

            if frame.1 >= edges.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                path.pop();
                continue;
            }

            let (target, edge_index) = edges[frame.1];
            frame.1 += 1;

            match marks.get(target) {
                Some(Mark::OnStack) => {
                    let from = path.iter().position(|n| *n == target).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[from..].iter().map(|n| n.to_string()).collect();
                    cycle.push(target.to_string());
                    cycles.push(Cycle {
                        edge_index,
                        path: cycle,
                    });
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(target, Mark::OnStack);
                    path.push(target);
                    stack.push((target, 0));
                }
            }
        }
    }

    cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(source: &str, target: &str, kind: &str) -> CandidateRelationship {
        CandidateRelationship::new(source, target, kind)
    }

    #[test]
    fn test_three_node_cycle_reported_once() {
        let rels = vec![
            rel("A", "B", "REQUIRES"),
            rel("B", "C", "REQUIRES"),
            rel("C", "A", "REQUIRES"),
        ];
        let cycles = find_structural_cycles(&rels);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].edge_index, 2);
        assert_eq!(cycles[0].path, vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn test_breaking_one_edge_removes_cycle() {
        let rels = vec![rel("A", "B", "REQUIRES"), rel("B", "C", "REQUIRES")];
        assert!(find_structural_cycles(&rels).is_empty());
    }

    #[test]
    fn test_non_structural_kinds_ignored() {
        let rels = vec![
            rel("A", "B", "RELATED_TO"),
            rel("B", "A", "RELATED_TO"),
            rel("A", "B", "CONTRASTS_WITH"),
        ];
        assert!(find_structural_cycles(&rels).is_empty());
    }

    #[test]
    fn test_mixed_structural_kinds_form_cycle() {
        let rels = vec![rel("A", "B", "BUILDS_ON"), rel("B", "A", "PART_OF")];
        assert_eq!(find_structural_cycles(&rels).len(), 1);
    }

    #[test]
    fn test_suggested_kinds_count_as_structural() {
        let rels = vec![rel("A", "B", "DEPENDS_ON"), rel("B", "A", "REQUIRES")];
        assert_eq!(find_structural_cycles(&rels).len(), 1);
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let rels = vec![
            rel("A", "B", "REQUIRES"),
            rel("A", "C", "REQUIRES"),
            rel("B", "D", "REQUIRES"),
            rel("C", "D", "REQUIRES"),
        ];
        assert!(find_structural_cycles(&rels).is_empty());
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let ids: Vec<String> = (0..50_000).map(|i| format!("N{i}")).collect();
        let mut rels: Vec<_> = ids
            .windows(2)
            .map(|w| rel(&w[0], &w[1], "REQUIRES"))
            .collect();
        rels.push(rel(&ids[ids.len() - 1], &ids[0], "REQUIRES"));

        let cycles = find_structural_cycles(&rels);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].path.len(), ids.len() + 1);
    }
}
