//! Property-based tests for groum-search
//!
//! Verifies set-trie, dominator, and residue-discovery invariants on
//! arbitrary inputs

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use groum_search::diff::{diff_residues, DiffKind};
use groum_search::graph::{GraphBuilder, NodeId};
use groum_search::{Acdfg, Dominators, SetTrie};

fn prop_sets() -> impl Strategy<Value = Vec<Vec<u32>>> {
    prop::collection::vec(prop::collection::vec(0u32..20, 0..6), 0..12)
}

// Property: supersets() agrees with a brute-force scan
proptest! {
    #[test]
    fn prop_set_trie_matches_brute_force(
        sets in prop_sets(),
        query in prop::collection::vec(0u32..20, 0..5),
    ) {
        let mut trie = SetTrie::new();
        for (i, set) in sets.iter().enumerate() {
            trie.insert(set, i);
        }

        let mut got: Vec<usize> = trie.supersets(&query).into_iter().copied().collect();
        got.sort_unstable();

        let need: BTreeSet<u32> = query.iter().copied().collect();
        let mut want: Vec<usize> = sets
            .iter()
            .enumerate()
            .filter(|(_, set)| {
                let have: BTreeSet<u32> = set.iter().copied().collect();
                need.is_subset(&have)
            })
            .map(|(i, _)| i)
            .collect();
        want.sort_unstable();

        prop_assert_eq!(got, want);
    }
}

// Property: empty query returns every inserted value
proptest! {
    #[test]
    fn prop_set_trie_empty_query_total(sets in prop_sets()) {
        let mut trie = SetTrie::new();
        for (i, set) in sets.iter().enumerate() {
            trie.insert(set, i);
        }
        prop_assert_eq!(trie.supersets(&[]).len(), sets.len());
    }
}

/// Random control graph over nodes 1..=n
fn prop_graph() -> impl Strategy<Value = Acdfg> {
    (2u64..10, prop::collection::vec((0usize..10, 0usize..10), 0..25)).prop_map(
        |(n, raw_edges)| {
            let mut b = GraphBuilder::new();
            for id in 1..=n {
                b.method_node(id, None, None, "m", &[]);
            }
            let mut seen = BTreeSet::new();
            let mut edge_id = 100u64;
            for (from, to) in raw_edges {
                let from = (from as u64 % n) + 1;
                let to = (to as u64 % n) + 1;
                if seen.insert((from, to)) {
                    b.control_edge(edge_id, from, to);
                    edge_id += 1;
                }
            }
            b.build().unwrap()
        },
    )
}

// Property: the root dominates every reachable node, every node dominates
// itself, and dominator sets only contain reachable nodes
proptest! {
    #[test]
    fn prop_dominator_basics(graph in prop_graph()) {
        let Some(root) = graph.effective_control_roots().first().copied() else {
            return Ok(());
        };
        let dom = Dominators::compute(&graph, root);
        for node in dom.reachable().clone() {
            prop_assert!(dom.dominates(root, node));
            prop_assert!(dom.dominates(node, node));
            for d in dom.dominators_of(node).unwrap() {
                prop_assert!(dom.reachable().contains(d));
            }
        }
    }
}

// Property: natural loop bodies contain their head and back node, and the
// head dominates every body node
proptest! {
    #[test]
    fn prop_natural_loop_bodies(graph in prop_graph()) {
        let Some(root) = graph.effective_control_roots().first().copied() else {
            return Ok(());
        };
        let dom = Dominators::compute(&graph, root);
        for l in dom.natural_loops() {
            prop_assert!(l.body.contains(&l.head));
            prop_assert!(l.body.contains(&l.back_node));
            for node in &l.body {
                prop_assert!(dom.dominates(l.head, *node), "head must dominate {node:?}");
            }
        }
    }
}

// Property: residue discovery puts every unmatched node in exactly one
// diff, and never includes a matched node
proptest! {
    #[test]
    fn prop_residues_partition_unmatched(
        graph in prop_graph(),
        matched_bits in prop::collection::vec(any::<bool>(), 10),
    ) {
        let matched = |n: NodeId| matched_bits
            .get((n.0 as usize).saturating_sub(1))
            .copied()
            .unwrap_or(false);
        let diffs = diff_residues(&graph, matched, DiffKind::Remove);

        let mut counts: BTreeMap<NodeId, usize> = BTreeMap::new();
        for diff in &diffs {
            prop_assert!(diff.entry.map_or(true, matched));
            for exit in &diff.exits {
                prop_assert!(matched(*exit));
            }
            for node in &diff.nodes {
                prop_assert!(!matched(*node));
                *counts.entry(*node).or_insert(0) += 1;
            }
        }

        for node in graph.control_nodes() {
            let expected = usize::from(!matched(node.id()));
            prop_assert_eq!(counts.get(&node.id()).copied().unwrap_or(0), expected);
        }
    }
}

// Property: graph wire encoding round-trips
proptest! {
    #[test]
    fn prop_graph_wire_round_trip(graph in prop_graph()) {
        let decoded = Acdfg::from_bytes(&graph.to_bytes()).unwrap();
        prop_assert_eq!(graph, decoded);
    }
}
