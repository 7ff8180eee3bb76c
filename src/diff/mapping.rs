//! Bipartite correspondences between two graphs' id spaces

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::error::{Error, Result};
use crate::graph::{Acdfg, EdgeId, NodeId};
use crate::lattice::{BinMember, IsoMap};

/// A partial one-to-one correspondence between graph A and graph B
///
/// Built from the solver's pairwise id list. Solver output is untrusted:
/// pairs naming ids absent from either universe are dropped, and a pair that
/// re-maps an already-mapped id is ignored (first write wins). Both cases
/// are logged and counted in [`Mapping::inconsistencies`].
#[derive(Debug, Clone)]
pub struct Mapping {
    a_nodes: BTreeSet<NodeId>,
    b_nodes: BTreeSet<NodeId>,
    a_edges: BTreeSet<EdgeId>,
    b_edges: BTreeSet<EdgeId>,
    node_a_to_b: BTreeMap<NodeId, NodeId>,
    node_b_to_a: BTreeMap<NodeId, NodeId>,
    edge_a_to_b: BTreeMap<EdgeId, EdgeId>,
    edge_b_to_a: BTreeMap<EdgeId, EdgeId>,
    inconsistencies: usize,
}

impl Mapping {
    /// Build a correspondence between two decoded graphs
    #[must_use]
    pub fn new(a: &Acdfg, b: &Acdfg, iso: &IsoMap) -> Self {
        let a_nodes = a.nodes().map(crate::graph::Node::id).collect();
        let b_nodes = b.nodes().map(crate::graph::Node::id).collect();
        let a_edges = a.edges().map(|e| e.id).collect();
        let b_edges = b.edges().map(|e| e.id).collect();
        Self::from_universes(a_nodes, a_edges, b_nodes, b_edges, iso)
    }

    /// Build the member → representative correspondence of a pattern bin
    ///
    /// Member graphs are not shipped in the lattice, so the member-side
    /// universe is reconstructed from the iso pairs and the line table.
    #[must_use]
    pub fn from_member(member: &BinMember, reference: &Acdfg) -> Self {
        let mut a_nodes: BTreeSet<NodeId> = member.iso.nodes.iter().map(|(m, _)| *m).collect();
        a_nodes.extend(member.lines.keys().copied());
        let a_edges: BTreeSet<EdgeId> = member.iso.edges.iter().map(|(m, _)| *m).collect();
        let b_nodes = reference.nodes().map(crate::graph::Node::id).collect();
        let b_edges = reference.edges().map(|e| e.id).collect();
        Self::from_universes(a_nodes, a_edges, b_nodes, b_edges, &member.iso)
    }

    fn from_universes(
        a_nodes: BTreeSet<NodeId>,
        a_edges: BTreeSet<EdgeId>,
        b_nodes: BTreeSet<NodeId>,
        b_edges: BTreeSet<EdgeId>,
        iso: &IsoMap,
    ) -> Self {
        let mut mapping = Self {
            a_nodes,
            b_nodes,
            a_edges,
            b_edges,
            node_a_to_b: BTreeMap::new(),
            node_b_to_a: BTreeMap::new(),
            edge_a_to_b: BTreeMap::new(),
            edge_b_to_a: BTreeMap::new(),
            inconsistencies: 0,
        };

        for (a, b) in &iso.nodes {
            if !mapping.a_nodes.contains(a) || !mapping.b_nodes.contains(b) {
                warn!(a = a.0, b = b.0, "node pair references an unknown id, dropped");
                mapping.inconsistencies += 1;
                continue;
            }
            match (mapping.node_a_to_b.get(a), mapping.node_b_to_a.get(b)) {
                (None, None) => {
                    mapping.node_a_to_b.insert(*a, *b);
                    mapping.node_b_to_a.insert(*b, *a);
                }
                (Some(prev), _) if prev == b => {}
                _ => {
                    warn!(a = a.0, b = b.0, "conflicting node pair, keeping first");
                    mapping.inconsistencies += 1;
                }
            }
        }

        for (a, b) in &iso.edges {
            if !mapping.a_edges.contains(a) || !mapping.b_edges.contains(b) {
                warn!(a = a.0, b = b.0, "edge pair references an unknown id, dropped");
                mapping.inconsistencies += 1;
                continue;
            }
            match (mapping.edge_a_to_b.get(a), mapping.edge_b_to_a.get(b)) {
                (None, None) => {
                    mapping.edge_a_to_b.insert(*a, *b);
                    mapping.edge_b_to_a.insert(*b, *a);
                }
                (Some(prev), _) if prev == b => {}
                _ => {
                    warn!(a = a.0, b = b.0, "conflicting edge pair, keeping first");
                    mapping.inconsistencies += 1;
                }
            }
        }

        mapping
    }

    /// Dropped or conflicting pairs encountered while building
    #[must_use]
    pub fn inconsistencies(&self) -> usize {
        self.inconsistencies
    }

    /// The B-side node mapped to `a`, if any
    #[must_use]
    pub fn node_in_b(&self, a: NodeId) -> Option<NodeId> {
        self.node_a_to_b.get(&a).copied()
    }

    /// The A-side node mapped to `b`, if any
    #[must_use]
    pub fn node_in_a(&self, b: NodeId) -> Option<NodeId> {
        self.node_b_to_a.get(&b).copied()
    }

    /// Whether an A-side node is covered by the correspondence
    #[must_use]
    pub fn is_matched_a(&self, a: NodeId) -> bool {
        self.node_a_to_b.contains_key(&a)
    }

    /// Whether a B-side node is covered by the correspondence
    #[must_use]
    pub fn is_matched_b(&self, b: NodeId) -> bool {
        self.node_b_to_a.contains_key(&b)
    }

    /// Matched node pairs in A-id order
    pub fn node_pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.node_a_to_b.iter().map(|(a, b)| (*a, *b))
    }

    /// A-side nodes with no correspondent
    #[must_use]
    pub fn just_a_nodes(&self) -> BTreeSet<NodeId> {
        self.a_nodes
            .iter()
            .filter(|n| !self.node_a_to_b.contains_key(n))
            .copied()
            .collect()
    }

    /// B-side nodes with no correspondent
    #[must_use]
    pub fn just_b_nodes(&self) -> BTreeSet<NodeId> {
        self.b_nodes
            .iter()
            .filter(|n| !self.node_b_to_a.contains_key(n))
            .copied()
            .collect()
    }

    /// A-side edges with no correspondent
    #[must_use]
    pub fn just_a_edges(&self) -> BTreeSet<EdgeId> {
        self.a_edges
            .iter()
            .filter(|e| !self.edge_a_to_b.contains_key(e))
            .copied()
            .collect()
    }

    /// B-side edges with no correspondent
    #[must_use]
    pub fn just_b_edges(&self) -> BTreeSet<EdgeId> {
        self.b_edges
            .iter()
            .filter(|e| !self.edge_b_to_a.contains_key(e))
            .copied()
            .collect()
    }

    /// Whether every B-side element has a correspondent (an isomorphism
    /// onto B)
    #[must_use]
    pub fn covers_b(&self) -> bool {
        self.node_b_to_a.len() == self.b_nodes.len()
            && self.edge_b_to_a.len() == self.b_edges.len()
    }

    /// Compose `self: A → Ref` with `other: C → Ref` into `A → C`
    ///
    /// # Errors
    ///
    /// [`Error::MissingMapping`] unless `other` covers every element of the
    /// shared reference, which guarantees every mapped A-side element lands
    /// somewhere in C.
    pub fn compose(&self, other: &Mapping) -> Result<Mapping> {
        if !other.covers_b() {
            return Err(Error::MissingMapping(
                "composition requires the second mapping to cover the reference".into(),
            ));
        }

        let mut composed = Mapping {
            a_nodes: self.a_nodes.clone(),
            b_nodes: other.a_nodes.clone(),
            a_edges: self.a_edges.clone(),
            b_edges: other.a_edges.clone(),
            node_a_to_b: BTreeMap::new(),
            node_b_to_a: BTreeMap::new(),
            edge_a_to_b: BTreeMap::new(),
            edge_b_to_a: BTreeMap::new(),
            inconsistencies: self.inconsistencies + other.inconsistencies,
        };

        for (a, r) in &self.node_a_to_b {
            if let Some(c) = other.node_b_to_a.get(r) {
                composed.node_a_to_b.insert(*a, *c);
                composed.node_b_to_a.insert(*c, *a);
            }
        }
        for (a, r) in &self.edge_a_to_b {
            if let Some(c) = other.edge_b_to_a.get(r) {
                composed.edge_a_to_b.insert(*a, *c);
                composed.edge_b_to_a.insert(*c, *a);
            }
        }
        Ok(composed)
    }
}

/// Line-number view of a query ↔ member correspondence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineCorrespondence {
    /// `(query line, member line)` for matched nodes with lines on both
    /// sides
    pub matched: Vec<(u32, u32)>,
    /// Member lines whose nodes have no query counterpart
    pub additions: Vec<u32>,
    /// Query lines whose nodes have no member counterpart
    pub removals: Vec<u32>,
}

/// Partition a query → member mapping into matched, added, and removed line
/// numbers
///
/// Query lines come from the decoded query graph, member lines from the
/// bin's line table. Nodes with no recorded line are skipped.
#[must_use]
pub fn line_correspondence(
    query: &Acdfg,
    query_to_member: &Mapping,
    member_lines: &BTreeMap<NodeId, u32>,
) -> LineCorrespondence {
    let mut out = LineCorrespondence::default();

    for (q, m) in query_to_member.node_pairs() {
        if let (Some(ql), Some(ml)) = (query.line_of(q), member_lines.get(&m)) {
            out.matched.push((ql, *ml));
        }
    }
    for q in query_to_member.just_a_nodes() {
        if let Some(line) = query.line_of(q) {
            out.removals.push(line);
        }
    }
    for m in query_to_member.just_b_nodes() {
        if let Some(line) = member_lines.get(&m) {
            out.additions.push(*line);
        }
    }

    out.matched.sort_unstable();
    out.additions.sort_unstable();
    out.removals.sort_unstable();
    out
}
