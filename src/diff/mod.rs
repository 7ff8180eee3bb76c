//! Structural residues between a query graph and a pattern
//!
//! Given a graph and a predicate telling which nodes the solver matched,
//! residue discovery carves the unmatched region into connected diffs, each
//! anchored at the matched frontier around it. Run twice with swapped roles:
//! the pattern side yields [`DiffKind::Add`] diffs (calls the pattern makes
//! that the query lacks), the query side [`DiffKind::Remove`] diffs.
//!
//! Every unmatched control node lands in exactly one diff. Residues with no
//! matched predecessor (unmatched roots, disconnected islands) get
//! `entry = None`, read as "from the method start"; a diff with no exits
//! runs to the method's end.

mod mapping;

pub use mapping::{line_correspondence, LineCorrespondence, Mapping};

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{Acdfg, EdgeId, EdgeKind, NodeId};

/// Which side of the comparison a residue belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// Present in the pattern, missing from the query
    Add,
    /// Present in the query, missing from the pattern
    Remove,
}

/// One connected unmatched region with its matched boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphDiff {
    /// Side of the comparison
    pub kind: DiffKind,
    /// Matched node the residue hangs off, `None` for "from the method
    /// start"
    pub entry: Option<NodeId>,
    /// Unmatched nodes the growth started from
    pub roots: BTreeSet<NodeId>,
    /// All unmatched nodes of the residue
    pub nodes: BTreeSet<NodeId>,
    /// Flow edges internal to the residue
    pub edges: BTreeSet<EdgeId>,
    /// Matched nodes bounding the residue downstream; empty means the
    /// residue reaches the method's end
    pub exits: BTreeSet<NodeId>,
}

fn flow_successors(graph: &Acdfg) -> BTreeMap<NodeId, Vec<(EdgeId, NodeId)>> {
    let mut fwd: BTreeMap<NodeId, Vec<(EdgeId, NodeId)>> = BTreeMap::new();
    for node in graph.control_nodes() {
        fwd.insert(node.id(), Vec::new());
    }
    for edge in graph.edges() {
        let flows = matches!(
            edge.kind,
            EdgeKind::Control | EdgeKind::Trans | EdgeKind::Exceptional
        );
        if flows && graph.is_control(edge.from) && graph.is_control(edge.to) {
            if let Some(succ) = fwd.get_mut(&edge.from) {
                succ.push((edge.id, edge.to));
            }
        }
    }
    fwd
}

/// Carve the unmatched region of `graph` into anchored residues
///
/// `matched` tells whether the solver covered a node. Discovery walks the
/// matched region from the control roots; each unmatched successor seeds a
/// residue anchored at the matched node that reached it. Unmatched roots and
/// unmatched islands no walk reaches seed entry-less residues in a final
/// sweep.
#[must_use]
pub fn diff_residues<F>(graph: &Acdfg, matched: F, kind: DiffKind) -> Vec<GraphDiff>
where
    F: Fn(NodeId) -> bool,
{
    let fwd = flow_successors(graph);
    let roots = graph.effective_control_roots();

    let mut diffs: Vec<GraphDiff> = Vec::new();
    let mut claimed: BTreeSet<NodeId> = BTreeSet::new();

    let grow = |entry: Option<NodeId>,
                seeds: BTreeSet<NodeId>,
                claimed: &mut BTreeSet<NodeId>|
     -> GraphDiff {
        let mut diff = GraphDiff {
            kind,
            entry,
            roots: seeds.clone(),
            nodes: BTreeSet::new(),
            edges: BTreeSet::new(),
            exits: BTreeSet::new(),
        };
        let mut worklist: Vec<NodeId> = seeds.into_iter().collect();
        claimed.extend(worklist.iter().copied());
        while let Some(node) = worklist.pop() {
            diff.nodes.insert(node);
            for (edge, succ) in fwd.get(&node).into_iter().flatten() {
                if matched(*succ) {
                    diff.exits.insert(*succ);
                } else {
                    diff.edges.insert(*edge);
                    if claimed.insert(*succ) {
                        worklist.push(*succ);
                    }
                }
            }
        }
        diff
    };

    // Unmatched roots form one residue starting at the method entry
    let unmatched_roots: BTreeSet<NodeId> =
        roots.iter().copied().filter(|r| !matched(*r)).collect();
    if !unmatched_roots.is_empty() {
        diffs.push(grow(None, unmatched_roots, &mut claimed));
    }

    // Walk the matched region; each unmatched successor anchors a residue
    // at the matched node that reached it
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut worklist: Vec<NodeId> = roots.iter().copied().filter(|r| matched(*r)).collect();
    visited.extend(worklist.iter().copied());
    while let Some(node) = worklist.pop() {
        for (_, succ) in fwd.get(&node).into_iter().flatten() {
            if matched(*succ) {
                if visited.insert(*succ) {
                    worklist.push(*succ);
                }
            } else if !claimed.contains(succ) {
                let seeds: BTreeSet<NodeId> = [*succ].into_iter().collect();
                diffs.push(grow(Some(node), seeds, &mut claimed));
            }
        }
    }

    // Sweep: unmatched islands no walk reached become entry-less residues
    for node in fwd.keys() {
        if !matched(*node) && !claimed.contains(node) {
            let seeds: BTreeSet<NodeId> = [*node].into_iter().collect();
            diffs.push(grow(None, seeds, &mut claimed));
        }
    }

    diffs
}
