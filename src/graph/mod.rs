//! ACDFG graph model
//!
//! An ACDFG (annotated control/data-flow graph) is the unit of search: one
//! graph per source method, produced by an external extractor and consumed
//! here from a binary message ([`Acdfg::from_bytes`]).
//!
//! Nodes are stored in an arena keyed by their extractor-assigned id (ids are
//! stable but not necessarily contiguous), and every cross-reference between
//! nodes (assignee, invokee, arguments, edge endpoints) is an id, never an
//! owning pointer.
//!
//! # Example
//!
//! ```
//! use groum_search::graph::{Acdfg, GraphBuilder, NodeId};
//!
//! let mut b = GraphBuilder::new();
//! b.method_node(1, None, None, "init", &[]);
//! b.method_node(2, None, None, "prepare", &[]);
//! b.control_edge(10, 1, 2);
//! let graph = b.build().unwrap();
//!
//! let roots = graph.find_control_roots();
//! assert_eq!(roots.into_iter().collect::<Vec<_>>(), vec![NodeId(1)]);
//! ```

pub mod cfg;
pub mod decode;

pub use cfg::{CfgView, Dominators, NaturalLoop};

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

/// Node identifier, unique within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct NodeId(pub u64);

/// Edge identifier, unique within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct EdgeId(pub u64);

/// Whether a data node is a variable or a constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// A program variable
    Var,
    /// A literal constant
    Const,
}

/// A data node: a variable or constant flowing through the method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    /// Node id
    pub id: NodeId,
    /// Variable name or constant literal
    pub name: String,
    /// Declared type (e.g. `java.lang.String`)
    pub ty: String,
    /// Variable vs. constant
    pub kind: DataKind,
}

/// A method-invocation node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodNode {
    /// Node id
    pub id: NodeId,
    /// Data node receiving the return value, if any
    pub assignee: Option<NodeId>,
    /// Data node the method is invoked on, if any
    pub invokee: Option<NodeId>,
    /// Fully qualified method name
    pub name: String,
    /// Ordered argument data nodes
    pub args: Vec<NodeId>,
}

/// A node of the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Variable or constant
    Data(DataNode),
    /// Method invocation
    Method(MethodNode),
    /// Control skeleton node with no payload
    Misc(NodeId),
}

impl Node {
    /// The node's id
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Node::Data(d) => d.id,
            Node::Method(m) => m.id,
            Node::Misc(id) => *id,
        }
    }

    /// Control nodes (method/misc) participate in control-flow analyses;
    /// data nodes do not.
    #[must_use]
    pub fn is_control(&self) -> bool {
        !matches!(self, Node::Data(_))
    }
}

/// Edge kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Genuine control-flow edge between control nodes
    Control,
    /// Definition edge: control node defines a data node
    Def,
    /// Use edge: data node is used by a control node
    Use,
    /// Inferred control edge materialized by the miner (a shortcut over
    /// removed nodes); rehydrated to [`EdgeKind::Control`] when it coincides
    /// with a genuine control path in the unreduced sibling graph
    Trans,
    /// Exception-driven control transfer
    Exceptional,
}

/// A directed edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Edge id
    pub id: EdgeId,
    /// Source node
    pub from: NodeId,
    /// Target node
    pub to: NodeId,
    /// Edge kind
    pub kind: EdgeKind,
}

/// Boolean-operator pseudo-methods emitted by the miner; noise for the
/// cluster index, never indexed or queried.
pub const PSEUDO_METHODS: &[&str] = &[
    "EQ", "NEQ", "GT", "GE", "LT", "LE", "AND", "OR", "XOR", "NOT",
];

/// An annotated control/data-flow graph, immutable once built
///
/// The single sanctioned mutation is [`Acdfg::rehydrate_trans_edges`], run
/// when a pattern slice is compared against its unreduced original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acdfg {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    lines: BTreeMap<NodeId, u32>,
}

impl Acdfg {
    fn validate(nodes: &BTreeMap<NodeId, Node>, edges: &BTreeMap<EdgeId, Edge>) -> Result<()> {
        let is_control = |id: NodeId| nodes.get(&id).map(Node::is_control);

        for edge in edges.values() {
            for endpoint in [edge.from, edge.to] {
                if !nodes.contains_key(&endpoint) {
                    return Err(Error::decode(format!(
                        "edge {} references unknown node {}",
                        edge.id.0, endpoint.0
                    )));
                }
            }
            let (from_ctrl, to_ctrl) = (is_control(edge.from), is_control(edge.to));
            let ok = match edge.kind {
                EdgeKind::Def => from_ctrl == Some(true) && to_ctrl == Some(false),
                EdgeKind::Use => from_ctrl == Some(false) && to_ctrl == Some(true),
                EdgeKind::Control | EdgeKind::Trans | EdgeKind::Exceptional => {
                    from_ctrl == Some(true) && to_ctrl == Some(true)
                }
            };
            if !ok {
                return Err(Error::decode(format!(
                    "edge {} violates the control/data partition for {:?}",
                    edge.id.0, edge.kind
                )));
            }
        }

        for node in nodes.values() {
            if let Node::Method(m) = node {
                let refs = m.args.iter().chain(m.assignee.iter()).chain(m.invokee.iter());
                for r in refs {
                    if !nodes.contains_key(r) {
                        return Err(Error::decode(format!(
                            "method node {} references unknown node {}",
                            m.id.0, r.0
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn from_parts(
        nodes: BTreeMap<NodeId, Node>,
        edges: BTreeMap<EdgeId, Edge>,
        lines: BTreeMap<NodeId, u32>,
    ) -> Result<Self> {
        Self::validate(&nodes, &edges)?;
        Ok(Self {
            nodes,
            edges,
            lines,
        })
    }

    /// Look up a node by id
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Look up an edge by id
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// All nodes, in ascending id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges, in ascending id order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Control nodes only (method/misc), ascending id order
    pub fn control_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_control())
    }

    /// Data nodes only, ascending id order
    pub fn data_nodes(&self) -> impl Iterator<Item = &DataNode> {
        self.nodes.values().filter_map(|n| match n {
            Node::Data(d) => Some(d),
            _ => None,
        })
    }

    /// Number of nodes
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Whether `id` names a control node of this graph
    #[must_use]
    pub fn is_control(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(Node::is_control)
    }

    /// Source line recorded for a node, if the extractor provided one
    #[must_use]
    pub fn line_of(&self, id: NodeId) -> Option<u32> {
        self.lines.get(&id).copied()
    }

    /// Line pair for an edge: lines of both endpoints, if both are known
    #[must_use]
    pub fn edge_lines(&self, id: EdgeId) -> Option<(u32, u32)> {
        let edge = self.edges.get(&id)?;
        Some((self.line_of(edge.from)?, self.line_of(edge.to)?))
    }

    /// Distinct method names invoked in this graph, sorted, with
    /// boolean-operator pseudo-methods filtered out
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        for node in self.nodes.values() {
            if let Node::Method(m) = node {
                if !PSEUDO_METHODS.contains(&m.name.as_str()) {
                    names.insert(&m.name);
                }
            }
        }
        names.into_iter().map(str::to_owned).collect()
    }

    /// Control nodes with no incoming CONTROL edge from another control node
    ///
    /// May be empty when the control skeleton is fully cyclic; see
    /// [`Acdfg::effective_control_roots`] for the synthesized-root policy.
    #[must_use]
    pub fn find_control_roots(&self) -> BTreeSet<NodeId> {
        let mut roots: BTreeSet<NodeId> = self
            .control_nodes()
            .map(Node::id)
            .collect();
        for edge in self.edges.values() {
            if edge.kind == EdgeKind::Control
                && edge.from != edge.to
                && self.is_control(edge.from)
            {
                roots.remove(&edge.to);
            }
        }
        roots
    }

    /// Control roots, synthesizing one for a fully cyclic skeleton
    ///
    /// Policy: the lowest-id control node is elected. Deterministic by
    /// construction (arena iteration is id-ordered).
    #[must_use]
    pub fn effective_control_roots(&self) -> BTreeSet<NodeId> {
        let roots = self.find_control_roots();
        if !roots.is_empty() {
            return roots;
        }
        self.control_nodes()
            .map(Node::id)
            .next()
            .into_iter()
            .collect()
    }

    /// Remove all control edges entering `root` (used after electing a
    /// synthesized root so downstream join counting stays consistent)
    pub fn sever_incoming(&mut self, root: NodeId) {
        self.edges
            .retain(|_, e| !(e.kind == EdgeKind::Control && e.to == root));
    }

    /// Control-edge pairs that remain meaningful after removing every node
    /// not in `keep`
    ///
    /// Removed nodes are spliced out one at a time: their predecessors gain
    /// bypass edges to their successors. Self-loops the splice introduces on
    /// removed nodes are dropped; a kept node's cycle through removed nodes
    /// survives as a self-loop. The result preserves the transitive control
    /// relation over the kept nodes.
    #[must_use]
    pub fn slice_control_edges(&self, keep: &BTreeSet<NodeId>) -> BTreeSet<(NodeId, NodeId)> {
        let mut fwd: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        let mut bwd: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for node in self.nodes.values() {
            fwd.insert(node.id(), BTreeSet::new());
            bwd.insert(node.id(), BTreeSet::new());
        }
        for edge in self.edges.values() {
            if edge.kind == EdgeKind::Control {
                if let Some(succ) = fwd.get_mut(&edge.from) {
                    succ.insert(edge.to);
                }
                if let Some(pred) = bwd.get_mut(&edge.to) {
                    pred.insert(edge.from);
                }
            }
        }

        let to_remove: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();

        for node in to_remove {
            if let Some(succ) = fwd.get_mut(&node) {
                succ.remove(&node);
            }
            if let Some(pred) = bwd.get_mut(&node) {
                pred.remove(&node);
            }
            let preds: Vec<NodeId> = bwd.get(&node).into_iter().flatten().copied().collect();
            let succs: Vec<NodeId> = fwd.get(&node).into_iter().flatten().copied().collect();

            for p in &preds {
                for s in &succs {
                    if p != s || keep.contains(p) {
                        if let Some(set) = fwd.get_mut(p) {
                            set.insert(*s);
                        }
                        if let Some(set) = bwd.get_mut(s) {
                            set.insert(*p);
                        }
                    }
                }
                if let Some(set) = fwd.get_mut(p) {
                    set.remove(&node);
                }
            }
            for s in &succs {
                if let Some(set) = bwd.get_mut(s) {
                    set.remove(&node);
                }
            }
            fwd.remove(&node);
            bwd.remove(&node);
        }

        let mut edges = BTreeSet::new();
        for (from, succs) in &fwd {
            for to in succs {
                edges.insert((*from, *to));
            }
        }
        edges
    }

    /// Reclassify TRANS edges as CONTROL when they coincide with a genuine
    /// control path in the unreduced `original` graph
    ///
    /// This is the single sanctioned mutation of a decoded graph.
    pub fn rehydrate_trans_edges(&mut self, original: &Acdfg) {
        let keep: BTreeSet<NodeId> = self.nodes.keys().copied().collect();
        let real = original.slice_control_edges(&keep);
        for edge in self.edges.values_mut() {
            if edge.kind == EdgeKind::Trans && real.contains(&(edge.from, edge.to)) {
                edge.kind = EdgeKind::Control;
            }
        }
    }

    /// Rename variables for presentation: VAR data nodes become `tmp_<n>`
    /// (consistently across graphs sharing `var_names`), and String constants
    /// become the empty literal
    pub(crate) fn rename_vars(&mut self, var_names: &mut BTreeMap<String, String>) {
        for node in self.nodes.values_mut() {
            if let Node::Data(d) = node {
                match d.kind {
                    DataKind::Var => {
                        let next = format!("tmp_{}", var_names.len());
                        let new_name =
                            var_names.entry(d.name.clone()).or_insert(next);
                        d.name = new_name.clone();
                    }
                    DataKind::Const if d.ty == "java.lang.String" => {
                        d.name = "\"\"".to_owned();
                    }
                    DataKind::Const => {}
                }
            }
        }
    }
}

/// Incremental builder used by the decoder and by test fixtures
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    lines: BTreeMap<NodeId, u32>,
    next_edge: u64,
}

impl GraphBuilder {
    /// New empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a data node
    pub fn data_node(&mut self, id: u64, name: &str, ty: &str, kind: DataKind) -> &mut Self {
        self.nodes.insert(
            NodeId(id),
            Node::Data(DataNode {
                id: NodeId(id),
                name: name.to_owned(),
                ty: ty.to_owned(),
                kind,
            }),
        );
        self
    }

    /// Add a misc node
    pub fn misc_node(&mut self, id: u64) -> &mut Self {
        self.nodes.insert(NodeId(id), Node::Misc(NodeId(id)));
        self
    }

    /// Add a method node
    pub fn method_node(
        &mut self,
        id: u64,
        assignee: Option<u64>,
        invokee: Option<u64>,
        name: &str,
        args: &[u64],
    ) -> &mut Self {
        self.nodes.insert(
            NodeId(id),
            Node::Method(MethodNode {
                id: NodeId(id),
                assignee: assignee.map(NodeId),
                invokee: invokee.map(NodeId),
                name: name.to_owned(),
                args: args.iter().copied().map(NodeId).collect(),
            }),
        );
        self
    }

    /// Add an edge with an explicit id
    pub fn edge(&mut self, id: u64, from: u64, to: u64, kind: EdgeKind) -> &mut Self {
        self.edges.insert(
            EdgeId(id),
            Edge {
                id: EdgeId(id),
                from: NodeId(from),
                to: NodeId(to),
                kind,
            },
        );
        self.next_edge = self.next_edge.max(id + 1);
        self
    }

    /// Add a control edge with an explicit id
    pub fn control_edge(&mut self, id: u64, from: u64, to: u64) -> &mut Self {
        self.edge(id, from, to, EdgeKind::Control)
    }

    /// Record a source line for a node
    pub fn line(&mut self, node: u64, line: u32) -> &mut Self {
        self.lines.insert(NodeId(node), line);
        self
    }

    /// Finish, validating edge endpoints and the control/data partition
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] when an edge references a missing node or
    /// runs against its kind's direction.
    pub fn build(self) -> Result<Acdfg> {
        Acdfg::from_parts(self.nodes, self.edges, self.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> Acdfg {
        // 1 → 2 → 3 with a data node 4 defined by 2
        let mut b = GraphBuilder::new();
        b.method_node(1, None, None, "a", &[]);
        b.method_node(2, None, None, "b", &[]);
        b.method_node(3, None, None, "c", &[]);
        b.data_node(4, "x", "int", DataKind::Var);
        b.control_edge(10, 1, 2);
        b.control_edge(11, 2, 3);
        b.edge(12, 2, 4, EdgeKind::Def);
        b.build().unwrap()
    }

    #[test]
    fn test_control_roots_linear() {
        let g = linear_graph();
        let roots = g.find_control_roots();
        assert_eq!(roots.into_iter().collect::<Vec<_>>(), vec![NodeId(1)]);
    }

    #[test]
    fn test_control_roots_idempotent() {
        let g = linear_graph();
        assert_eq!(g.find_control_roots(), g.find_control_roots());
    }

    #[test]
    fn test_cyclic_skeleton_synthesizes_lowest_id() {
        let mut b = GraphBuilder::new();
        b.method_node(5, None, None, "a", &[]);
        b.method_node(7, None, None, "b", &[]);
        b.control_edge(1, 5, 7);
        b.control_edge(2, 7, 5);
        let g = b.build().unwrap();

        assert!(g.find_control_roots().is_empty());
        let roots = g.effective_control_roots();
        assert_eq!(roots.into_iter().collect::<Vec<_>>(), vec![NodeId(5)]);
    }

    #[test]
    fn test_self_loop_does_not_unroot() {
        let mut b = GraphBuilder::new();
        b.method_node(1, None, None, "a", &[]);
        b.control_edge(10, 1, 1);
        let g = b.build().unwrap();
        assert_eq!(g.find_control_roots().len(), 1);
    }

    #[test]
    fn test_edge_to_unknown_node_rejected() {
        let mut b = GraphBuilder::new();
        b.method_node(1, None, None, "a", &[]);
        b.control_edge(10, 1, 99);
        assert!(matches!(b.build(), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_def_edge_direction_enforced() {
        let mut b = GraphBuilder::new();
        b.method_node(1, None, None, "a", &[]);
        b.data_node(2, "x", "int", DataKind::Var);
        // Def must run control → data; this one is reversed
        b.edge(10, 2, 1, EdgeKind::Def);
        assert!(matches!(b.build(), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_method_names_filter_pseudo() {
        let mut b = GraphBuilder::new();
        b.method_node(1, None, None, "android.util.Log.d", &[]);
        b.method_node(2, None, None, "EQ", &[]);
        b.method_node(3, None, None, "android.util.Log.d", &[]);
        let g = b.build().unwrap();
        assert_eq!(g.method_names(), vec!["android.util.Log.d".to_owned()]);
    }

    #[test]
    fn test_slice_bypasses_removed_node() {
        // 1 → 2 → 3, slicing out 2 leaves 1 → 3
        let g = linear_graph();
        let keep: BTreeSet<NodeId> = [NodeId(1), NodeId(3)].into_iter().collect();
        let edges = g.slice_control_edges(&keep);
        assert_eq!(
            edges.into_iter().collect::<Vec<_>>(),
            vec![(NodeId(1), NodeId(3))]
        );
    }

    #[test]
    fn test_slice_keeps_self_loop_on_kept_node() {
        // 1 → 2 → 1: splicing out 2 collapses the cycle into 1 → 1, which
        // survives because node 1 is kept
        let mut b = GraphBuilder::new();
        b.method_node(1, None, None, "a", &[]);
        b.method_node(2, None, None, "b", &[]);
        b.control_edge(10, 1, 2);
        b.control_edge(11, 2, 1);
        let g = b.build().unwrap();

        let keep: BTreeSet<NodeId> = [NodeId(1)].into_iter().collect();
        let edges = g.slice_control_edges(&keep);
        assert_eq!(
            edges.into_iter().collect::<Vec<_>>(),
            vec![(NodeId(1), NodeId(1))]
        );
    }

    #[test]
    fn test_rehydrate_trans_edges() {
        // Original: 1 → 2 → 3; slice kept {1, 3} with a TRANS shortcut 1 → 3
        let original = linear_graph();

        let mut b = GraphBuilder::new();
        b.method_node(1, None, None, "a", &[]);
        b.method_node(3, None, None, "c", &[]);
        b.edge(20, 1, 3, EdgeKind::Trans);
        let mut sliced = b.build().unwrap();

        sliced.rehydrate_trans_edges(&original);
        assert_eq!(sliced.edge(EdgeId(20)).unwrap().kind, EdgeKind::Control);
    }

    #[test]
    fn test_rehydrate_leaves_unbacked_trans() {
        let original = linear_graph();

        // 3 → 1 has no control path in the original, so the TRANS edge stays
        let mut b = GraphBuilder::new();
        b.method_node(1, None, None, "a", &[]);
        b.method_node(3, None, None, "c", &[]);
        b.edge(20, 3, 1, EdgeKind::Trans);
        let mut sliced = b.build().unwrap();

        sliced.rehydrate_trans_edges(&original);
        assert_eq!(sliced.edge(EdgeId(20)).unwrap().kind, EdgeKind::Trans);
    }

    #[test]
    fn test_edge_lines() {
        let mut b = GraphBuilder::new();
        b.method_node(1, None, None, "a", &[]);
        b.method_node(2, None, None, "b", &[]);
        b.control_edge(10, 1, 2);
        b.line(1, 41).line(2, 42);
        let g = b.build().unwrap();

        assert_eq!(g.line_of(NodeId(1)), Some(41));
        assert_eq!(g.edge_lines(EdgeId(10)), Some((41, 42)));
    }
}
