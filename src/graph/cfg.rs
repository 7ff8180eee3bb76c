//! Control-flow analyses over the control-node skeleton
//!
//! Two derived, read-only views over an [`Acdfg`]:
//!
//! - [`Dominators`]: classic iterative fixed-point dominator sets over the
//!   nodes reachable from a root, with natural-loop detection from back
//!   edges. O(V·E) worst case, fine for per-method graphs.
//! - [`CfgView`]: forward/backward adjacency, def/use indexing, and the
//!   loop-aware node classification (tail/join/if/seq/head) the code
//!   generator walks.
//!
//! Both are values built on demand from a shared `&Acdfg`, so concurrent
//! analyses of one graph never contend.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{Acdfg, DataKind, EdgeId, EdgeKind, Node, NodeId};

/// Edge kinds that carry control flow for analysis purposes
fn is_flow(kind: EdgeKind) -> bool {
    matches!(
        kind,
        EdgeKind::Control | EdgeKind::Trans | EdgeKind::Exceptional
    )
}

/// A natural loop: a back edge `back_node → head` where `head` dominates
/// `back_node`, with the loop body between them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalLoop {
    /// Loop header (the dominator)
    pub head: NodeId,
    /// Source of the back edge
    pub back_node: NodeId,
    /// Nodes forming the loop body (head and back node included)
    pub body: BTreeSet<NodeId>,
}

impl NaturalLoop {
    /// A single-node loop (`head == back_node`), special-cased by the code
    /// generator as a trivial `while` around one call
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.head == self.back_node
    }
}

/// Dominator sets over the control nodes reachable from a root
#[derive(Debug)]
pub struct Dominators {
    root: NodeId,
    reachable: BTreeSet<NodeId>,
    fwd: BTreeMap<NodeId, BTreeSet<NodeId>>,
    bwd: BTreeMap<NodeId, BTreeSet<NodeId>>,
    dom: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Dominators {
    /// Compute dominator sets from `root`
    ///
    /// Initialization: the root dominates itself; every other reachable node
    /// starts with all reachable nodes. Iterate
    /// `dom(n) = {n} ∪ ⋂ dom(pred)` to a fixed point.
    #[must_use]
    pub fn compute(graph: &Acdfg, root: NodeId) -> Self {
        let mut fwd: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        let mut bwd: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for node in graph.control_nodes() {
            fwd.insert(node.id(), BTreeSet::new());
            bwd.insert(node.id(), BTreeSet::new());
        }
        for edge in graph.edges() {
            if is_flow(edge.kind) && graph.is_control(edge.from) && graph.is_control(edge.to) {
                if let Some(set) = fwd.get_mut(&edge.from) {
                    set.insert(edge.to);
                }
                if let Some(set) = bwd.get_mut(&edge.to) {
                    set.insert(edge.from);
                }
            }
        }

        let reachable = reachable_from(&fwd, root);

        // Restrict both relations to the reachable region
        let shrink = |map: &BTreeMap<NodeId, BTreeSet<NodeId>>| {
            map.iter()
                .filter(|(n, _)| reachable.contains(n))
                .map(|(n, set)| (*n, set.iter().filter(|m| reachable.contains(m)).copied().collect()))
                .collect::<BTreeMap<NodeId, BTreeSet<NodeId>>>()
        };
        let fwd = shrink(&fwd);
        let bwd = shrink(&bwd);

        let mut dom: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        dom.insert(root, [root].into_iter().collect());
        for node in &reachable {
            if *node != root {
                dom.insert(*node, reachable.clone());
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for node in &reachable {
                if *node == root {
                    continue;
                }
                let mut next: Option<BTreeSet<NodeId>> = None;
                for pred in bwd.get(node).into_iter().flatten() {
                    let pred_dom = &dom[pred];
                    next = Some(match next {
                        None => pred_dom.clone(),
                        Some(acc) => acc.intersection(pred_dom).copied().collect(),
                    });
                }
                let mut next = next.unwrap_or_default();
                next.insert(*node);
                if next != dom[node] {
                    dom.insert(*node, next);
                    changed = true;
                }
            }
        }

        Self {
            root,
            reachable,
            fwd,
            bwd,
            dom,
        }
    }

    /// The root the analysis started from
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Nodes reachable from the root
    #[must_use]
    pub fn reachable(&self) -> &BTreeSet<NodeId> {
        &self.reachable
    }

    /// Dominator set of `node` (None if unreachable)
    #[must_use]
    pub fn dominators_of(&self, node: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.dom.get(&node)
    }

    /// Whether `d` dominates `n`
    #[must_use]
    pub fn dominates(&self, d: NodeId, n: NodeId) -> bool {
        self.dom.get(&n).is_some_and(|set| set.contains(&d))
    }

    /// Natural loops from back edges: `back_node → head` with `head`
    /// dominating `back_node`
    ///
    /// The body is the head plus every node that reaches the back node
    /// without passing through the head, so an enclosing cycle never leaks
    /// into an inner loop. A `head == back_node` self-loop gets the
    /// single-node body.
    #[must_use]
    pub fn natural_loops(&self) -> Vec<NaturalLoop> {
        let mut loops = Vec::new();
        for node in &self.reachable {
            for head in &self.dom[node] {
                if self.fwd[node].contains(head) {
                    let body = if head == node {
                        [*node].into_iter().collect()
                    } else {
                        // Walk predecessors from the back node, stopping at
                        // the head
                        let mut body: BTreeSet<NodeId> = [*head, *node].into_iter().collect();
                        let mut stack = vec![*node];
                        while let Some(current) = stack.pop() {
                            for pred in self.bwd.get(&current).into_iter().flatten() {
                                if body.insert(*pred) {
                                    stack.push(*pred);
                                }
                            }
                        }
                        body
                    };
                    loops.push(NaturalLoop {
                        head: *head,
                        back_node: *node,
                        body,
                    });
                }
            }
        }
        loops
    }
}

fn reachable_from(
    rel: &BTreeMap<NodeId, BTreeSet<NodeId>>,
    start: NodeId,
) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::new();
    if !rel.contains_key(&start) {
        return seen;
    }
    let mut stack = vec![start];
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        for next in rel.get(&current).into_iter().flatten() {
            if !seen.contains(next) {
                stack.push(*next);
            }
        }
    }
    seen
}

/// Loop-aware adjacency view the code generator and diff engine walk
///
/// Self-loops are stripped from the adjacency and remembered separately; the
/// generator renders them as a trivial `while` around the node's expression
/// instead of running them through natural-loop body extraction.
#[derive(Debug)]
pub struct CfgView {
    fwd: BTreeMap<NodeId, Vec<(EdgeId, NodeId)>>,
    bwd: BTreeMap<NodeId, Vec<(EdgeId, NodeId)>>,
    def_nodes: BTreeMap<NodeId, BTreeSet<NodeId>>,
    used_nodes: BTreeMap<NodeId, BTreeSet<NodeId>>,
    loops: BTreeSet<(NodeId, NodeId)>,
    loop_heads: BTreeMap<NodeId, usize>,
    loop_backs: BTreeMap<NodeId, usize>,
    self_loops: BTreeSet<NodeId>,
}

impl CfgView {
    /// Build the view for `graph`, taking loop bookkeeping from `loops`
    #[must_use]
    pub fn new(graph: &Acdfg, loops: &[NaturalLoop]) -> Self {
        let mut fwd: BTreeMap<NodeId, Vec<(EdgeId, NodeId)>> = BTreeMap::new();
        let mut bwd: BTreeMap<NodeId, Vec<(EdgeId, NodeId)>> = BTreeMap::new();
        let mut def_nodes: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        let mut used_nodes: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();

        for node in graph.control_nodes() {
            fwd.insert(node.id(), Vec::new());
            bwd.insert(node.id(), Vec::new());
            def_nodes.insert(node.id(), BTreeSet::new());
            used_nodes.insert(node.id(), BTreeSet::new());
        }

        for edge in graph.edges() {
            match edge.kind {
                k if is_flow(k) => {
                    if let Some(succ) = fwd.get_mut(&edge.from) {
                        succ.push((edge.id, edge.to));
                    }
                    if let Some(pred) = bwd.get_mut(&edge.to) {
                        pred.push((edge.id, edge.from));
                    }
                }
                EdgeKind::Use => {
                    if let Some(set) = used_nodes.get_mut(&edge.to) {
                        set.insert(edge.from);
                    }
                }
                EdgeKind::Def => {
                    if let Some(set) = def_nodes.get_mut(&edge.from) {
                        set.insert(edge.to);
                    }
                }
                _ => {}
            }
        }

        let mut loop_set = BTreeSet::new();
        let mut loop_heads: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut loop_backs: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut self_loops = BTreeSet::new();

        for l in loops {
            if l.is_self_loop() && l.body.len() == 1 {
                self_loops.insert(l.head);
            } else {
                loop_set.insert((l.head, l.back_node));
                *loop_heads.entry(l.head).or_insert(0) += 1;
                *loop_backs.entry(l.back_node).or_insert(0) += 1;
            }
        }

        // Strip self-loop adjacency; the nodes are remembered in self_loops
        for node in &self_loops {
            if let Some(succ) = fwd.get_mut(node) {
                succ.retain(|(_, to)| to != node);
            }
            if let Some(pred) = bwd.get_mut(node) {
                pred.retain(|(_, from)| from != node);
            }
        }

        Self {
            fwd,
            bwd,
            def_nodes,
            used_nodes,
            loops: loop_set,
            loop_heads,
            loop_backs,
            self_loops,
        }
    }

    /// All flow successors of a control node (edge id, target)
    #[must_use]
    pub fn successors(&self, node: NodeId) -> &[(EdgeId, NodeId)] {
        self.fwd.get(&node).map_or(&[], Vec::as_slice)
    }

    /// Data nodes defined by `node`
    #[must_use]
    pub fn defined(&self, node: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.def_nodes.get(&node)
    }

    /// Control nodes with a variable definition, in id order
    pub fn nodes_with_defs(&self) -> impl Iterator<Item = (NodeId, &BTreeSet<NodeId>)> {
        self.def_nodes
            .iter()
            .filter(|(_, defs)| !defs.is_empty())
            .map(|(n, defs)| (*n, defs))
    }

    /// Leaf statement: no flow successors
    #[must_use]
    pub fn is_tail(&self, node: NodeId) -> bool {
        self.successors(node).is_empty()
    }

    /// Join point: at least two non-loop incoming edges
    #[must_use]
    pub fn is_join(&self, node: NodeId) -> bool {
        let head_count = self.loop_heads.get(&node).copied().unwrap_or(0);
        let incoming = self.bwd.get(&node).map_or(0, Vec::len);
        incoming.saturating_sub(head_count) >= 2
    }

    fn count_outgoing(&self, node: NodeId) -> usize {
        let back_count = self.loop_backs.get(&node).copied().unwrap_or(0);
        self.successors(node).len().saturating_sub(back_count)
    }

    /// Two outgoing non-back edges
    #[must_use]
    pub fn is_if(&self, node: NodeId) -> bool {
        self.count_outgoing(node) == 2
    }

    /// One outgoing non-back edge
    #[must_use]
    pub fn is_seq(&self, node: NodeId) -> bool {
        self.count_outgoing(node) == 1
    }

    /// Head of at least one (remaining) loop
    #[must_use]
    pub fn is_head(&self, node: NodeId) -> bool {
        self.loop_heads.get(&node).copied().unwrap_or(0) > 0
    }

    /// Source of at least one (remaining) back edge
    #[must_use]
    pub fn is_back_node(&self, node: NodeId) -> bool {
        self.loop_backs.get(&node).copied().unwrap_or(0) > 0
    }

    /// Whether `(head, back_node)` is a known, still-active loop
    #[must_use]
    pub fn is_loop(&self, head: NodeId, back_node: NodeId) -> bool {
        self.loops.contains(&(head, back_node))
            && self.loop_heads.get(&head).copied().unwrap_or(0) > 0
            && self.loop_backs.get(&back_node).copied().unwrap_or(0) > 0
    }

    /// Whether the node carries a (stripped) self-loop
    #[must_use]
    pub fn has_self_loop(&self, node: NodeId) -> bool {
        self.self_loops.contains(&node)
    }

    /// Retire a loop once its `while` has been emitted: drop the back edge
    /// from the adjacency and decrement the head/back counters
    pub fn remove_loop(&mut self, head: NodeId, back_node: NodeId) {
        self.loops.remove(&(head, back_node));
        if let Some(c) = self.loop_heads.get_mut(&head) {
            *c = c.saturating_sub(1);
        }
        if let Some(c) = self.loop_backs.get_mut(&back_node) {
            *c = c.saturating_sub(1);
        }
        if let Some(succ) = self.fwd.get_mut(&back_node) {
            succ.retain(|(_, to)| *to != head);
        }
        if let Some(pred) = self.bwd.get_mut(&head) {
            pred.retain(|(_, from)| *from != back_node);
        }
    }

    fn branch_targets(&self, node: NodeId) -> Vec<NodeId> {
        self.successors(node)
            .iter()
            .filter(|(_, to)| !self.loops.contains(&(*to, node)))
            .map(|(_, to)| *to)
            .collect()
    }

    /// The single sequential successor of a seq node
    #[must_use]
    pub fn next_node(&self, node: NodeId) -> Option<NodeId> {
        let branches = self.branch_targets(node);
        match branches.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// The two branch targets of an if node
    #[must_use]
    pub fn if_branches(&self, node: NodeId) -> Option<(NodeId, NodeId)> {
        let branches = self.branch_targets(node);
        match branches.as_slice() {
            [left, right] => Some((*left, *right)),
            _ => None,
        }
    }

    /// Variables to declare and parameters, SSA style: params are VAR data
    /// nodes used but never defined; declarations are VAR data nodes with a
    /// definition
    #[must_use]
    pub fn vars_to_declare(&self, graph: &Acdfg) -> (BTreeSet<NodeId>, BTreeSet<NodeId>) {
        let is_var = |id: &&NodeId| {
            matches!(
                graph.node(**id),
                Some(Node::Data(d)) if d.kind == DataKind::Var
            )
        };

        let mut params: BTreeSet<NodeId> = self
            .used_nodes
            .values()
            .flatten()
            .filter(is_var)
            .copied()
            .collect();
        let defined: BTreeSet<NodeId> = self
            .def_nodes
            .values()
            .flatten()
            .filter(is_var)
            .copied()
            .collect();
        for d in &defined {
            params.remove(d);
        }
        (params, defined)
    }
}
