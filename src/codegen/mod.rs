//! Pseudocode rendering of pattern graphs and diffs
//!
//! Mined patterns are reduced graphs: they record that branches and loops
//! exist but not their guards. The generator reconstructs a structured AST
//! from the control skeleton (dominators, natural loops, join points) and
//! prints Java-flavored pseudocode with `if (*)` / `while (*)` placeholder
//! conditions. A second renderer turns a [`GraphDiff`] into a prose
//! recommendation.
//!
//! # Example
//!
//! ```
//! use groum_search::codegen::CodeGenerator;
//! use groum_search::graph::GraphBuilder;
//!
//! let mut b = GraphBuilder::new();
//! b.method_node(1, None, None, "java.io.Reader.read", &[]);
//! b.method_node(2, None, None, "java.io.Reader.close", &[]);
//! b.control_edge(10, 1, 2);
//! let graph = b.build().unwrap();
//!
//! let code = CodeGenerator::new(&graph, &graph).render();
//! assert!(code.contains("java.io.Reader.read()"));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::diff::{DiffKind, GraphDiff};
use crate::graph::{Acdfg, CfgView, DataKind, Dominators, NaturalLoop, Node, NodeId};

/// Structured pseudocode tree reconstructed from a pattern graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternAst {
    /// Variable reference
    Var(String),
    /// Constant literal
    Const(String),
    /// Method invocation
    Call {
        /// Fully qualified method name
        name: String,
        /// Receiver expression, if any
        invokee: Option<Box<PatternAst>>,
        /// Argument expressions
        args: Vec<PatternAst>,
    },
    /// Assignment to an already-declared variable
    Assign {
        /// Assigned variable
        target: Box<PatternAst>,
        /// Right-hand side
        value: Box<PatternAst>,
    },
    /// First definition of a variable, with its declared type
    Decl {
        /// Declared type name
        ty: String,
        /// Declared variable
        target: Box<PatternAst>,
        /// Initializer, if the declaration has one
        value: Option<Box<PatternAst>>,
    },
    /// Statement sequence
    Seq(Vec<PatternAst>),
    /// Branch with unreconstructed guard
    If {
        /// Taken branch
        then_branch: Box<PatternAst>,
        /// Fallthrough branch
        else_branch: Box<PatternAst>,
    },
    /// Loop with unreconstructed guard
    While {
        /// Loop body
        body: Box<PatternAst>,
    },
    /// Empty statement
    Skip,
    /// The enclosing synthetic method
    MethodDecl {
        /// Parameters as `(type, name)` pairs
        params: Vec<(String, String)>,
        /// Method body
        body: Box<PatternAst>,
    },
}

impl PatternAst {
    fn is_skip(&self) -> bool {
        match self {
            Self::Skip => true,
            Self::Seq(stmts) => stmts.iter().all(Self::is_skip),
            _ => false,
        }
    }
}

/// Renders a pattern graph as pseudocode
#[derive(Debug)]
pub struct CodeGenerator {
    graph: Acdfg,
    roots: Vec<NodeId>,
    loops: Vec<NaturalLoop>,
}

impl CodeGenerator {
    /// Prepare a sliced pattern graph for rendering
    ///
    /// TRANS edges that coincide with a control path in the unreduced
    /// `original` are rehydrated to CONTROL, variables are renamed to
    /// `tmp_<n>`, and a root is synthesized when the control skeleton is
    /// fully cyclic.
    #[must_use]
    pub fn new(sliced: &Acdfg, original: &Acdfg) -> Self {
        let mut graph = sliced.clone();
        graph.rehydrate_trans_edges(original);
        let mut var_names = BTreeMap::new();
        graph.rename_vars(&mut var_names);

        if graph.find_control_roots().is_empty() {
            if let Some(root) = graph.effective_control_roots().first().copied() {
                graph.sever_incoming(root);
            }
        }
        let roots: Vec<NodeId> = graph.effective_control_roots().into_iter().collect();

        let mut loops = Vec::new();
        for root in &roots {
            loops.extend(Dominators::compute(&graph, *root).natural_loops());
        }
        loops.sort_by_key(|l| (l.head, l.back_node));
        loops.dedup();

        Self { graph, roots, loops }
    }

    /// Reconstruct the structured AST
    #[must_use]
    pub fn ast(&self) -> PatternAst {
        let view = CfgView::new(&self.graph, &self.loops);
        let (param_ids, decl_ids) = view.vars_to_declare(&self.graph);

        let mut builder = AstBuilder {
            graph: &self.graph,
            view,
            loops: &self.loops,
            resolved_joins: BTreeSet::new(),
            emitted: BTreeSet::new(),
            declared: BTreeSet::new(),
            declarable: decl_ids,
        };

        let empty_stop = BTreeSet::new();
        let mut bodies: Vec<PatternAst> = Vec::new();
        for root in &self.roots {
            let mut pending = None;
            let ast = builder.build(*root, &empty_stop, false, &mut pending);
            if !ast.is_skip() {
                bodies.push(ast);
            }
        }

        // Multiple independent roots read as alternative executions
        let body = if bodies.len() == 1 {
            bodies.remove(0)
        } else {
            bodies
                .into_iter()
                .rev()
                .reduce(|acc, ast| PatternAst::If {
                    then_branch: Box::new(ast),
                    else_branch: Box::new(acc),
                })
                .unwrap_or(PatternAst::Skip)
        };

        let params = param_ids
            .into_iter()
            .filter_map(|id| match self.graph.node(id) {
                Some(Node::Data(d)) => Some((d.ty.clone(), d.name.clone())),
                _ => None,
            })
            .collect();

        PatternAst::MethodDecl {
            params,
            body: Box::new(body),
        }
    }

    /// Render the pattern as pseudocode
    #[must_use]
    pub fn render(&self) -> String {
        render_ast(&self.ast())
    }
}

struct AstBuilder<'a> {
    graph: &'a Acdfg,
    view: CfgView,
    loops: &'a [NaturalLoop],
    resolved_joins: BTreeSet<NodeId>,
    emitted: BTreeSet<NodeId>,
    declared: BTreeSet<NodeId>,
    declarable: BTreeSet<NodeId>,
}

impl<'a> AstBuilder<'a> {
    fn is_unresolved_join(&self, node: NodeId) -> bool {
        self.view.is_join(node) && !self.resolved_joins.contains(&node)
    }

    fn active_loop_at(&self, head: NodeId) -> Option<NaturalLoop> {
        self.loops
            .iter()
            .find(|l| {
                l.head == head && !l.is_self_loop() && self.view.is_loop(l.head, l.back_node)
            })
            .cloned()
    }

    /// Build the AST for the region starting at `node`
    ///
    /// `stop` bounds loop bodies; `in_branch` makes an unresolved join a
    /// deferral point reported through `pending` instead of a statement.
    fn build(
        &mut self,
        node: NodeId,
        stop: &BTreeSet<NodeId>,
        in_branch: bool,
        pending: &mut Option<NodeId>,
    ) -> PatternAst {
        if stop.contains(&node) {
            return PatternAst::Skip;
        }
        if in_branch && self.is_unresolved_join(node) {
            *pending = Some(node);
            return PatternAst::Skip;
        }

        // Loops headed here wrap everything else at this node
        if let Some(lp) = self.active_loop_at(node) {
            self.view.remove_loop(lp.head, lp.back_node);

            let body_stop: BTreeSet<NodeId> = self
                .graph
                .control_nodes()
                .map(Node::id)
                .filter(|n| !lp.body.contains(n))
                .collect();
            let mut body_pending = None;
            let body = self.build(node, &body_stop, false, &mut body_pending);

            // Continue at the loop's unique exit, if one exists
            let mut exits: BTreeSet<NodeId> = BTreeSet::new();
            for member in &lp.body {
                for (_, succ) in self.view.successors(*member) {
                    if !lp.body.contains(succ) && !stop.contains(succ) {
                        exits.insert(*succ);
                    }
                }
            }
            let while_ast = PatternAst::While {
                body: Box::new(body),
            };
            return match exits.first().copied() {
                Some(exit) => seq(vec![
                    while_ast,
                    self.build(exit, stop, in_branch, pending),
                ]),
                None => while_ast,
            };
        }

        // A node reached again outside a tracked loop (an irreducible cycle
        // has no dominance-based back edge to retire) terminates the walk
        // here instead of recursing forever
        if !self.emitted.insert(node) {
            return PatternAst::Skip;
        }

        let mut stmt = self.statement(node);
        if self.view.has_self_loop(node) {
            stmt = PatternAst::While {
                body: Box::new(stmt),
            };
        }

        if self.view.is_if(node) {
            let Some((left, right)) = self.view.if_branches(node) else {
                return stmt;
            };
            let mut left_join = None;
            let mut right_join = None;
            let then_branch = self.build(left, stop, true, &mut left_join);
            let else_branch = self.build(right, stop, true, &mut right_join);
            let if_ast = PatternAst::If {
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            };
            let join = match (left_join, right_join) {
                (Some(j), _) | (None, Some(j)) => Some(j),
                (None, None) => None,
            };
            return match join {
                Some(j) => {
                    self.resolved_joins.insert(j);
                    seq(vec![stmt, if_ast, self.build(j, stop, in_branch, pending)])
                }
                None => seq(vec![stmt, if_ast]),
            };
        }

        if self.view.is_seq(node) {
            if let Some(next) = self.view.next_node(node) {
                return seq(vec![stmt, self.build(next, stop, in_branch, pending)]);
            }
        }

        stmt
    }

    /// The statement a single control node contributes
    fn statement(&mut self, node: NodeId) -> PatternAst {
        let Some(Node::Method(m)) = self.graph.node(node) else {
            return PatternAst::Skip;
        };

        let call = PatternAst::Call {
            name: m.name.clone(),
            invokee: m.invokee.map(|id| Box::new(self.data_expr(id))),
            args: m.args.iter().map(|id| self.data_expr(*id)).collect(),
        };

        match m.assignee {
            None => call,
            Some(target_id) => {
                let target = Box::new(self.data_expr(target_id));
                let first_def =
                    self.declarable.contains(&target_id) && self.declared.insert(target_id);
                if first_def {
                    let ty = match self.graph.node(target_id) {
                        Some(Node::Data(d)) => d.ty.clone(),
                        _ => "Object".to_owned(),
                    };
                    PatternAst::Decl {
                        ty,
                        target,
                        value: Some(Box::new(call)),
                    }
                } else {
                    PatternAst::Assign {
                        target,
                        value: Box::new(call),
                    }
                }
            }
        }
    }

    fn data_expr(&self, id: NodeId) -> PatternAst {
        match self.graph.node(id) {
            Some(Node::Data(d)) => match d.kind {
                DataKind::Var => PatternAst::Var(d.name.clone()),
                DataKind::Const => PatternAst::Const(d.name.clone()),
            },
            _ => PatternAst::Var("unknown".to_owned()),
        }
    }
}

fn seq(stmts: Vec<PatternAst>) -> PatternAst {
    let mut flat = Vec::new();
    for stmt in stmts {
        match stmt {
            PatternAst::Skip => {}
            PatternAst::Seq(inner) => flat.extend(inner.into_iter().filter(|s| !s.is_skip())),
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => PatternAst::Skip,
        1 => flat.remove(0),
        _ => PatternAst::Seq(flat),
    }
}

/// Render an AST as pseudocode
#[must_use]
pub fn render_ast(ast: &PatternAst) -> String {
    let mut out = String::new();
    write_stmt(ast, 0, &mut out);
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_expr(ast: &PatternAst, out: &mut String) {
    match ast {
        PatternAst::Var(name) | PatternAst::Const(name) => out.push_str(name),
        PatternAst::Call {
            name,
            invokee,
            args,
        } => {
            if let Some(recv) = invokee {
                write_expr(recv, out);
                out.push('.');
            }
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(arg, out);
            }
            out.push(')');
        }
        other => {
            // Statements never appear in expression position
            let _ = write!(out, "{other:?}");
        }
    }
}

fn write_stmt(ast: &PatternAst, depth: usize, out: &mut String) {
    match ast {
        PatternAst::Skip => {}
        PatternAst::Seq(stmts) => {
            for stmt in stmts {
                write_stmt(stmt, depth, out);
            }
        }
        PatternAst::Var(_) | PatternAst::Const(_) | PatternAst::Call { .. } => {
            indent(out, depth);
            write_expr(ast, out);
            out.push_str(";\n");
        }
        PatternAst::Assign { target, value } => {
            indent(out, depth);
            write_expr(target, out);
            out.push_str(" = ");
            write_expr(value, out);
            out.push_str(";\n");
        }
        PatternAst::Decl { ty, target, value } => {
            indent(out, depth);
            out.push_str(ty);
            out.push(' ');
            write_expr(target, out);
            if let Some(value) = value {
                out.push_str(" = ");
                write_expr(value, out);
            }
            out.push_str(";\n");
        }
        PatternAst::If {
            then_branch,
            else_branch,
        } => {
            indent(out, depth);
            out.push_str("if (*) {\n");
            write_stmt(then_branch, depth + 1, out);
            if else_branch.is_skip() {
                indent(out, depth);
                out.push_str("}\n");
            } else {
                indent(out, depth);
                out.push_str("} else {\n");
                write_stmt(else_branch, depth + 1, out);
                indent(out, depth);
                out.push_str("}\n");
            }
        }
        PatternAst::While { body } => {
            indent(out, depth);
            out.push_str("while (*) {\n");
            write_stmt(body, depth + 1, out);
            indent(out, depth);
            out.push_str("}\n");
        }
        PatternAst::MethodDecl { params, body } => {
            indent(out, depth);
            out.push_str("void pattern(");
            for (i, (ty, name)) in params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{ty} {name}");
            }
            out.push_str(") {\n");
            write_stmt(body, depth + 1, out);
            indent(out, depth);
            out.push_str("}\n");
        }
    }
}

/// Render a residue as a prose recommendation
///
/// `graph` is the side the diff was computed on (the pattern for
/// [`DiffKind::Add`], the query for [`DiffKind::Remove`]).
#[must_use]
pub fn render_diff(diff: &GraphDiff, graph: &Acdfg) -> String {
    let anchor = match diff.entry.and_then(|id| method_name(graph, id)) {
        Some(name) => format!("After the method {name}"),
        None => "At the beginning of the method".to_owned(),
    };

    let verb = match diff.kind {
        DiffKind::Add => "you should call",
        DiffKind::Remove => "you should not call",
    };

    let calls = name_list(graph, diff.nodes.iter());
    let mut text = format!("{anchor}, {verb} the methods: {calls}");

    if diff.exits.is_empty() {
        text.push_str(", before the end of the method");
    } else {
        let bounds = name_list(graph, diff.exits.iter());
        let _ = write!(text, ", before calling the methods: {bounds}");
    }
    text.push('.');
    text
}

fn method_name(graph: &Acdfg, id: NodeId) -> Option<String> {
    match graph.node(id) {
        Some(Node::Method(m)) => Some(m.name.clone()),
        _ => None,
    }
}

fn name_list<'a>(graph: &Acdfg, ids: impl Iterator<Item = &'a NodeId>) -> String {
    let names: Vec<String> = ids.filter_map(|id| method_name(graph, *id)).collect();
    if names.is_empty() {
        "(none)".to_owned()
    } else {
        names.join(", ")
    }
}
