//! Control-flow graphs of method, initializer and lambda bodies
//!
//! Blocks hold the reference sites of the code they cover, in evaluation
//! order. Edges carry the guard that holds when they are taken, so the
//! propagation engine only has to refine facts along edges.

use super::guard::{catch_guards, Guard, GuardRecognizer};
use crate::parser::ast::{
    BinaryOp, Block, CatchClause, Expr, ExprKind, LambdaBody, Literal, Param, Span, Stmt,
    StmtKind, SwitchCase, TypeDecl, TypeRef, UnaryOp,
};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;

/// Code that runs later, with the facts of the point where it is created
#[derive(Debug, Clone, Copy)]
pub enum Nested<'a> {
    Lambda {
        params: &'a [Param],
        body: &'a LambdaBody,
    },
    /// Anonymous or local class body
    Class(&'a TypeDecl),
}

#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// Name, field access, call, object creation or method reference
    Reference(&'a Expr),
    /// Type named by a class literal, `instanceof` or a catch clause
    TypeUse(&'a TypeRef),
    /// Enum constant used as a `case` label of a switch over `selector`
    CaseLabel { label: &'a Expr, selector: &'a Expr },
    Nested(Nested<'a>),
    TryWithResources(Span),
}

#[derive(Debug, Clone, Copy)]
pub struct Site<'a> {
    pub event: Event<'a>,
    /// Innermost enclosing try body, if any
    pub context: Option<usize>,
}

/// A try body and the guards its catch clauses establish
#[derive(Debug, Clone)]
struct TryContext {
    parent: Option<usize>,
    guards: Vec<Guard>,
}

#[derive(Debug, Default)]
pub struct BasicBlock<'a> {
    pub sites: Vec<Site<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Flow,
    True,
    False,
    Case,
    Exception,
    Back,
}

#[derive(Debug, Clone)]
pub struct EdgeLabel {
    pub kind: EdgeKind,
    /// Condition known to hold after taking the edge
    pub guard: Option<Guard>,
}

#[derive(Debug)]
pub struct Cfg<'a> {
    pub graph: DiGraph<BasicBlock<'a>, EdgeLabel>,
    pub entry: NodeIndex,
    pub exit: NodeIndex,
    contexts: Vec<TryContext>,
}

impl<'a> Cfg<'a> {
    /// Graph of a method, constructor, initializer or block lambda body
    pub fn for_block(block: &'a Block, recognizer: &GuardRecognizer) -> Self {
        let mut builder = CfgBuilder::new(recognizer);
        builder.stmts(&block.stmts);
        builder.finish()
    }

    /// Graph of standalone expressions: field initializers, enum constant
    /// arguments and expression lambdas
    pub fn for_exprs<I>(exprs: I, recognizer: &GuardRecognizer) -> Self
    where
        I: IntoIterator<Item = &'a Expr>,
    {
        let mut builder = CfgBuilder::new(recognizer);
        for expr in exprs {
            builder.expr(expr);
        }
        builder.finish()
    }

    /// Guards established by the try statements lexically enclosing a site
    pub fn handler_guards(&self, context: Option<usize>) -> Vec<&Guard> {
        let mut guards = Vec::new();
        let mut next = context;
        while let Some(idx) = next {
            let Some(ctx) = self.contexts.get(idx) else {
                break;
            };
            guards.extend(ctx.guards.iter());
            next = ctx.parent;
        }
        guards
    }

    /// Blocks reachable from the entry in reverse postorder
    pub fn reverse_postorder(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut dfs = DfsPostOrder::new(&self.graph, self.entry);
        while let Some(node) = dfs.next(&self.graph) {
            order.push(node);
        }
        order.reverse();
        order
    }

    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }
}

/// Target of `break`, `continue` and `yield`
struct JumpTarget {
    label: Option<String>,
    break_to: NodeIndex,
    continue_to: Option<NodeIndex>,
    /// Unlabeled `break` may target this statement
    breakable: bool,
    /// Switch expression receiving `yield`
    yields: bool,
}

struct CfgBuilder<'a, 'r> {
    recognizer: &'r GuardRecognizer,
    graph: DiGraph<BasicBlock<'a>, EdgeLabel>,
    entry: NodeIndex,
    exit: NodeIndex,
    current: NodeIndex,
    jumps: Vec<JumpTarget>,
    contexts: Vec<TryContext>,
    context: Option<usize>,
    pending_label: Option<String>,
}

impl<'a, 'r> CfgBuilder<'a, 'r> {
    fn new(recognizer: &'r GuardRecognizer) -> Self {
        let mut graph = DiGraph::new();
        let entry = graph.add_node(BasicBlock::default());
        let exit = graph.add_node(BasicBlock::default());
        Self {
            recognizer,
            graph,
            entry,
            exit,
            current: entry,
            jumps: Vec::new(),
            contexts: Vec::new(),
            context: None,
            pending_label: None,
        }
    }

    fn finish(mut self) -> Cfg<'a> {
        let last = self.current;
        self.flow(last, self.exit);
        Cfg {
            graph: self.graph,
            entry: self.entry,
            exit: self.exit,
            contexts: self.contexts,
        }
    }

    fn new_block(&mut self) -> NodeIndex {
        self.graph.add_node(BasicBlock::default())
    }

    fn edge(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind, guard: Option<Guard>) {
        self.graph.add_edge(from, to, EdgeLabel { kind, guard });
    }

    fn flow(&mut self, from: NodeIndex, to: NodeIndex) {
        self.edge(from, to, EdgeKind::Flow, None);
    }

    /// Leave the current block for `target`; code after the jump is unreachable
    fn jump(&mut self, target: NodeIndex) {
        let from = self.current;
        self.flow(from, target);
        self.current = self.new_block();
    }

    fn site(&mut self, event: Event<'a>) {
        let context = self.context;
        self.graph[self.current].sites.push(Site { event, context });
    }

    // ==================== Statements ====================

    fn stmts(&mut self, stmts: &'a [Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.stmts(&block.stmts),
            StmtKind::Local(vars) => {
                for var in vars {
                    if let Some(init) = &var.init {
                        self.expr(init);
                    }
                }
            }
            StmtKind::Expr(e) => self.expr(e),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let then_block = self.new_block();
                let else_block = self.new_block();
                let join = self.new_block();
                self.cond(cond, then_block, else_block);

                self.current = then_block;
                self.stmt(then_branch);
                let end = self.current;
                self.flow(end, join);

                self.current = else_block;
                if let Some(other) = else_branch {
                    self.stmt(other);
                }
                let end = self.current;
                self.flow(end, join);

                self.current = join;
            }
            StmtKind::While { cond, body } => {
                let label = self.pending_label.take();
                let header = self.new_block();
                let body_block = self.new_block();
                let after = self.new_block();
                let start = self.current;
                self.flow(start, header);

                self.current = header;
                self.cond(cond, body_block, after);

                self.loop_body(label, body, body_block, after, header);
                self.current = after;
            }
            StmtKind::DoWhile { body, cond } => {
                let label = self.pending_label.take();
                let body_block = self.new_block();
                let cond_block = self.new_block();
                let after = self.new_block();
                let start = self.current;
                self.flow(start, body_block);

                self.jumps.push(JumpTarget {
                    label,
                    break_to: after,
                    continue_to: Some(cond_block),
                    breakable: true,
                    yields: false,
                });
                self.current = body_block;
                self.stmt(body);
                self.jumps.pop();
                let end = self.current;
                self.flow(end, cond_block);

                self.current = cond_block;
                let again = self.new_block();
                self.cond(cond, again, after);
                self.edge(again, body_block, EdgeKind::Back, None);
                self.current = after;
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let label = self.pending_label.take();
                self.stmts(init);
                let header = self.new_block();
                let body_block = self.new_block();
                let update_block = self.new_block();
                let after = self.new_block();
                let start = self.current;
                self.flow(start, header);

                self.current = header;
                match cond {
                    Some(cond) => self.cond(cond, body_block, after),
                    None => self.flow(header, body_block),
                }

                self.jumps.push(JumpTarget {
                    label,
                    break_to: after,
                    continue_to: Some(update_block),
                    breakable: true,
                    yields: false,
                });
                self.current = body_block;
                self.stmt(body);
                self.jumps.pop();
                let end = self.current;
                self.flow(end, update_block);

                self.current = update_block;
                for u in update {
                    self.expr(u);
                }
                let end = self.current;
                self.edge(end, header, EdgeKind::Back, None);
                self.current = after;
            }
            StmtKind::ForEach { iterable, body, .. } => {
                let label = self.pending_label.take();
                self.expr(iterable);
                let header = self.new_block();
                let body_block = self.new_block();
                let after = self.new_block();
                let start = self.current;
                self.flow(start, header);
                self.flow(header, body_block);
                self.flow(header, after);

                self.loop_body(label, body, body_block, after, header);
                self.current = after;
            }
            StmtKind::Switch { selector, cases } => {
                let label = self.pending_label.take();
                self.switch(label, selector, cases, false);
            }
            StmtKind::Try {
                resources,
                with_resources,
                body,
                catches,
                finally,
            } => {
                if *with_resources {
                    self.site(Event::TryWithResources(stmt.span));
                }
                self.try_stmt(resources, body, catches, finally.as_ref());
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
                self.jump(self.exit);
            }
            StmtKind::Throw(e) => {
                self.expr(e);
                self.jump(self.exit);
            }
            StmtKind::Yield(e) => {
                self.expr(e);
                match self.jumps.iter().rev().find(|j| j.yields) {
                    Some(target) => {
                        let to = target.break_to;
                        self.jump(to);
                    }
                    None => self.jump(self.exit),
                }
            }
            StmtKind::Break(label) => {
                let target = self
                    .jumps
                    .iter()
                    .rev()
                    .find(|j| match label {
                        Some(l) => j.label.as_deref() == Some(l),
                        None => j.breakable,
                    })
                    .map(|j| j.break_to);
                self.jump(target.unwrap_or(self.exit));
            }
            StmtKind::Continue(label) => {
                let target = self
                    .jumps
                    .iter()
                    .rev()
                    .filter(|j| j.continue_to.is_some())
                    .find(|j| label.is_none() || j.label.as_deref() == label.as_deref())
                    .and_then(|j| j.continue_to);
                match target {
                    Some(to) => {
                        let from = self.current;
                        self.edge(from, to, EdgeKind::Back, None);
                        self.current = self.new_block();
                    }
                    None => self.jump(self.exit),
                }
            }
            StmtKind::Labeled { label, body } => {
                if matches!(
                    body.kind,
                    StmtKind::While { .. }
                        | StmtKind::DoWhile { .. }
                        | StmtKind::For { .. }
                        | StmtKind::ForEach { .. }
                        | StmtKind::Switch { .. }
                ) {
                    self.pending_label = Some(label.clone());
                    self.stmt(body);
                } else {
                    let after = self.new_block();
                    self.jumps.push(JumpTarget {
                        label: Some(label.clone()),
                        break_to: after,
                        continue_to: None,
                        breakable: false,
                        yields: false,
                    });
                    self.stmt(body);
                    self.jumps.pop();
                    let end = self.current;
                    self.flow(end, after);
                    self.current = after;
                }
            }
            StmtKind::Synchronized { lock, body } => {
                self.expr(lock);
                self.stmts(&body.stmts);
            }
            StmtKind::LocalClass(decl) => self.site(Event::Nested(Nested::Class(decl))),
            StmtKind::Assert { cond, message } => {
                // Assertions may be disabled, so they establish nothing
                self.expr(cond);
                if let Some(message) = message {
                    self.expr(message);
                }
            }
            StmtKind::Empty => {}
        }
    }

    fn loop_body(
        &mut self,
        label: Option<String>,
        body: &'a Stmt,
        body_block: NodeIndex,
        after: NodeIndex,
        header: NodeIndex,
    ) {
        self.jumps.push(JumpTarget {
            label,
            break_to: after,
            continue_to: Some(header),
            breakable: true,
            yields: false,
        });
        self.current = body_block;
        self.stmt(body);
        self.jumps.pop();
        let end = self.current;
        self.edge(end, header, EdgeKind::Back, None);
    }

    fn switch(&mut self, label: Option<String>, selector: &'a Expr, cases: &'a [SwitchCase], is_expr: bool) {
        self.expr(selector);
        let head = self.current;
        let after = self.new_block();

        self.jumps.push(JumpTarget {
            label,
            break_to: after,
            continue_to: None,
            breakable: !is_expr,
            yields: is_expr,
        });

        let mut fallthrough: Option<NodeIndex> = None;
        let mut has_default = false;
        for case in cases {
            let block = self.new_block();
            let guard = if case.is_default {
                None
            } else {
                self.recognizer.case_guard(selector, &case.labels)
            };
            self.edge(head, block, EdgeKind::Case, guard);
            if let Some(previous) = fallthrough.take() {
                self.flow(previous, block);
            }
            has_default |= case.is_default;

            self.current = block;
            for label in &case.labels {
                if matches!(label.kind, ExprKind::Name(_)) {
                    self.site(Event::CaseLabel { label, selector });
                } else {
                    self.expr(label);
                }
            }
            self.stmts(&case.body);

            if case.is_rule {
                let end = self.current;
                self.flow(end, after);
            } else {
                fallthrough = Some(self.current);
            }
        }

        if let Some(previous) = fallthrough {
            self.flow(previous, after);
        }
        if !has_default {
            self.flow(head, after);
        }
        self.jumps.pop();
        self.current = after;
    }

    fn try_stmt(
        &mut self,
        resources: &'a [Stmt],
        body: &'a Block,
        catches: &'a [CatchClause],
        finally: Option<&'a Block>,
    ) {
        let try_entry = self.new_block();
        let start = self.current;
        self.flow(start, try_entry);
        self.current = try_entry;

        let caught: Vec<TypeRef> = catches.iter().flat_map(|c| c.types.iter().cloned()).collect();
        let outer = self.context;
        self.contexts.push(TryContext {
            parent: outer,
            guards: catch_guards(&caught),
        });
        self.context = Some(self.contexts.len() - 1);
        self.stmts(resources);
        self.stmts(&body.stmts);
        self.context = outer;

        let join = self.new_block();
        let end = self.current;
        self.flow(end, join);

        for catch in catches {
            let handler = self.new_block();
            self.edge(try_entry, handler, EdgeKind::Exception, None);
            self.current = handler;
            for ty in &catch.types {
                self.site(Event::TypeUse(ty));
            }
            self.stmts(&catch.body.stmts);
            let end = self.current;
            self.flow(end, join);
        }

        self.current = join;
        if let Some(finally) = finally {
            self.edge(try_entry, join, EdgeKind::Exception, None);
            self.stmts(&finally.stmts);
        }
    }

    // ==================== Expressions ====================

    /// Lower a condition into branches to `on_true` and `on_false`
    fn cond(&mut self, expr: &'a Expr, on_true: NodeIndex, on_false: NodeIndex) {
        match &expr.kind {
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                let mid = self.new_block();
                self.cond(lhs, mid, on_false);
                self.current = mid;
                self.cond(rhs, on_true, on_false);
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                let mid = self.new_block();
                self.cond(lhs, on_true, mid);
                self.current = mid;
                self.cond(rhs, on_true, on_false);
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.cond(operand, on_false, on_true),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let then_block = self.new_block();
                let else_block = self.new_block();
                self.cond(cond, then_block, else_block);
                self.current = then_block;
                self.cond(then_expr, on_true, on_false);
                self.current = else_block;
                self.cond(else_expr, on_true, on_false);
            }
            ExprKind::Literal(Literal::Bool(value)) => {
                let from = self.current;
                self.flow(from, if *value { on_true } else { on_false });
            }
            _ => {
                self.expr(expr);
                let guard = self.recognizer.recognize(expr);
                let from = self.current;
                self.edge(from, on_true, EdgeKind::True, guard.clone());
                self.edge(from, on_false, EdgeKind::False, guard.map(Guard::negate));
            }
        }
    }

    /// Record the reference sites of an expression evaluated for its value
    fn expr(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                lhs,
                rhs,
            } => {
                let rhs_block = self.new_block();
                let join = self.new_block();
                if *op == BinaryOp::And {
                    self.cond(lhs, rhs_block, join);
                } else {
                    self.cond(lhs, join, rhs_block);
                }
                self.current = rhs_block;
                self.expr(rhs);
                let end = self.current;
                self.flow(end, join);
                self.current = join;
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let then_block = self.new_block();
                let else_block = self.new_block();
                let join = self.new_block();
                self.cond(cond, then_block, else_block);

                self.current = then_block;
                self.expr(then_expr);
                let end = self.current;
                self.flow(end, join);

                self.current = else_block;
                self.expr(else_expr);
                let end = self.current;
                self.flow(end, join);

                self.current = join;
            }
            ExprKind::Lambda { params, body } => {
                self.site(Event::Nested(Nested::Lambda { params, body }));
            }
            ExprKind::New { args, body, .. } => {
                for arg in args {
                    self.expr(arg);
                }
                self.site(Event::Reference(expr));
                if let Some(decl) = body {
                    self.site(Event::Nested(Nested::Class(decl)));
                }
            }
            ExprKind::Switch { selector, cases } => self.switch(None, selector, cases, true),
            ExprKind::ClassLit(ty) => self.site(Event::TypeUse(ty)),
            ExprKind::InstanceOf { expr: inner, ty } => {
                self.expr(inner);
                self.site(Event::TypeUse(ty));
            }
            ExprKind::Name(_)
            | ExprKind::FieldAccess { .. }
            | ExprKind::Call { .. }
            | ExprKind::MethodRef { .. } => {
                for child in expr.children() {
                    self.expr(child);
                }
                self.site(Event::Reference(expr));
            }
            _ => {
                for child in expr.children() {
                    self.expr(child);
                }
            }
        }
    }
}
