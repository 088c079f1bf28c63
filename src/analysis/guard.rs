//! Guard predicate recognition
//!
//! Classifies branch conditions as version checks, permission checks or
//! boolean combinations of those. Anything else is unrecognized and
//! contributes no guarantee.

use crate::kb::api_level_for_codename;
use crate::parser::ast::{
    BinaryOp, Block, CompilationUnit, Expr, ExprKind, LambdaBody, Member, Stmt, StmtKind,
    TypeDecl, TypeKind, TypeRef, UnaryOp,
};
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::annotations::permission_name;

/// Runtime condition known to hold at a program point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    VersionAtLeast(u32),
    VersionAtMost(u32),
    VersionExactly(u32),
    PermissionHeld(String),
    /// Exceptions of this type are caught by an enclosing handler
    TypeExcluded(String),
    And(Vec<Guard>),
    Or(Vec<Guard>),
    Not(Box<Guard>),
    /// Unrecognized operand of a recognized `&&` / `||`
    Unknown,
}

impl Guard {
    pub fn negate(self) -> Guard {
        match self {
            Guard::Not(inner) => *inner,
            Guard::Unknown => Guard::Unknown,
            other => Guard::Not(Box::new(other)),
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |parts: &[Guard], op: &str| {
            parts
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(op)
        };
        match self {
            Guard::VersionAtLeast(v) => write!(f, "SDK_INT >= {}", v),
            Guard::VersionAtMost(v) => write!(f, "SDK_INT <= {}", v),
            Guard::VersionExactly(v) => write!(f, "SDK_INT == {}", v),
            Guard::PermissionHeld(p) => write!(f, "granted({})", p),
            Guard::TypeExcluded(t) => write!(f, "catches({})", t),
            Guard::And(parts) => write!(f, "({})", join(parts, " && ")),
            Guard::Or(parts) => write!(f, "({})", join(parts, " || ")),
            Guard::Not(inner) => write!(f, "!{}", inner),
            Guard::Unknown => write!(f, "?"),
        }
    }
}

const PERMISSION_CHECKS: &[&str] = &[
    "checkPermission",
    "checkSelfPermission",
    "checkCallingPermission",
    "checkCallingOrSelfPermission",
];

/// Recognizes guard shapes in the context of one compilation unit
#[derive(Debug, Clone, Default)]
pub struct GuardRecognizer {
    /// `SDK_INT` is statically imported
    sdk_int_imported: bool,
    /// Boolean variables initialized from a guard and never reassigned
    named: HashMap<String, Guard>,
    /// Names assigned anywhere in the unit, nested bodies included
    assigned: HashSet<String>,
}

impl GuardRecognizer {
    pub fn new(unit: &CompilationUnit) -> Self {
        let sdk_int_imported = unit.imports.iter().any(|import| {
            import.is_static
                && ((import.on_demand && import.path.ends_with("Build.VERSION"))
                    || import.path.ends_with("Build.VERSION.SDK_INT"))
        });
        let mut assigned = HashSet::new();
        for decl in &unit.types {
            scan_type(decl, &mut assigned);
        }
        Self {
            sdk_int_imported,
            named: HashMap::new(),
            assigned,
        }
    }

    /// Copy of this recognizer that also knows the guard variables of a scope
    pub fn with_variables(&self, variables: HashMap<String, Guard>) -> Self {
        let mut scoped = self.clone();
        scoped.named.extend(variables);
        scoped
    }

    /// Copy of this recognizer without the bindings that parameters or
    /// locals of an inner scope hide
    pub fn shadowed_by<'n>(&self, names: impl IntoIterator<Item = &'n String>) -> Self {
        let mut scoped = self.clone();
        for name in names {
            scoped.named.remove(name);
        }
        scoped
    }

    pub fn recognize(&self, expr: &Expr) -> Option<Guard> {
        match &expr.kind {
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.recognize(operand).map(Guard::negate),
            ExprKind::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                lhs,
                rhs,
            } => {
                let (l, r) = (self.recognize(lhs), self.recognize(rhs));
                if l.is_none() && r.is_none() {
                    return None;
                }
                let parts = vec![l.unwrap_or(Guard::Unknown), r.unwrap_or(Guard::Unknown)];
                Some(if *op == BinaryOp::And {
                    Guard::And(parts)
                } else {
                    Guard::Or(parts)
                })
            }
            ExprKind::Binary { op, lhs, rhs } => self
                .version_comparison(*op, lhs, rhs)
                .or_else(|| self.version_comparison(op.flipped(), rhs, lhs))
                .or_else(|| permission_comparison(*op, lhs, rhs))
                .or_else(|| permission_comparison(*op, rhs, lhs)),
            ExprKind::Name(name) => self.named.get(name).cloned(),
            _ => None,
        }
    }

    fn is_version_accessor(&self, expr: &Expr) -> bool {
        match expr.dotted_name() {
            Some(name) if name == "SDK_INT" => self.sdk_int_imported,
            Some(name) => name == "VERSION.SDK_INT" || name.ends_with(".VERSION.SDK_INT"),
            None => false,
        }
    }

    /// `accessor op level`
    fn version_comparison(&self, op: BinaryOp, accessor: &Expr, level: &Expr) -> Option<Guard> {
        if !self.is_version_accessor(accessor) {
            return None;
        }
        let v = version_constant(level)?;
        Some(match op {
            BinaryOp::Ge => Guard::VersionAtLeast(v),
            BinaryOp::Gt => Guard::VersionAtLeast(v.saturating_add(1)),
            BinaryOp::Le => Guard::VersionAtMost(v),
            BinaryOp::Lt => Guard::VersionAtMost(v.saturating_sub(1)),
            BinaryOp::Eq => Guard::VersionExactly(v),
            BinaryOp::Ne => Guard::VersionExactly(v).negate(),
            _ => return None,
        })
    }

    /// Guards for `case` labels of a switch over the version accessor
    pub fn case_guard(&self, selector: &Expr, labels: &[Expr]) -> Option<Guard> {
        if !self.is_version_accessor(selector) {
            return None;
        }
        let mut levels: Vec<Guard> = labels
            .iter()
            .map(|l| version_constant(l).map(Guard::VersionExactly))
            .collect::<Option<_>>()?;
        match levels.len() {
            0 => None,
            1 => levels.pop(),
            _ => Some(Guard::Or(levels)),
        }
    }

    /// Map of boolean locals in `body` that hold a guard and are never reassigned
    pub fn local_guard_variables(&self, body: &Block) -> HashMap<String, Guard> {
        let mut locals = Vec::new();
        let mut assigned = HashSet::new();
        for stmt in &body.stmts {
            scan_stmt(stmt, &mut locals, &mut assigned);
        }
        self.bind_unassigned(locals, &assigned)
    }

    /// Same for the fields of a type declaration. Only fields no other unit
    /// can write qualify: final ones, private ones and interface constants.
    pub fn field_guard_variables(&self, decl: &TypeDecl) -> HashMap<String, Guard> {
        let fields = decl
            .fields()
            .filter(|f| is_boolean(&f.ty))
            .filter(|f| f.is_final || f.is_private || decl.kind == TypeKind::Interface)
            .filter_map(|f| Some((f.name.as_str(), f.initializer.as_ref()?)))
            .collect();
        self.bind_unassigned(fields, &self.assigned)
    }

    fn bind_unassigned(&self, candidates: Vec<(&str, &Expr)>, assigned: &HashSet<String>) -> HashMap<String, Guard> {
        let mut bound = HashMap::new();
        for (name, init) in candidates {
            if assigned.contains(name) {
                continue;
            }
            // Earlier bindings are visible to later initializers
            let scoped = self.with_variables(bound.clone());
            if let Some(guard) = scoped.recognize(init) {
                bound.insert(name.to_string(), guard);
            }
        }
        bound
    }
}

/// Guards established by the catch clauses of a try statement
pub fn catch_guards(types: &[TypeRef]) -> Vec<Guard> {
    types
        .iter()
        .map(|t| Guard::TypeExcluded(t.name.clone()))
        .collect()
}

/// Literal level or `VERSION_CODES` constant
fn version_constant(expr: &Expr) -> Option<u32> {
    if let Some(value) = expr.int_literal() {
        return u32::try_from(value).ok();
    }
    match &expr.kind {
        ExprKind::Name(name) => api_level_for_codename(name),
        ExprKind::FieldAccess { target, name } => {
            let qualifier = target.dotted_name()?;
            if qualifier == "VERSION_CODES" || qualifier.ends_with(".VERSION_CODES") {
                api_level_for_codename(name)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// `check*Permission(.., permission, ..) op PERMISSION_GRANTED`
fn permission_comparison(op: BinaryOp, call: &Expr, status: &Expr) -> Option<Guard> {
    let ExprKind::Call { name, args, .. } = &call.kind else {
        return None;
    };
    if !PERMISSION_CHECKS.contains(&name.as_str()) {
        return None;
    }
    let permission = args.iter().find_map(permission_name)?;

    let granted = match status.last_name() {
        Some("PERMISSION_GRANTED") => true,
        Some("PERMISSION_DENIED") => false,
        _ => match status.int_literal()? {
            0 => true,
            -1 => false,
            _ => return None,
        },
    };

    let held = Guard::PermissionHeld(permission);
    match (op, granted) {
        (BinaryOp::Eq, true) | (BinaryOp::Ne, false) => Some(held),
        (BinaryOp::Ne, true) | (BinaryOp::Eq, false) => Some(held.negate()),
        _ => None,
    }
}

fn is_boolean(ty: &TypeRef) -> bool {
    matches!(ty.name.as_str(), "boolean" | "Boolean" | "java.lang.Boolean")
}

fn scan_stmt<'a>(stmt: &'a Stmt, locals: &mut Vec<(&'a str, &'a Expr)>, assigned: &mut HashSet<String>) {
    let mut exprs: Vec<&'a Expr> = Vec::new();
    let mut nested: Vec<&'a Stmt> = Vec::new();

    match &stmt.kind {
        StmtKind::Block(block) => nested.extend(&block.stmts),
        StmtKind::Local(vars) => {
            for var in vars {
                if let Some(init) = &var.init {
                    if is_boolean(&var.ty) || var.ty.is_inferred() {
                        locals.push((var.name.as_str(), init));
                    }
                    exprs.push(init);
                }
            }
        }
        StmtKind::Expr(e) | StmtKind::Throw(e) | StmtKind::Yield(e) => exprs.push(e),
        StmtKind::Return(e) => exprs.extend(e.iter()),
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            exprs.push(cond);
            nested.push(then_branch);
            nested.extend(else_branch.as_deref());
        }
        StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
            exprs.push(cond);
            nested.push(body);
        }
        StmtKind::For {
            init,
            cond,
            update,
            body,
        } => {
            nested.extend(init);
            exprs.extend(cond.iter());
            exprs.extend(update);
            nested.push(body);
        }
        StmtKind::ForEach { iterable, body, .. } => {
            exprs.push(iterable);
            nested.push(body);
        }
        StmtKind::Switch { selector, cases } => {
            exprs.push(selector);
            for case in cases {
                nested.extend(&case.body);
            }
        }
        StmtKind::Try {
            resources,
            body,
            catches,
            finally,
            ..
        } => {
            nested.extend(resources);
            nested.extend(&body.stmts);
            for catch in catches {
                nested.extend(&catch.body.stmts);
            }
            if let Some(finally) = finally {
                nested.extend(&finally.stmts);
            }
        }
        StmtKind::Labeled { body, .. } => nested.push(body),
        StmtKind::Synchronized { lock, body } => {
            exprs.push(lock);
            nested.extend(&body.stmts);
        }
        StmtKind::Assert { cond, message } => {
            exprs.push(cond);
            exprs.extend(message.iter());
        }
        StmtKind::LocalClass(decl) => scan_type(decl, assigned),
        StmtKind::Break(_)
        | StmtKind::Continue(_)
        | StmtKind::Empty => {}
    }

    for e in exprs {
        scan_assignments(e, assigned);
    }
    for s in nested {
        scan_stmt(s, locals, assigned);
    }
}

fn scan_assignments(expr: &Expr, assigned: &mut HashSet<String>) {
    match &expr.kind {
        ExprKind::Assign { target, .. } => {
            if let Some(name) = target.last_name() {
                assigned.insert(name.to_string());
            }
        }
        ExprKind::Lambda { body, .. } => match body {
            LambdaBody::Expr(body) => scan_assignments(body, assigned),
            LambdaBody::Block(block) => scan_block(block, assigned),
        },
        ExprKind::New {
            body: Some(decl), ..
        } => scan_type(decl, assigned),
        ExprKind::Switch { cases, .. } => {
            for case in cases {
                for stmt in &case.body {
                    scan_stmt(stmt, &mut Vec::new(), assigned);
                }
            }
        }
        _ => {}
    }
    for child in expr.children() {
        scan_assignments(child, assigned);
    }
}

/// Assignments in a body whose locals belong to another scope
fn scan_block(block: &Block, assigned: &mut HashSet<String>) {
    for stmt in &block.stmts {
        scan_stmt(stmt, &mut Vec::new(), assigned);
    }
}

/// Assignments anywhere in a type declaration, nested types included
fn scan_type(decl: &TypeDecl, assigned: &mut HashSet<String>) {
    for member in &decl.members {
        match member {
            Member::Method(method) => {
                if let Some(body) = &method.body {
                    scan_block(body, assigned);
                }
            }
            Member::Initializer { body, .. } => scan_block(body, assigned),
            Member::Field(field) => {
                if let Some(init) = &field.initializer {
                    scan_assignments(init, assigned);
                }
            }
            Member::EnumConstant(constant) => {
                for arg in &constant.args {
                    scan_assignments(arg, assigned);
                }
                if let Some(body) = &constant.body {
                    scan_type(body, assigned);
                }
            }
            Member::Type(nested) => scan_type(nested, assigned),
        }
    }
}
