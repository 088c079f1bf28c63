//! Symbol resolution: syntactic references to the declaring ancestor
//!
//! References are resolved against static receiver types only. Anything that
//! cannot be typed from declarations, imports and recorded return types is
//! left unresolved and never reported.

use crate::graph::{ProjectIndex, TypeScope};
use crate::kb::{KnowledgeBase, MemberKind, Requirement, SymbolDescriptor};
use crate::parser::ast::{Block, CatchClause, Expr, ExprKind, Param, Stmt, StmtKind, TypeRef};
use std::collections::HashMap;

/// Declared types of the locals and parameters visible in a body.
/// `None` marks a variable whose type is unknown (`var`, untyped lambda parameters).
pub type Locals = HashMap<String, Option<String>>;

/// A reference bound to the symbol that declares it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    /// Symbol as reported: the static receiver when it is a platform class
    pub display: SymbolDescriptor,
    /// Platform class or source type declaring the member
    pub declaring: SymbolDescriptor,
    pub requirements: Vec<Requirement>,
    /// Compile-time constant copied into the caller
    pub inlined: bool,
}

impl ResolvedSymbol {
    pub fn version(&self) -> Option<u32> {
        self.requirements.iter().find_map(|r| match r {
            Requirement::Version(v) => Some(*v),
            Requirement::Permission(_) => None,
        })
    }
}

/// What a receiver expression denotes
#[derive(Debug, Clone, PartialEq, Eq)]
enum Receiver {
    /// A type name: static member access
    Type(String),
    /// A value of a known static type
    Value(String),
    Unknown,
}

/// Resolves references inside one type declaration
pub struct Resolver<'a> {
    kb: &'a KnowledgeBase,
    index: &'a ProjectIndex,
    scope: TypeScope<'a>,
    /// Statically imported member name to its owner
    static_members: HashMap<String, String>,
    static_owners: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(kb: &'a KnowledgeBase, scope: TypeScope<'a>) -> Self {
        let mut static_members = HashMap::new();
        let mut static_owners = Vec::new();
        for import in scope.unit().imports.iter().filter(|i| i.is_static) {
            if import.on_demand {
                if let Some(owner) = scope.resolve(&import.path) {
                    static_owners.push(owner);
                }
            } else if let Some((owner, member)) = import.path.rsplit_once('.') {
                if let Some(owner) = scope.resolve(owner) {
                    static_members.insert(member.to_string(), owner);
                }
            }
        }
        Self {
            kb,
            index: scope.index(),
            scope,
            static_members,
            static_owners,
        }
    }

    pub fn scope(&self) -> &TypeScope<'a> {
        &self.scope
    }

    /// Innermost enclosing type
    fn this_type(&self) -> Option<&str> {
        self.scope.enclosing().first().map(String::as_str)
    }

    fn super_type(&self) -> Option<&str> {
        self.index.hierarchy().super_class(self.this_type()?)
    }

    /// Resolve a name, field access, call, object creation or method reference
    pub fn resolve_reference(&self, expr: &Expr, locals: &Locals) -> Option<ResolvedSymbol> {
        match &expr.kind {
            ExprKind::Name(name) => {
                if locals.contains_key(name) {
                    return None;
                }
                self.implicit_member(name, MemberKind::Field, None)
            }
            ExprKind::FieldAccess { target, name } => match self.receiver(target, locals) {
                Receiver::Type(owner) | Receiver::Value(owner) => {
                    self.find_member(&owner, name, MemberKind::Field, None)
                }
                Receiver::Unknown => None,
            },
            ExprKind::Call { target, name, args } => {
                let arity = Some(args.len());
                if name == "<init>" {
                    return match target.as_deref().map(|t| &t.kind) {
                        Some(ExprKind::Super) => self.constructor(self.super_type()?, arity),
                        _ => None,
                    };
                }
                match target.as_deref() {
                    None => self.implicit_member(name, MemberKind::Method, arity),
                    Some(Expr {
                        kind: ExprKind::Super,
                        ..
                    }) => self.find_member(self.super_type()?, name, MemberKind::Method, arity),
                    Some(target) => match self.receiver(target, locals) {
                        Receiver::Type(owner) | Receiver::Value(owner) => {
                            self.find_member(&owner, name, MemberKind::Method, arity)
                        }
                        Receiver::Unknown => None,
                    },
                }
            }
            ExprKind::New { ty, args, .. } => {
                let owner = self.scope.resolve(&ty.name)?;
                self.constructor(&owner, Some(args.len()))
            }
            ExprKind::MethodRef { target, name } => {
                let owner = match self.receiver(target, locals) {
                    Receiver::Type(owner) | Receiver::Value(owner) => owner,
                    Receiver::Unknown => return None,
                };
                if name == "new" {
                    self.constructor(&owner, None)
                } else {
                    self.find_member(&owner, name, MemberKind::Method, None)
                }
            }
            _ => None,
        }
    }

    /// Resolve a type named by a class literal, `instanceof`, catch clause or supertype
    pub fn resolve_type_use(&self, ty: &TypeRef) -> Option<ResolvedSymbol> {
        if ty.is_primitive() {
            return None;
        }
        let name = self.scope.resolve(&ty.name)?;
        let descriptor = SymbolDescriptor::class(&name);
        let requirements = match self.index.source_type(&name) {
            Some(source) => source.requires_api.map(Requirement::Version).into_iter().collect(),
            None => self.kb.lookup(&descriptor),
        };
        Some(ResolvedSymbol {
            display: descriptor.clone(),
            declaring: descriptor,
            requirements,
            inlined: false,
        })
    }

    /// Resolve an enum constant used as a case label of a switch over `selector`
    pub fn resolve_case_label(&self, label: &Expr, selector: &Expr, locals: &Locals) -> Option<ResolvedSymbol> {
        let name = label.last_name()?;
        let owner = self.type_of(selector, locals)?;
        self.find_member(&owner, name, MemberKind::EnumCase, None)
    }

    /// Member looked up through the implicit receiver: the enclosing types
    /// innermost first, then static imports
    fn implicit_member(&self, name: &str, kind: MemberKind, arity: Option<usize>) -> Option<ResolvedSymbol> {
        for outer in self.scope.enclosing() {
            if let Some(symbol) = self.find_member(outer, name, kind, arity) {
                return Some(symbol);
            }
        }
        if let Some(owner) = self.static_members.get(name) {
            return self.find_member(owner, name, kind, arity);
        }
        self.static_owners
            .iter()
            .find_map(|owner| self.find_member(owner, name, kind, arity))
    }

    /// Walk `start` and its ancestors for the first type declaring the member
    fn find_member(&self, start: &str, member: &str, kind: MemberKind, arity: Option<usize>) -> Option<ResolvedSymbol> {
        let candidates = std::iter::once(start.to_string()).chain(self.index.ancestors(start));
        for owner in candidates {
            if let Some(source) = self.index.source_type(&owner) {
                let declared = match kind {
                    MemberKind::Method | MemberKind::Constructor => {
                        source.find_method(member, arity).map(|m| {
                            let mut requirements: Vec<Requirement> =
                                m.requires_api.map(Requirement::Version).into_iter().collect();
                            if let Some(permission) = &m.requires_permission {
                                requirements.push(Requirement::Permission(permission.clone()));
                            }
                            requirements
                        })
                    }
                    MemberKind::Field | MemberKind::EnumCase => source
                        .fields
                        .get(member)
                        .map(|f| f.requires_api.map(Requirement::Version).into_iter().collect()),
                    MemberKind::Class => None,
                };
                if let Some(requirements) = declared {
                    let descriptor = SymbolDescriptor::new(&owner, member, kind);
                    return Some(ResolvedSymbol {
                        display: descriptor.clone(),
                        declaring: descriptor,
                        requirements,
                        inlined: false,
                    });
                }
                continue;
            }

            if !self.kb.declares(&owner, member, kind) {
                continue;
            }
            let declaring = SymbolDescriptor::new(&owner, member, kind);
            let requirements = self.kb.lookup_overload(&declaring, arity);
            let display_owner = if self.kb.class(start).is_some() {
                start
            } else {
                owner.as_str()
            };
            let inlined = kind == MemberKind::Field && self.kb.is_constant_field(&owner, member);
            return Some(ResolvedSymbol {
                display: SymbolDescriptor::new(display_owner, member, kind),
                declaring,
                requirements,
                inlined,
            });
        }
        None
    }

    /// Constructor of `owner`; platform classes without recorded
    /// constructors fall back to the class level
    fn constructor(&self, owner: &str, arity: Option<usize>) -> Option<ResolvedSymbol> {
        let descriptor = SymbolDescriptor::constructor(owner);

        if let Some(source) = self.index.source_type(owner) {
            let level = match source.find_method("<init>", arity) {
                Some(ctor) => ctor.requires_api,
                None => source.requires_api,
            };
            let mut requirements: Vec<Requirement> = level.map(Requirement::Version).into_iter().collect();
            if let Some(permission) = source
                .find_method("<init>", arity)
                .and_then(|c| c.requires_permission.clone())
            {
                requirements.push(Requirement::Permission(permission));
            }
            return Some(ResolvedSymbol {
                display: descriptor.clone(),
                declaring: descriptor,
                requirements,
                inlined: false,
            });
        }

        let class = self.kb.class(owner)?;
        let mut requirements = self.kb.lookup_overload(&descriptor, arity);
        if !requirements.iter().any(|r| matches!(r, Requirement::Version(_))) {
            requirements.insert(0, Requirement::Version(class.since));
        }
        Some(ResolvedSymbol {
            display: descriptor.clone(),
            declaring: descriptor,
            requirements,
            inlined: false,
        })
    }

    /// Field visible by simple name: enclosing types, their ancestors and static imports
    fn field_type(&self, name: &str) -> Option<Option<String>> {
        for outer in self.scope.enclosing() {
            let candidates = std::iter::once(outer.clone()).chain(self.index.ancestors(outer));
            for owner in candidates {
                if let Some(source) = self.index.source_type(&owner) {
                    if let Some(field) = source.fields.get(name) {
                        return Some(field.ty.clone());
                    }
                } else if self.kb.declares(&owner, name, MemberKind::Field) {
                    return Some(None);
                }
            }
        }
        let imported = self.static_members.contains_key(name)
            || self
                .static_owners
                .iter()
                .any(|owner| self.kb.declares(owner, name, MemberKind::Field));
        imported.then_some(None)
    }

    fn receiver(&self, expr: &Expr, locals: &Locals) -> Receiver {
        match &expr.kind {
            ExprKind::Name(name) => {
                if let Some(ty) = locals.get(name) {
                    return self.value(ty.as_deref());
                }
                if let Some(ty) = self.field_type(name) {
                    return self.value(ty.as_deref());
                }
                match self.scope.resolve(name) {
                    Some(ty) => Receiver::Type(ty),
                    None => Receiver::Unknown,
                }
            }
            ExprKind::FieldAccess { target, name } => {
                // Qualified type names (`android.os.Build.VERSION`)
                if let Some(dotted) = expr.dotted_name() {
                    let head = dotted.split('.').next().unwrap_or_default();
                    if !locals.contains_key(head) && self.field_type(head).is_none() {
                        if let Some(ty) = self.scope.resolve(&dotted) {
                            return Receiver::Type(ty);
                        }
                    }
                }
                match self.receiver(target, locals) {
                    Receiver::Type(owner) | Receiver::Value(owner) => {
                        self.value(self.member_field_type(&owner, name).as_deref())
                    }
                    Receiver::Unknown => Receiver::Unknown,
                }
            }
            _ => self.value(self.type_of(expr, locals).as_deref()),
        }
    }

    fn value(&self, ty: Option<&str>) -> Receiver {
        match ty.and_then(|t| self.scope.resolve(t)) {
            Some(ty) => Receiver::Value(ty),
            None => Receiver::Unknown,
        }
    }

    /// Declared type of a field reached through `owner`
    fn member_field_type(&self, owner: &str, name: &str) -> Option<String> {
        let candidates = std::iter::once(owner.to_string()).chain(self.index.ancestors(owner));
        for candidate in candidates {
            if let Some(field) = self
                .index
                .source_type(&candidate)
                .and_then(|t| t.fields.get(name))
            {
                return field.ty.clone();
            }
            if self.kb.is_enum(&candidate) && self.kb.declares(&candidate, name, MemberKind::Field) {
                return Some(candidate);
            }
        }
        None
    }

    /// Static type of an expression, when it can be determined
    pub fn type_of(&self, expr: &Expr, locals: &Locals) -> Option<String> {
        match &expr.kind {
            ExprKind::Name(_) | ExprKind::FieldAccess { .. } => match self.receiver(expr, locals) {
                Receiver::Value(ty) => Some(ty),
                _ => None,
            },
            ExprKind::Call { target, name, args } => {
                let owner = match target.as_deref() {
                    None => return self.implicit_return_type(name, args.len()),
                    Some(Expr {
                        kind: ExprKind::Super,
                        ..
                    }) => self.super_type()?.to_string(),
                    Some(target) => match self.receiver(target, locals) {
                        Receiver::Type(owner) | Receiver::Value(owner) => owner,
                        Receiver::Unknown => return None,
                    },
                };
                self.return_type(&owner, name, args.len())
            }
            ExprKind::New { ty, .. } | ExprKind::Cast { ty, .. } => self.scope.resolve(&ty.name),
            ExprKind::Literal(crate::parser::ast::Literal::Str(_)) => {
                Some("java.lang.String".to_string())
            }
            ExprKind::This => self.this_type().map(str::to_string),
            ExprKind::Super => self.super_type().map(str::to_string),
            ExprKind::Conditional { then_expr, .. } => self.type_of(then_expr, locals),
            ExprKind::Assign { target, .. } => self.type_of(target, locals),
            _ => None,
        }
    }

    fn implicit_return_type(&self, name: &str, arity: usize) -> Option<String> {
        self.scope
            .enclosing()
            .iter()
            .find_map(|outer| self.return_type(outer, name, arity))
    }

    fn return_type(&self, owner: &str, name: &str, arity: usize) -> Option<String> {
        let candidates = std::iter::once(owner.to_string()).chain(self.index.ancestors(owner));
        for candidate in candidates {
            if let Some(source) = self.index.source_type(&candidate) {
                if let Some(method) = source.find_method(name, Some(arity)) {
                    return method.return_type.clone();
                }
            } else if self.kb.declares(&candidate, name, MemberKind::Method) {
                return self
                    .kb
                    .return_type(&candidate, name, Some(arity))
                    .map(str::to_string);
            }
        }
        None
    }
}

/// Locals and parameters declared in a body, excluding nested lambdas and classes
pub fn collect_locals(params: &[Param], body: Option<&Block>) -> Locals {
    let mut locals = Locals::new();
    for param in params {
        locals.insert(param.name.clone(), declared_type(param.ty.as_ref()));
    }
    if let Some(body) = body {
        for stmt in &body.stmts {
            collect_stmt(stmt, &mut locals);
        }
    }
    locals
}

fn declared_type(ty: Option<&TypeRef>) -> Option<String> {
    ty.filter(|t| !t.is_primitive() && !t.is_inferred())
        .map(|t| t.name.clone())
}

fn collect_stmt(stmt: &Stmt, locals: &mut Locals) {
    let nested = |stmts: &[Stmt], locals: &mut Locals| {
        for s in stmts {
            collect_stmt(s, locals);
        }
    };
    match &stmt.kind {
        StmtKind::Block(block) => nested(&block.stmts, locals),
        StmtKind::Local(vars) => {
            for var in vars {
                locals.insert(var.name.clone(), declared_type(Some(&var.ty)));
            }
        }
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_stmt(then_branch, locals);
            if let Some(other) = else_branch {
                collect_stmt(other, locals);
            }
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::Labeled { body, .. } => collect_stmt(body, locals),
        StmtKind::For { init, body, .. } => {
            nested(init, locals);
            collect_stmt(body, locals);
        }
        StmtKind::ForEach { var, body, .. } => {
            locals.insert(var.name.clone(), declared_type(Some(&var.ty)));
            collect_stmt(body, locals);
        }
        StmtKind::Switch { cases, .. } => {
            for case in cases {
                nested(&case.body, locals);
            }
        }
        StmtKind::Try {
            resources,
            body,
            catches,
            finally,
            ..
        } => {
            nested(resources, locals);
            nested(&body.stmts, locals);
            for CatchClause { types, name, body, .. } in catches {
                // Multi-catch parameters have the common supertype; only a single type is kept
                let ty = match types.as_slice() {
                    [single] => declared_type(Some(single)),
                    _ => None,
                };
                locals.insert(name.clone(), ty);
                nested(&body.stmts, locals);
            }
            if let Some(finally) = finally {
                nested(&finally.stmts, locals);
            }
        }
        StmtKind::Synchronized { body, .. } => nested(&body.stmts, locals),
        StmtKind::Expr(_)
        | StmtKind::Return(_)
        | StmtKind::Throw(_)
        | StmtKind::Break(_)
        | StmtKind::Continue(_)
        | StmtKind::Yield(_)
        | StmtKind::LocalClass(_)
        | StmtKind::Assert { .. }
        | StmtKind::Empty => {}
    }
}
