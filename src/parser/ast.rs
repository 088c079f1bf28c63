//! Owned syntax tree produced by the Java front end.
//!
//! The tree keeps only what the API checks need: declarations with their
//! annotations and supertypes, statements with their control structure, and
//! expressions with source spans. Generic arguments and array dimensions are
//! stripped from type references.

use std::fmt;
use std::path::PathBuf;

/// A source range. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One parsed `.java` file
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub path: PathBuf,
    pub package: Option<String>,
    pub imports: Vec<Import>,
    pub types: Vec<TypeDecl>,
    /// Location of the first syntax error, if the file did not parse cleanly
    pub syntax_error: Option<Span>,
}

impl CompilationUnit {
    /// Visit every type declaration in the unit, including member, local and
    /// anonymous classes, in source order.
    pub fn for_each_type<'a>(&'a self, f: &mut dyn FnMut(&'a TypeDecl)) {
        for decl in &self.types {
            decl.walk_types(f);
        }
    }

    /// Total number of methods and constructors, including nested types
    pub fn method_count(&self) -> usize {
        let mut count = 0;
        self.for_each_type(&mut |decl| {
            count += decl.methods().count();
        });
        count
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Dotted path without the trailing `.*`
    pub path: String,
    pub is_static: bool,
    pub on_demand: bool,
}

impl Import {
    /// Last segment of the imported path (`View` for `android.view.View`)
    pub fn simple_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Record,
    AnnotationType,
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    /// Simple name, empty for anonymous classes
    pub name: String,
    /// Binary-style qualified name: `pkg.Outer.Inner`, `pkg.Outer$1`
    pub qualified_name: String,
    pub kind: TypeKind,
    pub annotations: Vec<Annotation>,
    pub super_class: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub members: Vec<Member>,
    pub span: Span,
}

impl TypeDecl {
    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Method(method) => Some(method),
            _ => None,
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Field(field) => Some(field),
            _ => None,
        })
    }

    /// Whether this declaration declares a method `name` taking `arity` arguments
    pub fn declares_method(&self, name: &str, arity: Option<usize>) -> bool {
        self.methods().any(|m| {
            !m.is_constructor && m.name == name && arity.map_or(true, |a| m.accepts_arity(a))
        })
    }

    /// All supertypes as written: superclass first, then interfaces
    pub fn supertypes(&self) -> impl Iterator<Item = &TypeRef> {
        self.super_class.iter().chain(self.interfaces.iter())
    }

    fn walk_types<'a>(&'a self, f: &mut dyn FnMut(&'a TypeDecl)) {
        f(self);
        for member in &self.members {
            member.walk_types(f);
        }
    }
}

#[derive(Debug, Clone)]
pub enum Member {
    Method(MethodDecl),
    Field(FieldDecl),
    Type(TypeDecl),
    Initializer { is_static: bool, body: Block },
    EnumConstant(EnumConstant),
}

impl Member {
    fn walk_types<'a>(&'a self, f: &mut dyn FnMut(&'a TypeDecl)) {
        match self {
            Member::Type(decl) => decl.walk_types(f),
            Member::Method(method) => {
                if let Some(body) = &method.body {
                    body.walk_types(f);
                }
            }
            Member::Field(field) => {
                if let Some(init) = &field.initializer {
                    init.walk_types(f);
                }
            }
            Member::Initializer { body, .. } => body.walk_types(f),
            Member::EnumConstant(constant) => {
                for arg in &constant.args {
                    arg.walk_types(f);
                }
                if let Some(body) = &constant.body {
                    body.walk_types(f);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub is_constructor: bool,
    pub is_static: bool,
    pub annotations: Vec<Annotation>,
    pub params: Vec<Param>,
    pub is_varargs: bool,
    pub return_type: Option<TypeRef>,
    pub throws: Vec<TypeRef>,
    pub body: Option<Block>,
    pub span: Span,
    /// Span of the declared name
    pub name_span: Span,
}

impl MethodDecl {
    pub fn accepts_arity(&self, arity: usize) -> bool {
        if self.is_varargs {
            arity + 1 >= self.params.len()
        } else {
            arity == self.params.len()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeRef>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    pub is_static: bool,
    pub is_final: bool,
    pub is_private: bool,
    pub annotations: Vec<Annotation>,
    pub initializer: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumConstant {
    pub name: String,
    pub annotations: Vec<Annotation>,
    pub args: Vec<Expr>,
    pub body: Option<TypeDecl>,
    pub span: Span,
}

/// A type as written in source, with generics and array dimensions removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub span: Span,
}

impl TypeRef {
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.name.as_str(),
            "int" | "long" | "short" | "byte" | "char" | "boolean" | "float" | "double" | "void"
        )
    }

    /// `var` in local declarations
    pub fn is_inferred(&self) -> bool {
        self.name == "var"
    }
}

#[derive(Debug, Clone)]
pub struct Annotation {
    /// Name as written, possibly qualified
    pub name: String,
    pub args: Vec<AnnotationArg>,
    pub span: Span,
}

impl Annotation {
    /// Simple name (`RequiresApi` for `androidx.annotation.RequiresApi`)
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Argument by key; a lone unnamed argument is keyed `value`
    pub fn arg(&self, key: &str) -> Option<&Expr> {
        self.args.iter().find(|a| a.key == key).map(|a| &a.value)
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationArg {
    pub key: String,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    fn walk_types<'a>(&'a self, f: &mut dyn FnMut(&'a TypeDecl)) {
        for stmt in &self.stmts {
            stmt.walk_types(f);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct LocalVar {
    pub name: String,
    pub ty: TypeRef,
    pub is_final: bool,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Block),
    Local(Vec<LocalVar>),
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Vec<Stmt>,
        cond: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },
    ForEach {
        var: LocalVar,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
    },
    Try {
        /// Resource declarations of a try-with-resources statement
        resources: Vec<Stmt>,
        with_resources: bool,
        body: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    Return(Option<Expr>),
    Throw(Expr),
    Break(Option<String>),
    Continue(Option<String>),
    Yield(Expr),
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Synchronized {
        lock: Expr,
        body: Block,
    },
    LocalClass(TypeDecl),
    Assert {
        cond: Expr,
        message: Option<Expr>,
    },
    Empty,
}

impl Stmt {
    fn walk_types<'a>(&'a self, f: &mut dyn FnMut(&'a TypeDecl)) {
        match &self.kind {
            StmtKind::Block(block) => block.walk_types(f),
            StmtKind::Local(vars) => {
                for var in vars {
                    if let Some(init) = &var.init {
                        init.walk_types(f);
                    }
                }
            }
            StmtKind::Expr(e) | StmtKind::Throw(e) | StmtKind::Yield(e) => e.walk_types(f),
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    e.walk_types(f);
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.walk_types(f);
                then_branch.walk_types(f);
                if let Some(other) = else_branch {
                    other.walk_types(f);
                }
            }
            StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
                cond.walk_types(f);
                body.walk_types(f);
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                for s in init {
                    s.walk_types(f);
                }
                if let Some(c) = cond {
                    c.walk_types(f);
                }
                for u in update {
                    u.walk_types(f);
                }
                body.walk_types(f);
            }
            StmtKind::ForEach { iterable, body, .. } => {
                iterable.walk_types(f);
                body.walk_types(f);
            }
            StmtKind::Switch { selector, cases } => {
                selector.walk_types(f);
                for case in cases {
                    for s in &case.body {
                        s.walk_types(f);
                    }
                }
            }
            StmtKind::Try {
                resources,
                body,
                catches,
                finally,
                ..
            } => {
                for r in resources {
                    r.walk_types(f);
                }
                body.walk_types(f);
                for c in catches {
                    c.body.walk_types(f);
                }
                if let Some(fin) = finally {
                    fin.walk_types(f);
                }
            }
            StmtKind::Labeled { body, .. } => body.walk_types(f),
            StmtKind::Synchronized { lock, body } => {
                lock.walk_types(f);
                body.walk_types(f);
            }
            StmtKind::LocalClass(decl) => decl.walk_types(f),
            StmtKind::Assert { cond, message } => {
                cond.walk_types(f);
                if let Some(m) = message {
                    m.walk_types(f);
                }
            }
            StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Empty => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Case label expressions; empty for `default`
    pub labels: Vec<Expr>,
    pub is_default: bool,
    /// `case X ->` form, which never falls through
    pub is_rule: bool,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub types: Vec<TypeRef>,
    pub name: String,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Other,
}

impl BinaryOp {
    pub fn from_token(token: &str) -> Self {
        match token {
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => BinaryOp::Other,
        }
    }

    /// The comparison with operands swapped (`a < b` is `b > a`)
    pub fn flipped(self) -> Self {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(String),
    Str(String),
    Null,
}

#[derive(Debug, Clone)]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Block),
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Name(String),
    FieldAccess {
        target: Box<Expr>,
        name: String,
    },
    /// Method call; `name` is `<init>` for `this(..)`/`super(..)` constructor calls
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    New {
        ty: TypeRef,
        args: Vec<Expr>,
        body: Option<Box<TypeDecl>>,
    },
    NewArray {
        ty: TypeRef,
        dims: Vec<Expr>,
        init: Vec<Expr>,
    },
    ArrayInit(Vec<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Cast {
        ty: TypeRef,
        expr: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    Lambda {
        params: Vec<Param>,
        body: LambdaBody,
    },
    MethodRef {
        target: Box<Expr>,
        name: String,
    },
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Switch {
        selector: Box<Expr>,
        cases: Vec<SwitchCase>,
    },
    Literal(Literal),
    ClassLit(TypeRef),
    This,
    Super,
    /// Syntax the front end does not model; children are still visited
    Unknown(Vec<Expr>),
}

impl Expr {
    /// Dotted text of a name chain (`Build.VERSION.SDK_INT`), if this is one
    pub fn dotted_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(name) => Some(name.clone()),
            ExprKind::FieldAccess { target, name } => {
                target.dotted_name().map(|prefix| format!("{}.{}", prefix, name))
            }
            _ => None,
        }
    }

    /// Last identifier of a name chain
    pub fn last_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            ExprKind::FieldAccess { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn int_literal(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Literal(Literal::Int(v)) => Some(*v),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => operand.int_literal().map(|v| -v),
            _ => None,
        }
    }

    pub fn string_literal(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Literal(Literal::Str(s)) => Some(s),
            _ => None,
        }
    }

    fn walk_types<'a>(&'a self, f: &mut dyn FnMut(&'a TypeDecl)) {
        match &self.kind {
            ExprKind::New { args, body, .. } => {
                for a in args {
                    a.walk_types(f);
                }
                if let Some(decl) = body {
                    decl.walk_types(f);
                }
            }
            ExprKind::Lambda { body, .. } => match body {
                LambdaBody::Expr(e) => e.walk_types(f),
                LambdaBody::Block(b) => b.walk_types(f),
            },
            ExprKind::Switch { selector, cases } => {
                selector.walk_types(f);
                for case in cases {
                    for s in &case.body {
                        s.walk_types(f);
                    }
                }
            }
            _ => {
                for child in self.children() {
                    child.walk_types(f);
                }
            }
        }
    }

    /// Direct subexpressions in evaluation order. Lambda bodies, anonymous
    /// class bodies and switch case bodies are not included.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::FieldAccess { target, .. } => vec![target.as_ref()],
            ExprKind::Call { target, args, .. } => {
                target.iter().map(|t| t.as_ref()).chain(args.iter()).collect()
            }
            ExprKind::New { args, .. } => args.iter().collect(),
            ExprKind::NewArray { dims, init, .. } => dims.iter().chain(init.iter()).collect(),
            ExprKind::ArrayInit(items) | ExprKind::Unknown(items) => items.iter().collect(),
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            ExprKind::Unary { operand, .. } => vec![operand.as_ref()],
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => vec![cond.as_ref(), then_expr.as_ref(), else_expr.as_ref()],
            ExprKind::Assign { target, value } => vec![target.as_ref(), value.as_ref()],
            ExprKind::Cast { expr, .. } | ExprKind::InstanceOf { expr, .. } => vec![expr.as_ref()],
            ExprKind::MethodRef { target, .. } => vec![target.as_ref()],
            ExprKind::ArrayAccess { array, index } => vec![array.as_ref(), index.as_ref()],
            ExprKind::Switch { selector, .. } => vec![selector.as_ref()],
            ExprKind::Name(_)
            | ExprKind::Lambda { .. }
            | ExprKind::Literal(_)
            | ExprKind::ClassLit(_)
            | ExprKind::This
            | ExprKind::Super => Vec::new(),
        }
    }
}
