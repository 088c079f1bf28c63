// Java front end: lowers the tree-sitter syntax tree into the owned AST

use super::ast::*;
use super::common::{
    children_of_kind, field_nodes, first_error, named_children, node_text, normalize_type_text,
    span_of, Parser,
};
use miette::{IntoDiagnostic, Result};
use std::path::Path;
use tracing::debug;
use tree_sitter::{Node, Parser as TsParser};

/// Java source code parser using tree-sitter
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaParser;

impl JavaParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for JavaParser {
    fn parse(&self, path: &Path, contents: &str) -> Result<CompilationUnit> {
        let mut parser = TsParser::new();
        parser
            .set_language(&tree_sitter_java::language())
            .into_diagnostic()?;

        let tree = parser
            .parse(contents, None)
            .ok_or_else(|| miette::miette!("Failed to parse Java file"))?;

        let root = tree.root_node();
        let mut lowering = Lowering::new(contents);

        let package = lowering.package(root);
        lowering.package = package.clone();
        let imports = lowering.imports(root);
        let types = lowering.top_level_types(root);

        let unit = CompilationUnit {
            path: path.to_path_buf(),
            package,
            imports,
            types,
            syntax_error: first_error(root).map(span_of),
        };

        debug!(
            "Parsed {}: {} types, {} methods",
            path.display(),
            unit.types.len(),
            unit.method_count()
        );

        Ok(unit)
    }
}

/// Lexically enclosing class used to name local and anonymous classes
struct ClassScope {
    qualified: String,
    next_index: u32,
}

#[derive(Default)]
struct Modifiers {
    annotations: Vec<Annotation>,
    is_static: bool,
    is_final: bool,
    is_private: bool,
}

struct Lowering<'s> {
    source: &'s str,
    package: Option<String>,
    scopes: Vec<ClassScope>,
}

impl<'s> Lowering<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            package: None,
            scopes: Vec::new(),
        }
    }

    fn text(&self, node: Node) -> &'s str {
        node_text(node, self.source)
    }

    fn package(&self, root: Node) -> Option<String> {
        children_of_kind(root, "package_declaration")
            .into_iter()
            .next()
            .and_then(|decl| {
                named_children(decl)
                    .into_iter()
                    .find(|n| n.kind() == "scoped_identifier" || n.kind() == "identifier")
            })
            .map(|name| self.text(name).to_string())
    }

    fn imports(&self, root: Node) -> Vec<Import> {
        let mut imports = Vec::new();

        for decl in children_of_kind(root, "import_declaration") {
            let mut cursor = decl.walk();
            let is_static = decl.children(&mut cursor).any(|c| c.kind() == "static");
            let on_demand = !children_of_kind(decl, "asterisk").is_empty();

            let name = named_children(decl)
                .into_iter()
                .find(|n| n.kind() == "scoped_identifier" || n.kind() == "identifier");

            if let Some(name) = name {
                imports.push(Import {
                    path: self.text(name).to_string(),
                    is_static,
                    on_demand,
                });
            }
        }

        imports
    }

    fn top_level_types(&mut self, root: Node) -> Vec<TypeDecl> {
        let mut types = Vec::new();
        for child in named_children(root) {
            if is_type_declaration(child.kind()) {
                let name = self.declared_name(child);
                let qualified = match &self.package {
                    Some(pkg) => format!("{}.{}", pkg, name),
                    None => name.to_string(),
                };
                types.push(self.type_decl(child, qualified));
            }
        }
        types
    }

    fn declared_name(&self, node: Node) -> &'s str {
        node.child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or("")
    }

    fn type_decl(&mut self, node: Node, qualified_name: String) -> TypeDecl {
        let kind = match node.kind() {
            "interface_declaration" => TypeKind::Interface,
            "enum_declaration" => TypeKind::Enum,
            "record_declaration" => TypeKind::Record,
            "annotation_type_declaration" => TypeKind::AnnotationType,
            _ => TypeKind::Class,
        };

        let name = self.declared_name(node).to_string();
        let modifiers = self.modifiers(node);

        let super_class = node
            .child_by_field_name("superclass")
            .and_then(|sc| named_children(sc).into_iter().next())
            .map(|t| self.type_ref(t));

        let mut interfaces = Vec::new();
        for child in named_children(node) {
            if child.kind() == "super_interfaces" || child.kind() == "extends_interfaces" {
                for list in children_of_kind(child, "type_list") {
                    for ty in named_children(list) {
                        interfaces.push(self.type_ref(ty));
                    }
                }
            }
        }

        self.scopes.push(ClassScope {
            qualified: qualified_name.clone(),
            next_index: 0,
        });
        let members = node
            .child_by_field_name("body")
            .map(|body| self.members(body))
            .unwrap_or_default();
        self.scopes.pop();

        TypeDecl {
            name,
            qualified_name,
            kind,
            annotations: modifiers.annotations,
            super_class,
            interfaces,
            members,
            span: span_of(node),
        }
    }

    /// Anonymous class body of `new T() { ... }` or of an enum constant
    fn anonymous_class(&mut self, body: Node, super_type: TypeRef) -> TypeDecl {
        let qualified_name = self.next_nested_name("");
        self.scopes.push(ClassScope {
            qualified: qualified_name.clone(),
            next_index: 0,
        });
        let members = self.members(body);
        self.scopes.pop();

        TypeDecl {
            name: String::new(),
            qualified_name,
            kind: TypeKind::Anonymous,
            annotations: Vec::new(),
            super_class: Some(super_type),
            interfaces: Vec::new(),
            members,
            span: span_of(body),
        }
    }

    /// `Outer$1` for anonymous classes, `Outer$1Local` for local classes
    fn next_nested_name(&mut self, simple: &str) -> String {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.next_index += 1;
                format!("{}${}{}", scope.qualified, scope.next_index, simple)
            }
            None => format!("${}", simple),
        }
    }

    fn current_class(&self) -> String {
        self.scopes
            .last()
            .map(|s| s.qualified.clone())
            .unwrap_or_default()
    }

    fn members(&mut self, body: Node) -> Vec<Member> {
        let mut members = Vec::new();

        for child in named_children(body) {
            match child.kind() {
                "field_declaration" | "constant_declaration" => {
                    members.extend(self.fields(child).into_iter().map(Member::Field));
                }
                "method_declaration"
                | "constructor_declaration"
                | "compact_constructor_declaration"
                | "annotation_type_element_declaration" => {
                    members.push(Member::Method(self.method(child)));
                }
                kind if is_type_declaration(kind) => {
                    let qualified = format!("{}.{}", self.current_class(), self.declared_name(child));
                    members.push(Member::Type(self.type_decl(child, qualified)));
                }
                "static_initializer" => {
                    if let Some(block) = children_of_kind(child, "block").into_iter().next() {
                        members.push(Member::Initializer {
                            is_static: true,
                            body: self.block(block),
                        });
                    }
                }
                "block" => {
                    members.push(Member::Initializer {
                        is_static: false,
                        body: self.block(child),
                    });
                }
                "enum_constant" => {
                    members.push(Member::EnumConstant(self.enum_constant(child)));
                }
                "enum_body_declarations" => {
                    members.extend(self.members(child));
                }
                _ => {}
            }
        }

        members
    }

    fn enum_constant(&mut self, node: Node) -> EnumConstant {
        let name = self.declared_name(node).to_string();
        let modifiers = self.modifiers(node);
        let args = node
            .child_by_field_name("arguments")
            .map(|a| self.arguments(a))
            .unwrap_or_default();

        let enum_name = self
            .current_class()
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_string();
        let body = node.child_by_field_name("body").map(|body| {
            let super_type = TypeRef {
                name: enum_name,
                span: span_of(node),
            };
            self.anonymous_class(body, super_type)
        });

        EnumConstant {
            name,
            annotations: modifiers.annotations,
            args,
            body,
            span: span_of(node),
        }
    }

    fn modifiers(&mut self, node: Node) -> Modifiers {
        let mut result = Modifiers::default();

        for mods in children_of_kind(node, "modifiers") {
            let mut cursor = mods.walk();
            for modifier in mods.children(&mut cursor) {
                match modifier.kind() {
                    "annotation" | "marker_annotation" => {
                        result.annotations.push(self.annotation(modifier));
                    }
                    "static" => result.is_static = true,
                    "final" => result.is_final = true,
                    "private" => result.is_private = true,
                    _ => {}
                }
            }
        }

        result
    }

    fn annotation(&mut self, node: Node) -> Annotation {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();

        let mut args = Vec::new();
        if let Some(list) = node.child_by_field_name("arguments") {
            for arg in named_children(list) {
                if arg.kind() == "element_value_pair" {
                    let key = arg
                        .child_by_field_name("key")
                        .map(|k| self.text(k).to_string())
                        .unwrap_or_default();
                    if let Some(value) = arg.child_by_field_name("value") {
                        args.push(AnnotationArg {
                            key,
                            value: self.element_value(value),
                        });
                    }
                } else {
                    args.push(AnnotationArg {
                        key: "value".to_string(),
                        value: self.element_value(arg),
                    });
                }
            }
        }

        Annotation {
            name,
            args,
            span: span_of(node),
        }
    }

    fn element_value(&mut self, node: Node) -> Expr {
        match node.kind() {
            "element_value_array_initializer" => Expr {
                kind: ExprKind::ArrayInit(
                    named_children(node)
                        .into_iter()
                        .map(|v| self.element_value(v))
                        .collect(),
                ),
                span: span_of(node),
            },
            "annotation" | "marker_annotation" => Expr {
                kind: ExprKind::Unknown(Vec::new()),
                span: span_of(node),
            },
            _ => self.expr(node),
        }
    }

    fn method(&mut self, node: Node) -> MethodDecl {
        let is_constructor = matches!(
            node.kind(),
            "constructor_declaration" | "compact_constructor_declaration"
        );
        let modifiers = self.modifiers(node);
        let name = if is_constructor {
            "<init>".to_string()
        } else {
            self.declared_name(node).to_string()
        };

        let (params, is_varargs) = node
            .child_by_field_name("parameters")
            .map(|p| self.params(p))
            .unwrap_or_default();

        let return_type = if is_constructor {
            None
        } else {
            node.child_by_field_name("type").map(|t| self.type_ref(t))
        };

        let throws: Vec<TypeRef> = children_of_kind(node, "throws")
            .into_iter()
            .flat_map(named_children)
            .map(|t| self.type_ref(t))
            .collect();

        let body = node.child_by_field_name("body").map(|b| self.block(b));

        MethodDecl {
            name,
            is_constructor,
            is_static: modifiers.is_static,
            annotations: modifiers.annotations,
            params,
            is_varargs,
            return_type,
            throws,
            body,
            span: span_of(node),
            name_span: node
                .child_by_field_name("name")
                .map(span_of)
                .unwrap_or_else(|| span_of(node)),
        }
    }

    fn params(&self, node: Node) -> (Vec<Param>, bool) {
        let mut params = Vec::new();
        let mut is_varargs = false;

        for child in named_children(node) {
            match child.kind() {
                "formal_parameter" => params.push(Param {
                    name: child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default(),
                    ty: child.child_by_field_name("type").map(|t| self.type_ref(t)),
                }),
                "spread_parameter" => {
                    is_varargs = true;
                    let children = named_children(child);
                    let ty = children
                        .iter()
                        .find(|n| n.kind() != "modifiers" && n.kind() != "variable_declarator")
                        .map(|t| self.type_ref(*t));
                    let name = children
                        .iter()
                        .find(|n| n.kind() == "variable_declarator")
                        .and_then(|d| d.child_by_field_name("name"))
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    params.push(Param { name, ty });
                }
                "identifier" => params.push(Param {
                    name: self.text(child).to_string(),
                    ty: None,
                }),
                _ => {}
            }
        }

        (params, is_varargs)
    }

    fn fields(&mut self, node: Node) -> Vec<FieldDecl> {
        let modifiers = self.modifiers(node);
        let Some(ty_node) = node.child_by_field_name("type") else {
            return Vec::new();
        };
        let ty = self.type_ref(ty_node);

        let mut fields = Vec::new();
        for declarator in field_nodes(node, "declarator") {
            let name = self.declared_name(declarator).to_string();
            let initializer = declarator
                .child_by_field_name("value")
                .map(|v| self.expr(v));
            fields.push(FieldDecl {
                name,
                ty: ty.clone(),
                is_static: modifiers.is_static,
                is_final: modifiers.is_final,
                is_private: modifiers.is_private,
                annotations: modifiers.annotations.clone(),
                initializer,
                span: span_of(declarator),
            });
        }
        fields
    }

    fn type_ref(&self, node: Node) -> TypeRef {
        TypeRef {
            name: normalize_type_text(self.text(node)),
            span: span_of(node),
        }
    }

    // ==================== Statements ====================

    fn block(&mut self, node: Node) -> Block {
        Block {
            stmts: named_children(node)
                .into_iter()
                .filter_map(|s| self.stmt(s))
                .collect(),
            span: span_of(node),
        }
    }

    /// Statement in a position that requires one (loop and branch bodies)
    fn body(&mut self, node: Option<Node>, parent: Node) -> Box<Stmt> {
        let stmt = node.and_then(|n| self.stmt(n)).unwrap_or(Stmt {
            kind: StmtKind::Empty,
            span: span_of(parent),
        });
        Box::new(stmt)
    }

    fn local_vars(&mut self, node: Node) -> Vec<LocalVar> {
        let modifiers = self.modifiers(node);
        let Some(ty_node) = node.child_by_field_name("type") else {
            return Vec::new();
        };
        let ty = self.type_ref(ty_node);

        field_nodes(node, "declarator")
            .into_iter()
            .map(|declarator| LocalVar {
                name: self.declared_name(declarator).to_string(),
                ty: ty.clone(),
                is_final: modifiers.is_final,
                init: declarator.child_by_field_name("value").map(|v| self.expr(v)),
                span: span_of(declarator),
            })
            .collect()
    }

    fn stmt(&mut self, node: Node) -> Option<Stmt> {
        let span = span_of(node);

        let kind = match node.kind() {
            "block" | "constructor_body" => StmtKind::Block(self.block(node)),
            "local_variable_declaration" => StmtKind::Local(self.local_vars(node)),
            "expression_statement" => {
                let inner = named_children(node).into_iter().next()?;
                StmtKind::Expr(self.expr(inner))
            }
            "explicit_constructor_invocation" => StmtKind::Expr(self.constructor_call(node)),
            "if_statement" => StmtKind::If {
                cond: self.required_expr(node.child_by_field_name("condition"), node),
                then_branch: self.body(node.child_by_field_name("consequence"), node),
                else_branch: node
                    .child_by_field_name("alternative")
                    .and_then(|alt| self.stmt(alt))
                    .map(Box::new),
            },
            "while_statement" => StmtKind::While {
                cond: self.required_expr(node.child_by_field_name("condition"), node),
                body: self.body(node.child_by_field_name("body"), node),
            },
            "do_statement" => StmtKind::DoWhile {
                body: self.body(node.child_by_field_name("body"), node),
                cond: self.required_expr(node.child_by_field_name("condition"), node),
            },
            "for_statement" => {
                let init = field_nodes(node, "init")
                    .into_iter()
                    .filter_map(|i| {
                        if i.kind() == "local_variable_declaration" {
                            self.stmt(i)
                        } else {
                            Some(Stmt {
                                kind: StmtKind::Expr(self.expr(i)),
                                span: span_of(i),
                            })
                        }
                    })
                    .collect();
                StmtKind::For {
                    init,
                    cond: node.child_by_field_name("condition").map(|c| self.expr(c)),
                    update: field_nodes(node, "update")
                        .into_iter()
                        .map(|u| self.expr(u))
                        .collect(),
                    body: self.body(node.child_by_field_name("body"), node),
                }
            }
            "enhanced_for_statement" => {
                let modifiers = self.modifiers(node);
                let var = LocalVar {
                    name: self.declared_name(node).to_string(),
                    ty: node
                        .child_by_field_name("type")
                        .map(|t| self.type_ref(t))
                        .unwrap_or(TypeRef {
                            name: "var".to_string(),
                            span,
                        }),
                    is_final: modifiers.is_final,
                    init: None,
                    span,
                };
                StmtKind::ForEach {
                    var,
                    iterable: self.required_expr(node.child_by_field_name("value"), node),
                    body: self.body(node.child_by_field_name("body"), node),
                }
            }
            "switch_expression" | "switch_statement" => {
                let (selector, cases) = self.switch_parts(node);
                StmtKind::Switch { selector, cases }
            }
            "try_statement" | "try_with_resources_statement" => {
                let with_resources = node.kind() == "try_with_resources_statement";
                let resources = node
                    .child_by_field_name("resources")
                    .map(|r| self.resources(r))
                    .unwrap_or_default();
                let body = node
                    .child_by_field_name("body")
                    .map(|b| self.block(b))
                    .unwrap_or(Block {
                        stmts: Vec::new(),
                        span,
                    });
                let catches = children_of_kind(node, "catch_clause")
                    .into_iter()
                    .map(|c| self.catch_clause(c))
                    .collect();
                let finally = children_of_kind(node, "finally_clause")
                    .into_iter()
                    .next()
                    .and_then(|f| children_of_kind(f, "block").into_iter().next())
                    .map(|b| self.block(b));
                StmtKind::Try {
                    resources,
                    with_resources,
                    body,
                    catches,
                    finally,
                }
            }
            "return_statement" => {
                StmtKind::Return(named_children(node).into_iter().next().map(|e| self.expr(e)))
            }
            "throw_statement" => {
                let inner = named_children(node).into_iter().next()?;
                StmtKind::Throw(self.expr(inner))
            }
            "yield_statement" => {
                let inner = named_children(node).into_iter().next()?;
                StmtKind::Yield(self.expr(inner))
            }
            "break_statement" => StmtKind::Break(self.label(node)),
            "continue_statement" => StmtKind::Continue(self.label(node)),
            "labeled_statement" => {
                let children = named_children(node);
                let label = children.first().map(|l| self.text(*l).to_string())?;
                StmtKind::Labeled {
                    label,
                    body: self.body(children.last().copied(), node),
                }
            }
            "synchronized_statement" => {
                let lock = children_of_kind(node, "parenthesized_expression")
                    .into_iter()
                    .next();
                StmtKind::Synchronized {
                    lock: self.required_expr(lock, node),
                    body: node
                        .child_by_field_name("body")
                        .map(|b| self.block(b))
                        .unwrap_or(Block {
                            stmts: Vec::new(),
                            span,
                        }),
                }
            }
            kind if is_type_declaration(kind) => {
                let qualified = self.next_nested_name(self.declared_name(node));
                StmtKind::LocalClass(self.type_decl(node, qualified))
            }
            "assert_statement" => {
                let mut exprs = named_children(node).into_iter().map(|e| self.expr(e));
                let cond = exprs.next()?;
                StmtKind::Assert {
                    cond,
                    message: exprs.next(),
                }
            }
            _ => StmtKind::Empty,
        };

        Some(Stmt { kind, span })
    }

    fn label(&self, node: Node) -> Option<String> {
        children_of_kind(node, "identifier")
            .into_iter()
            .next()
            .map(|l| self.text(l).to_string())
    }

    fn resources(&mut self, node: Node) -> Vec<Stmt> {
        children_of_kind(node, "resource")
            .into_iter()
            .filter_map(|resource| {
                let span = span_of(resource);
                if let Some(value) = resource.child_by_field_name("value") {
                    let ty = resource
                        .child_by_field_name("type")
                        .map(|t| self.type_ref(t))?;
                    Some(Stmt {
                        kind: StmtKind::Local(vec![LocalVar {
                            name: self.declared_name(resource).to_string(),
                            ty,
                            is_final: true,
                            init: Some(self.expr(value)),
                            span,
                        }]),
                        span,
                    })
                } else {
                    let inner = named_children(resource).into_iter().next()?;
                    Some(Stmt {
                        kind: StmtKind::Expr(self.expr(inner)),
                        span,
                    })
                }
            })
            .collect()
    }

    fn catch_clause(&mut self, node: Node) -> CatchClause {
        let param = children_of_kind(node, "catch_formal_parameter")
            .into_iter()
            .next();

        let types: Vec<TypeRef> = param
            .map(|p| {
                children_of_kind(p, "catch_type")
                    .into_iter()
                    .flat_map(named_children)
                    .map(|t| self.type_ref(t))
                    .collect()
            })
            .unwrap_or_default();

        let name = param
            .and_then(|p| p.child_by_field_name("name"))
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();

        let body = node
            .child_by_field_name("body")
            .map(|b| self.block(b))
            .unwrap_or(Block {
                stmts: Vec::new(),
                span: span_of(node),
            });

        CatchClause {
            types,
            name,
            body,
            span: span_of(node),
        }
    }

    fn switch_parts(&mut self, node: Node) -> (Expr, Vec<SwitchCase>) {
        let selector = self.required_expr(node.child_by_field_name("condition"), node);

        let mut cases = Vec::new();
        if let Some(block) = node.child_by_field_name("body") {
            for group in named_children(block) {
                let is_rule = match group.kind() {
                    "switch_block_statement_group" => false,
                    "switch_rule" => true,
                    _ => continue,
                };

                let mut case = SwitchCase {
                    labels: Vec::new(),
                    is_default: false,
                    is_rule,
                    body: Vec::new(),
                    span: span_of(group),
                };

                for child in named_children(group) {
                    if child.kind() == "switch_label" {
                        if self.text(child).trim_start().starts_with("default") {
                            case.is_default = true;
                        }
                        for label in named_children(child) {
                            case.labels.push(self.expr(label));
                        }
                    } else if let Some(stmt) = self.stmt(child) {
                        case.body.push(stmt);
                    }
                }

                cases.push(case);
            }
        }

        (selector, cases)
    }

    // ==================== Expressions ====================

    fn required_expr(&mut self, node: Option<Node>, parent: Node) -> Expr {
        match node {
            Some(n) => self.expr(n),
            None => Expr {
                kind: ExprKind::Unknown(Vec::new()),
                span: span_of(parent),
            },
        }
    }

    fn arguments(&mut self, node: Node) -> Vec<Expr> {
        named_children(node)
            .into_iter()
            .map(|a| self.expr(a))
            .collect()
    }

    fn boxed(&mut self, node: Option<Node>, parent: Node) -> Box<Expr> {
        Box::new(self.required_expr(node, parent))
    }

    fn constructor_call(&mut self, node: Node) -> Expr {
        let target = node.child_by_field_name("constructor").map(|c| {
            let kind = if c.kind() == "super" {
                ExprKind::Super
            } else {
                ExprKind::This
            };
            Box::new(Expr {
                kind,
                span: span_of(c),
            })
        });
        let args = node
            .child_by_field_name("arguments")
            .map(|a| self.arguments(a))
            .unwrap_or_default();

        Expr {
            kind: ExprKind::Call {
                target,
                name: "<init>".to_string(),
                args,
            },
            span: span_of(node),
        }
    }

    /// Build a `Name`/`FieldAccess` chain from dotted text
    fn name_chain(&self, text: &str, span: Span) -> ExprKind {
        let mut parts = text.split('.');
        let first = parts.next().unwrap_or_default();
        let mut expr = Expr {
            kind: ExprKind::Name(first.to_string()),
            span,
        };
        for part in parts {
            expr = Expr {
                kind: ExprKind::FieldAccess {
                    target: Box::new(expr),
                    name: part.to_string(),
                },
                span,
            };
        }
        expr.kind
    }

    fn expr(&mut self, node: Node) -> Expr {
        let span = span_of(node);

        let kind = match node.kind() {
            "identifier" => ExprKind::Name(self.text(node).to_string()),
            "type_identifier" | "scoped_type_identifier" | "generic_type" | "scoped_identifier" => {
                self.name_chain(&normalize_type_text(self.text(node)), span)
            }
            "parenthesized_expression" => {
                return match named_children(node).into_iter().next() {
                    Some(inner) => self.expr(inner),
                    None => Expr {
                        kind: ExprKind::Unknown(Vec::new()),
                        span,
                    },
                };
            }
            "field_access" => ExprKind::FieldAccess {
                target: self.boxed(node.child_by_field_name("object"), node),
                name: node
                    .child_by_field_name("field")
                    .map(|f| self.text(f).to_string())
                    .unwrap_or_default(),
            },
            "method_invocation" => ExprKind::Call {
                target: node
                    .child_by_field_name("object")
                    .map(|o| Box::new(self.expr(o))),
                name: node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default(),
                args: node
                    .child_by_field_name("arguments")
                    .map(|a| self.arguments(a))
                    .unwrap_or_default(),
            },
            "object_creation_expression" => {
                let ty = match node.child_by_field_name("type") {
                    Some(t) => self.type_ref(t),
                    None => TypeRef {
                        name: String::new(),
                        span,
                    },
                };
                let args = node
                    .child_by_field_name("arguments")
                    .map(|a| self.arguments(a))
                    .unwrap_or_default();
                let body = children_of_kind(node, "class_body")
                    .into_iter()
                    .next()
                    .map(|b| Box::new(self.anonymous_class(b, ty.clone())));
                ExprKind::New { ty, args, body }
            }
            "array_creation_expression" => {
                let ty = match node.child_by_field_name("type") {
                    Some(t) => self.type_ref(t),
                    None => TypeRef {
                        name: String::new(),
                        span,
                    },
                };
                let dims = children_of_kind(node, "dimensions_expr")
                    .into_iter()
                    .filter_map(|d| named_children(d).into_iter().next())
                    .map(|d| self.expr(d))
                    .collect();
                let init = node
                    .child_by_field_name("value")
                    .map(|v| self.arguments(v))
                    .unwrap_or_default();
                ExprKind::NewArray { ty, dims, init }
            }
            "array_initializer" => ExprKind::ArrayInit(self.arguments(node)),
            "binary_expression" => ExprKind::Binary {
                op: node
                    .child_by_field_name("operator")
                    .map(|o| BinaryOp::from_token(o.kind()))
                    .unwrap_or(BinaryOp::Other),
                lhs: self.boxed(node.child_by_field_name("left"), node),
                rhs: self.boxed(node.child_by_field_name("right"), node),
            },
            "unary_expression" => ExprKind::Unary {
                op: match node.child_by_field_name("operator").map(|o| o.kind()) {
                    Some("!") => UnaryOp::Not,
                    Some("-") => UnaryOp::Neg,
                    _ => UnaryOp::Other,
                },
                operand: self.boxed(node.child_by_field_name("operand"), node),
            },
            "update_expression" => ExprKind::Unary {
                op: UnaryOp::Other,
                operand: self.boxed(named_children(node).into_iter().next(), node),
            },
            "ternary_expression" => ExprKind::Conditional {
                cond: self.boxed(node.child_by_field_name("condition"), node),
                then_expr: self.boxed(node.child_by_field_name("consequence"), node),
                else_expr: self.boxed(node.child_by_field_name("alternative"), node),
            },
            "assignment_expression" => ExprKind::Assign {
                target: self.boxed(node.child_by_field_name("left"), node),
                value: self.boxed(node.child_by_field_name("right"), node),
            },
            "cast_expression" => {
                let ty = match node.child_by_field_name("type") {
                    Some(t) => self.type_ref(t),
                    None => TypeRef {
                        name: String::new(),
                        span,
                    },
                };
                ExprKind::Cast {
                    ty,
                    expr: self.boxed(node.child_by_field_name("value"), node),
                }
            }
            "instanceof_expression" => {
                let right = node.child_by_field_name("right").or_else(|| {
                    named_children(node)
                        .into_iter()
                        .skip(1)
                        .find(|n| n.kind() != "identifier")
                });
                let ty = right
                    .map(|r| {
                        // `x instanceof Foo f` patterns wrap the type
                        let inner = if r.kind().ends_with("pattern") {
                            r.child_by_field_name("type")
                                .or_else(|| named_children(r).into_iter().next())
                                .unwrap_or(r)
                        } else {
                            r
                        };
                        self.type_ref(inner)
                    })
                    .unwrap_or(TypeRef {
                        name: String::new(),
                        span,
                    });
                ExprKind::InstanceOf {
                    expr: self.boxed(node.child_by_field_name("left"), node),
                    ty,
                }
            }
            "lambda_expression" => {
                let params = match node.child_by_field_name("parameters") {
                    Some(p) if p.kind() == "identifier" => vec![Param {
                        name: self.text(p).to_string(),
                        ty: None,
                    }],
                    Some(p) => self.params(p).0,
                    None => Vec::new(),
                };
                let body = match node.child_by_field_name("body") {
                    Some(b) if b.kind() == "block" => LambdaBody::Block(self.block(b)),
                    other => LambdaBody::Expr(self.boxed(other, node)),
                };
                ExprKind::Lambda { params, body }
            }
            "method_reference" => {
                let children = named_children(node);
                let target = self.boxed(children.first().copied(), node);
                let name = if self.text(node).trim_end().ends_with("new") {
                    "<init>".to_string()
                } else {
                    children
                        .iter()
                        .skip(1)
                        .filter(|n| n.kind() == "identifier")
                        .last()
                        .map(|n| self.text(*n).to_string())
                        .unwrap_or_default()
                };
                ExprKind::MethodRef { target, name }
            }
            "array_access" => ExprKind::ArrayAccess {
                array: self.boxed(node.child_by_field_name("array"), node),
                index: self.boxed(node.child_by_field_name("index"), node),
            },
            "switch_expression" => {
                let (selector, cases) = self.switch_parts(node);
                ExprKind::Switch {
                    selector: Box::new(selector),
                    cases,
                }
            }
            "decimal_integer_literal"
            | "hex_integer_literal"
            | "octal_integer_literal"
            | "binary_integer_literal" => match parse_int(self.text(node)) {
                Some(v) => ExprKind::Literal(Literal::Int(v)),
                None => ExprKind::Unknown(Vec::new()),
            },
            "decimal_floating_point_literal" | "hex_floating_point_literal" => {
                let text = self.text(node).trim_end_matches(['f', 'F', 'd', 'D']);
                ExprKind::Literal(Literal::Float(text.parse().unwrap_or_default()))
            }
            "true" => ExprKind::Literal(Literal::Bool(true)),
            "false" => ExprKind::Literal(Literal::Bool(false)),
            "character_literal" => ExprKind::Literal(Literal::Char(self.text(node).to_string())),
            "string_literal" | "text_block" => {
                ExprKind::Literal(Literal::Str(self.text(node).trim_matches('"').to_string()))
            }
            "null_literal" => ExprKind::Literal(Literal::Null),
            "class_literal" => match named_children(node).into_iter().next() {
                Some(t) => ExprKind::ClassLit(self.type_ref(t)),
                None => ExprKind::Unknown(Vec::new()),
            },
            "this" => ExprKind::This,
            "super" => ExprKind::Super,
            _ => ExprKind::Unknown(self.arguments(node)),
        };

        Expr { kind, span }
    }
}

fn is_type_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration"
    )
}

/// Parse a Java integer literal (`0x1F`, `017`, `0b101`, `1_000L`)
fn parse_int(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "");
    let digits = cleaned.trim_end_matches(['l', 'L']);

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        i64::from_str_radix(bin, 2).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}
