//! Call-site checks against the guarantees at each reference

use super::annotations::{api_floor, requires_permission, suppressed_categories};
use super::cfg::{Cfg, Event, Nested};
use super::guard::{Guard, GuardRecognizer};
use super::propagation::{propagate, GuaranteeSet};
use super::resolver::{collect_locals, Locals, ResolvedSymbol, Resolver};
use super::{Diagnostic, IssueCategory, Severity};
use crate::baseline::ModuleBaseline;
use crate::graph::{ProjectIndex, TypeScope};
use crate::kb::{KnowledgeBase, PermissionRequirement, Requirement, SymbolDescriptor};
use crate::parser::ast::{
    Annotation, Block, CompilationUnit, Expr, ExprKind, LambdaBody, Member, MethodDecl, Span,
    TypeDecl, TypeKind,
};
use std::collections::BTreeSet;
use tracing::trace;

/// Platform level that introduced try-with-resources
const TRY_WITH_RESOURCES_LEVEL: u32 = 19;

/// Platform level that added the standalone month and weekday pattern letters
const DATE_FORMAT_LEVEL: u32 = 9;

const DATE_FORMAT_CLASS: &str = "java.text.SimpleDateFormat";

/// Level at which dangerous permissions became revocable
const RUNTIME_PERMISSIONS_LEVEL: u32 = 23;

const REVOCABLE_MESSAGE: &str = "Call requires permission which may be rejected by user: code should explicitly check to see if permission is available (with checkPermission) or handle a potential SecurityException";

/// Exception types whose handlers also catch `SecurityException`
const SECURITY_EXCEPTION_HANDLERS: &[&str] =
    &["SecurityException", "RuntimeException", "Exception", "Throwable"];

pub(crate) struct Checker<'a> {
    unit: &'a CompilationUnit,
    kb: &'a KnowledgeBase,
    index: &'a ProjectIndex,
    baseline: &'a ModuleBaseline,
    recognizer: GuardRecognizer,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Checker<'a> {
    pub fn new(
        unit: &'a CompilationUnit,
        kb: &'a KnowledgeBase,
        index: &'a ProjectIndex,
        baseline: &'a ModuleBaseline,
    ) -> Self {
        Self {
            unit,
            kb,
            index,
            baseline,
            recognizer: GuardRecognizer::new(unit),
            diagnostics: Vec::new(),
        }
    }

    pub fn run(mut self) -> Vec<Diagnostic> {
        let unit = self.unit;
        for decl in &unit.types {
            self.check_type(decl, &GuaranteeSet::top(), &Locals::new());
        }
        self.diagnostics
    }

    // ==================== Declarations ====================

    fn check_type(&mut self, decl: &'a TypeDecl, outer: &GuaranteeSet, outer_locals: &Locals) {
        let mut facts = outer.clone();
        seed(&mut facts, &decl.annotations);

        let resolver = Resolver::new(
            self.kb,
            TypeScope::new(self.index, self.unit, &decl.qualified_name),
        );
        let recognizer = self
            .recognizer
            .with_variables(self.recognizer.field_guard_variables(decl));

        // The creation expression already covers an anonymous class's supertype
        if decl.kind != TypeKind::Anonymous {
            for ty in decl.supertypes() {
                if let Some(symbol) = resolver.resolve_type_use(ty) {
                    self.check_symbol(&symbol, ty.span, &facts);
                }
            }
        }

        for member in &decl.members {
            match member {
                Member::Method(method) => {
                    let mut method_facts = facts.clone();
                    seed(&mut method_facts, &method.annotations);
                    for thrown in &method.throws {
                        method_facts.assume(&Guard::TypeExcluded(thrown.name.clone()), true);
                    }
                    if let Some(requirement) = requires_permission(&method.annotations) {
                        method_facts.declare_requirement(requirement);
                    }
                    self.check_override(decl, method, &method_facts);
                    let Some(body) = &method.body else {
                        continue;
                    };
                    let own = collect_locals(&method.params, Some(body));
                    let scoped = scope_recognizer(&recognizer, &own, Some(body));
                    let mut locals = outer_locals.clone();
                    locals.extend(own);
                    let cfg = Cfg::for_block(body, &scoped);
                    self.check_cfg(&cfg, &method_facts, &resolver, &locals, &scoped);
                }
                Member::Field(field) => {
                    let Some(init) = &field.initializer else {
                        continue;
                    };
                    let mut field_facts = facts.clone();
                    seed(&mut field_facts, &field.annotations);
                    let cfg = Cfg::for_exprs(std::iter::once(init), &recognizer);
                    self.check_cfg(&cfg, &field_facts, &resolver, outer_locals, &recognizer);
                }
                Member::Initializer { body, .. } => {
                    let own = collect_locals(&[], Some(body));
                    let scoped = scope_recognizer(&recognizer, &own, Some(body));
                    let mut locals = outer_locals.clone();
                    locals.extend(own);
                    let cfg = Cfg::for_block(body, &scoped);
                    self.check_cfg(&cfg, &facts, &resolver, &locals, &scoped);
                }
                Member::EnumConstant(constant) => {
                    let mut constant_facts = facts.clone();
                    seed(&mut constant_facts, &constant.annotations);
                    let cfg = Cfg::for_exprs(&constant.args, &recognizer);
                    self.check_cfg(&cfg, &constant_facts, &resolver, outer_locals, &recognizer);
                    if let Some(body) = &constant.body {
                        self.check_type(body, &constant_facts, outer_locals);
                    }
                }
                Member::Type(nested) => self.check_type(nested, &facts, &Locals::new()),
            }
        }
    }

    fn check_cfg(
        &mut self,
        cfg: &Cfg<'a>,
        seed: &GuaranteeSet,
        resolver: &Resolver<'_>,
        locals: &Locals,
        recognizer: &GuardRecognizer,
    ) {
        let facts = propagate(cfg, seed);
        for node in cfg.graph.node_indices() {
            for site in &cfg.graph[node].sites {
                let mut site_facts = facts[node.index()].clone();
                for guard in cfg.handler_guards(site.context) {
                    site_facts.assume(guard, true);
                }
                self.check_site(site.event, &site_facts, resolver, locals, recognizer);
            }
        }
    }

    fn check_site(
        &mut self,
        event: Event<'a>,
        facts: &GuaranteeSet,
        resolver: &Resolver<'_>,
        locals: &Locals,
        recognizer: &GuardRecognizer,
    ) {
        let (symbol, span) = match event {
            Event::Reference(expr) => (resolver.resolve_reference(expr, locals), expr.span),
            Event::TypeUse(ty) => (resolver.resolve_type_use(ty), ty.span),
            Event::CaseLabel { label, selector } => {
                (resolver.resolve_case_label(label, selector, locals), label.span)
            }
            Event::TryWithResources(span) => {
                self.check_try_with_resources(span, facts);
                return;
            }
            Event::Nested(nested) => {
                self.check_nested(nested, facts, resolver, locals, recognizer);
                return;
            }
        };
        if let Some(symbol) = symbol {
            trace!("{} at {} resolved to {}", symbol.display, span, symbol.declaring);
            self.check_symbol(&symbol, span, facts);
            if let Event::Reference(expr) = event {
                if symbol.declaring == SymbolDescriptor::constructor(DATE_FORMAT_CLASS) {
                    self.check_date_format(expr, facts);
                }
            }
        }
    }

    /// Lambdas and anonymous or local classes start from the guarantees of
    /// their creation point. Enclosing handlers do not cover code that runs later.
    fn check_nested(
        &mut self,
        nested: Nested<'a>,
        facts: &GuaranteeSet,
        resolver: &Resolver<'_>,
        locals: &Locals,
        recognizer: &GuardRecognizer,
    ) {
        let mut seed = facts.clone();
        seed.excluded.clear();

        match nested {
            Nested::Lambda { params, body } => {
                let block = match body {
                    LambdaBody::Block(block) => Some(block),
                    LambdaBody::Expr(_) => None,
                };
                let own = collect_locals(params, block);
                let scoped = scope_recognizer(recognizer, &own, block);
                let mut scoped_locals = locals.clone();
                scoped_locals.extend(own);
                let cfg = match body {
                    LambdaBody::Expr(expr) => Cfg::for_exprs(std::iter::once(expr.as_ref()), &scoped),
                    LambdaBody::Block(block) => Cfg::for_block(block, &scoped),
                };
                self.check_cfg(&cfg, &seed, resolver, &scoped_locals, &scoped);
            }
            Nested::Class(decl) => self.check_type(decl, &seed, locals),
        }
    }

    // ==================== Requirements ====================

    fn check_symbol(&mut self, symbol: &ResolvedSymbol, span: Span, facts: &GuaranteeSet) {
        for requirement in &symbol.requirements {
            match requirement {
                Requirement::Version(level) => self.check_version(symbol, *level, span, facts),
                Requirement::Permission(permission) => {
                    self.check_permission(symbol, permission, span, facts)
                }
            }
        }
    }

    fn check_version(&mut self, symbol: &ResolvedSymbol, level: u32, span: Span, facts: &GuaranteeSet) {
        let category = if symbol.inlined {
            IssueCategory::InlinedApi
        } else {
            IssueCategory::NewApi
        };
        if facts.is_suppressed(category) {
            return;
        }
        if level <= facts.effective_floor(self.baseline.min_sdk) {
            return;
        }
        self.report(
            span,
            category,
            format!(
                "{} requires API level {} (current min is {}): {}",
                symbol.display.kind.message_prefix(),
                level,
                facts.reported_min(self.baseline.min_sdk),
                symbol.display
            ),
        );
    }

    fn check_try_with_resources(&mut self, span: Span, facts: &GuaranteeSet) {
        if facts.is_suppressed(IssueCategory::NewApi) {
            return;
        }
        if TRY_WITH_RESOURCES_LEVEL <= facts.effective_floor(self.baseline.min_sdk) {
            return;
        }
        self.report(
            span,
            IssueCategory::NewApi,
            format!(
                "Try-with-resources requires API level {} (current min is {})",
                TRY_WITH_RESOURCES_LEVEL,
                facts.reported_min(self.baseline.min_sdk)
            ),
        );
    }

    /// Standalone month (`L`) and weekday (`c`) letters in a literal
    /// `SimpleDateFormat` pattern
    fn check_date_format(&mut self, creation: &Expr, facts: &GuaranteeSet) {
        let ExprKind::New { args, .. } = &creation.kind else {
            return;
        };
        let Some(pattern_arg) = args.first() else {
            return;
        };
        let Some(pattern) = pattern_arg.string_literal() else {
            return;
        };
        if facts.is_suppressed(IssueCategory::NewApi)
            || DATE_FORMAT_LEVEL <= facts.effective_floor(self.baseline.min_sdk)
        {
            return;
        }
        if let Some(letter) = standalone_pattern_letter(pattern) {
            self.report(
                pattern_arg.span,
                IssueCategory::NewApi,
                format!(
                    "The pattern character '{}' requires API level {} (current min is {}) : \"{}\"",
                    letter,
                    DATE_FORMAT_LEVEL,
                    facts.reported_min(self.baseline.min_sdk),
                    pattern
                ),
            );
        }
    }

    /// A method that would override a platform method newer than the
    /// compile platform does not override anything when built
    fn check_override(&mut self, decl: &TypeDecl, method: &MethodDecl, facts: &GuaranteeSet) {
        let Some(compile_sdk) = self.baseline.compile_sdk else {
            return;
        };
        if method.is_constructor || method.is_static || facts.is_suppressed(IssueCategory::Override) {
            return;
        }
        let arity = method.params.len();
        let overridden = self
            .index
            .ancestors(&decl.qualified_name)
            .iter()
            .filter_map(|owner| {
                self.kb
                    .class(owner)?
                    .methods
                    .get(&method.name)?
                    .iter()
                    .filter(|m| m.arity == arity)
                    .map(|m| m.since)
                    .min()
            })
            .min();
        let Some(since) = overridden else {
            return;
        };
        if since <= compile_sdk {
            return;
        }
        self.report(
            method.name_span,
            IssueCategory::Override,
            format!(
                "This method is not overriding anything with the current build target, but will in API level {} (current target is {}): {}#{}",
                since, compile_sdk, decl.qualified_name, method.name
            ),
        );
    }

    fn check_permission(
        &mut self,
        symbol: &ResolvedSymbol,
        requirement: &PermissionRequirement,
        span: Span,
        facts: &GuaranteeSet,
    ) {
        let baseline = self.baseline;
        if !requirement.applies_to(baseline.min_sdk, baseline.target_sdk) {
            return;
        }

        let held = &baseline.permissions;
        let mut guaranteed = facts.held.clone();
        guaranteed.extend(facts.implied_permissions());

        // A caller declaring the same requirement passes the obligation on
        let required_by_caller = facts
            .caller_requirements
            .iter()
            .any(|r| r.expr == requirement.expr);

        let expr = &requirement.expr;
        let missing_message = || {
            format!(
                "Missing permissions required by {}: {}",
                symbol.display.short_name(),
                expr.describe_missing(held, &guaranteed)
            )
        };

        if let Some(inner) = expr.conditional_inner() {
            if !required_by_caller
                && !inner.is_satisfied(held, &guaranteed)
                && !facts.is_suppressed(IssueCategory::MissingPermission)
            {
                let message = missing_message();
                self.push(
                    Diagnostic::new(&self.unit.path, span, IssueCategory::MissingPermission, message)
                        .with_severity(Severity::Info),
                );
            }
            return;
        }

        if !required_by_caller && !expr.is_satisfied(held, &guaranteed) {
            if !facts.is_suppressed(IssueCategory::MissingPermission) {
                let message = missing_message();
                self.report(span, IssueCategory::MissingPermission, message);
            }
            return;
        }

        if baseline.target_sdk < RUNTIME_PERMISSIONS_LEVEL
            || facts.is_suppressed(IssueCategory::RevocablePermission)
        {
            return;
        }
        let custom: BTreeSet<String> = baseline
            .revocable_permissions
            .iter()
            .chain(self.kb.revocable_permissions())
            .cloned()
            .collect();
        let revocable = expr.revocable_permissions(&custom);
        if revocable.is_empty() {
            return;
        }
        let checked = required_by_caller
            || revocable.iter().any(|p| guaranteed.contains(p))
            || handles_security_exception(&facts.excluded);
        if !checked {
            self.report(span, IssueCategory::RevocablePermission, REVOCABLE_MESSAGE.to_string());
        }
    }

    fn report(&mut self, span: Span, category: IssueCategory, message: String) {
        let diagnostic = Diagnostic::new(&self.unit.path, span, category, message);
        self.push(diagnostic);
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        trace!("{}: {}", diagnostic.category, diagnostic.message);
        self.diagnostics.push(diagnostic);
    }
}

/// Recognizer for a body: parameters and locals hide outer guard variables,
/// then the body's own guard locals are bound
fn scope_recognizer(outer: &GuardRecognizer, own: &Locals, body: Option<&Block>) -> GuardRecognizer {
    let shadowed = outer.shadowed_by(own.keys());
    match body {
        Some(body) => {
            let variables = shadowed.local_guard_variables(body);
            shadowed.with_variables(variables)
        }
        None => shadowed,
    }
}

/// Apply the annotations of a declaration to the guarantees of its scope
fn seed(facts: &mut GuaranteeSet, annotations: &[Annotation]) {
    if let Some(level) = api_floor(annotations) {
        facts.raise_annotation_floor(level);
    }
    facts.suppress(suppressed_categories(annotations));
}

/// First pattern letter outside quoted text that older platforms reject
fn standalone_pattern_letter(pattern: &str) -> Option<char> {
    let mut quoted = false;
    for c in pattern.chars() {
        match c {
            '\'' => quoted = !quoted,
            'L' | 'c' if !quoted => return Some(c),
            _ => {}
        }
    }
    None
}

/// Whether an excluded type catches `SecurityException`
fn handles_security_exception(excluded: &BTreeSet<String>) -> bool {
    excluded.iter().any(|name| {
        let simple = name.rsplit('.').next().unwrap_or(name);
        SECURITY_EXCEPTION_HANDLERS.contains(&simple)
            && (name == simple || name.starts_with("java.lang."))
    })
}
