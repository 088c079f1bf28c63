//! API availability and permission analysis
//!
//! Each compilation unit is lowered to one control-flow graph per body,
//! guarantees are propagated along guarded edges, and every resolved
//! reference is compared against the knowledge base and the module baseline.

pub mod annotations;
pub mod cfg;
mod checker;
pub mod guard;
mod project;
pub mod propagation;
pub mod resolver;
mod resources;

pub use guard::{Guard, GuardRecognizer};
pub use project::ProjectAnalyzer;
pub use propagation::GuaranteeSet;

use crate::baseline::ModuleBaseline;
use crate::graph::ProjectIndex;
use crate::kb::KnowledgeBase;
use crate::parser::ast::{CompilationUnit, Span};
use crate::parser::xml::ResourceDocument;
use checker::Checker;
use resources::ResourceChecker;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const PARSE_FAILURE_MESSAGE: &str = "Could not parse file; API check not performed for this file";

/// Errors that abort analysis of a single input
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The input could not be read or parsed; other inputs proceed
    #[error("{path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Stable issue identifiers, matching the names used in suppression annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueCategory {
    NewApi,
    InlinedApi,
    MissingPermission,
    RevocablePermission,
    Override,
    UnusedAttribute,
    LintError,
    ParserError,
}

impl IssueCategory {
    pub const ALL: [IssueCategory; 8] = [
        IssueCategory::NewApi,
        IssueCategory::InlinedApi,
        IssueCategory::MissingPermission,
        IssueCategory::RevocablePermission,
        IssueCategory::Override,
        IssueCategory::UnusedAttribute,
        IssueCategory::LintError,
        IssueCategory::ParserError,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            IssueCategory::NewApi => "NewApi",
            IssueCategory::InlinedApi => "InlinedApi",
            IssueCategory::MissingPermission => "MissingPermission",
            IssueCategory::RevocablePermission => "RevocablePermission",
            IssueCategory::Override => "Override",
            IssueCategory::UnusedAttribute => "UnusedAttribute",
            IssueCategory::LintError => "LintError",
            IssueCategory::ParserError => "ParserError",
        }
    }

    /// Parse an identifier, ignoring case
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.id().eq_ignore_ascii_case(id))
    }

    /// Categories that `@SuppressLint` can silence
    pub fn suppressible() -> impl Iterator<Item = IssueCategory> {
        [
            IssueCategory::NewApi,
            IssueCategory::InlinedApi,
            IssueCategory::MissingPermission,
            IssueCategory::RevocablePermission,
            IssueCategory::Override,
            IssueCategory::UnusedAttribute,
        ]
        .into_iter()
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            IssueCategory::InlinedApi
            | IssueCategory::UnusedAttribute
            | IssueCategory::ParserError => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Severity levels for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reported problem at a source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub span: Span,
    pub category: IssueCategory,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: &Path, span: Span, category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            span,
            category,
            severity: category.default_severity(),
            message: message.into(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Fatal diagnostic for a scope that could not be analyzed at all
    pub fn not_performed(path: &Path, error: &dyn std::error::Error) -> Self {
        Self::new(path, Span::default(), IssueCategory::LintError, error.to_string())
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Order by path, then position, then category and message
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then_with(|| (a.span.line, a.span.column).cmp(&(b.span.line, b.span.column)))
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.message.cmp(&b.message))
    });
}

/// Check one compilation unit. Units with syntax errors are skipped with a
/// single parser diagnostic.
pub fn analyze(
    unit: &CompilationUnit,
    kb: &KnowledgeBase,
    index: &ProjectIndex,
    baseline: &ModuleBaseline,
) -> Vec<Diagnostic> {
    if let Some(span) = unit.syntax_error {
        debug!("Skipping {}: syntax error at {}", unit.path.display(), span);
        return vec![Diagnostic::new(
            &unit.path,
            span,
            IssueCategory::ParserError,
            PARSE_FAILURE_MESSAGE,
        )];
    }

    let mut diagnostics = Checker::new(unit, kb, index, baseline).run();
    sort_diagnostics(&mut diagnostics);
    diagnostics.dedup();
    debug!("{}: {} diagnostics", unit.path.display(), diagnostics.len());
    diagnostics
}

/// Check one parsed XML resource or manifest file
pub fn analyze_resource(
    path: &Path,
    document: &ResourceDocument,
    kb: &KnowledgeBase,
    baseline: &ModuleBaseline,
) -> Vec<Diagnostic> {
    let mut diagnostics = ResourceChecker::new(path, kb, baseline).run(document);
    sort_diagnostics(&mut diagnostics);
    diagnostics.dedup();
    debug!("{}: {} diagnostics", path.display(), diagnostics.len());
    diagnostics
}
