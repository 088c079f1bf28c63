//! apicheck - API level and permission checks for Android Java sources
//!
//! This library flags uses of platform APIs that are newer than a module's
//! minimum SDK and calls that need permissions the module may not hold,
//! unless the use is guarded by a version check, a permission check or an
//! annotation on an enclosing declaration.
//!
//! # Architecture
//!
//! The analysis pipeline consists of:
//! 1. **File Discovery** - Find .java files, res/ XML files and the AndroidManifest.xml
//! 2. **Knowledge Base** - Load api-versions.xml and the permission table
//! 3. **Parsing** - Parse source files using tree-sitter into an owned AST
//! 4. **Project Index** - Build the type hierarchy of platform and source classes
//! 5. **Guard Analysis** - Propagate version and permission guarantees over each body's CFG
//! 6. **Resource Checks** - Check view tags, attributes and platform resource references in XML
//! 7. **Reporting** - Output diagnostics in various formats

pub mod analysis;
pub mod baseline;
pub mod config;
pub mod discovery;
pub mod graph;
pub mod kb;
pub mod parser;
pub mod report;

pub use analysis::{analyze, analyze_resource, Diagnostic, IssueCategory, ProjectAnalyzer, Severity};
pub use baseline::ModuleBaseline;
pub use config::Config;
pub use discovery::FileFinder;
pub use graph::ProjectIndex;
pub use kb::{KbError, KnowledgeBase};
pub use report::{ReportFormat, Reporter};
