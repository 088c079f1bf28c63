// Project driver: parallel parsing and per-unit analysis

use super::{
    analyze, analyze_resource, sort_diagnostics, AnalysisError, Diagnostic, IssueCategory,
    PARSE_FAILURE_MESSAGE,
};
use crate::baseline::ModuleBaseline;
use crate::discovery::SourceFile;
use crate::graph::ProjectIndex;
use crate::kb::{KbError, KnowledgeBase};
use crate::parser::ast::{CompilationUnit, Span};
use crate::parser::xml::ResourceParser;
use crate::parser::{JavaParser, Parser};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs the checks over every Java unit and XML resource of a project
#[derive(Debug, Default)]
pub struct ProjectAnalyzer {
    cancelled: Arc<AtomicBool>,
    disabled: BTreeSet<IssueCategory>,
}

impl ProjectAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop diagnostics of these categories from the result
    pub fn with_disabled(mut self, categories: impl IntoIterator<Item = IssueCategory>) -> Self {
        self.disabled.extend(categories);
        self
    }

    /// Flag that stops analysis before the next unit when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Read and parse Java files in parallel. Files that cannot be read are
    /// reported and left out.
    pub fn parse(&self, files: &[SourceFile]) -> (Vec<CompilationUnit>, Vec<Diagnostic>) {
        info!("Parsing {} files in parallel...", files.len());
        let parser = JavaParser::new();

        let results: Vec<Result<CompilationUnit, AnalysisError>> = files
            .par_iter()
            .filter(|file| file.is_java())
            .map(|file| {
                let malformed = |reason: String| AnalysisError::Malformed {
                    path: file.path.clone(),
                    reason,
                };
                let contents = file.read_contents().map_err(|e| malformed(e.to_string()))?;
                parser
                    .parse(&file.path, &contents)
                    .map_err(|e| malformed(e.to_string()))
            })
            .collect();

        let mut units = Vec::new();
        let mut diagnostics = Vec::new();
        for result in results {
            match result {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    warn!("{}", e);
                    let AnalysisError::Malformed { path, .. } = &e;
                    diagnostics.push(Diagnostic::new(
                        path,
                        Span::default(),
                        IssueCategory::ParserError,
                        PARSE_FAILURE_MESSAGE,
                    ));
                }
            }
        }
        (units, diagnostics)
    }

    /// Analyze parsed units against a loaded knowledge base
    pub fn analyze_units(
        &self,
        units: &[CompilationUnit],
        kb: &KnowledgeBase,
        baseline: &ModuleBaseline,
    ) -> Vec<Diagnostic> {
        let index = ProjectIndex::build(units, kb);
        info!(
            "Analyzing {} units (min {}, target {})",
            units.len(),
            baseline.min_sdk,
            baseline.target_sdk
        );

        let mut diagnostics: Vec<Diagnostic> = units
            .par_iter()
            .flat_map_iter(|unit| {
                if self.is_cancelled() {
                    debug!("Cancelled before {}", unit.path.display());
                    return Vec::new();
                }
                analyze(unit, kb, &index, baseline)
            })
            .filter(|d| !self.disabled.contains(&d.category))
            .collect();

        sort_diagnostics(&mut diagnostics);
        diagnostics
    }

    /// Check resource and manifest attributes. Files that cannot be read or
    /// parsed get one parser diagnostic each.
    pub fn check_resources(
        &self,
        files: &[SourceFile],
        kb: &KnowledgeBase,
        baseline: &ModuleBaseline,
    ) -> Vec<Diagnostic> {
        let parser = ResourceParser::new();
        let mut diagnostics: Vec<Diagnostic> = files
            .par_iter()
            .filter(|file| file.is_xml())
            .flat_map_iter(|file| {
                if self.is_cancelled() {
                    debug!("Cancelled before {}", file.path.display());
                    return Vec::new();
                }
                let parsed = file
                    .read_contents()
                    .and_then(|contents| parser.parse(&file.path, &contents));
                match parsed {
                    Ok(document) => analyze_resource(&file.path, &document, kb, baseline),
                    Err(e) => {
                        warn!("{}: {}", file.path.display(), e);
                        vec![Diagnostic::new(
                            &file.path,
                            Span::default(),
                            IssueCategory::ParserError,
                            PARSE_FAILURE_MESSAGE,
                        )]
                    }
                }
            })
            .filter(|d| !self.disabled.contains(&d.category))
            .collect();

        sort_diagnostics(&mut diagnostics);
        diagnostics
    }

    /// Parse and analyze `files`. Without a knowledge base nothing is checked
    /// and a single diagnostic says so.
    pub fn run(
        &self,
        root: &Path,
        files: &[SourceFile],
        kb: Result<&KnowledgeBase, &KbError>,
        baseline: &ModuleBaseline,
    ) -> Vec<Diagnostic> {
        let kb = match kb {
            Ok(kb) => kb,
            Err(e) => {
                warn!("{}", e);
                return vec![Diagnostic::not_performed(root, e)];
            }
        };

        let (units, mut diagnostics) = self.parse(files);
        diagnostics.retain(|d| !self.disabled.contains(&d.category));
        diagnostics.extend(self.analyze_units(&units, kb, baseline));
        diagnostics.extend(self.check_resources(files, kb, baseline));
        sort_diagnostics(&mut diagnostics);
        diagnostics
    }
}
