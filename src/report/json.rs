use crate::analysis::{Diagnostic, IssueCategory, Severity};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// JSON reporter for programmatic output
pub struct JsonReporter {
    output_path: Option<PathBuf>,
}

impl JsonReporter {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self { output_path }
    }

    pub fn report(&self, diagnostics: &[Diagnostic]) -> Result<()> {
        let json = Self::render(diagnostics)?;

        if let Some(path) = &self.output_path {
            std::fs::write(path, &json).into_diagnostic()?;
            println!("Report written to: {}", path.display());
        } else {
            println!("{}", json);
        }

        Ok(())
    }

    pub fn render(diagnostics: &[Diagnostic]) -> Result<String> {
        let report = JsonReport::from_diagnostics(diagnostics);
        serde_json::to_string_pretty(&report).into_diagnostic()
    }
}

#[derive(Serialize)]
struct JsonReport {
    version: &'static str,
    total_issues: usize,
    issues: Vec<JsonIssue>,
    summary: JsonSummary,
}

#[derive(Serialize)]
struct JsonIssue {
    id: &'static str,
    severity: Severity,
    message: String,
    file: String,
    line: usize,
    column: usize,
    end_line: usize,
    end_column: usize,
}

#[derive(Serialize)]
struct JsonSummary {
    errors: usize,
    warnings: usize,
    infos: usize,
    by_category: BTreeMap<&'static str, usize>,
}

impl JsonReport {
    fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let mut summary = JsonSummary {
            errors: 0,
            warnings: 0,
            infos: 0,
            by_category: IssueCategory::ALL.iter().map(|c| (c.id(), 0)).collect(),
        };

        let issues = diagnostics
            .iter()
            .map(|d| {
                match d.severity {
                    Severity::Error => summary.errors += 1,
                    Severity::Warning => summary.warnings += 1,
                    Severity::Info => summary.infos += 1,
                }
                *summary.by_category.entry(d.category.id()).or_default() += 1;

                JsonIssue {
                    id: d.category.id(),
                    severity: d.severity,
                    message: d.message.clone(),
                    file: d.path.to_string_lossy().to_string(),
                    line: d.span.line,
                    column: d.span.column,
                    end_line: d.span.end_line,
                    end_column: d.span.end_column,
                }
            })
            .collect();

        Self {
            version: "1.0",
            total_issues: diagnostics.len(),
            issues,
            summary,
        }
    }
}
