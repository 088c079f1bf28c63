mod json;
mod sarif;
mod terminal;

pub use json::JsonReporter;
pub use sarif::SarifReporter;
pub use terminal::TerminalReporter;

use crate::analysis::Diagnostic;
use miette::Result;
use std::path::PathBuf;
use std::str::FromStr;

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Terminal,
    Json,
    Sarif,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "terminal" | "text" => Ok(ReportFormat::Terminal),
            "json" => Ok(ReportFormat::Json),
            "sarif" => Ok(ReportFormat::Sarif),
            other => Err(format!("unknown report format: {}", other)),
        }
    }
}

/// How terminal output is grouped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupBy {
    #[default]
    File,
    Category,
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(GroupBy::File),
            "category" | "issue" => Ok(GroupBy::Category),
            other => Err(format!("unknown grouping: {}", other)),
        }
    }
}

/// Reporter for outputting diagnostics
pub struct Reporter {
    format: ReportFormat,
    output_path: Option<PathBuf>,
    group_by: GroupBy,
}

impl Reporter {
    pub fn new(format: ReportFormat, output_path: Option<PathBuf>) -> Self {
        Self {
            format,
            output_path,
            group_by: GroupBy::default(),
        }
    }

    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn report(&self, diagnostics: &[Diagnostic]) -> Result<()> {
        match self.format {
            ReportFormat::Terminal => TerminalReporter::new(self.group_by).report(diagnostics),
            ReportFormat::Json => JsonReporter::new(self.output_path.clone()).report(diagnostics),
            ReportFormat::Sarif => SarifReporter::new(self.output_path.clone()).report(diagnostics),
        }
    }
}
