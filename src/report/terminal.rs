use super::GroupBy;
use crate::analysis::{Diagnostic, IssueCategory, Severity};
use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;

/// Terminal reporter with colored, lint-style output
pub struct TerminalReporter {
    group_by: GroupBy,
}

impl TerminalReporter {
    pub fn new(group_by: GroupBy) -> Self {
        Self { group_by }
    }

    pub fn report(&self, diagnostics: &[Diagnostic]) -> Result<()> {
        if diagnostics.is_empty() {
            println!("{}", "No issues found.".green().bold());
            return Ok(());
        }

        println!();
        match self.group_by {
            GroupBy::File => self.print_by_file(diagnostics),
            GroupBy::Category => self.print_by_category(diagnostics),
        }
        self.print_summary(diagnostics);

        Ok(())
    }

    fn print_by_file(&self, diagnostics: &[Diagnostic]) {
        // Diagnostics arrive sorted by path
        let mut current = None;
        for item in diagnostics {
            if current != Some(&item.path) {
                if current.is_some() {
                    println!();
                }
                println!("{}", item.path.display().to_string().cyan().bold());
                current = Some(&item.path);
            }
            println!(
                "  {} {} {} [{}]",
                format!("{}:{}", item.span.line, item.span.column).dimmed(),
                severity_label(item.severity),
                item.message,
                item.category.id().dimmed()
            );
        }
        println!();
    }

    fn print_by_category(&self, diagnostics: &[Diagnostic]) {
        let mut by_category: BTreeMap<IssueCategory, Vec<&Diagnostic>> = BTreeMap::new();
        for item in diagnostics {
            by_category.entry(item.category).or_default().push(item);
        }

        for (category, items) in by_category {
            println!(
                "{} {}",
                category.id().cyan().bold(),
                format!("({})", items.len()).dimmed()
            );
            for item in items {
                println!(
                    "  {} {} {}",
                    format!("{}:{}:{}", item.path.display(), item.span.line, item.span.column).dimmed(),
                    severity_label(item.severity),
                    item.message
                );
            }
            println!();
        }
    }

    fn print_summary(&self, diagnostics: &[Diagnostic]) {
        let mut errors = 0;
        let mut warnings = 0;
        let mut infos = 0;
        for item in diagnostics {
            match item.severity {
                Severity::Error => errors += 1,
                Severity::Warning => warnings += 1,
                Severity::Info => infos += 1,
            }
        }

        println!("{}", "─".repeat(60).dimmed());

        let mut parts = Vec::new();
        if errors > 0 {
            parts.push(format!("{} errors", errors).red().to_string());
        }
        if warnings > 0 {
            parts.push(format!("{} warnings", warnings).yellow().to_string());
        }
        if infos > 0 {
            parts.push(format!("{} info", infos).blue().to_string());
        }
        println!("Summary: {}", parts.join(", "));

        if diagnostics
            .iter()
            .any(|d| matches!(d.category, IssueCategory::NewApi | IssueCategory::InlinedApi))
        {
            println!(
                "{}",
                "Tip: Guard calls with `if (Build.VERSION.SDK_INT >= N)` or annotate the method with @RequiresApi(N)"
                    .dimmed()
            );
        }
        if diagnostics
            .iter()
            .any(|d| d.category == IssueCategory::MissingPermission)
        {
            println!(
                "{}",
                "Tip: Check with checkSelfPermission(...) or declare the permission in AndroidManifest.xml"
                    .dimmed()
            );
        }
    }
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
        Severity::Info => "info".blue().bold(),
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new(GroupBy::File)
    }
}
