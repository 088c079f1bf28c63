use crate::analysis::{Diagnostic, IssueCategory, Severity};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

/// SARIF reporter for CI code scanning
pub struct SarifReporter {
    output_path: Option<PathBuf>,
}

impl SarifReporter {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self { output_path }
    }

    pub fn report(&self, diagnostics: &[Diagnostic]) -> Result<()> {
        let json = Self::render(diagnostics)?;

        if let Some(path) = &self.output_path {
            std::fs::write(path, &json).into_diagnostic()?;
            println!("SARIF report written to: {}", path.display());
        } else {
            println!("{}", json);
        }

        Ok(())
    }

    pub fn render(diagnostics: &[Diagnostic]) -> Result<String> {
        let sarif = SarifReport::from_diagnostics(diagnostics);
        serde_json::to_string_pretty(&sarif).into_diagnostic()
    }
}

/// SARIF 2.1.0 format
#[derive(Serialize)]
struct SarifReport {
    #[serde(rename = "$schema")]
    schema: &'static str,
    version: &'static str,
    runs: Vec<SarifRun>,
}

#[derive(Serialize)]
struct SarifRun {
    tool: SarifTool,
    results: Vec<SarifResult>,
}

#[derive(Serialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifDriver {
    name: &'static str,
    version: &'static str,
    information_uri: &'static str,
    rules: Vec<SarifRule>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifRule {
    id: &'static str,
    short_description: SarifMessage,
    default_configuration: SarifConfiguration,
}

#[derive(Serialize)]
struct SarifConfiguration {
    level: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifResult {
    rule_id: &'static str,
    level: &'static str,
    message: SarifMessage,
    locations: Vec<SarifLocation>,
}

#[derive(Serialize)]
struct SarifMessage {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifLocation {
    physical_location: SarifPhysicalLocation,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifPhysicalLocation {
    artifact_location: SarifArtifactLocation,
    region: SarifRegion,
}

#[derive(Serialize)]
struct SarifArtifactLocation {
    uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifRegion {
    start_line: usize,
    start_column: usize,
}

fn level(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "note",
    }
}

fn rule_description(category: IssueCategory) -> &'static str {
    match category {
        IssueCategory::NewApi => "Calling new methods on older versions",
        IssueCategory::InlinedApi => "Using inlined constants on older versions",
        IssueCategory::MissingPermission => "Missing permissions",
        IssueCategory::RevocablePermission => "Unchecked use of a revocable permission",
        IssueCategory::Override => "Method would override a newer platform method",
        IssueCategory::UnusedAttribute => "Attribute unused on older versions",
        IssueCategory::LintError => "Analysis could not be performed",
        IssueCategory::ParserError => "Source file could not be parsed",
    }
}

impl SarifReport {
    fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let rules = IssueCategory::ALL
            .iter()
            .map(|&category| SarifRule {
                id: category.id(),
                short_description: SarifMessage {
                    text: rule_description(category).to_string(),
                },
                default_configuration: SarifConfiguration {
                    level: level(category.default_severity()),
                },
            })
            .collect();

        let results = diagnostics
            .iter()
            .map(|d| SarifResult {
                rule_id: d.category.id(),
                level: level(d.severity),
                message: SarifMessage {
                    text: d.message.clone(),
                },
                locations: vec![SarifLocation {
                    physical_location: SarifPhysicalLocation {
                        artifact_location: SarifArtifactLocation {
                            uri: d.path.to_string_lossy().replace('\\', "/"),
                        },
                        // SARIF regions are 1-based
                        region: SarifRegion {
                            start_line: d.span.line.max(1),
                            start_column: d.span.column.max(1),
                        },
                    },
                }],
            })
            .collect();

        SarifReport {
            schema: "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
            version: "2.1.0",
            runs: vec![SarifRun {
                tool: SarifTool {
                    driver: SarifDriver {
                        name: "apicheck",
                        version: env!("CARGO_PKG_VERSION"),
                        information_uri: env!("CARGO_PKG_REPOSITORY"),
                        rules,
                    },
                },
                results,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Span;
    use std::path::Path;

    #[test]
    fn test_sarif_result() {
        let diagnostic = Diagnostic::new(
            Path::new("app/Main.java"),
            Span::default(),
            IssueCategory::MissingPermission,
            "Missing permissions required by LocationManager.getLastKnownLocation: android.permission.ACCESS_FINE_LOCATION",
        )
        .with_severity(Severity::Info);

        let json = SarifReporter::render(&[diagnostic]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let run = &value["runs"][0];

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(
            run["tool"]["driver"]["informationUri"],
            "https://github.com/KevinDoremy/apicheck"
        );
        assert_eq!(run["tool"]["driver"]["rules"].as_array().unwrap().len(), IssueCategory::ALL.len());
        assert_eq!(run["results"][0]["ruleId"], "MissingPermission");
        assert_eq!(run["results"][0]["level"], "note");
        assert_eq!(
            run["results"][0]["locations"][0]["physicalLocation"]["region"]["startLine"],
            1
        );
    }
}
