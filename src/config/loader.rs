use crate::analysis::IssueCategory;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration for an apicheck run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directories to analyze, relative to the project root
    pub targets: Vec<PathBuf>,

    /// Glob patterns to exclude from analysis
    pub exclude: Vec<String>,

    /// Path to api-versions.xml
    pub api_database: Option<PathBuf>,

    /// Permission table (TOML, YAML or JSON)
    pub permission_database: Option<PathBuf>,

    /// AndroidManifest.xml to read the module baseline from
    pub manifest: Option<PathBuf>,

    /// Override the manifest's minSdkVersion
    pub min_sdk: Option<u32>,

    /// Override the manifest's targetSdkVersion
    pub target_sdk: Option<u32>,

    /// Platform the module compiles against; read from the build files when unset
    pub compile_sdk: Option<u32>,

    pub checks: ChecksConfig,

    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub new_api: bool,
    pub inlined_api: bool,
    pub missing_permission: bool,
    pub revocable_permission: bool,
    #[serde(rename = "override")]
    pub overrides: bool,
    pub unused_attribute: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Output format: terminal, json
    pub format: String,

    /// Write the report here instead of stdout
    pub output: Option<PathBuf>,

    /// Group terminal output by: file, category
    pub group_by: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: vec![],
            exclude: vec![
                "**/build/**".to_string(),
                "**/generated/**".to_string(),
                "**/.gradle/**".to_string(),
            ],
            api_database: None,
            permission_database: None,
            manifest: None,
            min_sdk: None,
            target_sdk: None,
            compile_sdk: None,
            checks: ChecksConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            new_api: true,
            inlined_api: true,
            missing_permission: true,
            revocable_permission: true,
            overrides: true,
            unused_attribute: true,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: "terminal".to_string(),
            output: None,
            group_by: "file".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config")?,
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config")?,
            _ => match serde_yaml::from_str(&contents) {
                Ok(config) => config,
                Err(_) => toml::from_str(&contents)
                    .into_diagnostic()
                    .wrap_err("Failed to parse config file")?,
            },
        };

        debug!("Loaded config from {}", path.display());
        Ok(config.relative_to(path.parent().unwrap_or(Path::new("."))))
    }

    /// Look for `.apicheck.yml`, `.apicheck.yaml`, `.apicheck.toml` or
    /// `apicheck.toml` in the project root
    pub fn from_default_locations(project_root: &Path) -> Result<Self> {
        let default_names = [
            ".apicheck.yml",
            ".apicheck.yaml",
            ".apicheck.toml",
            "apicheck.toml",
        ];

        for name in &default_names {
            let path = project_root.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Resolve relative database and manifest paths against the config file's directory
    fn relative_to(mut self, base: &Path) -> Self {
        for path in [
            &mut self.api_database,
            &mut self.permission_database,
            &mut self.manifest,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    /// Categories turned off in the `checks` section
    pub fn disabled_categories(&self) -> Vec<IssueCategory> {
        let checks = &self.checks;
        [
            (checks.new_api, IssueCategory::NewApi),
            (checks.inlined_api, IssueCategory::InlinedApi),
            (checks.missing_permission, IssueCategory::MissingPermission),
            (checks.revocable_permission, IssueCategory::RevocablePermission),
            (checks.overrides, IssueCategory::Override),
            (checks.unused_attribute, IssueCategory::UnusedAttribute),
        ]
        .into_iter()
        .filter(|(enabled, _)| !enabled)
        .map(|(_, category)| category)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.checks.new_api);
        assert!(config.disabled_categories().is_empty());
        assert_eq!(config.report.format, "terminal");
    }

    #[test]
    fn test_yaml_config() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".apicheck.yml"),
            "min_sdk: 14\napi_database: sdk/api-versions.xml\nchecks:\n  inlined_api: false\n",
        )
        .unwrap();

        let config = Config::from_default_locations(dir.path()).unwrap();
        assert_eq!(config.min_sdk, Some(14));
        assert_eq!(config.target_sdk, None);
        assert_eq!(config.disabled_categories(), vec![IssueCategory::InlinedApi]);
        assert_eq!(
            config.api_database,
            Some(dir.path().join("sdk/api-versions.xml"))
        );
        // Unspecified fields keep their defaults
        assert!(!config.exclude.is_empty());
    }

    #[test]
    fn test_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("apicheck.toml");
        fs::write(
            &path,
            "target_sdk = 23\ncompile_sdk = 28\n[report]\nformat = \"json\"\n[checks]\nrevocable_permission = false\noverride = false\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.target_sdk, Some(23));
        assert_eq!(config.compile_sdk, Some(28));
        assert_eq!(config.report.format, "json");
        assert_eq!(
            config.disabled_categories(),
            vec![IssueCategory::RevocablePermission, IssueCategory::Override]
        );
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_default_locations(dir.path()).unwrap();
        assert!(config.api_database.is_none());
    }
}
