//! Module baseline for apicheck
//!
//! The declared minimum and target platform versions of the module being
//! checked, the platform it compiles against, plus the permissions its
//! manifest requests. The analysis treats the baseline as an opaque,
//! read-only fact.

use crate::parser::xml::{ManifestFacts, ManifestParser};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// API level assumed when the manifest declares no minimum
pub const DEFAULT_MIN_SDK: u32 = 1;

/// Baseline errors
#[derive(Error, Debug)]
pub enum BaselineError {
    #[error("Failed to read manifest {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse manifest {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Declared platform range and held permissions of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleBaseline {
    pub min_sdk: u32,
    pub target_sdk: u32,
    /// Platform the module compiles against, when known
    pub compile_sdk: Option<u32>,
    /// Permissions requested in the manifest
    pub permissions: BTreeSet<String>,
    /// Custom permissions the manifest declares as dangerous
    pub revocable_permissions: BTreeSet<String>,
}

impl ModuleBaseline {
    pub fn new(min_sdk: u32, target_sdk: u32) -> Self {
        Self {
            min_sdk,
            target_sdk: target_sdk.max(min_sdk),
            compile_sdk: None,
            permissions: BTreeSet::new(),
            revocable_permissions: BTreeSet::new(),
        }
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn with_revocable_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.revocable_permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Build a baseline from manifest facts. A missing minimum is the most
    /// permissive baseline; a missing target defaults to the minimum.
    pub fn from_facts(facts: &ManifestFacts) -> Self {
        let min_sdk = facts.min_sdk.unwrap_or(DEFAULT_MIN_SDK);
        let target_sdk = facts.target_sdk.unwrap_or(min_sdk);
        Self::new(min_sdk, target_sdk)
            .with_permissions(facts.permissions.iter().cloned())
            .with_revocable_permissions(facts.dangerous_permissions.iter().cloned())
    }

    /// Read and parse an AndroidManifest.xml
    pub fn load(manifest: &Path) -> Result<Self, BaselineError> {
        let contents = fs::read_to_string(manifest).map_err(|source| BaselineError::ReadError {
            path: manifest.to_path_buf(),
            source,
        })?;

        let facts = ManifestParser::new()
            .parse(manifest, &contents)
            .map_err(|e| BaselineError::ParseError {
                path: manifest.to_path_buf(),
                message: e.to_string(),
            })?;

        let baseline = Self::from_facts(&facts);
        debug!(
            "Baseline from {}: min {}, target {}",
            manifest.display(),
            baseline.min_sdk,
            baseline.target_sdk
        );
        Ok(baseline)
    }

    /// Replace the declared versions with explicit overrides
    pub fn with_overrides(mut self, min_sdk: Option<u32>, target_sdk: Option<u32>) -> Self {
        if let Some(min) = min_sdk {
            self.min_sdk = min;
        }
        if let Some(target) = target_sdk {
            self.target_sdk = target;
        }
        self.target_sdk = self.target_sdk.max(self.min_sdk);
        self
    }

    pub fn with_compile_sdk(mut self, compile_sdk: Option<u32>) -> Self {
        if compile_sdk.is_some() {
            self.compile_sdk = compile_sdk;
        }
        self
    }

    pub fn holds(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Build files that may name the compile platform, in lookup order
const BUILD_FILES: &[&str] = &["project.properties", "build.gradle", "build.gradle.kts"];

fn compile_sdk_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:target\s*=\s*android-|compileSdk(?:Version)?\s*[=(]?\s*)(\d+)")
            .expect("compile sdk pattern is valid")
    })
}

/// Compile platform declared by `target=android-N` in project.properties or
/// `compileSdkVersion N` in a Gradle build file of `module_root`
pub fn detect_compile_sdk(module_root: &Path) -> Option<u32> {
    BUILD_FILES.iter().find_map(|name| {
        let contents = fs::read_to_string(module_root.join(name)).ok()?;
        let level = compile_sdk_pattern()
            .captures(&contents)?
            .get(1)?
            .as_str()
            .parse()
            .ok()?;
        debug!("Compile SDK {} from {}", level, name);
        Some(level)
    })
}

impl Default for ModuleBaseline {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SDK, DEFAULT_MIN_SDK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_without_uses_sdk() {
        let baseline = ModuleBaseline::from_facts(&ManifestFacts::default());
        assert_eq!(baseline.min_sdk, 1);
        assert_eq!(baseline.target_sdk, 1);
        assert!(baseline.permissions.is_empty());
    }

    #[test]
    fn test_target_defaults_to_min() {
        let facts = ManifestFacts {
            min_sdk: Some(14),
            ..Default::default()
        };
        let baseline = ModuleBaseline::from_facts(&facts);
        assert_eq!(baseline.target_sdk, 14);
    }

    #[test]
    fn test_overrides() {
        let baseline = ModuleBaseline::new(4, 14).with_overrides(Some(21), None);
        assert_eq!(baseline.min_sdk, 21);
        assert_eq!(baseline.target_sdk, 21);
    }

    #[test]
    fn test_load_manifest() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="p">
                <uses-sdk android:minSdkVersion="9" android:targetSdkVersion="23"/>
                <uses-permission android:name="android.permission.CAMERA"/>
            </manifest>"#
        )
        .unwrap();

        let baseline = ModuleBaseline::load(file.path()).unwrap();
        assert_eq!(baseline.min_sdk, 9);
        assert_eq!(baseline.target_sdk, 23);
        assert!(baseline.holds("android.permission.CAMERA"));
    }

    #[test]
    fn test_detect_compile_sdk() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(detect_compile_sdk(dir.path()), None);

        fs::write(dir.path().join("project.properties"), "# generated\ntarget=android-17\n").unwrap();
        assert_eq!(detect_compile_sdk(dir.path()), Some(17));

        let gradle = tempfile::TempDir::new().unwrap();
        fs::write(
            gradle.path().join("build.gradle"),
            "android {\n    compileSdkVersion 28\n    defaultConfig { minSdkVersion 14 }\n}\n",
        )
        .unwrap();
        assert_eq!(detect_compile_sdk(gradle.path()), Some(28));

        let kts = tempfile::TempDir::new().unwrap();
        fs::write(kts.path().join("build.gradle.kts"), "android {\n    compileSdk = 34\n}\n").unwrap();
        assert_eq!(detect_compile_sdk(kts.path()), Some(34));
    }

    #[test]
    fn test_compile_sdk_override() {
        let baseline = ModuleBaseline::new(4, 14).with_compile_sdk(Some(3));
        assert_eq!(baseline.compile_sdk, Some(3));
        assert_eq!(baseline.with_compile_sdk(None).compile_sdk, Some(3));
    }

    #[test]
    fn test_load_missing_manifest() {
        let result = ModuleBaseline::load(Path::new("/nonexistent/AndroidManifest.xml"));
        assert!(matches!(result, Err(BaselineError::ReadError { .. })));
    }
}
