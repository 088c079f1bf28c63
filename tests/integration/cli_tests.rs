//! CLI integration tests
//!
//! These tests run the binary against small projects laid out in a temp dir.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const API_VERSIONS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<api version="3">
    <class name="java/lang/Object" since="1">
        <method name="toString()Ljava/lang/String;"/>
    </class>
    <class name="android/app/Activity" since="1">
        <extends name="java/lang/Object"/>
        <method name="getActionBar()Landroid/app/ActionBar;" since="11"/>
    </class>
    <class name="android/widget/GridLayout" since="14">
        <extends name="java/lang/Object"/>
    </class>
    <class name="android/location/LocationManager" since="1">
        <extends name="java/lang/Object"/>
        <method name="getLastKnownLocation(Ljava/lang/String;)Landroid/location/Location;"/>
    </class>
</api>
"#;

const PERMISSIONS: &str = r#"
[[permissions]]
symbol = "android.location.LocationManager#getLastKnownLocation"
any_of = ["android.permission.ACCESS_FINE_LOCATION", "android.permission.ACCESS_COARSE_LOCATION"]
"#;

const MANIFEST: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="test.pkg">
    <uses-sdk android:minSdkVersion="9" android:targetSdkVersion="23" />
    <uses-permission android:name="android.permission.ACCESS_COARSE_LOCATION" />
</manifest>
"#;

const ACTIVITY: &str = r#"package test.pkg;

import android.app.Activity;
import android.location.LocationManager;

public class MainActivity extends Activity {
    private LocationManager manager;

    void onStart() {
        getActionBar();
    }

    void locate() {
        manager.getLastKnownLocation("gps");
    }
}
"#;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let project = Self { dir };
        project.write("sdk/api-versions.xml", API_VERSIONS);
        project.write("sdk/permissions.toml", PERMISSIONS);
        project.write("app/src/main/AndroidManifest.xml", MANIFEST);
        project.write("app/src/main/java/test/pkg/MainActivity.java", ACTIVITY);
        project
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    fn write(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// `apicheck <root> --api-database sdk/api-versions.xml` plus `args`
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::cargo_bin("apicheck").unwrap();
        cmd.env("NO_COLOR", "1")
            .env_remove("ANDROID_HOME")
            .env_remove("ANDROID_SDK_ROOT")
            .arg(self.root())
            .arg("--api-database")
            .arg(self.path("sdk/api-versions.xml"))
            .args(args);
        cmd
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let mut all = vec!["--format", "json"];
        all.extend_from_slice(args);
        let output = self.command(&all).output().unwrap();
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

fn issue_ids(report: &serde_json::Value) -> Vec<String> {
    report["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_help() {
    Command::cargo_bin("apicheck")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--min-sdk"))
        .stdout(predicate::str::contains("--api-database"));
}

#[test]
fn test_version() {
    Command::cargo_bin("apicheck")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("apicheck"));
}

#[test]
fn test_unknown_category_is_rejected() {
    let project = Project::new();
    project
        .command(&["--disable", "Bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown category"));
}

// ============================================================================
// Analysis
// ============================================================================

#[test]
fn test_reports_new_api_against_manifest_min_sdk() {
    let project = Project::new();
    project
        .command(&["--format", "json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "Call requires API level 11 (current min is 9): android.app.Activity#getActionBar",
        ));
}

#[test]
fn test_min_sdk_override() {
    let project = Project::new();
    let report = project.json(&["--min-sdk", "11"]);
    assert_eq!(report["total_issues"], 0);

    project
        .command(&["--min-sdk", "11", "--format", "json"])
        .assert()
        .success();
}

#[test]
fn test_permission_table_enables_revocable_check() {
    let project = Project::new();
    let table = project.path("sdk/permissions.toml");
    let report = project.json(&["--permission-database", table.to_str().unwrap()]);
    assert_eq!(issue_ids(&report), vec!["NewApi", "RevocablePermission"]);

    let legacy = project.json(&[
        "--permission-database",
        table.to_str().unwrap(),
        "--target-sdk",
        "22",
    ]);
    assert_eq!(issue_ids(&legacy), vec!["NewApi"]);
}

#[test]
fn test_disable_category() {
    let project = Project::new();
    project
        .command(&["--format", "json", "--disable", "NewApi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_issues\": 0"));
}

#[test]
fn test_missing_api_database() {
    let project = Project::new();
    fs::remove_file(project.path("sdk/api-versions.xml")).unwrap();

    let report = project.json(&[]);
    assert_eq!(issue_ids(&report), vec!["LintError"]);
    assert_eq!(
        report["issues"][0]["message"],
        "Can't find API database; API check not performed"
    );
}

#[test]
fn test_config_file() {
    let project = Project::new();
    project.write(
        ".apicheck.yml",
        "min_sdk: 11\nreport:\n  format: json\n",
    );

    project
        .command(&[])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_issues\": 0"));
}

#[test]
fn test_sarif_output_file() {
    let project = Project::new();
    let output = project.path("report.sarif");

    project
        .command(&["--format", "sarif", "--output", output.to_str().unwrap()])
        .assert()
        .code(1);

    let sarif: serde_json::Value = serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
    assert_eq!(sarif["version"], "2.1.0");
    assert_eq!(sarif["runs"][0]["results"][0]["ruleId"], "NewApi");
}

#[test]
fn test_terminal_output() {
    let project = Project::new();
    project
        .command(&[])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("MainActivity.java"))
        .stdout(predicate::str::contains("[NewApi]"))
        .stdout(predicate::str::contains("1 errors"));
}

#[test]
fn test_excluded_directories_are_skipped() {
    let project = Project::new();
    project.write(
        "app/build/generated/Generated.java",
        "package gen;\nimport android.app.Activity;\nclass Generated extends Activity { void m() { getActionBar(); } }\n",
    );

    let report = project.json(&[]);
    assert_eq!(report["total_issues"], 1);
}

#[test]
fn test_layout_resources_are_checked() {
    let project = Project::new();
    project.write(
        "app/src/main/res/layout/main.xml",
        "<LinearLayout>\n    <GridLayout />\n</LinearLayout>\n",
    );
    project.write(
        "app/src/main/res/layout-v14/main.xml",
        "<LinearLayout>\n    <GridLayout />\n</LinearLayout>\n",
    );

    let report = project.json(&[]);
    assert_eq!(issue_ids(&report), vec!["NewApi", "NewApi"]);
    let messages: Vec<&str> = report["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["message"].as_str().unwrap())
        .collect();
    assert!(messages.contains(&"View requires API level 14 (current min is 9): <GridLayout>"));
}

#[test]
fn test_override_check_uses_compile_sdk_from_build_file() {
    let project = Project::new();
    project.write(
        "app/src/main/java/test/pkg/OldActivity.java",
        "package test.pkg;\nimport android.app.Activity;\nimport android.app.ActionBar;\npublic class OldActivity extends Activity {\n    public ActionBar getActionBar() { return null; }\n}\n",
    );

    // Without a known compile platform nothing is reported
    assert_eq!(issue_ids(&project.json(&[])), vec!["NewApi"]);

    project.write("app/build.gradle", "android {\n    compileSdkVersion 3\n}\n");
    let report = project.json(&[]);
    assert_eq!(issue_ids(&report), vec!["NewApi", "Override"]);
    assert_eq!(
        report["issues"][1]["message"],
        "This method is not overriding anything with the current build target, but will in API level 11 (current target is 3): test.pkg.OldActivity#getActionBar"
    );

    let report = project.json(&["--compile-sdk", "11"]);
    assert_eq!(issue_ids(&report), vec!["NewApi"]);
}
