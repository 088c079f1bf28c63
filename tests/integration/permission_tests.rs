//! Integration tests for permission checks
//!
//! Covers missing manifest permissions, runtime checks of revocable
//! permissions and requirements passed on through `@RequiresPermission`.

use apicheck::analysis::{Diagnostic, IssueCategory, ProjectAnalyzer, Severity};
use apicheck::kb::{ApiClass, ApiRange, PermissionExpr, PermissionRequirement, SymbolDescriptor};
use apicheck::parser::{JavaParser, Parser};
use apicheck::{KnowledgeBase, ModuleBaseline};
use std::path::Path;

const FINE: &str = "android.permission.ACCESS_FINE_LOCATION";
const COARSE: &str = "android.permission.ACCESS_COARSE_LOCATION";
const READ_CONTACTS: &str = "android.permission.READ_CONTACTS";
const WRITE_CONTACTS: &str = "android.permission.WRITE_CONTACTS";

const REVOCABLE: &str = "Call requires permission which may be rejected by user: code should explicitly check to see if permission is available (with checkPermission) or handle a potential SecurityException";

fn knowledge_base() -> KnowledgeBase {
    KnowledgeBase::new()
        .with_class(ApiClass::new("java.lang.Object", 1))
        .with_class(
            ApiClass::new("android.location.LocationManager", 1)
                .extends("java.lang.Object")
                .method("getLastKnownLocation", 1, 1),
        )
        .with_permission(
            SymbolDescriptor::method("android.location.LocationManager", "getLastKnownLocation"),
            PermissionRequirement::new(PermissionExpr::any_of([FINE, COARSE])),
        )
        .with_class(
            ApiClass::new("android.accounts.AccountManager", 5)
                .extends("java.lang.Object")
                .method("addAccountExplicitly", 3, 5),
        )
        .with_permission(
            SymbolDescriptor::method("android.accounts.AccountManager", "addAccountExplicitly"),
            PermissionRequirement::new(PermissionExpr::all_of([READ_CONTACTS, WRITE_CONTACTS])),
        )
        .with_class(
            ApiClass::new("android.os.Vibrator", 1)
                .extends("java.lang.Object")
                .method("vibrate", 1, 1),
        )
        .with_permission(
            SymbolDescriptor::method("android.os.Vibrator", "vibrate"),
            PermissionRequirement::new(PermissionExpr::single("android.permission.VIBRATE")).conditional(),
        )
        .with_class(
            ApiClass::new("android.bluetooth.BluetoothAdapter", 5)
                .extends("java.lang.Object")
                .method("enable", 0, 5),
        )
        .with_permission(
            SymbolDescriptor::method("android.bluetooth.BluetoothAdapter", "enable"),
            PermissionRequirement::new(PermissionExpr::single("android.permission.BLUETOOTH_ADMIN"))
                .with_apis("..22".parse::<ApiRange>().unwrap()),
        )
}

fn check(baseline: &ModuleBaseline, source: &str) -> Vec<Diagnostic> {
    let unit = JavaParser::new().parse(Path::new("Tracker.java"), source).unwrap();
    let kb = knowledge_base();
    ProjectAnalyzer::new().analyze_units(&[unit], &kb, baseline)
}

/// A tracker class whose `locate` method has `body`
fn tracker(annotations: &str, body: &str) -> String {
    format!(
        r#"package test.pkg;

import android.Manifest;
import android.content.pm.PackageManager;
import android.location.LocationManager;
import androidx.annotation.RequiresPermission;
import androidx.core.content.ContextCompat;

public class Tracker {{
    private LocationManager manager;

    {}
    void locate(android.content.Context context) {{
{}
    }}
}}
"#,
        annotations, body
    )
}

fn messages(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics.iter().map(|d| d.message.as_str()).collect()
}

// ============================================================================
// Missing permissions
// ============================================================================

#[test]
fn test_any_of_lists_alternatives_when_neither_is_declared() {
    let source = tracker("", "        manager.getLastKnownLocation(\"gps\");");
    let diagnostics = check(&ModuleBaseline::new(14, 22), &source);

    assert_eq!(
        messages(&diagnostics),
        vec![
            "Missing permissions required by LocationManager.getLastKnownLocation: \
             android.permission.ACCESS_FINE_LOCATION or android.permission.ACCESS_COARSE_LOCATION"
        ]
    );
    assert_eq!(diagnostics[0].category, IssueCategory::MissingPermission);
    assert_eq!(diagnostics[0].severity, Severity::Error);
}

#[test]
fn test_any_of_is_satisfied_by_either_declaration() {
    let source = tracker("", "        manager.getLastKnownLocation(\"gps\");");
    for permission in [FINE, COARSE] {
        let baseline = ModuleBaseline::new(14, 22).with_permissions([permission]);
        assert!(check(&baseline, &source).is_empty(), "{} should satisfy", permission);
    }
}

#[test]
fn test_all_of_lists_only_what_is_missing() {
    let source = r#"package test.pkg;

import android.accounts.AccountManager;

public class Sync {
    void sync(AccountManager accounts) {
        accounts.addAccountExplicitly(null, null, null);
    }
}
"#;
    let baseline = ModuleBaseline::new(14, 22).with_permissions([READ_CONTACTS]);
    assert_eq!(
        messages(&check(&baseline, source)),
        vec!["Missing permissions required by AccountManager.addAccountExplicitly: android.permission.WRITE_CONTACTS"]
    );
}

#[test]
fn test_caller_with_same_requirement_is_not_reported() {
    let source = r#"package test.pkg;

import android.Manifest;
import android.accounts.AccountManager;
import androidx.annotation.RequiresPermission;

public class Sync {
    @RequiresPermission(allOf = {Manifest.permission.READ_CONTACTS, Manifest.permission.WRITE_CONTACTS})
    void sync(AccountManager accounts) {
        accounts.addAccountExplicitly(null, null, null);
    }
}
"#;
    assert!(check(&ModuleBaseline::new(14, 23), source).is_empty());
}

#[test]
fn test_caller_requirement_implies_an_alternative() {
    let source = tracker(
        "@RequiresPermission(Manifest.permission.ACCESS_FINE_LOCATION)",
        "        manager.getLastKnownLocation(\"gps\");",
    );
    assert!(check(&ModuleBaseline::new(14, 23), &source).is_empty());
}

#[test]
fn test_source_requirement_is_checked_at_callers() {
    let source = r#"package test.pkg;

import android.Manifest;
import androidx.annotation.RequiresPermission;

public class Shooter {
    @RequiresPermission(Manifest.permission.CAMERA)
    void capture() {}

    void shoot() {
        capture();
    }
}
"#;
    let diagnostics = check(&ModuleBaseline::new(14, 22), source);
    assert_eq!(
        messages(&diagnostics),
        vec!["Missing permissions required by Shooter.capture: android.permission.CAMERA"]
    );
    assert_eq!(diagnostics[0].span.line, 11);
}

#[test]
fn test_conditional_requirement_is_informational() {
    let source = r#"package test.pkg;

import android.os.Vibrator;

public class Buzz {
    void buzz(Vibrator vibrator) {
        vibrator.vibrate(100);
    }
}
"#;
    let diagnostics = check(&ModuleBaseline::new(14, 23), source);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Info);
    assert_eq!(
        diagnostics[0].message,
        "Missing permissions required by Vibrator.vibrate: android.permission.VIBRATE"
    );
    assert!(!diagnostics[0].is_error());
}

#[test]
fn test_api_range_limits_requirement() {
    let source = r#"package test.pkg;

import android.bluetooth.BluetoothAdapter;

public class Radio {
    void on(BluetoothAdapter adapter) {
        adapter.enable();
    }
}
"#;
    assert_eq!(check(&ModuleBaseline::new(14, 22), source).len(), 1);
    assert!(check(&ModuleBaseline::new(23, 23), source).is_empty());
}

#[test]
fn test_suppressed_missing_permission() {
    let source = tracker(
        "@android.annotation.SuppressLint(\"MissingPermission\")",
        "        manager.getLastKnownLocation(\"gps\");",
    );
    assert!(check(&ModuleBaseline::new(14, 22), &source).is_empty());
}

// ============================================================================
// Revocable permissions
// ============================================================================

fn revocable_baseline() -> ModuleBaseline {
    ModuleBaseline::new(14, 23).with_permissions([COARSE])
}

#[test]
fn test_unchecked_revocable_permission() {
    let source = tracker("", "        manager.getLastKnownLocation(\"gps\");");
    let diagnostics = check(&revocable_baseline(), &source);

    assert_eq!(messages(&diagnostics), vec![REVOCABLE]);
    assert_eq!(diagnostics[0].category, IssueCategory::RevocablePermission);

    // Before runtime permissions nothing can be revoked
    let legacy = ModuleBaseline::new(14, 22).with_permissions([COARSE]);
    assert!(check(&legacy, &source).is_empty());
}

#[test]
fn test_runtime_check_guards_call() {
    let source = tracker(
        "",
        "        if (ContextCompat.checkSelfPermission(context, Manifest.permission.ACCESS_COARSE_LOCATION)
                == PackageManager.PERMISSION_GRANTED) {
            manager.getLastKnownLocation(\"gps\");
        }",
    );
    assert!(check(&revocable_baseline(), &source).is_empty());
}

#[test]
fn test_denied_check_with_early_return() {
    let source = tracker(
        "",
        "        if (ContextCompat.checkSelfPermission(context, Manifest.permission.ACCESS_FINE_LOCATION)
                != PackageManager.PERMISSION_GRANTED) {
            return;
        }
        manager.getLastKnownLocation(\"gps\");",
    );
    assert!(check(&revocable_baseline(), &source).is_empty());
}

#[test]
fn test_security_exception_handler() {
    let source = tracker(
        "",
        "        try {
            manager.getLastKnownLocation(\"gps\");
        } catch (SecurityException e) {
            e.printStackTrace();
        }",
    );
    assert!(check(&revocable_baseline(), &source).is_empty());

    let unrelated = tracker(
        "",
        "        try {
            manager.getLastKnownLocation(\"gps\");
        } catch (IllegalStateException e) {
            e.printStackTrace();
        }",
    );
    assert_eq!(messages(&check(&revocable_baseline(), &unrelated)), vec![REVOCABLE]);
}

#[test]
fn test_throws_clause_handles_security_exception() {
    let source = r#"package test.pkg;

import android.location.LocationManager;

public class Tracker {
    void locate(LocationManager manager) throws SecurityException {
        manager.getLastKnownLocation("gps");
    }
}
"#;
    assert!(check(&revocable_baseline(), source).is_empty());
}

#[test]
fn test_lambda_is_not_covered_by_enclosing_handler() {
    let source = tracker(
        "",
        "        try {
            Runnable later = () -> manager.getLastKnownLocation(\"gps\");
        } catch (SecurityException e) {
            e.printStackTrace();
        }",
    );
    assert_eq!(messages(&check(&revocable_baseline(), &source)), vec![REVOCABLE]);
}

#[test]
fn test_custom_revocable_permission() {
    let source = r#"package test.pkg;

import com.example.Vault;

public class Safe {
    void open(Vault vault) {
        vault.unlock();
    }
}
"#;
    let kb = KnowledgeBase::new()
        .with_class(ApiClass::new("java.lang.Object", 1))
        .with_class(
            ApiClass::new("com.example.Vault", 1)
                .extends("java.lang.Object")
                .method("unlock", 0, 1),
        )
        .with_permission(
            SymbolDescriptor::method("com.example.Vault", "unlock"),
            PermissionRequirement::new(PermissionExpr::single("com.example.permission.VAULT")),
        );
    let unit = JavaParser::new().parse(Path::new("Safe.java"), source).unwrap();
    let units = [unit];

    let plain = ModuleBaseline::new(14, 23).with_permissions(["com.example.permission.VAULT"]);
    assert!(ProjectAnalyzer::new().analyze_units(&units, &kb, &plain).is_empty());

    let revocable = plain.clone().with_revocable_permissions(["com.example.permission.VAULT"]);
    assert_eq!(
        messages(&ProjectAnalyzer::new().analyze_units(&units, &kb, &revocable)),
        vec![REVOCABLE]
    );
}

#[test]
fn test_exclusive_requirement_fails_when_both_are_held() {
    let source = r#"package test.pkg;

import android.bluetooth.BluetoothDevice;

public class Pairing {
    void pair(BluetoothDevice device) {
        device.createBond();
    }
}
"#;
    let kb = KnowledgeBase::new()
        .with_class(ApiClass::new("java.lang.Object", 1))
        .with_class(
            ApiClass::new("android.bluetooth.BluetoothDevice", 5)
                .extends("java.lang.Object")
                .method("createBond", 0, 1),
        )
        .with_permission(
            SymbolDescriptor::method("android.bluetooth.BluetoothDevice", "createBond"),
            PermissionRequirement::new(PermissionExpr::xor(
                PermissionExpr::single("android.permission.BLUETOOTH"),
                PermissionExpr::single("android.permission.BLUETOOTH_PRIVILEGED"),
            )),
        );
    let unit = JavaParser::new().parse(Path::new("Pairing.java"), source).unwrap();
    let units = [unit];
    let run = |held: &[&str]| {
        let baseline = ModuleBaseline::new(14, 22).with_permissions(held.iter().copied());
        ProjectAnalyzer::new().analyze_units(&units, &kb, &baseline)
    };
    let expected = "Missing permissions required by BluetoothDevice.createBond: \
                    android.permission.BLUETOOTH xor android.permission.BLUETOOTH_PRIVILEGED";

    assert!(run(&["android.permission.BLUETOOTH"]).is_empty());
    assert!(run(&["android.permission.BLUETOOTH_PRIVILEGED"]).is_empty());
    assert_eq!(messages(&run(&[])), vec![expected]);

    let both = run(&["android.permission.BLUETOOTH", "android.permission.BLUETOOTH_PRIVILEGED"]);
    assert_eq!(messages(&both), vec![expected]);
    assert_eq!(both[0].category, IssueCategory::MissingPermission);
}
