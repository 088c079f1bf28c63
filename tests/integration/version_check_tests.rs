//! Integration tests for API level checks
//!
//! Each test parses inline Java sources, analyzes them against a small
//! in-memory knowledge base and asserts on the exact diagnostics.

use apicheck::analysis::{Diagnostic, IssueCategory, ProjectAnalyzer, Severity};
use apicheck::kb::ApiClass;
use apicheck::parser::{JavaParser, Parser};
use apicheck::{KnowledgeBase, ModuleBaseline};
use std::path::Path;

const GET_ACTION_BAR: &str = "Call requires API level 11 (current min is 1): android.app.Activity#getActionBar";

fn knowledge_base() -> KnowledgeBase {
    KnowledgeBase::new()
        .with_class(ApiClass::new("java.lang.Object", 1))
        .with_class(ApiClass::new("java.lang.Enum", 1).extends("java.lang.Object"))
        .with_class(
            ApiClass::new("android.app.Activity", 1)
                .extends("java.lang.Object")
                .method_returning("getActionBar", 0, 11, "android.app.ActionBar")
                .method("setContentView", 1, 1),
        )
        .with_class(
            ApiClass::new("android.app.ActionBar", 11)
                .extends("java.lang.Object")
                .method("setHomeButtonEnabled", 1, 14),
        )
        .with_class(
            ApiClass::new("android.view.View", 1)
                .extends("java.lang.Object")
                .field("MEASURED_STATE_MASK", 11)
                .method("setAlpha", 1, 11),
        )
        .with_class(ApiClass::new("android.animation.AnimatorSet", 11).extends("java.lang.Object"))
        .with_class(
            ApiClass::new("java.text.SimpleDateFormat", 1)
                .extends("java.lang.Object")
                .constructor(1, 1),
        )
        .with_class(
            ApiClass::new("android.graphics.PorterDuff.Mode", 1)
                .extends("java.lang.Enum")
                .field("OVERLAY", 11),
        )
}

fn check_with(min_sdk: u32, sources: &[(&str, &str)]) -> Vec<Diagnostic> {
    check_baseline(&ModuleBaseline::new(min_sdk, min_sdk), sources)
}

fn check_baseline(baseline: &ModuleBaseline, sources: &[(&str, &str)]) -> Vec<Diagnostic> {
    let parser = JavaParser::new();
    let units: Vec<_> = sources
        .iter()
        .map(|(name, source)| parser.parse(Path::new(name), source).unwrap())
        .collect();
    let kb = knowledge_base();
    ProjectAnalyzer::new().analyze_units(&units, &kb, baseline)
}

/// Wrap a method body in an activity subclass
fn activity(body: &str) -> String {
    format!(
        r#"package test.pkg;

import android.app.Activity;
import android.os.Build;

public class MainActivity extends Activity {{
    void onStart() {{
{}
    }}
}}
"#,
        body
    )
}

fn messages(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics.iter().map(|d| d.message.as_str()).collect()
}

// ============================================================================
// Guard thresholds
// ============================================================================

#[test]
fn test_unguarded_call_is_reported() {
    let source = activity("        getActionBar();");
    let diagnostics = check_with(1, &[("MainActivity.java", &source)]);

    assert_eq!(messages(&diagnostics), vec![GET_ACTION_BAR]);
    assert_eq!(diagnostics[0].category, IssueCategory::NewApi);
    assert_eq!(diagnostics[0].severity, Severity::Error);
    assert_eq!(diagnostics[0].span.line, 8);
}

#[test]
fn test_at_least_guard_covers_call() {
    let source = activity(
        "        if (Build.VERSION.SDK_INT >= 11) {
            getActionBar();
        }",
    );
    assert!(check_with(1, &[("MainActivity.java", &source)]).is_empty());
}

#[test]
fn test_strict_comparison_boundary() {
    let source = activity(
        "        if (Build.VERSION.SDK_INT > 10) {
            getActionBar();
        }",
    );
    assert!(check_with(1, &[("MainActivity.java", &source)]).is_empty());
}

#[test]
fn test_insufficient_guard_is_reported() {
    let source = activity(
        "        if (Build.VERSION.SDK_INT >= 9) {
            getActionBar();
        }",
    );
    let diagnostics = check_with(1, &[("MainActivity.java", &source)]);
    // The message cites the declared minimum, not the insufficient guard
    assert_eq!(messages(&diagnostics), vec![GET_ACTION_BAR]);
}

#[test]
fn test_version_codes_constant() {
    let source = activity(
        "        if (Build.VERSION.SDK_INT >= Build.VERSION_CODES.HONEYCOMB) {
            getActionBar();
        }",
    );
    assert!(check_with(1, &[("MainActivity.java", &source)]).is_empty());
}

#[test]
fn test_min_sdk_covers_call() {
    let source = activity("        getActionBar();");
    assert!(check_with(11, &[("MainActivity.java", &source)]).is_empty());
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_else_branch_is_not_covered() {
    let source = activity(
        "        if (Build.VERSION.SDK_INT >= 11) {
            getActionBar();
        } else {
            getActionBar();
        }",
    );
    let diagnostics = check_with(1, &[("MainActivity.java", &source)]);
    assert_eq!(messages(&diagnostics), vec![GET_ACTION_BAR]);
    assert_eq!(diagnostics[0].span.line, 11);
}

#[test]
fn test_early_return_covers_rest_of_method() {
    let source = activity(
        "        if (Build.VERSION.SDK_INT < 11) {
            return;
        }
        getActionBar();",
    );
    assert!(check_with(1, &[("MainActivity.java", &source)]).is_empty());
}

#[test]
fn test_negated_guard_else_branch() {
    let source = activity(
        "        if (!(Build.VERSION.SDK_INT >= 11)) {
            setContentView(0);
        } else {
            getActionBar();
        }",
    );
    assert!(check_with(1, &[("MainActivity.java", &source)]).is_empty());
}

#[test]
fn test_short_circuit_and_ternary() {
    let source = activity(
        "        boolean shown = Build.VERSION.SDK_INT >= 11 && getActionBar() != null;
        Object bar = Build.VERSION.SDK_INT >= 11 ? getActionBar() : null;",
    );
    assert!(check_with(1, &[("MainActivity.java", &source)]).is_empty());
}

#[test]
fn test_guard_variable() {
    let source = activity(
        "        boolean modern = Build.VERSION.SDK_INT >= 11;
        if (modern) {
            getActionBar();
        }",
    );
    assert!(check_with(1, &[("MainActivity.java", &source)]).is_empty());
}

#[test]
fn test_redundant_guard_changes_nothing() {
    let single = activity(
        "        if (Build.VERSION.SDK_INT >= 11) {
            getActionBar().setHomeButtonEnabled(true);
        }",
    );
    let nested = activity(
        "        if (Build.VERSION.SDK_INT >= 11) {
            if (Build.VERSION.SDK_INT >= 11) {
                getActionBar().setHomeButtonEnabled(true);
            }
        }",
    );
    let repeated = activity(
        "        if (Build.VERSION.SDK_INT >= 11 && Build.VERSION.SDK_INT >= 11) {
            getActionBar().setHomeButtonEnabled(true);
        }",
    );
    let expected = check_with(1, &[("MainActivity.java", &single)]);
    assert_eq!(expected.len(), 1);
    for source in [&nested, &repeated] {
        let diagnostics = check_with(1, &[("MainActivity.java", source)]);
        assert_eq!(messages(&diagnostics), messages(&expected));
    }
}

#[test]
fn test_raising_min_never_adds_diagnostics() {
    let source = r#"package test.pkg;

import android.app.Activity;
import android.os.Build;
import android.view.View;

public class MainActivity extends Activity {
    void a() { getActionBar(); }

    void b() {
        if (Build.VERSION.SDK_INT >= 9) {
            getActionBar().setHomeButtonEnabled(true);
        }
    }

    void c() {
        if (Build.VERSION.SDK_INT < 14) {
            return;
        }
        getActionBar().setHomeButtonEnabled(true);
    }

    int d() { return View.MEASURED_STATE_MASK; }
}
"#;
    let key = |d: &Diagnostic| (d.span.line, d.span.column, d.category);
    let mut previous: Option<Vec<_>> = None;
    for min_sdk in 1..=16 {
        let current: Vec<_> = check_with(min_sdk, &[("MainActivity.java", source)])
            .iter()
            .map(key)
            .collect();
        if let Some(previous) = &previous {
            assert!(
                current.iter().all(|k| previous.contains(k)),
                "min {} reported {:?}, not a subset of {:?}",
                min_sdk,
                current,
                previous
            );
        }
        previous = Some(current);
    }
    assert_eq!(previous, Some(Vec::new()));
}

#[test]
fn test_chained_call_needs_both_levels() {
    let source = activity(
        "        if (Build.VERSION.SDK_INT >= 11) {
            getActionBar().setHomeButtonEnabled(true);
        }",
    );
    let diagnostics = check_with(1, &[("MainActivity.java", &source)]);
    assert_eq!(
        messages(&diagnostics),
        vec!["Call requires API level 14 (current min is 1): android.app.ActionBar#setHomeButtonEnabled"]
    );
}

#[test]
fn test_lambda_inherits_guard_of_creation_point() {
    let source = activity(
        "        if (Build.VERSION.SDK_INT >= 11) {
            Runnable guarded = () -> getActionBar();
        }
        Runnable unguarded = () -> getActionBar();",
    );
    let diagnostics = check_with(1, &[("MainActivity.java", &source)]);
    assert_eq!(messages(&diagnostics), vec![GET_ACTION_BAR]);
    assert_eq!(diagnostics[0].span.line, 11);
}

// ============================================================================
// Guard variables
// ============================================================================

#[test]
fn test_guard_field() {
    let source = r#"package test.pkg;

import android.app.Activity;
import android.os.Build;

public class MainActivity extends Activity {
    private static final boolean MODERN = Build.VERSION.SDK_INT >= 11;

    void show() {
        if (MODERN) {
            getActionBar();
        }
    }
}
"#;
    assert!(check_with(1, &[("MainActivity.java", source)]).is_empty());
}

#[test]
fn test_parameter_shadowing_guard_field_gives_no_protection() {
    let source = r#"package test.pkg;

import android.app.Activity;
import android.os.Build;

public class MainActivity extends Activity {
    private static final boolean MODERN = Build.VERSION.SDK_INT >= 11;

    void show(boolean MODERN) {
        if (MODERN) {
            getActionBar();
        }
    }

    void hide() {
        boolean MODERN = getIntent() != null;
        if (MODERN) {
            getActionBar();
        }
    }
}
"#;
    let diagnostics = check_with(1, &[("MainActivity.java", source)]);
    assert_eq!(messages(&diagnostics), vec![GET_ACTION_BAR, GET_ACTION_BAR]);
    assert_eq!(diagnostics[0].span.line, 11);
    assert_eq!(diagnostics[1].span.line, 18);
}

/// An activity with a mutable guard field `sModern`, a use guarded by it and
/// `extra` members
fn mutable_guard_activity(extra: &str) -> String {
    format!(
        r#"package test.pkg;

import android.app.Activity;
import android.os.Build;

public class MainActivity extends Activity {{
    private static boolean sModern = Build.VERSION.SDK_INT >= 11;

    void show() {{
        if (sModern) {{
            getActionBar();
        }}
    }}

{}
}}
"#,
        extra
    )
}

#[test]
fn test_reassigned_guard_field_gives_no_protection() {
    let untouched = mutable_guard_activity("    void other() {}");
    assert!(check_with(1, &[("MainActivity.java", &untouched)]).is_empty());

    let writers = [
        "    Runnable reset = () -> { sModern = true; };",
        "    void reset() {
        new Runnable() {
            public void run() { sModern = true; }
        }.run();
    }",
        "    void reset() {
        class Resetter { void run() { sModern = true; } }
        new Resetter().run();
    }",
        "    int reset(int kind) {
        return switch (kind) {
            case 1 -> {
                sModern = true;
                yield 1;
            }
            default -> 0;
        };
    }",
    ];
    for writer in writers {
        let source = mutable_guard_activity(writer);
        let diagnostics = check_with(1, &[("MainActivity.java", &source)]);
        assert_eq!(messages(&diagnostics), vec![GET_ACTION_BAR], "writer: {}", writer);
        assert_eq!(diagnostics[0].span.line, 11);
    }
}

// ============================================================================
// Annotations
// ============================================================================

#[test]
fn test_annotation_floor_is_the_reported_min() {
    let source = r#"package test.pkg;

import android.annotation.TargetApi;
import android.app.Activity;
import android.os.Build;

public class MainActivity extends Activity {
    @TargetApi(11)
    void a() {
        getActionBar().setHomeButtonEnabled(true);
        if (Build.VERSION.SDK_INT >= 13) {
            getActionBar().setHomeButtonEnabled(true);
        }
    }
}
"#;
    let expected = "Call requires API level 14 (current min is 11): android.app.ActionBar#setHomeButtonEnabled";
    let diagnostics = check_with(4, &[("MainActivity.java", source)]);
    assert_eq!(messages(&diagnostics), vec![expected, expected]);
}

#[test]
fn test_target_api_and_requires_api_raise_floor() {
    let source = r#"package test.pkg;

import android.annotation.TargetApi;
import android.app.Activity;
import androidx.annotation.RequiresApi;

public class MainActivity extends Activity {
    @TargetApi(11)
    void a() { getActionBar(); }

    @RequiresApi(api = 14)
    void b() { getActionBar().setHomeButtonEnabled(true); }
}
"#;
    assert!(check_with(1, &[("MainActivity.java", source)]).is_empty());
}

#[test]
fn test_suppression_is_per_category() {
    let source = r#"package test.pkg;

import android.annotation.SuppressLint;
import android.app.Activity;
import android.view.View;

public class MainActivity extends Activity {
    @SuppressLint("NewApi")
    void a() { getActionBar(); }

    @SuppressLint("InlinedApi")
    void b() { getActionBar(); }

    @SuppressLint("NewApi")
    int c() { return View.MEASURED_STATE_MASK; }
}
"#;
    let diagnostics = check_with(1, &[("MainActivity.java", source)]);
    let found: Vec<_> = diagnostics.iter().map(|d| (d.category, d.span.line)).collect();
    assert_eq!(
        found,
        vec![(IssueCategory::NewApi, 12), (IssueCategory::InlinedApi, 15)]
    );
}

#[test]
fn test_requires_api_on_source_method_is_checked_at_callers() {
    let source = r#"package test.pkg;

import androidx.annotation.RequiresApi;

public class Helper {
    @RequiresApi(21)
    static void elevate() {}

    void caller() {
        elevate();
    }
}
"#;
    let diagnostics = check_with(1, &[("Helper.java", source)]);
    assert_eq!(
        messages(&diagnostics),
        vec!["Call requires API level 21 (current min is 1): test.pkg.Helper#elevate"]
    );
}

// ============================================================================
// Other kinds of use
// ============================================================================

#[test]
fn test_inlined_constant_is_a_warning() {
    let source = r#"package test.pkg;

import android.view.View;

public class Sizes {
    int mask() {
        return View.MEASURED_STATE_MASK;
    }
}
"#;
    let diagnostics = check_with(4, &[("Sizes.java", source)]);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].category, IssueCategory::InlinedApi);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert_eq!(
        diagnostics[0].message,
        "Field requires API level 11 (current min is 4): android.view.View#MEASURED_STATE_MASK"
    );
}

#[test]
fn test_class_uses_and_enum_cases() {
    let source = r#"package test.pkg;

import android.animation.AnimatorSet;
import android.graphics.PorterDuff;

public class Uses {
    void m(Object o, PorterDuff.Mode mode) {
        boolean b = o instanceof AnimatorSet;
        switch (mode) {
            case OVERLAY:
                break;
            default:
                break;
        }
    }
}
"#;
    let diagnostics = check_with(1, &[("Uses.java", source)]);
    assert_eq!(
        messages(&diagnostics),
        vec![
            "Class requires API level 11 (current min is 1): android.animation.AnimatorSet",
            "Enum value requires API level 11 (current min is 1): android.graphics.PorterDuff.Mode#OVERLAY",
        ]
    );
}

#[test]
fn test_try_with_resources() {
    let source = r#"package test.pkg;

import java.io.FileInputStream;

public class Files {
    void read() throws Exception {
        try (FileInputStream in = new FileInputStream("data")) {
            in.read();
        }
    }
}
"#;
    let diagnostics = check_with(4, &[("Files.java", source)]);
    assert_eq!(
        messages(&diagnostics),
        vec!["Try-with-resources requires API level 19 (current min is 4)"]
    );
    assert!(check_with(19, &[("Files.java", source)]).is_empty());
}

#[test]
fn test_supertype_from_another_unit() {
    let base = r#"package test.pkg;

import android.app.Activity;

public class BaseActivity extends Activity {
}
"#;
    let screen = r#"package test.pkg;

public class Screen extends BaseActivity {
    void show() {
        getActionBar();
    }
}
"#;
    let diagnostics = check_with(1, &[("BaseActivity.java", base), ("Screen.java", screen)]);
    assert_eq!(messages(&diagnostics), vec![GET_ACTION_BAR]);
    assert!(diagnostics[0].path.ends_with("Screen.java"));
}

#[test]
fn test_syntax_error_is_reported_for_that_unit_only() {
    let broken = "package test.pkg;\nclass Broken { void m( { }\n";
    let source = activity("        getActionBar();");
    let diagnostics = check_with(1, &[("Broken.java", broken), ("MainActivity.java", &source)]);

    let categories: Vec<_> = diagnostics.iter().map(|d| d.category).collect();
    assert_eq!(categories, vec![IssueCategory::ParserError, IssueCategory::NewApi]);
}

#[test]
fn test_date_format_pattern_letters() {
    let source = r#"package test.pkg;

import java.text.SimpleDateFormat;

public class Dates {
    void format() {
        new SimpleDateFormat("yyyy-MM-dd LL");
        new SimpleDateFormat("cccc");
        new SimpleDateFormat("yyyy-MM-dd 'Label'");
    }
}
"#;
    let diagnostics = check_with(4, &[("Dates.java", source)]);
    assert_eq!(
        messages(&diagnostics),
        vec![
            "The pattern character 'L' requires API level 9 (current min is 4) : \"yyyy-MM-dd LL\"",
            "The pattern character 'c' requires API level 9 (current min is 4) : \"cccc\"",
        ]
    );
    assert!(diagnostics.iter().all(|d| d.category == IssueCategory::NewApi));
    assert_eq!(diagnostics[0].span.line, 7);
    assert!(check_with(10, &[("Dates.java", source)]).is_empty());
}

// ============================================================================
// Overrides
// ============================================================================

#[test]
fn test_override_of_method_newer_than_compile_target() {
    let source = r#"package test.pkg;

import android.annotation.SuppressLint;
import android.app.ActionBar;
import android.app.Activity;

public class ApiCallTest11 extends Activity {
    public ActionBar getActionBar() {
        return null;
    }

    public void setContentView(int layout) {
    }
}
"#;
    let sources = [("ApiCallTest11.java", source)];

    // Unknown compile target: nothing to compare against
    assert!(check_baseline(&ModuleBaseline::new(1, 1), &sources).is_empty());

    let diagnostics = check_baseline(&ModuleBaseline::new(1, 1).with_compile_sdk(Some(3)), &sources);
    assert_eq!(
        messages(&diagnostics),
        vec!["This method is not overriding anything with the current build target, but will in API level 11 (current target is 3): test.pkg.ApiCallTest11#getActionBar"]
    );
    assert_eq!(diagnostics[0].category, IssueCategory::Override);
    assert_eq!(diagnostics[0].severity, Severity::Error);
    assert_eq!((diagnostics[0].span.line, diagnostics[0].span.column), (8, 22));

    let current = ModuleBaseline::new(1, 1).with_compile_sdk(Some(11));
    assert!(check_baseline(&current, &sources).is_empty());

    let suppressed = source.replace(
        "    public ActionBar getActionBar()",
        "    @SuppressLint(\"Override\")\n    public ActionBar getActionBar()",
    );
    let baseline = ModuleBaseline::new(1, 1).with_compile_sdk(Some(3));
    assert!(check_baseline(&baseline, &[("ApiCallTest11.java", &suppressed)]).is_empty());
}
