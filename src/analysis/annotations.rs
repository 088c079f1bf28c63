// Interpretation of the annotations that seed or declare requirements

use super::IssueCategory;
use crate::kb::{api_level_for_codename, ApiRange, PermissionExpr, PermissionRequirement};
use crate::parser::ast::{Annotation, Expr, ExprKind, Literal};

/// Version level of a literal or `VERSION_CODES` constant
pub fn api_level(expr: &Expr) -> Option<u32> {
    if let Some(value) = expr.int_literal() {
        return u32::try_from(value).ok();
    }
    let name = expr.last_name()?;
    api_level_for_codename(name)
}

/// Permission name of a string literal or `Manifest.permission.X` reference
pub fn permission_name(expr: &Expr) -> Option<String> {
    if let Some(name) = expr.string_literal() {
        return Some(name.to_string());
    }
    let dotted = expr.dotted_name()?;
    let (prefix, name) = dotted.rsplit_once('.')?;
    if prefix == "permission" || prefix.ends_with("Manifest.permission") {
        return Some(format!("android.permission.{}", name));
    }
    None
}

/// String values of a single string or an array of strings
fn string_values(expr: &Expr) -> Vec<String> {
    match &expr.kind {
        ExprKind::ArrayInit(items) => items
            .iter()
            .filter_map(|i| i.string_literal().map(str::to_string))
            .collect(),
        _ => expr.string_literal().map(str::to_string).into_iter().collect(),
    }
}

fn permission_values(expr: &Expr) -> Vec<String> {
    match &expr.kind {
        ExprKind::ArrayInit(items) => items.iter().filter_map(permission_name).collect(),
        _ => permission_name(expr).into_iter().collect(),
    }
}

fn find<'a>(annotations: &'a [Annotation], simple_name: &str) -> impl Iterator<Item = &'a Annotation> + 'a {
    let simple_name = simple_name.to_string();
    annotations
        .iter()
        .filter(move |a| a.simple_name() == simple_name)
}

/// Level declared by `@RequiresApi(v)` or `@RequiresApi(api = v)`
pub fn requires_api(annotations: &[Annotation]) -> Option<u32> {
    find(annotations, "RequiresApi")
        .filter_map(|a| a.arg("api").or_else(|| a.arg("value")))
        .filter_map(api_level)
        .max()
}

/// Level declared by `@TargetApi(v)`
pub fn target_api(annotations: &[Annotation]) -> Option<u32> {
    find(annotations, "TargetApi")
        .filter_map(|a| a.arg("value"))
        .filter_map(api_level)
        .max()
}

/// Version floor an annotated scope may assume
pub fn api_floor(annotations: &[Annotation]) -> Option<u32> {
    requires_api(annotations).max(target_api(annotations))
}

/// Issue categories silenced by `@SuppressLint` or `@SuppressWarnings`
pub fn suppressed_categories(annotations: &[Annotation]) -> Vec<IssueCategory> {
    let mut categories = Vec::new();
    for annotation in annotations
        .iter()
        .filter(|a| matches!(a.simple_name(), "SuppressLint" | "SuppressWarnings"))
    {
        let Some(value) = annotation.arg("value") else {
            continue;
        };
        for id in string_values(value) {
            if id == "all" {
                categories.extend(IssueCategory::suppressible());
            } else if let Some(category) = IssueCategory::from_id(&id) {
                categories.push(category);
            }
        }
    }
    categories.sort();
    categories.dedup();
    categories
}

/// Requirement declared by `@RequiresPermission`
pub fn requires_permission(annotations: &[Annotation]) -> Option<PermissionRequirement> {
    let annotation = find(annotations, "RequiresPermission").next()?;

    let expr = if let Some(value) = annotation.arg("value") {
        let names = permission_values(value);
        match names.as_slice() {
            [] => return None,
            [single] => PermissionExpr::single(single.as_str()),
            _ => PermissionExpr::all_of(names),
        }
    } else if let Some(all_of) = annotation.arg("allOf") {
        PermissionExpr::all_of(permission_values(all_of))
    } else if let Some(any_of) = annotation.arg("anyOf") {
        PermissionExpr::any_of(permission_values(any_of))
    } else {
        return None;
    };

    let mut requirement = PermissionRequirement::new(expr);
    if let Some(apis) = annotation
        .arg("apis")
        .and_then(|a| a.string_literal())
        .and_then(|a| a.parse::<ApiRange>().ok())
    {
        requirement = requirement.with_apis(apis);
    }
    let conditional = annotation
        .arg("conditional")
        .map_or(false, |c| matches!(c.kind, ExprKind::Literal(Literal::Bool(true))));
    if conditional {
        requirement = requirement.conditional();
    }

    Some(requirement)
}
