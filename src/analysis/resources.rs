//! Version checks for XML resources: view tags, drawable roots, platform
//! resource references, style items and attributes the platform ignores

use super::{Diagnostic, IssueCategory};
use crate::baseline::ModuleBaseline;
use crate::kb::{api_level_for_codename, KnowledgeBase, Requirement, SymbolDescriptor};
use crate::parser::ast::Span;
use crate::parser::xml::{ResourceAttribute, ResourceDocument, ResourceElement, ResourceFolder};
use std::path::Path;
use tracing::trace;

/// Packages searched for unqualified view tags
const VIEW_PACKAGES: &[&str] = &["android.widget.", "android.view.", "android.webkit."];

/// Layout tags that do not name a view class
const NON_VIEW_TAGS: &[&str] = &["merge", "include", "requestFocus", "fragment", "tag", "data", "layout"];

/// Level of the `<tag>` layout element
const TAG_ELEMENT_LEVEL: u32 = 21;

/// Drawable root elements and the levels that introduced them
const DRAWABLE_ROOTS: &[(&str, u32)] = &[
    ("ripple", 21),
    ("vector", 21),
    ("animated-selector", 21),
    ("animated-vector", 21),
];

/// Level from which the relative padding attributes are safe on every device
const RTL_PADDING_LEVEL: u32 = 17;

const RTL_PADDING_ATTRIBUTES: &[&str] = &["paddingStart", "paddingEnd"];

/// Checks one resource file against the knowledge base
pub(crate) struct ResourceChecker<'a> {
    path: &'a Path,
    kb: &'a KnowledgeBase,
    baseline: &'a ModuleBaseline,
    folder: Option<ResourceFolder>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ResourceChecker<'a> {
    pub fn new(path: &'a Path, kb: &'a KnowledgeBase, baseline: &'a ModuleBaseline) -> Self {
        let folder = path
            .parent()
            .and_then(|dir| dir.parent())
            .filter(|res| res.file_name().map_or(false, |name| name == "res"))
            .and_then(|_| ResourceFolder::from_path(path));
        Self {
            path,
            kb,
            baseline,
            folder,
            diagnostics: Vec::new(),
        }
    }

    pub fn run(mut self, document: &ResourceDocument) -> Vec<Diagnostic> {
        let folder_level = self.folder.as_ref().and_then(|f| f.version);
        let folder_type = self.folder.as_ref().map(|f| f.folder_type.clone());

        let mut floors: Vec<u32> = Vec::with_capacity(document.elements.len());
        for element in &document.elements {
            let inherited = element.parent.map_or(self.baseline.min_sdk, |p| floors[p]);
            let floor = target_api(element).map_or(inherited, |level| inherited.max(level));
            floors.push(floor);

            let floor = floor.max(folder_level.unwrap_or(0));
            match folder_type.as_deref() {
                Some("layout") => {
                    self.check_view_tag(element, floor);
                    self.check_attribute_names(element, floor, folder_level);
                }
                Some("drawable") => {
                    self.check_drawable_root(element, floor);
                    self.check_attribute_names(element, floor, folder_level);
                }
                Some("values") => self.check_values_element(element, floor),
                Some(_) => self.check_attribute_names(element, floor, folder_level),
                None => {}
            }
            for attribute in &element.attributes {
                self.check_reference(attribute, floor);
            }
        }
        self.diagnostics
    }

    fn requirement(&self, descriptor: &SymbolDescriptor) -> Option<u32> {
        self.kb.lookup(descriptor).into_iter().find_map(|r| match r {
            Requirement::Version(level) => Some(level),
            Requirement::Permission(_) => None,
        })
    }

    fn attribute_level(&self, name: &str) -> Option<u32> {
        self.requirement(&SymbolDescriptor::field("android.R.attr", name))
    }

    fn check_view_tag(&mut self, element: &ResourceElement, floor: u32) {
        let class = if element.tag == "view" {
            match element.attribute("class") {
                Some(class) => class.value.as_str(),
                None => return,
            }
        } else {
            element.tag.as_str()
        };
        if NON_VIEW_TAGS.contains(&class) {
            if class == "tag" && TAG_ELEMENT_LEVEL > floor {
                self.report(
                    element.span,
                    IssueCategory::UnusedAttribute,
                    format!(
                        "<tag> is only used in API level {} and higher (current min is {})",
                        TAG_ELEMENT_LEVEL, self.baseline.min_sdk
                    ),
                );
            }
            return;
        }

        let candidates: Vec<String> = if class.contains('.') {
            vec![class.to_string()]
        } else {
            VIEW_PACKAGES.iter().map(|p| format!("{}{}", p, class)).collect()
        };
        let Some((name, level)) = candidates.iter().find_map(|name| {
            self.kb.class(name)?;
            Some((name, self.requirement(&SymbolDescriptor::class(name))?))
        }) else {
            return;
        };
        if level <= floor {
            return;
        }
        let simple = name.rsplit('.').next().unwrap_or(name);
        self.report(
            element.span,
            IssueCategory::NewApi,
            format!(
                "View requires API level {} (current min is {}): <{}>",
                level, self.baseline.min_sdk, simple
            ),
        );
    }

    fn check_drawable_root(&mut self, element: &ResourceElement, floor: u32) {
        if !element.is_root() {
            return;
        }
        let Some(&(tag, level)) = DRAWABLE_ROOTS.iter().find(|(tag, _)| *tag == element.tag) else {
            return;
        };
        if level > floor {
            self.report(
                element.span,
                IssueCategory::NewApi,
                format!(
                    "<{}> requires API level {} (current min is {})",
                    tag, level, self.baseline.min_sdk
                ),
            );
        }
    }

    /// `android:` attributes newer than the floor are silently ignored by older platforms
    fn check_attribute_names(&mut self, element: &ResourceElement, floor: u32, folder_level: Option<u32>) {
        for attribute in &element.attributes {
            let Some(name) = attribute.android_name() else {
                continue;
            };
            if RTL_PADDING_ATTRIBUTES.contains(&name) {
                if folder_level.unwrap_or(0) < RTL_PADDING_LEVEL && floor < RTL_PADDING_LEVEL {
                    self.report(
                        attribute.span,
                        IssueCategory::NewApi,
                        format!(
                            "Attribute {} referenced here can result in a crash on some specific devices older than API {} (current min is {})",
                            name, RTL_PADDING_LEVEL, self.baseline.min_sdk
                        ),
                    );
                }
                continue;
            }
            let Some(level) = self.attribute_level(name) else {
                continue;
            };
            if level > floor {
                self.report(
                    attribute.span,
                    IssueCategory::UnusedAttribute,
                    format!(
                        "Attribute {} is only used in API level {} and higher (current min is {})",
                        name, level, self.baseline.min_sdk
                    ),
                );
            }
        }
    }

    /// Style items, style parents and item values in a values folder
    fn check_values_element(&mut self, element: &ResourceElement, floor: u32) {
        match element.tag.as_str() {
            "style" => {
                let Some(parent) = element.attribute("parent") else {
                    return;
                };
                let Some(style) = parent.value.trim().strip_prefix("android:") else {
                    return;
                };
                let descriptor = SymbolDescriptor::field("android.R.style", style.replace('.', "_"));
                if let Some(level) = self.requirement(&descriptor).filter(|&l| l > floor) {
                    self.report(
                        parent.span,
                        IssueCategory::NewApi,
                        format!(
                            "android:{} requires API level {} (current min is {})",
                            style, level, self.baseline.min_sdk
                        ),
                    );
                }
            }
            "item" => {
                if let Some(name) = element.attribute("name") {
                    if let Some(attr) = name.value.trim().strip_prefix("android:") {
                        if let Some(level) = self.attribute_level(attr).filter(|&l| l > floor) {
                            self.report(
                                name.span,
                                IssueCategory::NewApi,
                                format!(
                                    "android:{} requires API level {} (current min is {})",
                                    attr, level, self.baseline.min_sdk
                                ),
                            );
                        }
                    }
                }
                if let Some((text, span)) = &element.text {
                    if let Some(level) = self
                        .reference_level(text)
                        .map(|(_, level)| level)
                        .filter(|&l| l > floor)
                    {
                        self.report(
                            *span,
                            IssueCategory::NewApi,
                            format!(
                                "{} requires API level {} (current min is {})",
                                text, level, self.baseline.min_sdk
                            ),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    /// `@android:type/name` and `?android:[attr/]name` values
    fn check_reference(&mut self, attribute: &ResourceAttribute, floor: u32) {
        let value = attribute.value.trim();
        let Some((name, level)) = self.reference_level(value) else {
            return;
        };
        if level <= floor {
            return;
        }
        let attribute_level = attribute.android_name().and_then(|a| self.attribute_level(a));
        let message = match attribute_level {
            // The attribute is only read where the referenced resource exists
            Some(read_from) if read_from >= level => return,
            Some(read_from) if read_from > self.baseline.min_sdk => format!(
                "{} requires API level {} (current min is {}), but note that attribute {} is only used in API level {} and higher",
                name,
                level,
                self.baseline.min_sdk,
                attribute.android_name().unwrap_or(&attribute.name),
                read_from
            ),
            _ => format!(
                "{} requires API level {} (current min is {})",
                value, level, self.baseline.min_sdk
            ),
        };
        self.report(attribute.span, IssueCategory::NewApi, message);
    }

    /// Resource name and level of a platform resource reference
    fn reference_level<'v>(&self, value: &'v str) -> Option<(&'v str, u32)> {
        let (resource_type, name) = if let Some(rest) = value.strip_prefix("@android:") {
            rest.split_once('/')?
        } else if let Some(rest) = value.strip_prefix("?android:") {
            rest.split_once('/').unwrap_or(("attr", rest))
        } else {
            return None;
        };
        let owner = format!("android.R.{}", resource_type);
        let level = self.requirement(&SymbolDescriptor::field(owner, name.replace('.', "_")))?;
        Some((name, level))
    }

    fn report(&mut self, span: Span, category: IssueCategory, message: String) {
        trace!("{}: {}", category, message);
        self.diagnostics.push(Diagnostic::new(self.path, span, category, message));
    }
}

/// Level named by `tools:targetApi`, as a number or a version code name
fn target_api(element: &ResourceElement) -> Option<u32> {
    let value = element.attribute("tools:targetApi")?.value.trim().to_string();
    value.parse().ok().or_else(|| api_level_for_codename(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::ApiClass;
    use crate::parser::xml::ResourceParser;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::new()
            .with_class(ApiClass::new("android.widget.GridLayout", 14))
            .with_class(ApiClass::new("android.widget.TextView", 1))
            .with_class(ApiClass::new("android.widget.QuickContactBadge", 5))
            .with_class(
                ApiClass::new("android.R.attr", 1)
                    .field("showDividers", 11)
                    .field("layout_row", 14)
                    .field("editTextColor", 11)
                    .field("switchTextAppearance", 14)
                    .field("actionBarStyle", 11)
                    .field("dividerHorizontal", 11)
                    .field("textColor", 1)
                    .field("paddingStart", 17),
            )
            .with_class(ApiClass::new("android.R.color", 1).field("holo_red_light", 14))
            .with_class(
                ApiClass::new("android.R.style", 1)
                    .field("Theme_Holo", 11)
                    .field("Theme_Holo_Light_DarkActionBar", 14),
            )
    }

    fn check(path: &str, contents: &str, min_sdk: u32) -> Vec<Diagnostic> {
        let path = Path::new(path);
        let document = ResourceParser::new().parse(path, contents).unwrap();
        let kb = kb();
        let baseline = ModuleBaseline::new(min_sdk, min_sdk);
        ResourceChecker::new(path, &kb, &baseline).run(&document)
    }

    fn messages(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.message.as_str()).collect()
    }

    #[test]
    fn test_view_tags() {
        let layout = r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android">
    <GridLayout />
    <view class="android.widget.QuickContactBadge" />
    <TextView />
    <com.example.CustomView />
</LinearLayout>"#;
        let diagnostics = check("res/layout/main.xml", layout, 1);
        assert_eq!(
            messages(&diagnostics),
            vec![
                "View requires API level 14 (current min is 1): <GridLayout>",
                "View requires API level 5 (current min is 1): <QuickContactBadge>",
            ]
        );
        assert_eq!(diagnostics[0].span.line, 2);
        assert!(diagnostics.iter().all(|d| d.category == IssueCategory::NewApi));
    }

    #[test]
    fn test_folder_version_suppresses_but_keeps_declared_min() {
        let layout = "<LinearLayout><GridLayout /></LinearLayout>";
        assert!(check("res/layout-v14/main.xml", layout, 4).is_empty());
        assert_eq!(
            messages(&check("res/layout-v11/main.xml", layout, 4)),
            vec!["View requires API level 14 (current min is 4): <GridLayout>"]
        );
    }

    #[test]
    fn test_tools_target_api_covers_subtree() {
        let layout = r#"<LinearLayout xmlns:tools="http://schemas.android.com/tools" tools:targetApi="ICE_CREAM_SANDWICH">
    <FrameLayout><GridLayout /></FrameLayout>
</LinearLayout>"#;
        assert!(check("res/layout/main.xml", layout, 1).is_empty());
    }

    #[test]
    fn test_attribute_names() {
        let layout = r##"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android"
    android:showDividers="middle">
    <TextView android:layout_row="2" android:textColor="#fff" />
</LinearLayout>"##;
        let diagnostics = check("res/layout/main.xml", layout, 4);
        assert_eq!(
            messages(&diagnostics),
            vec![
                "Attribute showDividers is only used in API level 11 and higher (current min is 4)",
                "Attribute layout_row is only used in API level 14 and higher (current min is 4)",
            ]
        );
        assert!(diagnostics.iter().all(|d| d.category == IssueCategory::UnusedAttribute));
        assert!(diagnostics.iter().all(|d| d.severity == crate::analysis::Severity::Warning));
    }

    #[test]
    fn test_rtl_padding() {
        let layout = r#"<TextView xmlns:android="http://schemas.android.com/apk/res/android" android:paddingStart="4dp" />"#;
        let diagnostics = check("res/layout/main.xml", layout, 4);
        assert_eq!(
            messages(&diagnostics),
            vec!["Attribute paddingStart referenced here can result in a crash on some specific devices older than API 17 (current min is 4)"]
        );
        assert_eq!(diagnostics[0].category, IssueCategory::NewApi);
        assert!(check("res/layout-v17/main.xml", layout, 4).is_empty());
    }

    #[test]
    fn test_tag_element() {
        let layout = r#"<TextView xmlns:android="http://schemas.android.com/apk/res/android">
    <tag android:id="@+id/mytag" android:value="v" />
</TextView>"#;
        let diagnostics = check("res/layout/main.xml", layout, 1);
        assert_eq!(
            messages(&diagnostics),
            vec!["<tag> is only used in API level 21 and higher (current min is 1)"]
        );
        assert_eq!(diagnostics[0].category, IssueCategory::UnusedAttribute);
    }

    #[test]
    fn test_drawable_roots() {
        let ripple = r#"<ripple xmlns:android="http://schemas.android.com/apk/res/android" />"#;
        assert_eq!(
            messages(&check("res/drawable/ripple.xml", ripple, 14)),
            vec!["<ripple> requires API level 21 (current min is 14)"]
        );
        assert!(check("res/drawable-v21/ripple.xml", ripple, 14).is_empty());
    }

    #[test]
    fn test_value_references() {
        let layout = r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android">
    <View unknown="?android:attr/dividerHorizontal"
        android:background=" @android:color/holo_red_light " />
</LinearLayout>"#;
        assert_eq!(
            messages(&check("res/layout/main.xml", layout, 1)),
            vec![
                "?android:attr/dividerHorizontal requires API level 11 (current min is 1)",
                "@android:color/holo_red_light requires API level 14 (current min is 1)",
            ]
        );
    }

    #[test]
    fn test_reference_read_by_newer_attribute() {
        let layout = r#"<EditText xmlns:android="http://schemas.android.com/apk/res/android"
    android:editTextColor="?android:switchTextAppearance" />"#;
        let diagnostics = check("res/layout/main.xml", layout, 1);
        assert_eq!(
            messages(&diagnostics),
            vec![
                "Attribute editTextColor is only used in API level 11 and higher (current min is 1)",
                "switchTextAppearance requires API level 14 (current min is 1), but note that attribute editTextColor is only used in API level 11 and higher",
            ]
        );

        let covered = r#"<EditText xmlns:android="http://schemas.android.com/apk/res/android"
    android:editTextColor="?android:dividerHorizontal" />"#;
        assert_eq!(check("res/layout/main.xml", covered, 1).len(), 1);
    }

    #[test]
    fn test_styles() {
        let values = r#"<resources xmlns:android="http://schemas.android.com/apk/res/android">
    <style name="AppTheme" parent="android:Theme.Holo.Light.DarkActionBar">
        <item name="android:actionBarStyle">@style/Bar</item>
        <item name="android:textColor">@android:color/holo_red_light</item>
    </style>
</resources>"#;
        let diagnostics = check("res/values/styles.xml", values, 10);
        assert_eq!(
            messages(&diagnostics),
            vec![
                "android:Theme.Holo.Light.DarkActionBar requires API level 14 (current min is 10)",
                "android:actionBarStyle requires API level 11 (current min is 10)",
                "@android:color/holo_red_light requires API level 14 (current min is 10)",
            ]
        );
        assert!(check("res/values-v14/styles.xml", values, 10).is_empty());
    }

    #[test]
    fn test_manifest_theme_reference() {
        let manifest = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android">
    <application android:theme="@android:style/Theme.Holo" />
</manifest>"#;
        let diagnostics = check("AndroidManifest.xml", manifest, 4);
        assert_eq!(
            messages(&diagnostics),
            vec!["@android:style/Theme.Holo requires API level 11 (current min is 4)"]
        );
    }
}
