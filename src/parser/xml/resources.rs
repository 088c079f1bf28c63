use crate::parser::ast::Span;
use miette::{IntoDiagnostic, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use tracing::debug;

/// An attribute as written, with its qualified name (`android:paddingStart`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAttribute {
    pub name: String,
    pub value: String,
    /// From the start of the name to the closing quote of the value
    pub span: Span,
}

impl ResourceAttribute {
    /// Local name when the attribute is in the `android:` namespace
    pub fn android_name(&self) -> Option<&str> {
        self.name.strip_prefix("android:")
    }
}

/// One element of an XML resource file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceElement {
    pub tag: String,
    pub attributes: Vec<ResourceAttribute>,
    /// Index of the enclosing element
    pub parent: Option<usize>,
    /// Trimmed character content directly inside the element
    pub text: Option<(String, Span)>,
    /// Span of the opening `<tag`
    pub span: Span,
}

impl ResourceElement {
    pub fn attribute(&self, name: &str) -> Option<&ResourceAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Elements of one resource file in document order, parents before children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDocument {
    pub elements: Vec<ResourceElement>,
}

impl ResourceDocument {
    pub fn root(&self) -> Option<&ResourceElement> {
        self.elements.first()
    }
}

/// Resource folder of a file: `layout-v17` is type `layout` with version 17
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFolder {
    pub folder_type: String,
    pub version: Option<u32>,
}

impl ResourceFolder {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.parent()?.file_name()?.to_str()?;
        let mut parts = name.split('-');
        let folder_type = parts.next()?.to_string();
        let version = parts.find_map(|q| q.strip_prefix('v').and_then(|v| v.parse().ok()));
        Some(Self {
            folder_type,
            version,
        })
    }
}

/// Parser for layout, drawable, values and other resource XML files
#[derive(Debug, Default)]
pub struct ResourceParser;

impl ResourceParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, path: &Path, contents: &str) -> Result<ResourceDocument> {
        let lines = LineIndex::new(contents);
        let mut document = ResourceDocument::default();
        let mut stack: Vec<usize> = Vec::new();
        let mut reader = Reader::from_str(contents);
        reader.trim_text(true);

        let mut buf = Vec::new();

        loop {
            let before = reader.buffer_position();
            let event = reader.read_event_into(&mut buf).into_diagnostic()?;
            let after = reader.buffer_position();
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let start = contents[before..after]
                        .find('<')
                        .map_or(before, |offset| before + offset);
                    let raw = &contents[start..after];
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    let element = ResourceElement {
                        span: lines.span(start, start + 1 + tag.len()),
                        attributes: attributes(e, raw, start, &lines),
                        parent: stack.last().copied(),
                        text: None,
                        tag,
                    };
                    document.elements.push(element);
                    if matches!(event, Event::Start(_)) {
                        stack.push(document.elements.len() - 1);
                    }
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(ref t) => {
                    let text = t.unescape().into_diagnostic()?.trim().to_string();
                    if let (Some(&owner), false) = (stack.last(), text.is_empty()) {
                        let start = contents[before..after]
                            .find(text.as_str())
                            .map_or(before, |offset| before + offset);
                        let span = lines.span(start, start + text.len());
                        document.elements[owner].text = Some((text, span));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        debug!(
            "Parsed resource {}: {} elements",
            path.display(),
            document.elements.len()
        );

        Ok(document)
    }
}

fn attributes(element: &BytesStart, raw: &str, offset: usize, lines: &LineIndex) -> Vec<ResourceAttribute> {
    element
        .attributes()
        .filter_map(|a| a.ok())
        .map(|attr| {
            let name = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
            let (start, end) = attribute_range(raw, &name).unwrap_or((0, raw.len()));
            ResourceAttribute {
                span: lines.span(offset + start, offset + end),
                name,
                value,
            }
        })
        .collect()
}

/// Byte range of `name="value"` inside the raw start tag
fn attribute_range(raw: &str, name: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(found) = raw[from..].find(name) {
        let start = from + found;
        let rest = &raw[start + name.len()..];
        let preceded = raw[..start].ends_with(char::is_whitespace);
        let trimmed = rest.trim_start();
        if preceded && trimmed.starts_with('=') {
            let value = trimmed[1..].trim_start();
            let quote = value.chars().next()?;
            let value_start = raw.len() - value.len();
            let close = value[1..].find(quote)?;
            return Some((start, value_start + close + 2));
        }
        from = start + name.len();
    }
    None
}

/// Byte offset to 1-based line and column
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(contents: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(contents.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    fn position(&self, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&start| start <= offset).max(1);
        (line, offset - self.starts[line - 1] + 1)
    }

    fn span(&self, start: usize, end: usize) -> Span {
        let (line, column) = self.position(start);
        let (end_line, end_column) = self.position(end);
        Span {
            line,
            column,
            end_line,
            end_column,
            start_byte: start,
            end_byte: end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout_elements() {
        let layout = r#"<?xml version="1.0" encoding="utf-8"?>
<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android"
    android:orientation="vertical">
    <GridLayout
        android:layout_width="match_parent"
        android:showDividers="middle" />
</LinearLayout>
"#;
        let document = ResourceParser::new()
            .parse(Path::new("res/layout/main.xml"), layout)
            .unwrap();

        assert_eq!(document.elements.len(), 2);
        let root = document.root().unwrap();
        assert_eq!(root.tag, "LinearLayout");
        assert!(root.is_root());
        assert_eq!(root.span.line, 2);

        let grid = &document.elements[1];
        assert_eq!(grid.parent, Some(0));
        assert_eq!(grid.span.line, 4);
        assert_eq!(grid.span.column, 5);
        let dividers = grid.attribute("android:showDividers").unwrap();
        assert_eq!(dividers.android_name(), Some("showDividers"));
        assert_eq!(dividers.value, "middle");
        assert_eq!(dividers.span.line, 6);
        assert_eq!(dividers.span.column, 9);
        assert_eq!(
            &layout[dividers.span.start_byte..dividers.span.end_byte],
            "android:showDividers=\"middle\""
        );
    }

    #[test]
    fn test_item_text() {
        let values = r#"<resources>
    <style name="Theme" parent="android:Theme.Holo">
        <item name="android:windowBackground"> @android:color/holo_red_light </item>
    </style>
</resources>"#;
        let document = ResourceParser::new()
            .parse(Path::new("res/values/styles.xml"), values)
            .unwrap();

        let item = &document.elements[2];
        assert_eq!(item.tag, "item");
        assert_eq!(item.parent, Some(1));
        let (text, span) = item.text.as_ref().unwrap();
        assert_eq!(text, "@android:color/holo_red_light");
        assert_eq!(span.line, 3);
        assert!(document.elements[1].text.is_none());
    }

    #[test]
    fn test_resource_folder() {
        let folder = ResourceFolder::from_path(Path::new("res/layout-land-v17/main.xml")).unwrap();
        assert_eq!(folder.folder_type, "layout");
        assert_eq!(folder.version, Some(17));

        let folder = ResourceFolder::from_path(Path::new("res/values/styles.xml")).unwrap();
        assert_eq!(folder.folder_type, "values");
        assert_eq!(folder.version, None);
    }

    #[test]
    fn test_malformed_resource() {
        let result = ResourceParser::new().parse(Path::new("res/layout/bad.xml"), "<a><b></a>");
        assert!(result.is_err());
    }
}
