use miette::{IntoDiagnostic, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Facts declared in an AndroidManifest.xml that affect API checks
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ManifestFacts {
    pub package: Option<String>,
    pub min_sdk: Option<u32>,
    pub target_sdk: Option<u32>,
    /// `<uses-permission>` and `<uses-permission-sdk-23>` names
    pub permissions: BTreeSet<String>,
    /// Custom permissions declared with `protectionLevel="dangerous"`
    pub dangerous_permissions: BTreeSet<String>,
}

/// Parser for AndroidManifest.xml files
#[derive(Debug, Default)]
pub struct ManifestParser;

impl ManifestParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse an AndroidManifest.xml file and extract the module facts
    pub fn parse(&self, path: &Path, contents: &str) -> Result<ManifestFacts> {
        let mut facts = ManifestFacts::default();
        let mut reader = Reader::from_str(contents);
        reader.trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf).into_diagnostic()? {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                    match tag_name.as_str() {
                        "manifest" => facts.package = attribute(e, "package"),
                        "uses-sdk" => {
                            facts.min_sdk = attribute(e, "minSdkVersion")
                                .and_then(|v| parse_level(path, "minSdkVersion", &v));
                            facts.target_sdk = attribute(e, "targetSdkVersion")
                                .and_then(|v| parse_level(path, "targetSdkVersion", &v));
                        }
                        "uses-permission" | "uses-permission-sdk-23" | "uses-permission-sdk-m" => {
                            if let Some(name) = attribute(e, "name") {
                                facts.permissions.insert(name);
                            }
                        }
                        "permission" => {
                            let dangerous = attribute(e, "protectionLevel")
                                .map(|level| level.split('|').any(|l| l == "dangerous"))
                                .unwrap_or(false);
                            if let (true, Some(name)) = (dangerous, attribute(e, "name")) {
                                facts.dangerous_permissions.insert(name);
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        debug!(
            "Parsed manifest {}: min {:?}, target {:?}, {} permissions",
            path.display(),
            facts.min_sdk,
            facts.target_sdk,
            facts.permissions.len()
        );

        Ok(facts)
    }
}

/// Attribute value by local name, ignoring the `android:` prefix
fn attribute(element: &BytesStart, local_name: &str) -> Option<String> {
    element
        .attributes()
        .filter_map(|a| a.ok())
        .find(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref());
            key == local_name || key.rsplit(':').next() == Some(local_name)
        })
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

fn parse_level(path: &Path, attr: &str, value: &str) -> Option<u32> {
    match value.trim().parse() {
        Ok(level) => Some(level),
        Err(_) => {
            warn!(
                "{}: ignoring non-numeric {} \"{}\"",
                path.display(),
                attr,
                value
            );
            None
        }
    }
}
