// Reader for the SDK's api-versions.xml database

use super::{ApiClass, ApiField, ApiMethod, KbError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Parse the contents of an `api-versions.xml` file.
///
/// ```xml
/// <api version="2">
///   <class name="android/app/Activity" since="1">
///     <extends name="android/view/ContextThemeWrapper"/>
///     <method name="getActionBar()Landroid/app/ActionBar;" since="11"/>
///     <field name="DEFAULT_KEYS_DIALER"/>
///   </class>
/// </api>
/// ```
///
/// Members without a `since` attribute inherit the class's level. Entries
/// marked `removed` are skipped.
pub fn parse_api_versions(contents: &str) -> Result<Vec<ApiClass>, KbError> {
    let mut reader = Reader::from_str(contents);
    reader.trim_text(true);

    let mut classes = Vec::new();
    let mut current: Option<ApiClass> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| KbError::Malformed(format!("api-versions.xml: {}", e)))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let since = attribute(e, "since").and_then(|s| s.parse::<u32>().ok());
                let removed = attribute(e, "removed").is_some();

                match tag.as_str() {
                    "class" => {
                        let name = attribute(e, "name").map(|n| internal_to_dotted(&n));
                        current = name.map(|name| ApiClass::new(name, since.unwrap_or(1)));
                        if is_empty {
                            classes.extend(current.take());
                        }
                    }
                    "extends" | "implements" => {
                        if let (Some(class), Some(name), false) =
                            (current.as_mut(), attribute(e, "name"), removed)
                        {
                            let name = internal_to_dotted(&name);
                            if tag == "extends" {
                                class.super_class = Some(name);
                            } else if !class.interfaces.contains(&name) {
                                class.interfaces.push(name);
                            }
                        }
                    }
                    "method" => {
                        if let (Some(class), Some(signature), false) =
                            (current.as_mut(), attribute(e, "name"), removed)
                        {
                            if let Some((name, descriptor)) = signature.split_once('(') {
                                let (arity, return_type) = parse_descriptor(descriptor);
                                let since = since.unwrap_or(class.since);
                                class.methods.entry(name.to_string()).or_default().push(
                                    ApiMethod {
                                        arity,
                                        since,
                                        return_type,
                                    },
                                );
                            } else {
                                trace!("Skipping malformed method signature {}", signature);
                            }
                        }
                    }
                    "field" => {
                        if let (Some(class), Some(name), false) =
                            (current.as_mut(), attribute(e, "name"), removed)
                        {
                            let since = since.unwrap_or(class.since);
                            class.fields.insert(
                                name,
                                ApiField {
                                    since,
                                    constant: None,
                                    ty: None,
                                },
                            );
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => {
                if e.name().as_ref() == b"class" {
                    classes.extend(current.take());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!("Loaded {} platform classes from api-versions.xml", classes.len());
    Ok(classes)
}

fn attribute(element: &BytesStart, key: &str) -> Option<String> {
    element
        .attributes()
        .filter_map(|a| a.ok())
        .find(|attr| attr.key.as_ref() == key.as_bytes())
        .map(|attr| {
            attr.unescape_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string())
        })
}

/// `android/graphics/PorterDuff$Mode` becomes `android.graphics.PorterDuff.Mode`
pub fn internal_to_dotted(name: &str) -> String {
    name.replace(['/', '$'], ".")
}

/// Parse the part of a JVM method descriptor after the opening parenthesis,
/// returning the parameter count and the return type when it is a class.
fn parse_descriptor(descriptor: &str) -> (usize, Option<String>) {
    let (params, ret) = descriptor.split_once(')').unwrap_or((descriptor, ""));

    let mut arity = 0;
    let mut chars = params.chars();
    while let Some(c) = chars.next() {
        match c {
            '[' => continue,
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                arity += 1;
            }
            _ => arity += 1,
        }
    }

    let return_type = ret
        .strip_prefix('L')
        .and_then(|r| r.strip_suffix(';'))
        .map(internal_to_dotted);

    (arity, return_type)
}

/// Locate an api-versions.xml: an explicit path, the SDK's
/// `platform-tools/api/api-versions.xml`, or the newest platform's copy.
pub fn find_api_database(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.is_file().then(|| path.to_path_buf());
    }

    let sdk = ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(PathBuf::from)
        .find(|p| p.is_dir())?;

    let platform_tools = sdk.join("platform-tools").join("api").join("api-versions.xml");
    if platform_tools.is_file() {
        return Some(platform_tools);
    }

    newest_platform_database(&sdk.join("platforms"))
}

fn newest_platform_database(platforms: &Path) -> Option<PathBuf> {
    WalkDir::new(platforms)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() == "api-versions.xml")
        .filter_map(|e| {
            let level = e
                .path()
                .ancestors()
                .filter_map(|a| a.file_name()?.to_str()?.strip_prefix("android-"))
                .find_map(|n| n.parse::<u32>().ok())?;
            Some((level, e.into_path()))
        })
        .max_by_key(|(level, _)| *level)
        .map(|(_, path)| path)
}
