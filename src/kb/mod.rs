//! Knowledge base of the platform API surface
//!
//! Maps platform symbols to the API level that introduced them and to the
//! permissions they require. The knowledge base is built once before analysis
//! and shared read-only between worker threads.

mod api_versions;
pub mod permissions;
mod version_codes;

pub use api_versions::{find_api_database, parse_api_versions};
pub use permissions::{ApiRange, PermissionExpr, PermissionParseError, PermissionRequirement};
pub use version_codes::api_level_for_codename;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Knowledge base errors
#[derive(Error, Debug)]
pub enum KbError {
    #[error("Can't find API database; API check not performed")]
    ApiDatabaseNotFound,
    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed {0}")]
    Malformed(String),
    #[error("Invalid permission table entry for {symbol}: {reason}")]
    InvalidPermission { symbol: String, reason: String },
}

/// Kind of member a descriptor names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Method,
    Field,
    Class,
    EnumCase,
    Constructor,
}

impl MemberKind {
    /// Word used at the start of version diagnostics
    pub fn message_prefix(&self) -> &'static str {
        match self {
            MemberKind::Method | MemberKind::Constructor => "Call",
            MemberKind::Field => "Field",
            MemberKind::Class => "Class",
            MemberKind::EnumCase => "Enum value",
        }
    }
}

/// Structural key of a platform or source symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolDescriptor {
    /// Dotted owner type name (`android.graphics.PorterDuff.Mode`)
    pub owner: String,
    /// Member name; `<init>` for constructors and empty for classes
    pub member: String,
    pub kind: MemberKind,
}

impl SymbolDescriptor {
    pub fn new(owner: impl Into<String>, member: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            owner: owner.into(),
            member: member.into(),
            kind,
        }
    }

    pub fn method(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(owner, name, MemberKind::Method)
    }

    pub fn field(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(owner, name, MemberKind::Field)
    }

    pub fn class(owner: impl Into<String>) -> Self {
        Self::new(owner, "", MemberKind::Class)
    }

    pub fn constructor(owner: impl Into<String>) -> Self {
        Self::new(owner, "<init>", MemberKind::Constructor)
    }

    /// `Activity.getActionBar` style name used in permission messages
    pub fn short_name(&self) -> String {
        let owner = self.owner.rsplit('.').next().unwrap_or(&self.owner);
        match self.kind {
            MemberKind::Class | MemberKind::Constructor => owner.to_string(),
            _ => format!("{}.{}", owner, self.member),
        }
    }
}

impl fmt::Display for SymbolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MemberKind::Class => write!(f, "{}", self.owner),
            MemberKind::Constructor => write!(f, "new {}", self.owner),
            _ => write!(f, "{}#{}", self.owner, self.member),
        }
    }
}

/// What a symbol demands of its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Introduced at this API level
    Version(u32),
    Permission(PermissionRequirement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiMethod {
    pub arity: usize,
    pub since: u32,
    /// Dotted class name of the return type, when it is a class
    pub return_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiField {
    pub since: u32,
    /// Whether the field is a compile-time constant; `None` when the database does not say
    pub constant: Option<bool>,
    /// Declared type (`int`, `java.lang.String`, ...) when known
    pub ty: Option<String>,
}

/// A platform class and the members it declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiClass {
    pub name: String,
    pub since: u32,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub methods: HashMap<String, Vec<ApiMethod>>,
    pub fields: HashMap<String, ApiField>,
}

impl ApiClass {
    pub fn new(name: impl Into<String>, since: u32) -> Self {
        Self {
            name: name.into(),
            since,
            super_class: None,
            interfaces: Vec::new(),
            methods: HashMap::new(),
            fields: HashMap::new(),
        }
    }

    pub fn extends(mut self, super_class: impl Into<String>) -> Self {
        self.super_class = Some(super_class.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>, arity: usize, since: u32) -> Self {
        self.methods.entry(name.into()).or_default().push(ApiMethod {
            arity,
            since,
            return_type: None,
        });
        self
    }

    pub fn method_returning(
        mut self,
        name: impl Into<String>,
        arity: usize,
        since: u32,
        return_type: impl Into<String>,
    ) -> Self {
        self.methods.entry(name.into()).or_default().push(ApiMethod {
            arity,
            since,
            return_type: Some(return_type.into()),
        });
        self
    }

    pub fn constructor(self, arity: usize, since: u32) -> Self {
        self.method("<init>", arity, since)
    }

    pub fn field(mut self, name: impl Into<String>, since: u32) -> Self {
        self.fields.insert(
            name.into(),
            ApiField {
                since,
                constant: None,
                ty: None,
            },
        );
        self
    }

    /// Field whose declared type is known
    pub fn typed_field(mut self, name: impl Into<String>, since: u32, ty: impl Into<String>) -> Self {
        self.fields.insert(
            name.into(),
            ApiField {
                since,
                constant: None,
                ty: Some(ty.into()),
            },
        );
        self
    }

    /// Field the database marks as a compile-time constant, or explicitly not one
    pub fn constant_field(mut self, name: impl Into<String>, since: u32, constant: bool) -> Self {
        self.fields.insert(
            name.into(),
            ApiField {
                since,
                constant: Some(constant),
                ty: None,
            },
        );
        self
    }

    /// Best matching overload: same arity if any, smallest level among candidates
    pub fn find_method(&self, name: &str, arity: Option<usize>) -> Option<&ApiMethod> {
        let overloads = self.methods.get(name)?;
        let by_arity: Vec<&ApiMethod> = match arity {
            Some(a) => overloads.iter().filter(|m| m.arity == a).collect(),
            None => Vec::new(),
        };
        let candidates = if by_arity.is_empty() {
            overloads.iter().collect()
        } else {
            by_arity
        };
        candidates.into_iter().min_by_key(|m| m.since)
    }

    pub fn is_enum(&self) -> bool {
        self.super_class.as_deref() == Some("java.lang.Enum")
    }
}

/// Read-only lookup table of platform symbols
#[derive(Debug, Default, Clone)]
pub struct KnowledgeBase {
    classes: HashMap<String, ApiClass>,
    permissions: HashMap<SymbolDescriptor, PermissionRequirement>,
    /// Revocable permissions beyond the platform's dangerous list
    revocable: BTreeSet<String>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the API database and the optional permission table
    pub fn load(api_database: Option<&Path>, permission_table: Option<&Path>) -> Result<Self, KbError> {
        let path = find_api_database(api_database).ok_or(KbError::ApiDatabaseNotFound)?;
        info!("Loading API database from {}", path.display());

        let contents = fs::read_to_string(&path).map_err(|source| KbError::ReadError {
            path: path.clone(),
            source,
        })?;

        let mut kb = Self::from_api_versions(&contents)?;

        if let Some(table) = permission_table {
            kb.add_permission_table(&PermissionTable::from_file(table)?)?;
        }

        Ok(kb)
    }

    /// Build from the contents of an api-versions.xml
    pub fn from_api_versions(contents: &str) -> Result<Self, KbError> {
        let mut kb = Self::new();
        for class in parse_api_versions(contents)? {
            kb.add_class(class);
        }
        Ok(kb)
    }

    pub fn add_class(&mut self, class: ApiClass) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn with_class(mut self, class: ApiClass) -> Self {
        self.add_class(class);
        self
    }

    pub fn add_permission(&mut self, descriptor: SymbolDescriptor, requirement: PermissionRequirement) {
        self.permissions.insert(descriptor, requirement);
    }

    pub fn with_permission(mut self, descriptor: SymbolDescriptor, requirement: PermissionRequirement) -> Self {
        self.add_permission(descriptor, requirement);
        self
    }

    pub fn add_permission_table(&mut self, table: &PermissionTable) -> Result<(), KbError> {
        for entry in &table.permissions {
            let (descriptor, requirement) = entry.to_requirement()?;
            self.add_permission(descriptor, requirement);
        }
        self.revocable.extend(table.revocable.iter().cloned());
        debug!(
            "Loaded {} permission requirements, {} custom revocable permissions",
            table.permissions.len(),
            table.revocable.len()
        );
        Ok(())
    }

    pub fn class(&self, name: &str) -> Option<&ApiClass> {
        self.classes.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ApiClass> {
        self.classes.values()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Custom revocable permissions from the permission table
    pub fn revocable_permissions(&self) -> &BTreeSet<String> {
        &self.revocable
    }

    /// Whether `owner` itself declares the member (no inheritance)
    pub fn declares(&self, owner: &str, member: &str, kind: MemberKind) -> bool {
        let permission_key = SymbolDescriptor::new(owner, member, kind);
        if self.permissions.contains_key(&permission_key) {
            return true;
        }
        let Some(class) = self.classes.get(owner) else {
            return false;
        };
        match kind {
            MemberKind::Class => true,
            MemberKind::Method => class.methods.contains_key(member),
            MemberKind::Constructor => class.methods.contains_key("<init>"),
            MemberKind::Field | MemberKind::EnumCase => class.fields.contains_key(member),
        }
    }

    /// Requirements recorded for exactly this descriptor
    pub fn lookup(&self, descriptor: &SymbolDescriptor) -> Vec<Requirement> {
        self.lookup_overload(descriptor, None)
    }

    /// Requirements for a call with a known argument count
    pub fn lookup_overload(&self, descriptor: &SymbolDescriptor, arity: Option<usize>) -> Vec<Requirement> {
        let mut requirements = Vec::new();

        if let Some(class) = self.classes.get(&descriptor.owner) {
            let since = match descriptor.kind {
                MemberKind::Class => Some(class.since),
                MemberKind::Method => class.find_method(&descriptor.member, arity).map(|m| m.since),
                MemberKind::Constructor => class.find_method("<init>", arity).map(|m| m.since),
                MemberKind::Field | MemberKind::EnumCase => {
                    class.fields.get(&descriptor.member).map(|f| f.since)
                }
            };
            if let Some(since) = since {
                requirements.push(Requirement::Version(since));
            }
        }

        let permission_key = match descriptor.kind {
            MemberKind::EnumCase => SymbolDescriptor::field(&descriptor.owner, &descriptor.member),
            _ => descriptor.clone(),
        };
        if let Some(permission) = self.permissions.get(&permission_key) {
            requirements.push(Requirement::Permission(permission.clone()));
        }

        requirements
    }

    /// Return type recorded for a platform method
    pub fn return_type(&self, owner: &str, method: &str, arity: Option<usize>) -> Option<&str> {
        self.classes
            .get(owner)?
            .find_method(method, arity)?
            .return_type
            .as_deref()
    }

    /// Whether a field is inlined into callers at compile time
    pub fn is_constant_field(&self, owner: &str, field: &str) -> bool {
        let Some(class) = self.classes.get(owner) else {
            return false;
        };
        if class.is_enum() {
            return false;
        }
        let Some(entry) = class.fields.get(field) else {
            return false;
        };
        if let Some(constant) = entry.constant {
            return constant;
        }
        if !looks_like_constant(field) {
            return false;
        }
        match entry.ty.as_deref() {
            Some(ty) => is_inlinable_type(ty),
            None => !RUNTIME_VALUE_HOLDERS.contains(&owner),
        }
    }

    pub fn is_enum(&self, owner: &str) -> bool {
        self.classes.get(owner).map_or(false, ApiClass::is_enum)
    }
}

/// Classes whose upper-case fields are read from the running device
const RUNTIME_VALUE_HOLDERS: &[&str] = &["android.os.Build", "android.os.Build.VERSION"];

/// Only primitives and strings are copied into callers by the compiler
fn is_inlinable_type(ty: &str) -> bool {
    matches!(
        ty,
        "int" | "long" | "short" | "byte" | "char" | "boolean" | "float" | "double"
            | "String" | "java.lang.String"
    )
}

/// `UPPER_SNAKE_CASE` names are treated as static final constants
fn looks_like_constant(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Permission table file: requirements attached to platform symbols
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionTable {
    pub permissions: Vec<PermissionEntry>,
    /// Additional permissions the user can revoke
    pub revocable: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionEntry {
    /// `android.location.LocationManager#getLastKnownLocation`
    pub symbol: String,
    pub kind: Option<MemberKind>,
    pub value: Option<String>,
    pub any_of: Vec<String>,
    pub all_of: Vec<String>,
    /// Annotation-style expression: `(A || B) && C`
    pub expression: Option<String>,
    pub conditional: bool,
    /// Range of API levels the requirement applies to: `..22`, `23..`
    pub apis: Option<String>,
}

impl PermissionEntry {
    pub fn to_requirement(&self) -> Result<(SymbolDescriptor, PermissionRequirement), KbError> {
        let invalid = |reason: String| KbError::InvalidPermission {
            symbol: self.symbol.clone(),
            reason,
        };

        let (owner, member) = self
            .symbol
            .split_once('#')
            .ok_or_else(|| invalid("expected `owner#member`".to_string()))?;

        let kind = self.kind.unwrap_or(if member == "<init>" {
            MemberKind::Constructor
        } else {
            MemberKind::Method
        });

        let expr = if let Some(expression) = &self.expression {
            PermissionExpr::parse(expression).map_err(|e| invalid(e.to_string()))?
        } else if let Some(value) = &self.value {
            PermissionExpr::single(value)
        } else if !self.all_of.is_empty() {
            PermissionExpr::all_of(self.all_of.iter().cloned())
        } else if !self.any_of.is_empty() {
            PermissionExpr::any_of(self.any_of.iter().cloned())
        } else {
            return Err(invalid("no permission given".to_string()));
        };

        let mut requirement = PermissionRequirement::new(expr);
        if let Some(apis) = &self.apis {
            requirement = requirement.with_apis(apis.parse().map_err(|e: PermissionParseError| invalid(e.to_string()))?);
        }
        if self.conditional {
            requirement = requirement.conditional();
        }

        Ok((SymbolDescriptor::new(owner, member, kind), requirement))
    }
}

impl PermissionTable {
    /// Load from a YAML, TOML or JSON file, chosen by extension
    pub fn from_file(path: &Path) -> Result<Self, KbError> {
        let contents = fs::read_to_string(path).map_err(|source| KbError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let malformed = |e: String| KbError::Malformed(format!("{}: {}", path.display(), e));
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents).map_err(|e| malformed(e.to_string())),
            "json" => serde_json::from_str(&contents).map_err(|e| malformed(e.to_string())),
            _ => toml::from_str(&contents).map_err(|e| malformed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_kb() -> KnowledgeBase {
        KnowledgeBase::new()
            .with_class(
                ApiClass::new("android.app.Activity", 1)
                    .method_returning("getActionBar", 0, 11, "android.app.ActionBar")
                    .method("setContentView", 1, 1),
            )
            .with_class(ApiClass::new("android.view.View", 1).field("MEASURED_STATE_MASK", 11))
            .with_class(
                ApiClass::new("android.graphics.PorterDuff.Mode", 1)
                    .extends("java.lang.Enum")
                    .field("OVERLAY", 11),
            )
            .with_class(
                ApiClass::new("android.widget.TextView", 1)
                    .method("setText", 1, 1)
                    .method("setText", 1, 3)
                    .method("setText", 2, 9),
            )
    }

    #[test]
    fn test_lookup_method() {
        let kb = sample_kb();
        let requirements = kb.lookup(&SymbolDescriptor::method("android.app.Activity", "getActionBar"));
        assert_eq!(requirements, vec![Requirement::Version(11)]);
        assert!(kb
            .lookup(&SymbolDescriptor::method("android.app.Activity", "missing"))
            .is_empty());
    }

    #[test]
    fn test_overload_picks_smallest_level() {
        let kb = sample_kb();
        let setter = SymbolDescriptor::method("android.widget.TextView", "setText");
        assert_eq!(kb.lookup_overload(&setter, Some(1)), vec![Requirement::Version(1)]);
        assert_eq!(kb.lookup_overload(&setter, Some(2)), vec![Requirement::Version(9)]);
        assert_eq!(kb.lookup_overload(&setter, Some(5)), vec![Requirement::Version(1)]);
    }

    #[test]
    fn test_lookup_with_permission() {
        let descriptor = SymbolDescriptor::method("android.app.Activity", "getActionBar");
        let kb = sample_kb().with_permission(
            descriptor.clone(),
            PermissionRequirement::new(PermissionExpr::single("my.permission.X")),
        );
        let requirements = kb.lookup(&descriptor);
        assert_eq!(requirements.len(), 2);
        assert!(matches!(requirements[1], Requirement::Permission(_)));
    }

    #[test]
    fn test_constant_and_enum_fields() {
        let kb = sample_kb();
        assert!(kb.is_constant_field("android.view.View", "MEASURED_STATE_MASK"));
        assert!(!kb.is_constant_field("android.graphics.PorterDuff.Mode", "OVERLAY"));
        assert!(kb.is_enum("android.graphics.PorterDuff.Mode"));
        assert!(!looks_like_constant("mField"));
    }

    #[test]
    fn test_constant_fallback_needs_inlinable_type() {
        let kb = KnowledgeBase::new()
            .with_class(ApiClass::new("android.os.Build.VERSION", 1).field("SDK_INT", 4))
            .with_class(
                ApiClass::new("android.view.View", 1)
                    .typed_field("ALPHA", 14, "android.util.Property")
                    .typed_field("LAYER_TYPE_HARDWARE", 11, "int")
                    .constant_field("STATUS_BAR_HIDDEN", 11, false),
            );
        assert!(!kb.is_constant_field("android.os.Build.VERSION", "SDK_INT"));
        assert!(!kb.is_constant_field("android.view.View", "ALPHA"));
        assert!(kb.is_constant_field("android.view.View", "LAYER_TYPE_HARDWARE"));
        assert!(!kb.is_constant_field("android.view.View", "STATUS_BAR_HIDDEN"));
        assert!(!kb.is_constant_field("android.view.View", "UNKNOWN_FIELD"));
    }

    #[test]
    fn test_descriptor_display() {
        assert_eq!(
            SymbolDescriptor::method("android.app.Activity", "getActionBar").to_string(),
            "android.app.Activity#getActionBar"
        );
        assert_eq!(
            SymbolDescriptor::constructor("android.widget.GridLayout").to_string(),
            "new android.widget.GridLayout"
        );
        assert_eq!(SymbolDescriptor::class("org.w3c.dom.DOMErrorHandler").to_string(), "org.w3c.dom.DOMErrorHandler");
        assert_eq!(
            SymbolDescriptor::method("android.location.LocationManager", "myMethod").short_name(),
            "LocationManager.myMethod"
        );
    }

    #[test]
    fn test_permission_entry_forms() {
        let entry = PermissionEntry {
            symbol: "android.location.LocationManager#getLastKnownLocation".to_string(),
            any_of: vec!["A".to_string(), "B".to_string()],
            apis: Some("23..".to_string()),
            ..Default::default()
        };
        let (descriptor, requirement) = entry.to_requirement().unwrap();
        assert_eq!(descriptor.kind, MemberKind::Method);
        assert_eq!(requirement.expr, PermissionExpr::any_of(["A", "B"]));
        assert!(!requirement.applies_to(1, 22));

        let conditional = PermissionEntry {
            symbol: "a.B#c".to_string(),
            value: Some("P".to_string()),
            conditional: true,
            ..Default::default()
        };
        let (_, requirement) = conditional.to_requirement().unwrap();
        assert!(requirement.expr.conditional_inner().is_some());

        let invalid = PermissionEntry {
            symbol: "no-member".to_string(),
            value: Some("P".to_string()),
            ..Default::default()
        };
        assert!(invalid.to_requirement().is_err());
    }

    #[test]
    fn test_permission_table_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.toml");
        fs::write(
            &path,
            r#"
revocable = ["my.permission.DANGER"]

[[permissions]]
symbol = "android.location.LocationManager#requestLocationUpdates"
expression = "android.permission.ACCESS_FINE_LOCATION || android.permission.ACCESS_COARSE_LOCATION"
"#,
        )
        .unwrap();

        let table = PermissionTable::from_file(&path).unwrap();
        let mut kb = KnowledgeBase::new();
        kb.add_permission_table(&table).unwrap();

        assert!(kb.revocable_permissions().contains("my.permission.DANGER"));
        let requirements = kb.lookup(&SymbolDescriptor::method(
            "android.location.LocationManager",
            "requestLocationUpdates",
        ));
        assert_eq!(requirements.len(), 1);
    }

    #[test]
    fn test_missing_database() {
        let result = KnowledgeBase::load(Some(Path::new("/nonexistent/api-versions.xml")), None);
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Can't find API database; API check not performed");
    }
}
