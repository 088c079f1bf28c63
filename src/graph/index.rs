use super::{SupertypeKind, TypeGraph, TypeOrigin, TypeScope};
use crate::analysis::annotations::{requires_api, requires_permission};
use crate::kb::{KnowledgeBase, PermissionRequirement};
use crate::parser::ast::{CompilationUnit, Member, MethodDecl, TypeDecl, TypeKind};
use std::collections::HashMap;
use tracing::debug;

/// A method or constructor declared in source
#[derive(Debug, Clone)]
pub struct SourceMethod {
    pub name: String,
    pub params: usize,
    pub is_varargs: bool,
    pub is_static: bool,
    /// Resolved return type, when it is a known class
    pub return_type: Option<String>,
    /// Level from `@RequiresApi` on the method or its class
    pub requires_api: Option<u32>,
    pub requires_permission: Option<PermissionRequirement>,
}

impl SourceMethod {
    pub fn accepts_arity(&self, arity: usize) -> bool {
        if self.is_varargs {
            arity + 1 >= self.params
        } else {
            arity == self.params
        }
    }
}

/// A field or enum constant declared in source
#[derive(Debug, Clone)]
pub struct SourceField {
    pub name: String,
    /// Resolved declared type, when it is a known class
    pub ty: Option<String>,
    pub is_static: bool,
    pub requires_api: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SourceType {
    pub qualified_name: String,
    /// Empty for anonymous classes
    pub simple_name: String,
    pub package: Option<String>,
    pub kind: TypeKind,
    pub methods: HashMap<String, Vec<SourceMethod>>,
    pub fields: HashMap<String, SourceField>,
    /// Member types by simple name
    pub member_types: HashMap<String, String>,
    pub requires_api: Option<u32>,
}

impl SourceType {
    /// Declared method matching a call, if any
    pub fn find_method(&self, name: &str, arity: Option<usize>) -> Option<&SourceMethod> {
        let overloads = self.methods.get(name)?;
        match arity {
            Some(arity) => overloads.iter().find(|m| m.accepts_arity(arity)),
            None => overloads.first(),
        }
    }
}

/// Types, members and hierarchy of the whole project, platform and source
#[derive(Debug, Default)]
pub struct ProjectIndex {
    hierarchy: TypeGraph,
    types: HashMap<String, SourceType>,
    /// Top-level source types by package, then simple name
    packages: HashMap<String, HashMap<String, String>>,
}

impl ProjectIndex {
    /// Index holding only the platform classes
    pub fn from_kb(kb: &KnowledgeBase) -> Self {
        let mut hierarchy = TypeGraph::new();
        for class in kb.classes() {
            hierarchy.add_type(&class.name, TypeOrigin::Platform);
        }
        for class in kb.classes() {
            if let Some(sup) = &class.super_class {
                hierarchy.add_supertype(&class.name, sup, SupertypeKind::Extends);
            }
            for interface in &class.interfaces {
                hierarchy.add_supertype(&class.name, interface, SupertypeKind::Implements);
            }
        }
        Self {
            hierarchy,
            ..Default::default()
        }
    }

    /// Index the platform classes and every type declared in `units`
    pub fn build(units: &[CompilationUnit], kb: &KnowledgeBase) -> Self {
        let mut index = Self::from_kb(kb);

        // Pass 1: register declarations so names resolve across units
        for unit in units {
            unit.for_each_type(&mut |decl| index.register(unit, decl));
        }

        // Pass 2: supertypes, which later lookups walk
        let mut supertypes = Vec::new();
        for unit in units {
            unit.for_each_type(&mut |decl| {
                let scope = TypeScope::new(&index, unit, &decl.qualified_name);
                if let Some(sup) = decl.super_class.as_ref().and_then(|t| scope.resolve(&t.name)) {
                    supertypes.push((decl.qualified_name.clone(), sup, SupertypeKind::Extends));
                }
                for interface in &decl.interfaces {
                    if let Some(sup) = scope.resolve(&interface.name) {
                        // An interface's `extends` clause lists its superinterfaces
                        let kind = match decl.kind {
                            TypeKind::Interface => SupertypeKind::Extends,
                            _ => SupertypeKind::Implements,
                        };
                        supertypes.push((decl.qualified_name.clone(), sup, kind));
                    }
                }
            });
        }
        for (sub, sup, kind) in supertypes {
            index.hierarchy.add_supertype(&sub, &sup, kind);
        }

        // Pass 3: member types, now that inherited member types resolve
        let mut member_types = Vec::new();
        for unit in units {
            unit.for_each_type(&mut |decl| {
                let scope = TypeScope::new(&index, unit, &decl.qualified_name);
                member_types.push((decl.qualified_name.clone(), resolve_members(&scope, decl)));
            });
        }
        for (name, (fields, methods)) in member_types {
            let Some(ty) = index.types.get_mut(&name) else {
                continue;
            };
            for (field, resolved) in fields {
                if let Some(f) = ty.fields.get_mut(&field) {
                    f.ty = resolved;
                }
            }
            for ((method, position), resolved) in methods {
                if let Some(m) = ty.methods.get_mut(&method).and_then(|o| o.get_mut(position)) {
                    m.return_type = resolved;
                }
            }
        }

        debug!(
            "Indexed {} source types, {} types in hierarchy",
            index.types.len(),
            index.hierarchy.type_count()
        );
        index
    }

    fn register(&mut self, unit: &CompilationUnit, decl: &TypeDecl) {
        let name = &decl.qualified_name;
        let class_level = requires_api(&decl.annotations);

        let mut methods: HashMap<String, Vec<SourceMethod>> = HashMap::new();
        for method in decl.methods() {
            let key = if method.is_constructor {
                "<init>".to_string()
            } else {
                method.name.clone()
            };
            methods.entry(key).or_default().push(source_method(method, class_level));
        }

        let mut fields = HashMap::new();
        for member in &decl.members {
            let (field_name, is_static, annotations) = match member {
                Member::Field(field) => (&field.name, field.is_static, &field.annotations),
                Member::EnumConstant(constant) => (&constant.name, true, &constant.annotations),
                _ => continue,
            };
            fields.insert(
                field_name.clone(),
                SourceField {
                    name: field_name.clone(),
                    ty: None,
                    is_static,
                    requires_api: requires_api(annotations).max(class_level),
                },
            );
        }

        self.hierarchy.add_type(name, TypeOrigin::Source);
        self.types.insert(
            name.clone(),
            SourceType {
                qualified_name: name.clone(),
                simple_name: decl.name.clone(),
                package: unit.package.clone(),
                kind: decl.kind,
                methods,
                fields,
                member_types: HashMap::new(),
                requires_api: class_level,
            },
        );

        if decl.name.is_empty() {
            return;
        }
        let package = unit.package.clone().unwrap_or_default();
        let top_level = if package.is_empty() {
            decl.name.clone()
        } else {
            format!("{}.{}", package, decl.name)
        };
        if *name == top_level {
            self.packages
                .entry(package)
                .or_default()
                .insert(decl.name.clone(), name.clone());
        } else if let Some((outer, _)) = name.rsplit_once('.') {
            if let Some(outer) = self.types.get_mut(outer) {
                outer.member_types.insert(decl.name.clone(), name.clone());
            }
        }
    }

    pub fn hierarchy(&self) -> &TypeGraph {
        &self.hierarchy
    }

    pub fn source_type(&self, name: &str) -> Option<&SourceType> {
        self.types.get(name)
    }

    /// Whether `name` is a platform or source type
    pub fn is_known_type(&self, name: &str) -> bool {
        self.hierarchy.contains(name)
    }

    pub fn ancestors(&self, name: &str) -> Vec<String> {
        self.hierarchy.ancestors(name)
    }

    /// Top-level source type `simple` in `package` (`None` for the default package)
    pub fn package_type(&self, package: Option<&str>, simple: &str) -> Option<&str> {
        self.packages
            .get(package.unwrap_or(""))?
            .get(simple)
            .map(String::as_str)
    }
}

fn source_method(method: &MethodDecl, class_level: Option<u32>) -> SourceMethod {
    SourceMethod {
        name: method.name.clone(),
        params: method.params.len(),
        is_varargs: method.is_varargs,
        is_static: method.is_static,
        return_type: None,
        requires_api: requires_api(&method.annotations).max(class_level),
        requires_permission: requires_permission(&method.annotations),
    }
}

type ResolvedFields = Vec<(String, Option<String>)>;
type ResolvedMethods = Vec<((String, usize), Option<String>)>;

fn resolve_members(scope: &TypeScope, decl: &TypeDecl) -> (ResolvedFields, ResolvedMethods) {
    let fields = decl
        .fields()
        .filter(|f| !f.ty.is_primitive())
        .map(|f| (f.name.clone(), scope.resolve(&f.ty.name)))
        .collect();

    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut methods = Vec::new();
    for method in decl.methods() {
        let key = if method.is_constructor {
            "<init>"
        } else {
            method.name.as_str()
        };
        let position = positions.entry(key).or_insert(0);
        let resolved = method
            .return_type
            .as_ref()
            .filter(|t| !t.is_primitive())
            .and_then(|t| scope.resolve(&t.name));
        methods.push(((key.to_string(), *position), resolved));
        *position += 1;
    }

    (fields, methods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::ApiClass;
    use crate::parser::{JavaParser, Parser};
    use std::path::Path;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::new()
            .with_class(ApiClass::new("java.lang.Object", 1))
            .with_class(ApiClass::new("android.app.Activity", 1).extends("java.lang.Object"))
            .with_class(ApiClass::new("android.view.View", 1).extends("java.lang.Object"))
            .with_class(ApiClass::new("android.view.View.OnClickListener", 1))
    }

    fn parse(name: &str, source: &str) -> CompilationUnit {
        JavaParser::new().parse(Path::new(name), source).unwrap()
    }

    #[test]
    fn test_source_types_join_platform_hierarchy() {
        let units = vec![
            parse(
                "Main.java",
                r#"
package test.pkg;
import android.app.Activity;
import android.view.View;
public class Main extends Base implements View.OnClickListener {
    class Inner {}
    public void onClick(View v) {}
}
"#,
            ),
            parse(
                "Base.java",
                "package test.pkg;\nimport android.app.Activity;\npublic class Base extends Activity {}",
            ),
        ];
        let index = ProjectIndex::build(&units, &kb());

        assert_eq!(
            index.ancestors("test.pkg.Main"),
            vec![
                "test.pkg.Base",
                "android.app.Activity",
                "java.lang.Object",
                "android.view.View.OnClickListener"
            ]
        );
        let main = index.source_type("test.pkg.Main").unwrap();
        assert_eq!(main.member_types.get("Inner").map(String::as_str), Some("test.pkg.Main.Inner"));
        assert_eq!(index.package_type(Some("test.pkg"), "Base"), Some("test.pkg.Base"));
        assert!(index.is_known_type("test.pkg.Main.Inner"));
    }

    #[test]
    fn test_member_annotations_and_types() {
        let units = vec![parse(
            "Foo.java",
            r#"
package test.pkg;
import android.view.View;
import androidx.annotation.RequiresApi;
public class Foo {
    View view;
    int count;
    @RequiresApi(21)
    View make(int a) { return null; }
    void make() {}
}
"#,
        )];
        let index = ProjectIndex::build(&units, &kb());
        let foo = index.source_type("test.pkg.Foo").unwrap();

        assert_eq!(foo.fields["view"].ty.as_deref(), Some("android.view.View"));
        assert_eq!(foo.fields["count"].ty, None);

        let make = foo.find_method("make", Some(1)).unwrap();
        assert_eq!(make.requires_api, Some(21));
        assert_eq!(make.return_type.as_deref(), Some("android.view.View"));
        assert_eq!(foo.find_method("make", Some(0)).unwrap().requires_api, None);
    }
}
