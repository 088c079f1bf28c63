use super::ProjectIndex;
use crate::parser::ast::CompilationUnit;

/// Name resolution context of code inside one type declaration
pub struct TypeScope<'a> {
    index: &'a ProjectIndex,
    unit: &'a CompilationUnit,
    /// Lexically enclosing source types, innermost first
    enclosing: Vec<String>,
}

impl<'a> TypeScope<'a> {
    pub fn new(index: &'a ProjectIndex, unit: &'a CompilationUnit, qualified_name: &str) -> Self {
        let mut enclosing = Vec::new();
        let mut current = qualified_name;
        while index.source_type(current).is_some() {
            enclosing.push(current.to_string());
            match current.rfind(['$', '.']) {
                Some(pos) => current = &current[..pos],
                None => break,
            }
        }
        Self {
            index,
            unit,
            enclosing,
        }
    }

    pub fn index(&self) -> &'a ProjectIndex {
        self.index
    }

    pub fn unit(&self) -> &'a CompilationUnit {
        self.unit
    }

    /// Enclosing source types, innermost first
    pub fn enclosing(&self) -> &[String] {
        &self.enclosing
    }

    /// Qualified name of a type as written at this point
    pub fn resolve(&self, name: &str) -> Option<String> {
        if name.contains('.') {
            return self.resolve_dotted(name);
        }
        self.resolve_simple(name)
    }

    fn resolve_dotted(&self, name: &str) -> Option<String> {
        if self.index.is_known_type(name) {
            return Some(name.to_string());
        }
        let mut parts = name.split('.');
        let mut resolved = self.resolve_simple(parts.next()?)?;
        for part in parts {
            resolved = self.member_type(&resolved, part)?;
        }
        Some(resolved)
    }

    fn resolve_simple(&self, name: &str) -> Option<String> {
        for outer in &self.enclosing {
            if let Some(ty) = self.index.source_type(outer) {
                if ty.simple_name == name {
                    return Some(outer.clone());
                }
                if let Some(member) = ty.member_types.get(name) {
                    return Some(member.clone());
                }
            }
        }

        let mut declared = None;
        self.unit.for_each_type(&mut |decl| {
            if declared.is_none() && decl.name == name {
                declared = Some(decl.qualified_name.clone());
            }
        });
        if declared.is_some() {
            return declared;
        }

        let imports = || self.unit.imports.iter().filter(|i| !i.is_static);

        if let Some(import) = imports().find(|i| !i.on_demand && i.simple_name() == name) {
            return Some(import.path.clone());
        }

        if let Some(ty) = self.index.package_type(self.unit.package.as_deref(), name) {
            return Some(ty.to_string());
        }

        for import in imports().filter(|i| i.on_demand) {
            let candidate = format!("{}.{}", import.path, name);
            if self.index.is_known_type(&candidate) {
                return Some(candidate);
            }
        }

        let lang = format!("java.lang.{}", name);
        if self.index.is_known_type(&lang) {
            return Some(lang);
        }

        for outer in &self.enclosing {
            for ancestor in self.index.ancestors(outer) {
                if let Some(member) = self.member_type(&ancestor, name) {
                    return Some(member);
                }
            }
        }

        None
    }

    /// Member type `name` declared directly in `owner`
    fn member_type(&self, owner: &str, name: &str) -> Option<String> {
        if let Some(member) = self
            .index
            .source_type(owner)
            .and_then(|ty| ty.member_types.get(name))
        {
            return Some(member.clone());
        }
        let candidate = format!("{}.{}", owner, name);
        self.index.is_known_type(&candidate).then_some(candidate)
    }
}
