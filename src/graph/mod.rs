//! Type hierarchy of the analyzed project
//!
//! Platform classes from the knowledge base and classes declared in source
//! share one directed graph whose edges point from a type to its supertypes.
//! Member lookups walk this graph to find the declaring ancestor.

mod index;
mod scope;

pub use index::{ProjectIndex, SourceField, SourceMethod, SourceType};
pub use scope::TypeScope;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// Where a type in the hierarchy comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOrigin {
    Platform,
    Source,
}

/// Kind of supertype edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupertypeKind {
    Extends,
    Implements,
}

#[derive(Debug, Clone)]
pub struct TypeNode {
    pub name: String,
    pub origin: TypeOrigin,
}

/// Directed graph of types; edges go from subtype to supertype
#[derive(Debug, Default)]
pub struct TypeGraph {
    inner: DiGraph<TypeNode, SupertypeKind>,
    node_map: HashMap<String, NodeIndex>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type, returning the existing node if the name is already known
    pub fn add_type(&mut self, name: &str, origin: TypeOrigin) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(name) {
            return idx;
        }
        let idx = self.inner.add_node(TypeNode {
            name: name.to_string(),
            origin,
        });
        self.node_map.insert(name.to_string(), idx);
        idx
    }

    /// Record that `sub` extends or implements `sup`. Unknown types are ignored.
    pub fn add_supertype(&mut self, sub: &str, sup: &str, kind: SupertypeKind) {
        if let (Some(&from), Some(&to)) = (self.node_map.get(sub), self.node_map.get(sup)) {
            if from != to && self.inner.find_edge(from, to).is_none() {
                self.inner.add_edge(from, to, kind);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    pub fn origin(&self, name: &str) -> Option<TypeOrigin> {
        let idx = self.node_map.get(name)?;
        self.inner.node_weight(*idx).map(|n| n.origin)
    }

    pub fn type_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Direct supertypes of a type in declaration order
    fn supertypes(&self, idx: NodeIndex, kind: SupertypeKind) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| *e.weight() == kind)
            .map(|e| (e.id(), e.target()))
            .collect();
        edges.sort_by_key(|(id, _)| id.index());
        edges.into_iter().map(|(_, target)| target).collect()
    }

    pub fn super_class(&self, name: &str) -> Option<&str> {
        let idx = *self.node_map.get(name)?;
        let sup = *self.supertypes(idx, SupertypeKind::Extends).first()?;
        Some(self.inner[sup].name.as_str())
    }

    /// All ancestors of `name`, nearest first: the superclass chain, then the
    /// interfaces of the type and of each superclass, breadth first.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let Some(&start) = self.node_map.get(name) else {
            return Vec::new();
        };

        let mut visited = HashSet::from([start]);
        let mut chain = vec![start];
        let mut current = start;
        while let Some(&sup) = self.supertypes(current, SupertypeKind::Extends).first() {
            if !visited.insert(sup) {
                break;
            }
            chain.push(sup);
            current = sup;
        }

        let mut ordered: Vec<NodeIndex> = chain[1..].to_vec();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        for &class in &chain {
            queue.extend(self.supertypes(class, SupertypeKind::Implements));
        }
        while let Some(interface) = queue.pop_front() {
            if !visited.insert(interface) {
                continue;
            }
            ordered.push(interface);
            // Interfaces extending interfaces are recorded as either edge kind
            queue.extend(self.supertypes(interface, SupertypeKind::Implements));
            queue.extend(self.supertypes(interface, SupertypeKind::Extends));
        }

        ordered
            .into_iter()
            .map(|idx| self.inner[idx].name.clone())
            .collect()
    }

    /// Whether `name` is `ancestor` or inherits from it
    pub fn is_subtype_of(&self, name: &str, ancestor: &str) -> bool {
        name == ancestor || self.ancestors(name).iter().any(|a| a == ancestor)
    }
}
