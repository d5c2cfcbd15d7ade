use std::collections::HashMap;
use std::rc::Rc;

use tower_lsp::lsp_types::Url;

use crate::bindings::NodeType;
use crate::parser::NodeId as AstNodeId;

pub type NodeRef = usize;

/// An AST node plus the file it came from — needed because a context spans
/// many files, each with its own `Ast` arena, so a bare `NodeId` is
/// ambiguous on its own (`spec.md` §3 "Runtime tree").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frag {
    pub file: Url,
    pub node: AstNodeId,
}

/// Primitive projection of a property's values, used by type checks without
/// re-walking the AST (`spec.md` §3 "Property object").
#[derive(Debug, Clone, PartialEq)]
pub enum QuickValue {
    Number(i64),
    Str(String),
    Bytes(Vec<u8>),
    PhandleRef(String),
    Macro(String),
    Unknown,
}

#[derive(Debug, Clone)]
pub struct NexusMapEntry {
    pub target: NodeRef,
    pub specifier_space: String,
}

#[derive(Debug, Clone)]
pub struct PropertyObject {
    pub name: String,
    pub declaration_site: Frag,
    pub all_sites: Vec<Frag>,
    pub values: Vec<Frag>,
    pub quick_values: Vec<QuickValue>,
    pub nexus_maps_to: Option<Vec<NexusMapEntry>>,
    pub property_type: Option<Rc<crate::bindings::PropertyType>>,
}

#[derive(Debug, Clone)]
pub struct RuntimeNode {
    pub path: Vec<String>,
    pub address: Option<String>,
    pub address2: Option<String>,
    pub labels: Vec<String>,
    pub definitions: Vec<Frag>,
    pub referenced_by: Vec<Frag>,
    pub properties: HashMap<String, PropertyObject>,
    pub children: Vec<NodeRef>,
    pub parent: Option<NodeRef>,
    pub phandle: Option<u32>,
    pub node_type: Option<Rc<NodeType>>,
    pub deleted: bool,
}

impl RuntimeNode {
    fn new(path: Vec<String>, parent: Option<NodeRef>) -> Self {
        Self {
            path,
            address: None,
            address2: None,
            labels: Vec::new(),
            definitions: Vec::new(),
            referenced_by: Vec::new(),
            properties: HashMap::new(),
            children: Vec::new(),
            parent,
            phandle: None,
            node_type: None,
            deleted: false,
        }
    }

    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("/")
    }
}

/// The merged, resolved tree produced by the evaluator from one context
/// (`spec.md` §3 "Runtime tree", GLOSSARY).
#[derive(Debug, Clone)]
pub struct RuntimeTree {
    pub nodes: Vec<RuntimeNode>,
    pub root: NodeRef,
    /// Label name → live runtime node, reflecting the last-defined binding
    /// (statement-index ordering is resolved before this map is built).
    pub labels: HashMap<String, NodeRef>,
    pub phandles: HashMap<u32, NodeRef>,
}

impl Default for RuntimeTree {
    fn default() -> Self {
        let mut nodes = Vec::new();
        nodes.push(RuntimeNode::new(Vec::new(), None));
        Self {
            nodes,
            root: 0,
            labels: HashMap::new(),
            phandles: HashMap::new(),
        }
    }
}

impl RuntimeTree {
    pub fn get(&self, r: NodeRef) -> &RuntimeNode {
        &self.nodes[r]
    }

    pub fn get_mut(&mut self, r: NodeRef) -> &mut RuntimeNode {
        &mut self.nodes[r]
    }

    pub fn child_named(&self, parent: NodeRef, name: &str, address: Option<&str>) -> Option<NodeRef> {
        self.nodes[parent].children.iter().copied().find(|&c| {
            let node = &self.nodes[c];
            node.name() == name && node.address.as_deref() == address
        })
    }

    pub fn add_child(&mut self, parent: NodeRef, name: String, address: Option<String>) -> NodeRef {
        let mut path = self.nodes[parent].path.clone();
        path.push(match &address {
            Some(a) => format!("{name}@{a}"),
            None => name.clone(),
        });
        let id = self.nodes.len();
        let mut node = RuntimeNode::new(path, Some(parent));
        node.address = address;
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    pub fn resolve_path(&self, path: &str) -> Option<NodeRef> {
        let mut current = self.root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let (name, address) = match segment.split_once('@') {
                Some((n, a)) => (n, Some(a)),
                None => (segment, None),
            };
            current = self.child_named(current, name, address)?;
        }
        Some(current)
    }
}
