use std::{collections::HashMap, sync::Arc};

use crate::data::{
    input::{Input, InputValue},
    schema::SchemaNode,
};

/// Stable index of a node inside a [`ModelTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Shape of a model node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Declared properties, in schema order.
    Object { children: Vec<NodeId> },
    /// Repeated items, in index order.
    Array { items: Vec<NodeId> },
    /// Terminal node bound to an input.
    Leaf(Input),
    /// Static content block; holds no data.
    Content,
}

/// A node of the model tree, mirroring one schema node.
#[derive(Debug, Clone)]
pub struct ModelNode {
    pub schema: Arc<SchemaNode>,
    pub kind: NodeKind,
    /// Path with array indices, e.g. `Book/authors/0/name`.
    pub path: String,
    /// Path with array indices stripped, e.g. `Book/authors/name`.
    pub path_no_index: String,
    /// Property name within the parent object (empty for items and roots).
    pub key: String,
    pub parent: Option<NodeId>,
    pub multiselect: bool,
    pub is_file: bool,
    pub file_key: Option<String>,
    /// Field errors from the last validation pass.
    pub errors: Vec<String>,
}

impl ModelNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Bound input of a leaf.
    pub fn input(&self) -> Option<&Input> {
        match &self.kind {
            NodeKind::Leaf(input) => Some(input),
            _ => None,
        }
    }

    pub fn input_mut(&mut self) -> Option<&mut Input> {
        match &mut self.kind {
            NodeKind::Leaf(input) => Some(input),
            _ => None,
        }
    }

    /// Current value of a leaf.
    pub fn value(&self) -> Option<&InputValue> {
        self.input().map(|i| &i.value)
    }

    /// Name of the schema the node belongs to.
    pub fn schema_name(&self) -> &str {
        crate::data::pointer::root(&self.path)
    }
}

/// Arena holding the model nodes of every attached schema.
///
/// Nodes refer to their parent by [`NodeId`] rather than by reference, so the
/// whole tree can be dropped and rebuilt without dangling back-references.
#[derive(Debug, Clone, Default)]
pub struct ModelTree {
    nodes: Vec<ModelNode>,
    roots: Vec<(String, NodeId)>,
    by_path: HashMap<String, NodeId>,
}

impl ModelTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node and index it by path.
    pub fn insert(&mut self, node: ModelNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.by_path.insert(node.path.clone(), id);
        self.nodes.push(node);
        id
    }

    /// Append `child` to the children (or items) of `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        match &mut self.nodes[parent.0].kind {
            NodeKind::Object { children } => children.push(child),
            NodeKind::Array { items } => items.push(child),
            NodeKind::Leaf(_) | NodeKind::Content => {
                debug!(
                    "ignoring child {} of terminal node {}",
                    self.nodes[child.0].path, self.nodes[parent.0].path
                );
            }
        }
    }

    /// Register the root node of a schema.
    pub fn add_root(&mut self, schema_name: &str, id: NodeId) {
        self.roots.push((schema_name.to_string(), id));
    }

    pub fn get(&self, id: NodeId) -> &ModelNode {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut ModelNode {
        &mut self.nodes[id.0]
    }

    /// Find a node by its indexed path.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    /// Root node of a schema.
    pub fn root(&self, schema_name: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .find(|(name, _)| name == schema_name)
            .map(|(_, id)| *id)
    }

    /// Roots in attachment order.
    pub fn roots(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.roots.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Children of an object or items of an array.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].kind {
            NodeKind::Object { children } => children,
            NodeKind::Array { items } => items,
            _ => &[],
        }
    }

    /// All nodes below (and including) `id`, depth first in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.children(cur).iter().rev());
        }
        out
    }

    /// Leaves below `id`, depth first in document order.
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| self.get(*n).is_leaf())
            .collect()
    }

    /// Leaves of every attached schema.
    pub fn all_leaves(&self) -> Vec<NodeId> {
        self.roots
            .iter()
            .flat_map(|(_, root)| self.leaves(*root))
            .collect()
    }

    /// Paths of every node, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.by_path.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Drop the errors of the last validation pass, optionally for one schema.
    pub fn clear_errors(&mut self, schema_name: Option<&str>) {
        for node in &mut self.nodes {
            if schema_name.is_none_or(|name| node.schema_name() == name) {
                node.errors.clear();
            }
        }
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
