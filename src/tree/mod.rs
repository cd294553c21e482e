//! The resolved dependency tree: an arena of nodes addressed by [`NodeId`].
//!
//! A node's `parent` is `None` while it hangs directly off the project root.
//! Removing a node frees its whole subtree.

use crate::fsutil::NODE_MODULES;
use crate::resolver::{ResolvedVersion, VersionSpec};
use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

mod builder;
mod hoist;

pub use builder::{BuildOptions, TreeBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    /// What the referrer asked for; cleared once the node is hoisted.
    pub version_spec: Option<VersionSpec>,
    pub resolved: ResolvedVersion,
    pub dependency_specs: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    loaded: bool,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        version_spec: VersionSpec,
        resolved: ResolvedVersion,
        dependency_specs: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            version_spec: Some(version_spec),
            resolved,
            dependency_specs,
            parent: None,
            children: Vec::new(),
            loaded: false,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// True when the node's requester accepts `version`. A hoisted node only
    /// accepts its own version.
    pub fn accepts(&self, version: &ResolvedVersion) -> bool {
        match &self.version_spec {
            Some(spec) => spec.is_satisfied_by(version),
            None => &self.resolved == version,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyTree {
    nodes: Vec<Option<Node>>,
    root_children: Vec<NodeId>,
    root_loaded: bool,
}

impl DependencyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children_of(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            None => &self.root_children,
            Some(id) => self.get(id).map(Node::children).unwrap_or_default(),
        }
    }

    fn children_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Vec<NodeId>> {
        match parent {
            None => Some(&mut self.root_children),
            Some(id) => self.get_mut(id).map(|n| &mut n.children),
        }
    }

    /// Attach `node` as the last child of `parent`.
    pub fn insert(&mut self, parent: Option<NodeId>, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent;
        self.nodes.push(Some(node));
        if let Some(children) = self.children_mut(parent) {
            children.push(id);
        }
        id
    }

    /// Detach `id` from its parent and free it with everything below it.
    pub fn remove(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else { return };
        let parent = node.parent;
        if let Some(children) = self.children_mut(parent) {
            children.retain(|c| *c != id);
        }
        let mut doomed = vec![id];
        while let Some(next) = doomed.pop() {
            if let Some(node) = self.nodes.get_mut(next.0).and_then(Option::take) {
                doomed.extend(node.children);
            }
        }
    }

    /// Move `id` (with its subtree) to the end of the root's children. A node
    /// already at the root keeps its place.
    pub fn reparent_to_root(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else { return };
        let Some(parent) = node.parent else { return };
        if let Some(children) = self.children_mut(Some(parent)) {
            children.retain(|c| *c != id);
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = None;
        }
        self.root_children.push(id);
    }

    pub fn root_child_named(&self, name: &str) -> Option<NodeId> {
        self.root_children.iter().copied().find(|id| self[*id].name == name)
    }

    /// True when `name` is `id` itself or one of its ancestors.
    pub fn path_contains(&self, id: Option<NodeId>, name: &str) -> bool {
        let mut cursor = id;
        while let Some(current) = cursor.and_then(|c| self.get(c)) {
            if current.name == name {
                return true;
            }
            cursor = current.parent;
        }
        false
    }

    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cursor = self.get(id).and_then(|n| n.parent);
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.get(parent).and_then(|n| n.parent);
        }
        depth
    }

    /// Live nodes, parents before their children, siblings in order.
    pub fn pre_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.root_children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// `<cwd>/node_modules/<a>/node_modules/<b>` for a node `b` under `a`.
    pub fn install_path(&self, cwd: &Path, id: NodeId) -> PathBuf {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(node) = cursor.and_then(|c| self.get(c)) {
            chain.push(node.name.as_str());
            cursor = node.parent;
        }
        let mut path = cwd.to_path_buf();
        for name in chain.iter().rev() {
            path.push(NODE_MODULES);
            path.extend(name.split('/'));
        }
        path
    }

    pub(crate) fn mark_loaded(&mut self, id: Option<NodeId>) {
        match id {
            None => self.root_loaded = true,
            Some(id) => {
                if let Some(node) = self.get_mut(id) {
                    node.loaded = true;
                }
            }
        }
    }

    /// Load completion of a subtree in percent: 0 until its children are
    /// known, 100 with no children, otherwise the rounded mean of the children.
    pub fn completion(&self, id: Option<NodeId>) -> u8 {
        let loaded = match id {
            None => self.root_loaded,
            Some(id) => self.get(id).is_some_and(|n| n.loaded),
        };
        if !loaded {
            return 0;
        }
        let children = self.children_of(id);
        if children.is_empty() {
            return 100;
        }
        let sum: u32 = children.iter().map(|c| u32::from(self.completion(Some(*c)))).sum();
        (f64::from(sum) / children.len() as f64).round() as u8
    }

    /// One `name@version` line per node, indented two spaces per level.
    pub fn render(&self) -> Vec<String> {
        self.pre_order()
            .into_iter()
            .map(|id| {
                let node = &self[id];
                format!("{}{}@{}", "  ".repeat(self.depth(id)), node.name, node.resolved)
            })
            .collect()
    }
}

impl Index<NodeId> for DependencyTree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("node {} was removed from the tree", id.0),
        }
    }
}

impl IndexMut<NodeId> for DependencyTree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("node {} was removed from the tree", id.0),
        }
    }
}
