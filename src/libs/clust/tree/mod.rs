pub mod io;
pub mod ops;
pub mod stat;
pub mod traversal;

use super::node::{ClusterNode, NodeId};
use crate::libs::error::Result;
use crate::libs::matrix::IndexRemap;
use serde::{Deserialize, Serialize};

/// Dendrogram stored as an arena of nodes.
///
/// Every restructuring operation returns a new tree; nodes are never shared
/// between trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTree<T> {
    /// Arena storage for all nodes
    pub(in crate::libs::clust) nodes: Vec<ClusterNode<T>>,

    /// Optional root ID (a tree might be empty or in construction)
    pub(in crate::libs::clust) root: Option<NodeId>,
}

impl<T> Default for ClusterTree<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }
}

impl<T> ClusterTree<T> {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree made of a single leaf.
    pub fn leaf(item: T, index: isize) -> Self {
        let mut tree = Self::new();
        let id = tree.add_leaf(item, index);
        tree.root = Some(id);
        tree
    }

    pub fn add_leaf(&mut self, item: T, index: isize) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ClusterNode::leaf(id, item, index));
        id
    }

    pub fn add_merge(&mut self, distance: f64, index: isize) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ClusterNode::merge(id, distance, index));
        id
    }

    /// Get number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        if id < self.nodes.len() {
            self.root = Some(id);
        }
    }

    pub fn get_node(&self, id: NodeId) -> Option<&ClusterNode<T>> {
        self.nodes.get(id)
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut ClusterNode<T>> {
        self.nodes.get_mut(id)
    }

    pub fn root_node(&self) -> Option<&ClusterNode<T>> {
        self.root.and_then(|r| self.nodes.get(r))
    }

    /// Merge height of the root; 0 for a single leaf or an empty tree.
    pub fn distance(&self) -> f64 {
        self.root_node().map_or(0.0, |n| n.distance())
    }

    /// Index of the root node.
    pub fn index(&self) -> Option<isize> {
        self.root_node().map(|n| n.index)
    }

    pub fn is_leaf(&self) -> bool {
        self.root_node().is_some_and(|n| n.is_leaf())
    }

    // --- Delegation to ops ---

    pub fn add_child(&mut self, parent_id: NodeId, child_id: NodeId) -> Result<()> {
        ops::add_child(self, parent_id, child_id)
    }

    // --- Delegation to traversal ---

    pub fn preorder(&self, start_node: NodeId) -> Vec<NodeId> {
        traversal::preorder(self, start_node)
    }

    pub fn postorder(&self, start_node: NodeId) -> Vec<NodeId> {
        traversal::postorder(self, start_node)
    }

    // --- Delegation to stat ---

    /// Leaf IDs in left-to-right order.
    pub fn get_leaves(&self) -> Vec<NodeId> {
        match self.root {
            Some(root) => stat::get_leaves(self, root),
            None => Vec::new(),
        }
    }

    pub fn get_leaves_of(&self, id: NodeId) -> Vec<NodeId> {
        stat::get_leaves(self, id)
    }

    /// Leaf payloads in left-to-right order.
    pub fn elements(&self) -> Vec<&T> {
        match self.root {
            Some(root) => stat::elements(self, root),
            None => Vec::new(),
        }
    }

    pub fn elements_of(&self, id: NodeId) -> Vec<&T> {
        stat::elements(self, id)
    }

    /// Matrix rows of the leaves, in leaf order.
    pub fn leaf_indices(&self) -> Vec<isize> {
        match self.root {
            Some(root) => stat::leaf_indices(self, root),
            None => Vec::new(),
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.get_leaves().len()
    }

    pub fn internal_count(&self) -> usize {
        match self.root {
            Some(root) => stat::internal_count(self, root),
            None => 0,
        }
    }

    /// Smallest index over all nodes, internal ones included.
    pub fn min_index(&self) -> Option<isize> {
        self.root.and_then(|root| stat::min_index(self, root))
    }

    pub fn is_binary(&self) -> bool {
        stat::is_binary(self)
    }

    // --- Delegation to io ---

    pub fn to_newick<F>(&self, label: F) -> String
    where
        F: Fn(&T) -> String,
    {
        io::to_newick_with_format(self, &label, "")
    }

    pub fn to_newick_with_format<F>(&self, label: F, indent: &str) -> String
    where
        F: Fn(&T) -> String,
    {
        io::to_newick_with_format(self, &label, indent)
    }
}

impl<T: Clone> ClusterTree<T> {
    /// Copy all nodes of `other` into this arena. Returns the new ID of
    /// `other`'s root.
    pub fn graft(&mut self, other: &ClusterTree<T>) -> Result<NodeId> {
        ops::graft(self, other)
    }

    pub fn extract_subtree(&self, root_id: NodeId) -> Result<ClusterTree<T>> {
        ops::extract_subtree(self, root_id)
    }

    /// Every node's children in reverse order; the leaf order flips.
    pub fn reversed(&self) -> ClusterTree<T> {
        ops::reversed(self)
    }

    pub fn remap_indices(&self, remap: &IndexRemap) -> Result<ClusterTree<T>> {
        ops::remap_indices(self, remap)
    }

    /// Give internal nodes the indices `start, start - 1, ...` in postorder.
    /// Returns the tree and the next unused index.
    pub fn renumber_internal(&self, start: isize) -> (ClusterTree<T>, isize) {
        ops::renumber_internal(self, start)
    }

    /// Replace each subtree whose root index is listed in `root_indices` by a
    /// leaf carrying the matching payload.
    pub fn drop_below<P: Clone>(
        &self,
        root_indices: &[isize],
        payloads: &[P],
    ) -> Result<ClusterTree<P>> {
        ops::drop_below(self, root_indices, payloads)
    }
}

impl<T> ClusterTree<T> {
    /// Same shape and indices, transformed payloads.
    pub fn map<U, F>(&self, f: F) -> ClusterTree<U>
    where
        F: Fn(&T) -> U,
    {
        ops::map(self, f)
    }

    /// Leaf payload of node `id`, if it is a leaf.
    pub fn item(&self, id: NodeId) -> Option<&T> {
        self.get_node(id).and_then(|n| n.item())
    }
}
