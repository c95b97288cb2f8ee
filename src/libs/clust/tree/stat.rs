use super::ClusterTree;
use crate::libs::clust::node::NodeId;

/// Leaf IDs below `start`, left to right.
pub fn get_leaves<T>(tree: &ClusterTree<T>, start: NodeId) -> Vec<NodeId> {
    tree.preorder(start)
        .into_iter()
        .filter(|&id| tree.get_node(id).is_some_and(|n| n.is_leaf()))
        .collect()
}

pub fn elements<T>(tree: &ClusterTree<T>, start: NodeId) -> Vec<&T> {
    get_leaves(tree, start)
        .into_iter()
        .filter_map(|id| tree.item(id))
        .collect()
}

pub fn leaf_indices<T>(tree: &ClusterTree<T>, start: NodeId) -> Vec<isize> {
    get_leaves(tree, start)
        .into_iter()
        .filter_map(|id| tree.get_node(id).map(|n| n.index))
        .collect()
}

pub fn internal_count<T>(tree: &ClusterTree<T>, start: NodeId) -> usize {
    tree.preorder(start)
        .into_iter()
        .filter(|&id| tree.get_node(id).is_some_and(|n| !n.is_leaf()))
        .count()
}

pub fn min_index<T>(tree: &ClusterTree<T>, start: NodeId) -> Option<isize> {
    tree.preorder(start)
        .into_iter()
        .filter_map(|id| tree.get_node(id).map(|n| n.index))
        .min()
}

/// Every internal node has exactly two children.
pub fn is_binary<T>(tree: &ClusterTree<T>) -> bool {
    match tree.get_root() {
        Some(root) => tree.preorder(root).into_iter().all(|id| {
            tree.get_node(id)
                .is_some_and(|n| n.is_leaf() || n.children.len() == 2)
        }),
        None => true,
    }
}
