use super::ClusterTree;
use crate::libs::clust::node::{ClusterNode, NodeId, NodeKind};
use crate::libs::error::{FamilyError, Result};
use crate::libs::matrix::IndexRemap;
use std::collections::HashMap;

/// Attach `child_id` below `parent_id`.
///
/// Fails if either node is missing, the parent is a leaf, or the child
/// already has a parent.
pub fn add_child<T>(tree: &mut ClusterTree<T>, parent_id: NodeId, child_id: NodeId) -> Result<()> {
    if parent_id == child_id {
        return Err(FamilyError::Tree(format!(
            "Cannot add node {} as child of itself",
            parent_id
        )));
    }

    match tree.get_node(parent_id) {
        None => {
            return Err(FamilyError::Tree(format!(
                "Parent node {} not found",
                parent_id
            )))
        }
        Some(node) if node.is_leaf() => {
            return Err(FamilyError::Tree(format!(
                "Leaf node {} can not have children",
                parent_id
            )))
        }
        _ => {}
    }

    match tree.get_node(child_id) {
        None => {
            return Err(FamilyError::Tree(format!(
                "Child node {} not found",
                child_id
            )))
        }
        Some(node) if node.parent.is_some() => {
            return Err(FamilyError::Tree(format!(
                "Node {} already has a parent",
                child_id
            )))
        }
        _ => {}
    }

    tree.nodes[parent_id].children.push(child_id);
    tree.nodes[child_id].parent = Some(parent_id);
    Ok(())
}

// Preorder copy of the subtree at `id` into `dst`.
fn copy_subtree<T: Clone>(
    src: &ClusterTree<T>,
    id: NodeId,
    dst: &mut ClusterTree<T>,
) -> Result<NodeId> {
    let node = src
        .get_node(id)
        .ok_or_else(|| FamilyError::Tree(format!("Node {} not found", id)))?;

    let new_id = dst.nodes.len();
    dst.nodes.push(ClusterNode {
        id: new_id,
        parent: None,
        children: Vec::new(),
        index: node.index,
        kind: node.kind.clone(),
    });

    for &child in &node.children {
        let new_child = copy_subtree(src, child, dst)?;
        add_child(dst, new_id, new_child)?;
    }

    Ok(new_id)
}

pub fn graft<T: Clone>(tree: &mut ClusterTree<T>, other: &ClusterTree<T>) -> Result<NodeId> {
    let root = other
        .get_root()
        .ok_or_else(|| FamilyError::Tree("Cannot graft an empty tree".to_string()))?;
    copy_subtree(other, root, tree)
}

/// Extract a subtree rooted at `node_id`.
/// Returns a new, compact tree.
pub fn extract_subtree<T: Clone>(tree: &ClusterTree<T>, node_id: NodeId) -> Result<ClusterTree<T>> {
    let mut new_tree = ClusterTree::new();
    let root = copy_subtree(tree, node_id, &mut new_tree)?;
    new_tree.set_root(root);
    Ok(new_tree)
}

pub fn reversed<T: Clone>(tree: &ClusterTree<T>) -> ClusterTree<T> {
    let mut new_tree = tree.clone();
    for node in new_tree.nodes.iter_mut() {
        node.children.reverse();
    }
    new_tree
}

pub fn remap_indices<T: Clone>(tree: &ClusterTree<T>, remap: &IndexRemap) -> Result<ClusterTree<T>> {
    let mut new_tree = tree.clone();
    for node in new_tree.nodes.iter_mut() {
        if node.is_leaf() {
            node.index = remap.map_index(node.index)?;
        }
    }
    Ok(new_tree)
}

pub fn renumber_internal<T: Clone>(tree: &ClusterTree<T>, start: isize) -> (ClusterTree<T>, isize) {
    let mut new_tree = tree.clone();
    let mut next = start;
    if let Some(root) = tree.get_root() {
        for id in tree.postorder(root) {
            if !new_tree.nodes[id].is_leaf() {
                new_tree.nodes[id].index = next;
                next -= 1;
            }
        }
    }
    (new_tree, next)
}

pub fn map<T, U, F>(tree: &ClusterTree<T>, f: F) -> ClusterTree<U>
where
    F: Fn(&T) -> U,
{
    let nodes = tree
        .nodes
        .iter()
        .map(|n| ClusterNode {
            id: n.id,
            parent: n.parent,
            children: n.children.clone(),
            index: n.index,
            kind: match &n.kind {
                NodeKind::Leaf { item } => NodeKind::Leaf { item: f(item) },
                NodeKind::Merge { distance } => NodeKind::Merge {
                    distance: *distance,
                },
            },
        })
        .collect();

    ClusterTree {
        nodes,
        root: tree.root,
    }
}

pub fn drop_below<T, P: Clone>(
    tree: &ClusterTree<T>,
    root_indices: &[isize],
    payloads: &[P],
) -> Result<ClusterTree<P>> {
    if root_indices.len() != payloads.len() {
        return Err(FamilyError::DimensionMismatch {
            expected: root_indices.len(),
            found: payloads.len(),
        });
    }
    let root = tree
        .get_root()
        .ok_or(FamilyError::EmptyInput("tree"))?;

    let lookup: HashMap<isize, usize> = root_indices
        .iter()
        .enumerate()
        .map(|(k, &idx)| (idx, k))
        .collect();

    fn helper<T, P: Clone>(
        src: &ClusterTree<T>,
        id: NodeId,
        dst: &mut ClusterTree<P>,
        lookup: &HashMap<isize, usize>,
        payloads: &[P],
    ) -> Result<NodeId> {
        let node = src
            .get_node(id)
            .ok_or_else(|| FamilyError::Tree(format!("Node {} not found", id)))?;

        if let Some(&k) = lookup.get(&node.index) {
            return Ok(dst.add_leaf(payloads[k].clone(), node.index));
        }

        match &node.kind {
            NodeKind::Leaf { .. } => Err(FamilyError::Tree(format!(
                "Leaf with index {} is not below any listed root",
                node.index
            ))),
            NodeKind::Merge { distance } => {
                let new_id = dst.add_merge(*distance, node.index);
                for &child in &node.children {
                    let new_child = helper(src, child, dst, lookup, payloads)?;
                    add_child(dst, new_id, new_child)?;
                }
                Ok(new_id)
            }
        }
    }

    let mut new_tree = ClusterTree::new();
    let new_root = helper(tree, root, &mut new_tree, &lookup, payloads)?;
    new_tree.set_root(new_root);
    Ok(new_tree)
}
