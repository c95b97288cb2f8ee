use super::ClusterTree;
use crate::libs::clust::node::NodeId;

/// Get node IDs in preorder traversal (Root -> Children)
pub fn preorder<T>(tree: &ClusterTree<T>, start_node: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut stack = vec![start_node];

    while let Some(id) = stack.pop() {
        if let Some(node) = tree.get_node(id) {
            result.push(id);
            // Push children in reverse order so they are processed in order
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    result
}

/// Get node IDs in postorder traversal (Children -> Root)
pub fn postorder<T>(tree: &ClusterTree<T>, start_node: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    // (node, children expanded)
    let mut stack = vec![(start_node, false)];

    while let Some((id, expanded)) = stack.pop() {
        let Some(node) = tree.get_node(id) else {
            continue;
        };
        if expanded || node.children.is_empty() {
            result.push(id);
        } else {
            stack.push((id, true));
            for &child in node.children.iter().rev() {
                stack.push((child, false));
            }
        }
    }

    result
}
