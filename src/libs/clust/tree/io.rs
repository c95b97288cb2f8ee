use super::ClusterTree;
use crate::libs::clust::node::NodeId;

/// Serialize the tree to Newick.
///
/// Leaves are labelled by `label`; every non-root node carries the branch
/// length `parent distance - own distance`, so root-to-leaf path lengths equal
/// the merge heights. An empty indent gives a single line.
pub fn to_newick_with_format<T, F>(tree: &ClusterTree<T>, label: &F, indent: &str) -> String
where
    F: Fn(&T) -> String,
{
    match tree.get_root() {
        Some(root) => {
            let mut s = to_newick_recursive(tree, root, label, indent, 0);
            s.push(';');
            s
        }
        None => ";".to_string(),
    }
}

fn to_newick_recursive<T, F>(
    tree: &ClusterTree<T>,
    node_id: NodeId,
    label: &F,
    indent: &str,
    depth: usize,
) -> String
where
    F: Fn(&T) -> String,
{
    let Some(node) = tree.get_node(node_id) else {
        return String::new();
    };
    let is_pretty = !indent.is_empty();

    let my_indent = if is_pretty {
        indent.repeat(depth)
    } else {
        String::new()
    };

    let mut node_info = String::new();
    if let Some(item) = node.item() {
        node_info.push_str(&quote_label(&label(item)));
    }
    if let Some(parent) = node.parent.and_then(|p| tree.get_node(p)) {
        node_info.push_str(&format!(":{}", parent.distance() - node.distance()));
    }

    if node.children.is_empty() {
        format!("{}{}", my_indent, node_info)
    } else {
        let children_strs: Vec<String> = node
            .children
            .iter()
            .map(|&child| to_newick_recursive(tree, child, label, indent, depth + 1))
            .collect();

        if is_pretty {
            format!(
                "{}(\n{}\n{}){}",
                my_indent,
                children_strs.join(",\n"),
                my_indent,
                node_info
            )
        } else {
            format!("({}){}", children_strs.join(","), node_info)
        }
    }
}

fn quote_label(label: &str) -> String {
    let needs_quote = label.chars().any(|c| "(),:;[] \t\n'".contains(c));
    if needs_quote {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}
