use super::node::NodeId;
use super::tree::ClusterTree;
use crate::libs::error::{FamilyError, Result};
use crate::libs::matrix::DistanceMatrix;
use std::collections::{BTreeMap, HashMap};

// Best ordering of a subtree given its leftmost and rightmost leaf.
// `junction` holds the two leaves meeting between the children; frozen
// (non-binary) nodes and leaves have none.
#[derive(Debug, Clone, Copy)]
struct Entry {
    cost: f64,
    junction: Option<(NodeId, NodeId)>,
}

type Table = BTreeMap<(NodeId, NodeId), Entry>;

impl<T: Clone> ClusterTree<T> {
    /// See [`leaf_order`].
    pub fn leaf_order(&self, matrix: &DistanceMatrix) -> Result<ClusterTree<T>> {
        leaf_order(self, matrix)
    }
}

/// Optimal leaf ordering (Bar-Joseph, Gifford & Jaakkola, 2001).
///
/// Flips children so the sum of distances between adjacent leaves is
/// minimal. Merge structure, distances and indices are unchanged.
/// Nodes with more than two children keep their child order and are only
/// flipped as a whole.
pub fn leaf_order<T: Clone>(tree: &ClusterTree<T>, matrix: &DistanceMatrix) -> Result<ClusterTree<T>> {
    let Some(root) = tree.get_root() else {
        return Ok(tree.clone());
    };

    let mut rows: HashMap<NodeId, usize> = HashMap::new();
    for leaf in tree.get_leaves() {
        let index = tree.get_node(leaf).map_or(-1, |n| n.index);
        rows.insert(leaf, matrix.check_index(index)?);
    }
    let dist = |a: NodeId, b: NodeId| matrix.get(rows[&a], rows[&b]);

    let mut ordered = tree.clone();
    let mut tables: HashMap<NodeId, Table> = HashMap::new();

    for id in tree.postorder(root) {
        let node = tree
            .get_node(id)
            .ok_or_else(|| FamilyError::Tree(format!("Node {} not found", id)))?;

        let mut table = Table::new();
        if node.is_leaf() {
            table.insert(
                (id, id),
                Entry {
                    cost: 0.0,
                    junction: None,
                },
            );
        } else if node.children.len() == 2 {
            let (a, b) = (node.children[0], node.children[1]);
            let leaves_a = tree.get_leaves_of(a);
            let leaves_b = tree.get_leaves_of(b);
            let table_a = &tables[&a];
            let table_b = &tables[&b];

            for &l in &leaves_a {
                // cheapest way from l through a to each k of b
                let through: Vec<(f64, NodeId)> = leaves_b
                    .iter()
                    .map(|&k| {
                        let mut best = (f64::INFINITY, l);
                        for (&(_, m), entry) in table_a.range((l, 0)..=(l, NodeId::MAX)) {
                            let cost = entry.cost + dist(m, k);
                            if cost < best.0 {
                                best = (cost, m);
                            }
                        }
                        best
                    })
                    .collect();

                for &r in &leaves_b {
                    let mut best = (f64::INFINITY, l, r);
                    for (&k, &(cost_lk, m)) in leaves_b.iter().zip(through.iter()) {
                        if let Some(entry) = table_b.get(&(k, r)) {
                            let cost = cost_lk + entry.cost;
                            if cost < best.0 {
                                best = (cost, m, k);
                            }
                        }
                    }
                    let (cost, m, k) = best;
                    table.insert(
                        (l, r),
                        Entry {
                            cost,
                            junction: Some((m, k)),
                        },
                    );
                    table.insert(
                        (r, l),
                        Entry {
                            cost,
                            junction: Some((k, m)),
                        },
                    );
                }
            }
        } else {
            // Frozen node: settle each child on its own, keep the child order
            for &child in &node.children {
                let (&(l, r), _) = best_entry(&tables[&child])?;
                apply(&mut ordered, &tables, child, l, r)?;
            }
            let leaves = ordered.get_leaves_of(id);
            let cost: f64 = leaves.windows(2).map(|w| dist(w[0], w[1])).sum();
            if let (Some(&first), Some(&last)) = (leaves.first(), leaves.last()) {
                let entry = Entry {
                    cost,
                    junction: None,
                };
                table.insert((first, last), entry);
                table.insert((last, first), entry);
            }
        }

        tables.insert(id, table);
    }

    let (&(l, r), _) = best_entry(&tables[&root])?;
    apply(&mut ordered, &tables, root, l, r)?;

    Ok(ordered)
}

fn best_entry(table: &Table) -> Result<(&(NodeId, NodeId), &Entry)> {
    let mut best: Option<(&(NodeId, NodeId), &Entry)> = None;
    for (key, entry) in table {
        match best {
            Some((_, b)) if entry.cost >= b.cost => {}
            _ => best = Some((key, entry)),
        }
    }
    best.ok_or_else(|| FamilyError::Tree("Empty leaf ordering table".to_string()))
}

// Lay out the subtree at `id` so that it starts at leaf `l` and ends at `r`.
fn apply<T>(
    tree: &mut ClusterTree<T>,
    tables: &HashMap<NodeId, Table>,
    id: NodeId,
    l: NodeId,
    r: NodeId,
) -> Result<()> {
    let children = match tree.get_node(id) {
        Some(node) if !node.is_leaf() => node.children.clone(),
        _ => return Ok(()),
    };
    let entry = tables
        .get(&id)
        .and_then(|t| t.get(&(l, r)))
        .ok_or_else(|| FamilyError::Tree(format!("No ordering of node {} from {} to {}", id, l, r)))?;

    match entry.junction {
        Some((m, k)) => {
            let (a, b) = (children[0], children[1]);
            let l_in_a = tables
                .get(&a)
                .is_some_and(|t| t.range((l, 0)..=(l, NodeId::MAX)).next().is_some());
            let (first, second) = if l_in_a { (a, b) } else { (b, a) };
            tree.nodes[id].children = vec![first, second];
            apply(tree, tables, first, l, m)?;
            apply(tree, tables, second, k, r)?;
        }
        None => {
            if tree.get_leaves_of(id).first() != Some(&l) {
                for node in tree.preorder(id) {
                    tree.nodes[node].children.reverse();
                }
            }
        }
    }

    Ok(())
}
