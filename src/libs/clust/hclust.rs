use super::node::NodeId;
use super::tree::ClusterTree;
use crate::libs::error::{FamilyError, Result};
use crate::libs::matrix::DistanceMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rule reducing the pairwise distances between two clusters to one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Minimum pairwise distance
    Single,
    /// Maximum pairwise distance
    Complete,
    /// Mean pairwise distance (UPGMA)
    #[default]
    Average,
}

impl Linkage {
    /// Reduce values with min, max or mean. `None` for an empty slice.
    ///
    /// ```
    /// use tfam::libs::clust::Linkage;
    /// assert_eq!(Linkage::Single.reduce(&[3.0, 1.0, 2.0]), Some(1.0));
    /// assert_eq!(Linkage::Complete.reduce(&[3.0, 1.0, 2.0]), Some(3.0));
    /// assert_eq!(Linkage::Average.reduce(&[3.0, 1.0, 2.0]), Some(2.0));
    /// assert_eq!(Linkage::Average.reduce(&[]), None);
    /// ```
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let reduced = match self {
            Linkage::Single => values.iter().copied().fold(f64::INFINITY, f64::min),
            Linkage::Complete => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Linkage::Average => values.iter().sum::<f64>() / values.len() as f64,
        };
        Some(reduced)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
        }
    }
}

impl std::str::FromStr for Linkage {
    type Err = FamilyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Linkage::Single),
            "complete" => Ok(Linkage::Complete),
            "average" | "upgma" => Ok(Linkage::Average),
            _ => Err(FamilyError::InvalidConfig(format!("unknown linkage '{}'", s))),
        }
    }
}

impl std::fmt::Display for Linkage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Agglomerative hierarchical clustering over a [`DistanceMatrix`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hclust {
    pub linkage: Linkage,
}

fn key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    (a.min(b), a.max(b))
}

impl Hclust {
    pub fn new(linkage: Linkage) -> Self {
        Self { linkage }
    }

    /// Cluster `items`, where `items[i]` owns row `i` of `matrix`.
    ///
    /// A single item yields a single leaf.
    pub fn cluster<T: Clone>(&self, matrix: &DistanceMatrix, items: &[T]) -> Result<ClusterTree<T>> {
        if items.is_empty() {
            return Err(FamilyError::EmptyInput("items"));
        }
        if items.len() != matrix.size() {
            return Err(FamilyError::DimensionMismatch {
                expected: matrix.size(),
                found: items.len(),
            });
        }

        let forest = items
            .iter()
            .enumerate()
            .map(|(i, item)| ClusterTree::leaf(item.clone(), i as isize))
            .collect();
        self.cluster_forest(0, matrix, forest)
    }

    /// Linkage distance between two trees, over their leaf rows.
    pub fn linkage_distance<T>(
        &self,
        matrix: &DistanceMatrix,
        a: &ClusterTree<T>,
        b: &ClusterTree<T>,
    ) -> Result<f64> {
        let mut values = Vec::new();
        for i in a.leaf_indices() {
            for j in b.leaf_indices() {
                values.push(matrix.try_get(i, j)?);
            }
        }
        self.linkage
            .reduce(&values)
            .ok_or(FamilyError::EmptyInput("cluster"))
    }

    /// Cluster a forest of already built subtrees.
    ///
    /// Leaves address `matrix` by their index. New merge nodes get the
    /// indices `-index_offset - 1, -index_offset - 2, ...`, so an offset
    /// larger than every existing internal index keeps them unique.
    ///
    /// The closest pair is merged first; the scan visits `(i, j)` with
    /// `j < i` and keeps the first minimum. The merged node lists the later
    /// cluster first.
    pub fn cluster_forest<T: Clone>(
        &self,
        index_offset: isize,
        matrix: &DistanceMatrix,
        forest: Vec<ClusterTree<T>>,
    ) -> Result<ClusterTree<T>> {
        if forest.is_empty() {
            return Err(FamilyError::EmptyInput("forest"));
        }
        if index_offset < 0 {
            return Err(FamilyError::InvalidConfig(format!(
                "index offset must not be negative, got {}",
                index_offset
            )));
        }

        let mut tree = ClusterTree::new();

        // Active clusters: arena IDs of the current roots
        let mut active: Vec<NodeId> = Vec::with_capacity(forest.len());
        let mut cluster_sizes: HashMap<NodeId, usize> = HashMap::new();
        let mut leaf_rows: Vec<Vec<usize>> = Vec::with_capacity(forest.len());

        for sub in &forest {
            let rows = sub
                .leaf_indices()
                .into_iter()
                .map(|i| matrix.check_index(i))
                .collect::<Result<Vec<_>>>()?;
            if rows.is_empty() {
                return Err(FamilyError::EmptyInput("subtree"));
            }
            let id = tree.graft(sub)?;
            active.push(id);
            cluster_sizes.insert(id, rows.len());
            leaf_rows.push(rows);
        }

        let mut dists: HashMap<(NodeId, NodeId), f64> = HashMap::new();
        for i in 0..active.len() {
            for j in 0..i {
                let mut values = Vec::with_capacity(leaf_rows[i].len() * leaf_rows[j].len());
                for &a in &leaf_rows[i] {
                    for &b in &leaf_rows[j] {
                        values.push(matrix.get(a, b));
                    }
                }
                let d = self.linkage.reduce(&values).unwrap_or(f64::INFINITY);
                if d.is_nan() || d < 0.0 {
                    return Err(FamilyError::InvalidConfig(format!(
                        "linkage distance must be a non-negative number, got {}",
                        d
                    )));
                }
                dists.insert(key(active[i], active[j]), d);
            }
        }

        let lookup = |dists: &HashMap<(NodeId, NodeId), f64>, a: NodeId, b: NodeId| {
            dists.get(&key(a, b)).copied().unwrap_or(f64::INFINITY)
        };

        let mut next_index = -index_offset - 1;
        while active.len() > 1 {
            // 1. Find min distance pair
            let mut min_dist = f64::INFINITY;
            let mut pair = None;
            for i in 0..active.len() {
                for j in 0..i {
                    let d = lookup(&dists, active[i], active[j]);
                    if pair.is_none() || d < min_dist {
                        min_dist = d;
                        pair = Some((i, j));
                    }
                }
            }
            let Some((i, j)) = pair else {
                break;
            };

            // 2. Merge clusters
            let id_i = active[i];
            let id_j = active[j];
            let new_node = tree.add_merge(min_dist, next_index);
            next_index -= 1;
            tree.add_child(new_node, id_i)?;
            tree.add_child(new_node, id_j)?;

            let size_i = cluster_sizes[&id_i];
            let size_j = cluster_sizes[&id_j];
            let new_size = size_i + size_j;

            // 3. Lance-Williams update of the distances to the merged cluster
            let mut new_dists = Vec::with_capacity(active.len());
            for (k, &other) in active.iter().enumerate() {
                if k == i || k == j {
                    continue;
                }
                let di = lookup(&dists, id_i, other);
                let dj = lookup(&dists, id_j, other);
                let d = match self.linkage {
                    Linkage::Single => di.min(dj),
                    Linkage::Complete => di.max(dj),
                    Linkage::Average => {
                        (di * size_i as f64 + dj * size_j as f64) / new_size as f64
                    }
                };
                new_dists.push((other, d));
            }

            // i > j, remove the larger position first
            active.remove(i);
            active.remove(j);
            for &other in &active {
                dists.remove(&key(id_i, other));
                dists.remove(&key(id_j, other));
            }

            active.push(new_node);
            cluster_sizes.insert(new_node, new_size);
            for (other, d) in new_dists {
                dists.insert(key(new_node, other), d);
            }
        }

        if let Some(&root) = active.first() {
            tree.set_root(root);
        }

        Ok(tree)
    }
}

/// Cut `tree` top-down at the first nodes whose merge distance is
/// `<= threshold`; returns those subtrees in leaf order.
///
/// Leaves have distance 0, so every leaf ends up in exactly one piece.
pub fn cut_tree<T: Clone>(threshold: f64, tree: &ClusterTree<T>) -> Result<Vec<ClusterTree<T>>> {
    if threshold.is_nan() || threshold < 0.0 {
        return Err(FamilyError::InvalidConfig(format!(
            "cut threshold must be a non-negative number, got {}",
            threshold
        )));
    }

    let mut result = Vec::new();
    let Some(root) = tree.get_root() else {
        return Ok(result);
    };

    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get_node(id) else {
            continue;
        };
        if node.distance() <= threshold {
            result.push(tree.extract_subtree(id)?);
        } else {
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    //   A B C D
    // A 0 7 11 14
    // B 7 0 6 9
    // C 11 6 0 7
    // D 14 9 7 0
    fn abcd() -> (DistanceMatrix, Vec<String>) {
        let rows = vec![
            vec![0.0, 7.0, 11.0, 14.0],
            vec![7.0, 0.0, 6.0, 9.0],
            vec![11.0, 6.0, 0.0, 7.0],
            vec![14.0, 9.0, 7.0, 0.0],
        ];
        let names = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        (DistanceMatrix::from_rows(&rows).unwrap(), names)
    }

    fn sorted(tree: &ClusterTree<String>) -> Vec<String> {
        let mut names: Vec<String> = tree.elements().into_iter().cloned().collect();
        names.sort();
        names
    }

    #[test]
    fn test_average_linkage() {
        let (matrix, names) = abcd();
        let tree = Hclust::new(Linkage::Average).cluster(&matrix, &names).unwrap();

        assert_eq!(tree.leaf_count(), 4);
        assert_eq!(tree.internal_count(), 3);
        assert!(tree.is_binary());
        // B-C at 6, D joins at (9 + 7) / 2 = 8, A at (7 + 11 + 14) / 3
        assert_relative_eq!(tree.distance(), 32.0 / 3.0);
        assert_eq!(tree.index(), Some(-3));
        assert_eq!(tree.to_newick(|s| s.clone()).matches('(').count(), 3);
    }

    #[test]
    fn test_single_and_complete_linkage() {
        let (matrix, names) = abcd();

        let single = Hclust::new(Linkage::Single).cluster(&matrix, &names).unwrap();
        // B-C 6, D 7, A 7
        assert_relative_eq!(single.distance(), 7.0);

        let complete = Hclust::new(Linkage::Complete).cluster(&matrix, &names).unwrap();
        // B-C 6, then min(A:11, D:9) -> D at 9, A at 14
        assert_relative_eq!(complete.distance(), 14.0);
        let root = complete.root_node().unwrap();
        // later cluster first: the merged BCD node, then A
        let first = complete.get_node(root.children[0]).unwrap();
        assert_relative_eq!(first.distance(), 9.0);
    }

    #[test]
    fn test_single_item_and_errors() {
        let matrix = DistanceMatrix::new(1);
        let tree = Hclust::default().cluster(&matrix, &["A".to_string()]).unwrap();
        assert!(tree.is_leaf());
        assert_eq!(tree.distance(), 0.0);
        let pieces = cut_tree(0.5, &tree).unwrap();
        assert_eq!(pieces, vec![tree.clone()]);

        let empty: Vec<String> = vec![];
        assert!(matches!(
            Hclust::default().cluster(&matrix, &empty),
            Err(FamilyError::EmptyInput(_))
        ));
        assert!(matches!(
            Hclust::default().cluster(&DistanceMatrix::new(2), &["A".to_string()]),
            Err(FamilyError::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(cut_tree(-1.0, &tree).is_err());
    }

    #[test]
    fn test_cluster_forest_missing_index() {
        let matrix = DistanceMatrix::new(2);
        let forest = vec![
            ClusterTree::leaf("A".to_string(), 0),
            ClusterTree::leaf("X".to_string(), 5),
        ];
        let err = Hclust::default().cluster_forest(0, &matrix, forest).unwrap_err();
        assert!(matches!(err, FamilyError::MissingIndex(5)));
        assert!(err.to_string().contains("row missing for index 5"));
    }

    #[test]
    fn test_cluster_forest_keeps_subtrees() {
        let (matrix, _) = abcd();
        let hclust = Hclust::new(Linkage::Average);

        // (A,D) is forced together although A and D are the most distant pair
        let mut ad = ClusterTree::new();
        let root = ad.add_merge(14.0, -1);
        let a = ad.add_leaf("A".to_string(), 0);
        let d = ad.add_leaf("D".to_string(), 3);
        ad.set_root(root);
        ad.add_child(root, a).unwrap();
        ad.add_child(root, d).unwrap();

        let forest = vec![
            ad,
            ClusterTree::leaf("B".to_string(), 1),
            ClusterTree::leaf("C".to_string(), 2),
        ];
        let tree = hclust.cluster_forest(1, &matrix, forest).unwrap();

        assert_eq!(tree.leaf_count(), 4);
        // new merges are numbered below the offset
        assert_eq!(tree.min_index(), Some(-3));
        assert_eq!(tree.index(), Some(-3));
        let root = tree.root_node().unwrap();
        let first = tree.get_node(root.children[0]).unwrap();
        assert_relative_eq!(first.distance(), 6.0);
        // (7 + 9 + 11 + 7) / 4
        assert_relative_eq!(tree.distance(), 8.5);

        let ad_leaves = &tree.extract_subtree(root.children[1]).unwrap();
        assert_eq!(sorted(ad_leaves), vec!["A", "D"]);
    }

    #[test]
    fn test_cut_tree_monotonic() {
        let (matrix, names) = abcd();
        let tree = Hclust::new(Linkage::Average).cluster(&matrix, &names).unwrap();

        let pieces = cut_tree(5.0, &tree).unwrap();
        assert_eq!(pieces.len(), 4);

        let fine = cut_tree(6.5, &tree).unwrap();
        let coarse = cut_tree(8.5, &tree).unwrap();
        assert_eq!(fine.len(), 3);
        assert_eq!(coarse.len(), 2);
        for piece in &fine {
            assert!(piece.distance() <= 6.5);
            let members = sorted(piece);
            let holders = coarse
                .iter()
                .filter(|c| members.iter().all(|m| sorted(c).contains(m)))
                .count();
            assert_eq!(holders, 1);
        }

        let all = cut_tree(f64::INFINITY, &tree).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(sorted(&all[0]), vec!["A", "B", "C", "D"]);
    }
}
