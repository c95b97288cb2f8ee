pub mod builder;
pub mod ids;
pub mod msa;
pub mod report;

pub use builder::FamilyBuilder;
pub use ids::IdPool;
pub use msa::InducedAlignment;
pub use report::{AssignmentReport, RelatedPair};

use crate::libs::align::{Aligner, PairwiseAlignment};
use crate::libs::clust::{ClusterTree, Hclust, Linkage};
use crate::libs::error::{FamilyError, Result};
use crate::libs::item::Item;
use crate::libs::matrix::{DistanceMatrix, IndexRemap};
use crate::libs::pvalue::{log10_any, AlignmentPValues};
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Combine log10 p-values: `Single` keeps the smallest, `Complete` the
/// largest and `Average` treats them as independent chances.
pub fn combine_log10(linkage: Linkage, log10_ps: &[f64]) -> f64 {
    if log10_ps.is_empty() {
        return 0.0;
    }
    match linkage {
        Linkage::Single => log10_ps.iter().copied().fold(f64::INFINITY, f64::min),
        Linkage::Complete => log10_ps.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Linkage::Average => log10_any(log10_ps),
    }
}

/// A group of items cut from the dendrogram, with all pairwise alignments
/// of its members.
///
/// `alignments[i][j]` aligns member `i` (row 0) with member `j` (row 1),
/// members numbered in tree leaf order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
    id: String,
    tree: ClusterTree<Item>,
    linkage: Linkage,
    alignments: Vec<Vec<Option<PairwiseAlignment>>>,
}

impl Family {
    /// Align every pair of members of `tree`.
    pub fn new<A: Aligner + ?Sized>(
        id: impl Into<String>,
        tree: ClusterTree<Item>,
        linkage: Linkage,
        aligner: &A,
    ) -> Result<Self> {
        Self::assemble(id, tree, linkage, aligner, &[])
    }

    /// Like [`Family::new`], but pairs already aligned in one of `previous`
    /// are copied instead of realigned.
    pub fn assemble<A: Aligner + ?Sized>(
        id: impl Into<String>,
        tree: ClusterTree<Item>,
        linkage: Linkage,
        aligner: &A,
        previous: &[&Family],
    ) -> Result<Self> {
        if tree.get_root().is_none() {
            return Err(FamilyError::EmptyInput("family tree"));
        }

        let members: Vec<&Item> = tree.elements();
        let n = members.len();
        let pairs: Vec<(usize, usize)> = (0..n).tuple_combinations().collect();

        let aligned: Vec<PairwiseAlignment> = pairs
            .par_iter()
            .map(|&(i, j)| {
                let known = previous
                    .iter()
                    .find_map(|f| f.alignment_for_ids(&members[i].id, &members[j].id));
                match known {
                    Some(a) => Ok(a.clone()),
                    None => aligner.align(members[i], members[j]),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut alignments = vec![vec![None; n]; n];
        for (&(i, j), a) in pairs.iter().zip(aligned) {
            alignments[j][i] = Some(a.reversed());
            alignments[i][j] = Some(a);
        }

        Ok(Self {
            id: id.into(),
            tree,
            linkage,
            alignments,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn tree(&self) -> &ClusterTree<Item> {
        &self.tree
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Members in leaf order.
    pub fn members(&self) -> Vec<&Item> {
        self.tree.elements()
    }

    /// Members placed by the latest assignment round.
    pub fn new_members(&self) -> Vec<&Item> {
        self.tree.elements().into_iter().filter(|m| m.is_new).collect()
    }

    /// Flag exactly the members whose ids are in `ids` as new.
    pub fn mark_new(&mut self, ids: &HashSet<&str>) {
        self.tree = self.tree.map(|m| Item {
            is_new: ids.contains(m.id.as_str()),
            ..m.clone()
        });
    }

    pub fn size(&self) -> usize {
        self.alignments.len()
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.index_of(item_id).is_some()
    }

    pub fn index_of(&self, item_id: &str) -> Option<usize> {
        self.members().iter().position(|m| m.id == item_id)
    }

    /// Root merge height; 0 for a single member.
    pub fn distance(&self) -> f64 {
        self.tree.distance()
    }

    pub fn alignment(&self, i: usize, j: usize) -> Option<&PairwiseAlignment> {
        self.alignments.get(i).and_then(|row| row.get(j)).and_then(|a| a.as_ref())
    }

    /// Alignment of `id1` (row 0) against `id2` (row 1).
    pub fn alignment_for_ids(&self, id1: &str, id2: &str) -> Option<&PairwiseAlignment> {
        let members = self.members();
        let i = members.iter().position(|m| m.id == id1)?;
        let j = members.iter().position(|m| m.id == id2)?;
        self.alignment(i, j)
    }

    pub fn newick(&self) -> String {
        self.tree.to_newick(|item| item.id.clone())
    }

    /// Align `item` against every member and reduce the costs by `linkage`.
    pub fn distance_to<A: Aligner + ?Sized>(&self, item: &Item, aligner: &A, linkage: Linkage) -> Result<f64> {
        let costs = self
            .members()
            .par_iter()
            .map(|m| aligner.align(item, m).map(|a| a.cost))
            .collect::<Result<Vec<f64>>>()?;
        linkage
            .reduce(&costs)
            .ok_or(FamilyError::EmptyInput("family members"))
    }

    /// log10 p-values of `item` against every member, reduced by `linkage`.
    pub fn significance_to<A: Aligner + ?Sized>(
        &self,
        item: &Item,
        aligner: &A,
        engine: &AlignmentPValues,
        linkage: Linkage,
    ) -> Result<f64> {
        let (gap_open, gap_extend) = aligner.overhang_penalties();
        let ps = self
            .members()
            .par_iter()
            .map(|m| {
                let cost = aligner.align(item, m)?.cost;
                engine.log_p10_pair(item, m, cost, gap_open, gap_extend)
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(combine_log10(linkage, &ps))
    }

    /// Probability that at least one stored member pair is as close by
    /// chance, pairs taken as independent events whatever the linkage; 0 for
    /// a single member.
    pub fn family_significance<A: Aligner + ?Sized>(&self, aligner: &A, engine: &AlignmentPValues) -> Result<f64> {
        let (gap_open, gap_extend) = aligner.overhang_penalties();
        let members = self.members();
        let mut ps = Vec::new();
        for i in 0..members.len() {
            for j in 0..i {
                let cost = self
                    .alignment(i, j)
                    .ok_or_else(|| FamilyError::Tree(format!("No alignment for members {} and {}", i, j)))?
                    .cost;
                ps.push(engine.log_p10_pair(members[i], members[j], cost, gap_open, gap_extend)?);
            }
        }
        Ok(log10_any(&ps))
    }

    /// Significance of member `item_id` against the other members, from the
    /// stored alignments; `None` for a single member.
    pub fn member_significance<A: Aligner + ?Sized>(
        &self,
        item_id: &str,
        aligner: &A,
        engine: &AlignmentPValues,
    ) -> Result<Option<f64>> {
        let i = self
            .index_of(item_id)
            .ok_or_else(|| FamilyError::UnknownItem(item_id.to_string()))?;
        if self.size() < 2 {
            return Ok(None);
        }
        let (gap_open, gap_extend) = aligner.overhang_penalties();
        let members = self.members();
        let mut ps = Vec::with_capacity(members.len() - 1);
        for (j, other) in members.iter().enumerate() {
            if let Some(a) = self.alignment(i, j) {
                ps.push(engine.log_p10_pair(members[i], other, a.cost, gap_open, gap_extend)?);
            }
        }
        Ok(Some(combine_log10(self.linkage, &ps)))
    }

    // Current leaves as singleton trees, optionally filtered and re-indexed
    fn leaf_forest<F>(&self, mut keep: F) -> Result<Vec<ClusterTree<Item>>>
    where
        F: FnMut(&Item, isize) -> Result<Option<isize>>,
    {
        let mut forest = Vec::new();
        for leaf in self.tree.get_leaves() {
            let Some(node) = self.tree.get_node(leaf) else {
                continue;
            };
            if let Some(item) = node.item() {
                if let Some(index) = keep(item, node.index)? {
                    forest.push(ClusterTree::leaf(item.clone(), index));
                }
            }
        }
        Ok(forest)
    }

    /// A new family with `item` (matrix row `index`) added.
    ///
    /// Existing leaves and the new one are clustered again as a forest over
    /// `matrix`; alignments of existing members are reused.
    pub fn add_item<A: Aligner + ?Sized>(
        &self,
        matrix: &DistanceMatrix,
        item: Item,
        index: usize,
        index_offset: isize,
        aligner: &A,
    ) -> Result<Family> {
        let mut forest = self.leaf_forest(|_, idx| Ok(Some(idx)))?;
        forest.push(ClusterTree::leaf(item, index as isize));

        let tree = Hclust::new(self.linkage)
            .cluster_forest(index_offset, matrix, forest)?
            .leaf_order(matrix)?;
        Family::assemble(self.id.clone(), tree, self.linkage, aligner, &[self])
    }

    /// A new family without the listed items, or `None` when nothing is
    /// left. `matrix` is the restricted matrix and `remap` maps old rows to
    /// its rows.
    pub fn remove_items<A: Aligner + ?Sized>(
        &self,
        matrix: &DistanceMatrix,
        remap: &IndexRemap,
        item_ids: &HashSet<&str>,
        index_offset: isize,
        aligner: &A,
    ) -> Result<Option<Family>> {
        let forest = self.leaf_forest(|item, idx| {
            if item_ids.contains(item.id.as_str()) {
                Ok(None)
            } else {
                remap.map_index(idx).map(Some)
            }
        })?;
        if forest.is_empty() {
            return Ok(None);
        }

        let tree = Hclust::new(self.linkage)
            .cluster_forest(index_offset, matrix, forest)?
            .leaf_order(matrix)?;
        Family::assemble(self.id.clone(), tree, self.linkage, aligner, &[self]).map(Some)
    }

    /// Same family, leaf rows moved by `remap`.
    pub fn remap(&self, remap: &IndexRemap) -> Result<Family> {
        Ok(Self {
            id: self.id.clone(),
            tree: self.tree.remap_indices(remap)?,
            linkage: self.linkage,
            alignments: self.alignments.clone(),
        })
    }

    /// Multiple alignment of all members induced by the stored pairwise
    /// alignments along the tree.
    pub fn induced_alignment(&self) -> Result<InducedAlignment<'_>> {
        msa::induced_alignment(self)
    }
}
