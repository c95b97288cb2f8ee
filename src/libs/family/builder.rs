//! Building families from items and keeping them up to date.
//!
//! Every mutating operation computes the new state on the side and commits it
//! only once all fallible steps have succeeded, so a failed call leaves the
//! builder untouched.

use super::{AssignmentReport, Family, IdPool, RelatedPair};
use crate::libs::align::{AffineAligner, Aligner};
use crate::libs::clust::{cut_tree, ClusterTree, Hclust};
use crate::libs::config::BuilderConfig;
use crate::libs::error::{FamilyError, Result};
use crate::libs::item::Item;
use crate::libs::matrix::DistanceMatrix;
use crate::libs::pvalue::AlignmentPValues;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;

/// Families are split just below their root merge height.
const SPLIT_EPSILON: f64 = 1e-6;

/// Families listed as related in assignment reports, log10(0.001).
const ASSIGN_RELATED_LOG10_P: f64 = -3.0;

/// Tolerance for asymmetric entries in a loaded matrix.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Items, their distance matrix and the families cut from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyBuilder<A = AffineAligner> {
    config: BuilderConfig,
    aligner: A,
    items: Vec<Item>,
    matrix: DistanceMatrix,
    families: Vec<Family>,
}

impl FamilyBuilder<AffineAligner> {
    /// Build with the aligner described by `config`.
    pub fn build(config: BuilderConfig, items: Vec<Item>) -> Result<Self> {
        let aligner = config.aligner();
        Self::build_with(config, aligner, items)
    }
}

impl<A: Aligner> FamilyBuilder<A> {
    /// Align all pairs, cluster, cut at `config.cut` and order the leaves of
    /// every family.
    pub fn build_with(config: BuilderConfig, aligner: A, items: Vec<Item>) -> Result<Self> {
        config.validate()?;
        if items.is_empty() {
            return Err(FamilyError::EmptyInput("items"));
        }
        check_unique_ids(&items, &HashSet::new())?;

        let n = items.len();
        let matrix = DistanceMatrix::from_fn_par(n, |i, j| aligner.align(&items[i], &items[j]).map(|a| a.cost))?;
        info!("Aligned {} items, {} pairs", n, n * (n - 1) / 2);

        let mut pool = IdPool::new(Vec::<String>::new());
        pool.reserve(config.reserved_names.iter().cloned());
        let indices: Vec<usize> = (0..n).collect();
        let families = new_families(&config, &aligner, &matrix, &items, &indices, &mut pool)?;
        info!("Built {} families from {} items", families.len(), n);

        Ok(Self {
            config,
            aligner,
            items,
            matrix,
            families,
        })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn aligner(&self) -> &A {
        &self.aligner
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn matrix(&self) -> &DistanceMatrix {
        &self.matrix
    }

    pub fn families(&self) -> &[Family] {
        &self.families
    }

    pub fn family(&self, id: &str) -> Result<&Family> {
        self.families
            .iter()
            .find(|f| f.id() == id)
            .ok_or_else(|| FamilyError::UnknownFamily(id.to_string()))
    }

    /// Family containing the item `item_id`.
    pub fn family_of(&self, item_id: &str) -> Option<&Family> {
        self.families.iter().find(|f| f.contains(item_id))
    }

    fn hclust(&self) -> Hclust {
        self.config.hclust()
    }

    fn item_positions(&self) -> HashMap<&str, usize> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.as_str(), i))
            .collect()
    }

    fn id_pool(&self, families: &[Family]) -> IdPool {
        let mut pool = IdPool::new(families.iter().map(|f| f.id().to_string()));
        pool.reserve(self.config.reserved_names.iter().cloned());
        pool
    }

    fn closest_index(&self, item: &Item) -> Result<Option<(usize, f64)>> {
        let mut best: Option<(usize, f64)> = None;
        for (k, family) in self.families.iter().enumerate() {
            let d = family.distance_to(item, &self.aligner, self.config.linkage)?;
            match best {
                Some((_, b)) if d >= b => {}
                _ => best = Some((k, d)),
            }
        }
        Ok(best)
    }

    /// Family with the smallest linkage distance to `item`; the first one
    /// wins ties.
    pub fn closest_family(&self, item: &Item) -> Result<Option<(&Family, f64)>> {
        Ok(self
            .closest_index(item)?
            .map(|(k, d)| (&self.families[k], d)))
    }

    /// Family with the smallest combined log10 p-value against `item`.
    pub fn most_significant_family(
        &self,
        item: &Item,
        engine: &AlignmentPValues,
    ) -> Result<Option<(&Family, f64)>> {
        let mut best: Option<(&Family, f64)> = None;
        for family in &self.families {
            let p = family.significance_to(item, &self.aligner, engine, self.config.linkage)?;
            match best {
                Some((_, b)) if p >= b => {}
                _ => best = Some((family, p)),
            }
        }
        Ok(best)
    }

    /// Significance engine over the current items plus `extra`.
    pub fn significance_engine(&self, extra: &[Item]) -> Result<AlignmentPValues> {
        let population: Vec<Item> = self.items.iter().chain(extra.iter()).cloned().collect();
        AlignmentPValues::new(&population, self.aligner.symbol_costs())
    }

    pub fn family_significance(&self, family_id: &str, engine: &AlignmentPValues) -> Result<f64> {
        self.family(family_id)?.family_significance(&self.aligner, engine)
    }

    /// Add items to existing families (by position in [`Self::families`])
    /// and cluster the `unassigned` ones into new families.
    ///
    /// Returns the ids of the new families.
    pub fn add_items_to_families(
        &mut self,
        assignments: Vec<(usize, Vec<Item>)>,
        unassigned: Vec<Item>,
    ) -> Result<Vec<String>> {
        if assignments.iter().all(|(_, v)| v.is_empty()) && unassigned.is_empty() {
            return Ok(Vec::new());
        }

        let known: HashSet<&str> = self.items.iter().map(|i| i.id.as_str()).collect();
        let mut incoming: Vec<Item> = Vec::new();
        let mut targets: Vec<(usize, Vec<usize>)> = Vec::new();
        let n = self.items.len();

        for (k, batch) in assignments {
            if k >= self.families.len() {
                return Err(FamilyError::UnknownFamily(k.to_string()));
            }
            let start = n + incoming.len();
            let count = batch.len();
            incoming.extend(batch);
            targets.push((k, (start..start + count).collect()));
        }
        let start = n + incoming.len();
        let fresh: Vec<usize> = (start..start + unassigned.len()).collect();
        incoming.extend(unassigned);
        check_unique_ids(&incoming, &known)?;

        let mut items = self.items.clone();
        items.extend(incoming);

        let (matrix, computed) =
            self.matrix
                .extend(items.len(), |i, j| self.aligner.align(&items[i], &items[j]).map(|a| a.cost))?;
        info!(
            "Distance matrix grown from {} to {} rows, {} pairs aligned",
            n,
            matrix.size(),
            computed
        );

        let mut families = self.families.clone();
        for (k, rows) in targets {
            for row in rows {
                families[k] = families[k].add_item(&matrix, items[row].clone(), row, 0, &self.aligner)?;
            }
            debug!("Family {} now has {} members", families[k].id(), families[k].size());
        }

        let mut pool = self.id_pool(&families);
        let created = if fresh.is_empty() {
            Vec::new()
        } else {
            new_families(&self.config, &self.aligner, &matrix, &items, &fresh, &mut pool)?
        };
        let new_ids: Vec<String> = created.iter().map(|f| f.id().to_string()).collect();
        families.extend(created);

        self.items = items;
        self.matrix = matrix;
        self.families = families;
        Ok(new_ids)
    }

    /// Remove items by id. Families losing every member are dropped.
    pub fn remove_items_from_families(&mut self, item_ids: &[String]) -> Result<()> {
        let positions = self.item_positions();
        let mut removed: HashSet<&str> = HashSet::new();
        for id in item_ids {
            if !positions.contains_key(id.as_str()) {
                return Err(FamilyError::UnknownItem(id.clone()));
            }
            removed.insert(id.as_str());
        }
        if removed.is_empty() {
            return Ok(());
        }

        let keep: Vec<usize> = (0..self.items.len())
            .filter(|&i| !removed.contains(self.items[i].id.as_str()))
            .collect();
        let (matrix, remap) = self.matrix.restrict(&keep)?;
        let items: Vec<Item> = keep.iter().map(|&i| self.items[i].clone()).collect();

        let mut families = Vec::with_capacity(self.families.len());
        for family in &self.families {
            if family.members().iter().any(|m| removed.contains(m.id.as_str())) {
                match family.remove_items(&matrix, &remap, &removed, 0, &self.aligner)? {
                    Some(f) => {
                        debug!("Family {} shrunk to {} members", f.id(), f.size());
                        families.push(f);
                    }
                    None => debug!("Family {} dropped", family.id()),
                }
            } else {
                families.push(family.remap(&remap)?);
            }
        }
        info!("Removed {} items, {} remain", removed.len(), items.len());

        self.items = items;
        self.matrix = matrix;
        self.families = families;
        Ok(())
    }

    /// Cut a family just below its root. The largest piece keeps the id,
    /// the others get fresh ones, which are returned.
    pub fn split_family(&mut self, family_id: &str) -> Result<Vec<String>> {
        let pos = self
            .families
            .iter()
            .position(|f| f.id() == family_id)
            .ok_or_else(|| FamilyError::UnknownFamily(family_id.to_string()))?;
        let family = &self.families[pos];
        if family.size() < 2 {
            return Err(FamilyError::CannotSplit(format!(
                "family {} has a single member",
                family_id
            )));
        }

        let threshold = family.distance() - SPLIT_EPSILON;
        if threshold < 0.0 {
            return Err(FamilyError::CannotSplit(format!(
                "family {} has identical members only",
                family_id
            )));
        }
        let pieces = cut_tree(threshold, family.tree())?;
        if pieces.len() < 2 {
            return Err(FamilyError::CannotSplit(format!(
                "family {} did not break up",
                family_id
            )));
        }

        let mut largest = 0;
        for (k, piece) in pieces.iter().enumerate() {
            if piece.leaf_count() > pieces[largest].leaf_count() {
                largest = k;
            }
        }

        let mut pool = self.id_pool(&self.families);
        let mut kept = None;
        let mut others = Vec::new();
        for (k, piece) in pieces.iter().enumerate() {
            let tree = piece.leaf_order(&self.matrix)?;
            if k == largest {
                kept = Some(Family::assemble(
                    family.id(),
                    tree,
                    self.config.linkage,
                    &self.aligner,
                    &[family],
                )?);
            } else {
                let id = pool.next_id()?;
                others.push(Family::assemble(id, tree, self.config.linkage, &self.aligner, &[family])?);
            }
        }
        let kept = kept.ok_or_else(|| FamilyError::CannotSplit(family_id.to_string()))?;
        let new_ids: Vec<String> = others.iter().map(|f| f.id().to_string()).collect();
        debug!(
            "Family {} split, {} members kept, new families {:?}",
            family_id,
            kept.size(),
            new_ids
        );

        let mut families = self.families.clone();
        families[pos] = kept;
        for (k, f) in others.into_iter().enumerate() {
            families.insert(pos + 1 + k, f);
        }
        self.families = families;
        Ok(new_ids)
    }

    /// Cluster the families themselves: family trees are kept intact and
    /// joined by the configured linkage over item distances. Leaves of the
    /// result are the families.
    pub fn cluster_families(&self) -> Result<ClusterTree<Family>> {
        if self.families.is_empty() {
            return Err(FamilyError::EmptyInput("families"));
        }

        let mut next = -1;
        let mut forest = Vec::with_capacity(self.families.len());
        let mut roots = Vec::with_capacity(self.families.len());
        for family in &self.families {
            let (tree, following) = family.tree().map(|item| item.id.clone()).renumber_internal(next);
            next = following;
            let root = tree
                .index()
                .ok_or_else(|| FamilyError::Tree(format!("family {} has no root", family.id())))?;
            roots.push(root);
            forest.push(tree);
        }

        let offset = -next - 1;
        let tree = self.hclust().cluster_forest(offset, &self.matrix, forest)?;
        tree.drop_below(&roots, &self.families)
    }

    /// Place new items: each joins its closest family when the distance is
    /// below the cut, the rest are clustered into new families.
    ///
    /// Items shorter than `min_symbols` are reported as skipped and left
    /// out. `engine` must know every symbol of the new items.
    pub fn assign_items(&mut self, items: Vec<Item>, engine: &AlignmentPValues) -> Result<Vec<AssignmentReport>> {
        let mut reports = Vec::with_capacity(items.len());
        let mut assignments: BTreeMap<usize, Vec<Item>> = BTreeMap::new();
        let mut unassigned = Vec::new();

        for item in items {
            if item.len() < self.config.min_symbols {
                debug!("Item {} skipped, {} symbols", item.id, item.len());
                reports.push(AssignmentReport::skipped(&item));
                continue;
            }

            let mut report = AssignmentReport::new(&item);
            let mut significance = Vec::with_capacity(self.families.len());
            for family in &self.families {
                significance.push(family.significance_to(&item, &self.aligner, engine, self.config.linkage)?);
            }

            let target = match self.closest_index(&item)? {
                Some((k, d)) => {
                    report.distance = Some(d);
                    (d < self.config.cut).then_some(k)
                }
                None => None,
            };
            if let Some(k) = target {
                report.family = Some(self.families[k].id().to_string());
                report.log10_p = Some(significance[k]);
            }

            let mut related: Vec<(String, f64)> = self
                .families
                .iter()
                .zip(significance.iter())
                .enumerate()
                .filter(|&(k, (_, &p))| Some(k) != target && p < ASSIGN_RELATED_LOG10_P)
                .map(|(_, (f, &p))| (f.id().to_string(), p))
                .collect();
            related.sort_by(|a, b| a.1.total_cmp(&b.1));
            report.related = related;

            match target {
                Some(k) => assignments.entry(k).or_default().push(item),
                None => unassigned.push(item),
            }
            reports.push(report);
        }

        self.add_items_to_families(assignments.into_iter().collect(), unassigned)?;
        let placed: HashSet<&str> = reports
            .iter()
            .filter(|r| !r.skipped)
            .map(|r| r.item.as_str())
            .collect();
        self.mark_new(&placed);

        for report in reports.iter_mut().filter(|r| !r.skipped && r.family.is_none()) {
            if let Some(family) = self.family_of(&report.item) {
                report.family = Some(family.id().to_string());
                report.new_family = true;
                report.log10_p = family.member_significance(&report.item, &self.aligner, engine)?;
            }
        }

        Ok(reports)
    }

    /// Clear the new-item markers left by the latest assignment round.
    pub fn set_to_old(&mut self) {
        self.mark_new(&HashSet::new());
    }

    fn mark_new(&mut self, ids: &HashSet<&str>) {
        for item in self.items.iter_mut() {
            item.is_new = ids.contains(item.id.as_str());
        }
        for family in self.families.iter_mut() {
            family.mark_new(ids);
        }
    }

    /// Member pairs across `family_id` and any other family whose alignment
    /// is significant at the configured level, most significant first.
    pub fn related_families(&self, family_id: &str, engine: &AlignmentPValues) -> Result<Vec<RelatedPair>> {
        self.related_families_at(family_id, engine, self.config.log10_pvalue())
    }

    /// [`Self::related_families`] with an explicit log10 cutoff.
    pub fn related_families_at(
        &self,
        family_id: &str,
        engine: &AlignmentPValues,
        cutoff: f64,
    ) -> Result<Vec<RelatedPair>> {
        let family = self.family(family_id)?;
        let positions = self.item_positions();
        let (go, ge) = self.aligner.overhang_penalties();

        let row = |id: &str| {
            positions
                .get(id)
                .copied()
                .ok_or_else(|| FamilyError::UnknownItem(id.to_string()))
        };

        let mut pairs = Vec::new();
        for member in family.members() {
            let i = row(&member.id)?;
            for other in self.families.iter().filter(|f| f.id() != family_id) {
                for candidate in other.members() {
                    let j = row(&candidate.id)?;
                    let cost = self.matrix.get(i, j);
                    let p = engine.log_p10_pair(member, candidate, cost, go, ge)?;
                    if p < cutoff {
                        pairs.push(RelatedPair {
                            member: member.id.clone(),
                            family: other.id().to_string(),
                            other: candidate.id.clone(),
                            cost,
                            log10_p: p,
                        });
                    }
                }
            }
        }
        pairs.sort_by(|a, b| a.log10_p.total_cmp(&b.log10_p));
        Ok(pairs)
    }

    /// Consistency checks for a builder read from disk.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if self.matrix.size() != self.items.len() {
            return Err(FamilyError::DimensionMismatch {
                expected: self.items.len(),
                found: self.matrix.size(),
            });
        }
        self.matrix.validate_symmetric(SYMMETRY_TOLERANCE)?;
        check_unique_ids(&self.items, &HashSet::new())?;

        let mut seen_families = HashSet::new();
        let mut seen_items = HashSet::new();
        for family in &self.families {
            if !seen_families.insert(family.id()) {
                return Err(FamilyError::Tree(format!("duplicate family id '{}'", family.id())));
            }
            let tree = family.tree();
            for leaf in tree.get_leaves() {
                let Some(node) = tree.get_node(leaf) else {
                    continue;
                };
                let row = self.matrix.check_index(node.index)?;
                let Some(item) = node.item() else {
                    continue;
                };
                if self.items[row].id != item.id {
                    return Err(FamilyError::Tree(format!(
                        "leaf '{}' of family {} points at row {} ('{}')",
                        item.id,
                        family.id(),
                        row,
                        self.items[row].id
                    )));
                }
                if !seen_items.insert(row) {
                    return Err(FamilyError::Tree(format!(
                        "item '{}' belongs to more than one family",
                        item.id
                    )));
                }
            }
        }
        Ok(())
    }
}

impl<A: Aligner + Serialize> FamilyBuilder<A> {
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Write the whole state as JSON; "stdout" and `.gz` paths are honoured.
    pub fn save(&self, output: &str) -> Result<()> {
        let mut writer = crate::libs::io::writer(output)?;
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl<A: Aligner + DeserializeOwned> FamilyBuilder<A> {
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let builder: Self = serde_json::from_reader(reader)?;
        builder.validate()?;
        Ok(builder)
    }

    pub fn load(input: &str) -> Result<Self> {
        Self::from_reader(crate::libs::io::reader(input)?)
    }
}

fn check_unique_ids(items: &[Item], known: &HashSet<&str>) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(items.len());
    for item in items {
        if known.contains(item.id.as_str()) || !seen.insert(item.id.as_str()) {
            return Err(FamilyError::InvalidConfig(format!("duplicate item id '{}'", item.id)));
        }
    }
    Ok(())
}

/// Cluster the items at `indices` and cut them into new, leaf-ordered
/// families named from `pool`.
fn new_families<A: Aligner + ?Sized>(
    config: &BuilderConfig,
    aligner: &A,
    matrix: &DistanceMatrix,
    items: &[Item],
    indices: &[usize],
    pool: &mut IdPool,
) -> Result<Vec<Family>> {
    let forest: Vec<ClusterTree<Item>> = indices
        .iter()
        .map(|&i| ClusterTree::leaf(items[i].clone(), i as isize))
        .collect();
    let tree = config.hclust().cluster_forest(0, matrix, forest)?;

    let mut families = Vec::new();
    for piece in cut_tree(config.cut, &tree)? {
        let ordered = piece.leaf_order(matrix)?;
        let family = Family::new(pool.next_id()?, ordered, config.linkage, aligner)?;
        debug!("Family {} created with {} members", family.id(), family.size());
        families.push(family);
    }
    Ok(families)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::align::{AlignmentType, CostModel, MismatchCosts};
    use crate::libs::clust::Linkage;

    fn config(cut: f64, linkage: Linkage) -> BuilderConfig {
        BuilderConfig {
            linkage,
            cut,
            costs: CostModel::Mismatch(MismatchCosts { mismatch: 1.0 }),
            alignment_type: AlignmentType::SemiGlobal,
            ..Default::default()
        }
    }

    fn scenario() -> Vec<Item> {
        vec![
            Item::from_rvds("A", "NI-NG-NN"),
            Item::from_rvds("B", "NI-NG-NN"),
            Item::from_rvds("C", "HD-NG-NN"),
        ]
    }

    fn pool() -> Vec<Item> {
        vec![
            Item::from_rvds("A1", "NI-NG-NN-HD-HD-NG"),
            Item::from_rvds("A2", "NI-NG-NN-HD-HD-NG"),
            Item::from_rvds("A3", "NI-NG-NI-HD-HD-NG"),
            Item::from_rvds("B1", "NN-NN-HD-NI-NG-NI"),
            Item::from_rvds("B2", "NN-NN-HD-NI-NG-NG"),
            Item::from_rvds("C1", "HD-HD-HD-HD-HD-HD"),
        ]
    }

    fn family_ids(builder: &FamilyBuilder) -> Vec<Vec<String>> {
        let mut out: Vec<Vec<String>> = builder
            .families()
            .iter()
            .map(|f| {
                let mut ids: Vec<String> = f.members().iter().map(|m| m.id.clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_build_scenario() {
        let builder = FamilyBuilder::build(config(0.5, Linkage::Single), scenario()).unwrap();

        assert_eq!(builder.matrix().get(0, 1), 0.0);
        assert_eq!(builder.matrix().get(0, 2), 1.0);
        assert_eq!(builder.families().len(), 2);
        assert_eq!(family_ids(&builder), vec![vec!["A", "B"], vec!["C"]]);

        let ab = builder.family_of("A").unwrap();
        assert_eq!(ab.id(), "1");
        assert_eq!(ab.distance(), 0.0);
        assert_eq!(builder.family_of("C").unwrap().id(), "2");

        let c = builder.items()[2].clone();
        let (closest, d) = builder.closest_family(&c).unwrap().unwrap();
        assert_eq!(closest.id(), "2");
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_build_errors() {
        assert!(matches!(
            FamilyBuilder::build(BuilderConfig::default(), vec![]),
            Err(FamilyError::EmptyInput(_))
        ));

        let mut items = scenario();
        items.push(Item::from_rvds("A", "NI"));
        assert!(matches!(
            FamilyBuilder::build(BuilderConfig::default(), items),
            Err(FamilyError::InvalidConfig(_))
        ));

        let bad = BuilderConfig {
            cut: -1.0,
            ..Default::default()
        };
        assert!(FamilyBuilder::build(bad, scenario()).is_err());
    }

    #[test]
    fn test_reserved_names() {
        let mut config = config(0.5, Linkage::Single);
        config.reserved_names = vec!["1".to_string()];
        let builder = FamilyBuilder::build(config, scenario()).unwrap();
        let mut ids: Vec<&str> = builder.families().iter().map(|f| f.id()).collect();
        ids.sort();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn test_closest_family() {
        let builder = FamilyBuilder::build(config(1.5, Linkage::Average), pool()).unwrap();
        assert_eq!(builder.families().len(), 3);

        let probe = Item::from_rvds("P", "NN-NN-HD-NI-NG-NN");
        let (family, d) = builder.closest_family(&probe).unwrap().unwrap();
        assert!(family.contains("B1"));
        assert_eq!(d, 1.0);

        let engine = builder.significance_engine(&[probe.clone()]).unwrap();
        let (family, p) = builder.most_significant_family(&probe, &engine).unwrap().unwrap();
        assert!(family.contains("B1"));
        assert!(p < 0.0);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let all = pool();
        let (first, rest) = all.split_at(4);

        let batch = FamilyBuilder::build(config(1.5, Linkage::Average), all.clone()).unwrap();

        let mut grown = FamilyBuilder::build(config(1.5, Linkage::Average), first.to_vec()).unwrap();
        let b_family = grown
            .families()
            .iter()
            .position(|f| f.contains("B1"))
            .unwrap();
        let new_ids = grown
            .add_items_to_families(vec![(b_family, vec![rest[0].clone()])], vec![rest[1].clone()])
            .unwrap();

        assert_eq!(new_ids.len(), 1);
        assert_eq!(grown.items().len(), 6);
        assert_eq!(grown.matrix(), batch.matrix());
        assert_eq!(family_ids(&grown), family_ids(&batch));
        assert!(grown.validate().is_ok());
    }

    #[test]
    fn test_add_then_remove_restores_partition() {
        let mut builder = FamilyBuilder::build(config(1.5, Linkage::Average), pool()).unwrap();
        let original = family_ids(&builder);
        let a = builder
            .families()
            .iter()
            .position(|f| f.contains("A1"))
            .unwrap();

        builder
            .add_items_to_families(
                vec![(a, vec![Item::from_rvds("X", "NI-NG-NN-HD-HD-NI")])],
                vec![Item::from_rvds("Y", "NG-NG-NG-NG-NG-NG")],
            )
            .unwrap();
        assert_eq!(builder.families().len(), 4);
        assert!(builder.families()[a].contains("X"));

        builder
            .remove_items_from_families(&["X".to_string(), "Y".to_string()])
            .unwrap();
        assert_eq!(family_ids(&builder), original);
        assert_eq!(builder.matrix().size(), 6);
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn test_remove_items() {
        let mut builder = FamilyBuilder::build(config(1.5, Linkage::Average), pool()).unwrap();
        let c_id = builder.family_of("C1").unwrap().id().to_string();

        builder
            .remove_items_from_families(&["A2".to_string(), "C1".to_string()])
            .unwrap();
        assert_eq!(builder.items().len(), 4);
        assert_eq!(builder.matrix().size(), 4);
        assert!(builder.family(&c_id).is_err());
        assert_eq!(family_ids(&builder), vec![vec!["A1", "A3"], vec!["B1", "B2"]]);
        assert!(builder.validate().is_ok());

        let fresh = FamilyBuilder::build(config(1.5, Linkage::Average), builder.items().to_vec()).unwrap();
        assert_eq!(builder.matrix(), fresh.matrix());

        let before = builder.families().to_vec();
        assert!(matches!(
            builder.remove_items_from_families(&["nope".to_string()]),
            Err(FamilyError::UnknownItem(_))
        ));
        assert_eq!(builder.families(), &before[..]);
    }

    #[test]
    fn test_split_family() {
        let mut builder = FamilyBuilder::build(config(10.0, Linkage::Average), pool()).unwrap();
        assert_eq!(builder.families().len(), 1);
        assert_eq!(builder.families()[0].id(), "1");

        let new_ids = builder.split_family("1").unwrap();
        assert!(!new_ids.is_empty());
        assert_eq!(builder.families().len(), 1 + new_ids.len());
        // largest piece keeps the id
        let kept = builder.family("1").unwrap();
        assert!(builder.families().iter().all(|f| f.size() <= kept.size()));
        assert_eq!(
            builder.families().iter().map(|f| f.size()).sum::<usize>(),
            6
        );
        assert!(builder.validate().is_ok());

        assert!(matches!(builder.split_family("99"), Err(FamilyError::UnknownFamily(_))));
    }

    #[test]
    fn test_split_refused() {
        let mut builder = FamilyBuilder::build(config(0.5, Linkage::Single), scenario()).unwrap();
        let c = builder.family_of("C").unwrap().id().to_string();
        let ab = builder.family_of("A").unwrap().id().to_string();
        assert!(matches!(builder.split_family(&c), Err(FamilyError::CannotSplit(_))));
        // A and B are identical
        assert!(matches!(builder.split_family(&ab), Err(FamilyError::CannotSplit(_))));
    }

    #[test]
    fn test_cluster_families() {
        let builder = FamilyBuilder::build(config(1.5, Linkage::Average), pool()).unwrap();
        let meta = builder.cluster_families().unwrap();

        assert_eq!(meta.leaf_count(), 3);
        let leaves: Vec<&str> = meta.elements().iter().map(|f| f.id()).collect();
        let mut sorted = leaves.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["1", "2", "3"]);
        assert!(meta.distance() > 1.5);

        let nwk = meta.to_newick(|f| f.id().to_string());
        assert!(nwk.ends_with(';'));
    }

    #[test]
    fn test_assign_items() {
        let all = pool();
        let mut builder = FamilyBuilder::build(config(1.5, Linkage::Average), all[..5].to_vec()).unwrap();
        let new = vec![
            Item::from_rvds("A4", "NI-NG-NN-HD-HD-NG"),
            Item::from_rvds("S", "NI-NG"),
            all[5].clone(),
        ];
        let engine = builder.significance_engine(&new).unwrap();
        let reports = builder.assign_items(new, &engine).unwrap();

        assert_eq!(reports.len(), 3);
        let a4 = &reports[0];
        assert_eq!(a4.family.as_deref(), builder.family_of("A1").map(|f| f.id()));
        assert!(!a4.new_family);
        // 0, 0 and 1 against A1, A2, A3
        assert!((a4.distance.unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert!(a4.log10_p.unwrap() < 0.0);

        assert!(reports[1].skipped);
        assert!(builder.family_of("S").is_none());

        let c1 = &reports[2];
        assert!(c1.new_family);
        assert_eq!(c1.family.as_deref(), builder.family_of("C1").map(|f| f.id()));
        assert_eq!(builder.items().len(), 7);
    }

    #[test]
    fn test_assign_marks_new_items() {
        let all = pool();
        let mut builder = FamilyBuilder::build(config(1.5, Linkage::Average), all[..5].to_vec()).unwrap();
        let new_ids = |b: &FamilyBuilder| -> Vec<String> {
            b.items().iter().filter(|i| i.is_new).map(|i| i.id.clone()).collect()
        };
        assert!(new_ids(&builder).is_empty());

        let round = vec![Item::from_rvds("A4", "NI-NG-NN-HD-HD-NG"), all[5].clone()];
        let engine = builder.significance_engine(&round).unwrap();
        builder.assign_items(round, &engine).unwrap();
        assert_eq!(new_ids(&builder), vec!["A4", "C1"]);

        // joined an existing family, only the newcomer is flagged
        let a = builder.family_of("A4").unwrap();
        let fresh: Vec<&str> = a.new_members().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(fresh, vec!["A4"]);
        assert!(a.size() > 1);

        // markers survive a save/load
        let mut buf = Vec::new();
        builder.to_writer(&mut buf).unwrap();
        let loaded: FamilyBuilder = FamilyBuilder::from_reader(&buf[..]).unwrap();
        assert_eq!(new_ids(&loaded), vec!["A4", "C1"]);

        // the next round replaces them
        let round = vec![Item::from_rvds("B3", "NN-NN-HD-NI-NG-NI")];
        let engine = builder.significance_engine(&round).unwrap();
        builder.assign_items(round, &engine).unwrap();
        assert_eq!(new_ids(&builder), vec!["B3"]);
        assert!(builder.family_of("A4").unwrap().new_members().is_empty());

        builder.set_to_old();
        assert!(new_ids(&builder).is_empty());
        assert!(builder.families().iter().all(|f| f.new_members().is_empty()));
    }

    #[test]
    fn test_related_families() {
        let mut config = config(0.5, Linkage::Single);
        config.pvalue = 0.5;
        let builder = FamilyBuilder::build(config, pool()).unwrap();
        let a = builder.family_of("A1").unwrap().id().to_string();
        let engine = builder.significance_engine(&[]).unwrap();

        let related = builder.related_families(&a, &engine).unwrap();
        assert!(related.iter().any(|r| r.other == "A3"));
        assert!(related.iter().all(|r| r.family != a));
        assert!(related.windows(2).all(|w| w[0].log10_p <= w[1].log10_p));
    }

    #[test]
    fn test_save_load() {
        let builder = FamilyBuilder::build(config(1.5, Linkage::Average), pool()).unwrap();
        let mut buf = Vec::new();
        builder.to_writer(&mut buf).unwrap();

        let loaded: FamilyBuilder = FamilyBuilder::from_reader(&buf[..]).unwrap();
        assert_eq!(loaded.items(), builder.items());
        assert_eq!(loaded.matrix(), builder.matrix());
        assert_eq!(loaded.families(), builder.families());
        assert_eq!(loaded.config(), builder.config());

        // corrupt the matrix
        let text = String::from_utf8(buf).unwrap();
        let broken = text.replacen("\"size\":6", "\"size\":5", 1);
        assert!(FamilyBuilder::<AffineAligner>::from_reader(broken.as_bytes()).is_err());
    }

    #[test]
    fn test_save_load_fractional_costs() {
        const RVDS: [&str; 6] = ["NI", "NG", "NN", "HD", "NS", "N*"];
        let items: Vec<Item> = (0..16)
            .map(|k| {
                let rvds = (0..5 + k % 4)
                    .map(|p| RVDS[(k * 7 + p * 3 + p * p * k) % RVDS.len()])
                    .collect::<Vec<_>>()
                    .join("-");
                Item::from_rvds(&format!("T{}", k), &rvds)
            })
            .collect();
        let config = BuilderConfig {
            gap_extend: 2.7,
            extra_gap_extend: 0.13,
            ..Default::default()
        };
        let builder = FamilyBuilder::build(config, items).unwrap();
        // fractional costs
        assert!((0..16).any(|i| (0..i).any(|j| builder.matrix().get(i, j).fract() != 0.0)));

        let mut buf = Vec::new();
        builder.to_writer(&mut buf).unwrap();
        let loaded: FamilyBuilder = FamilyBuilder::from_reader(&buf[..]).unwrap();

        assert_eq!(loaded.matrix(), builder.matrix());
        assert_eq!(loaded.families(), builder.families());

        let query = Item::from_rvds("Q", "NI-NG-NS-HD-N*-NN");
        let engine = builder.significance_engine(&[query.clone()]).unwrap();
        let before = builder.closest_family(&query).unwrap().map(|(f, d)| (f.id().to_string(), d));
        let after = loaded.closest_family(&query).unwrap().map(|(f, d)| (f.id().to_string(), d));
        assert_eq!(before, after);
        for family in builder.families() {
            assert_eq!(
                loaded.family_significance(family.id(), &engine).unwrap(),
                builder.family_significance(family.id(), &engine).unwrap()
            );
        }
    }
}
