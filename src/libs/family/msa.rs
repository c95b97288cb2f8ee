//! Multiple alignments induced by pairwise alignments along a family tree.
//!
//! Every internal node joins the blocks of its children left to right. Two
//! blocks are glued through the pairwise alignment of the last member of the
//! left block with the first member of the right block: that alignment shares
//! one row with each block, so gap columns can be threaded through both.

use super::Family;
use crate::libs::align::{render_rows, strip_gaps, AlignedRow};
use crate::libs::clust::{ClusterTree, NodeId};
use crate::libs::error::{FamilyError, Result};
use crate::libs::item::Item;
use std::collections::HashMap;

/// Aligned rows of all family members, in leaf order.
#[derive(Debug, Clone, PartialEq)]
pub struct InducedAlignment<'a> {
    pub items: Vec<&'a Item>,
    pub rows: Vec<AlignedRow>,
}

impl InducedAlignment<'_> {
    /// Number of columns
    pub fn len(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn render(&self) -> Vec<String> {
        render_rows(&self.rows)
    }

    /// `id<TAB>aligned row`, one line per member.
    pub fn to_tsv(&self) -> String {
        self.items
            .iter()
            .zip(self.render())
            .map(|(item, line)| format!("{}\t{}\n", item.id, line))
            .collect()
    }
}

struct Block {
    members: Vec<usize>,
    rows: Vec<AlignedRow>,
}

pub(super) fn induced_alignment(family: &Family) -> Result<InducedAlignment<'_>> {
    let tree = family.tree();
    let root = tree
        .get_root()
        .ok_or(FamilyError::EmptyInput("family tree"))?;
    let positions: HashMap<NodeId, usize> = tree
        .get_leaves()
        .into_iter()
        .enumerate()
        .map(|(pos, id)| (id, pos))
        .collect();

    let block = build_block(family, tree, root, &positions)?;
    let items = family.members();

    if block.members.len() != items.len() {
        return Err(FamilyError::Alignment(format!(
            "{} rows for {} members",
            block.members.len(),
            items.len()
        )));
    }
    for (row, item) in block.rows.iter().zip(items.iter()) {
        if strip_gaps(row) != item.symbols {
            return Err(FamilyError::Alignment(format!(
                "row of '{}' does not reproduce its symbols",
                item.id
            )));
        }
    }

    Ok(InducedAlignment {
        items,
        rows: block.rows,
    })
}

fn build_block(
    family: &Family,
    tree: &ClusterTree<Item>,
    id: NodeId,
    positions: &HashMap<NodeId, usize>,
) -> Result<Block> {
    let node = tree
        .get_node(id)
        .ok_or_else(|| FamilyError::Tree(format!("Node {} not found", id)))?;

    if let Some(item) = node.item() {
        let pos = positions
            .get(&id)
            .copied()
            .ok_or_else(|| FamilyError::Tree(format!("Leaf {} not in leaf order", id)))?;
        return Ok(Block {
            members: vec![pos],
            rows: vec![item.symbols.iter().cloned().map(Some).collect()],
        });
    }

    let mut acc: Option<Block> = None;
    for &child in &node.children {
        let next = build_block(family, tree, child, positions)?;
        acc = Some(match acc {
            None => next,
            Some(left) => join(family, left, next)?,
        });
    }
    acc.ok_or_else(|| FamilyError::Tree(format!("Internal node {} has no children", id)))
}

fn join(family: &Family, left: Block, right: Block) -> Result<Block> {
    let (Some(&x), Some(&y)) = (left.members.last(), right.members.first()) else {
        return Err(FamilyError::Alignment("empty block".to_string()));
    };
    let pair = family.alignment(x, y).ok_or_else(|| {
        FamilyError::Alignment(format!("no pairwise alignment for members {} and {}", x, y))
    })?;

    // left + y, threaded through x
    let (mut glued, pair_rows) = merge_on_row(&left.rows, left.rows.len() - 1, &pair.rows, 0)?;
    let helper = glued.len();
    glued.extend(pair_rows.into_iter().skip(1));

    // (left + y) + right, threaded through y; the helper copy of y goes
    let (mut rows, right_rows) = merge_on_row(&glued, helper, &right.rows, 0)?;
    rows.truncate(helper);
    rows.extend(right_rows);
    drop_gap_columns(&mut rows);

    let mut members = left.members;
    members.extend(right.members);
    Ok(Block { members, rows })
}

/// Expand two blocks to a common set of columns, given that row `ra` of `a`
/// and row `rb` of `b` carry the same symbols.
fn merge_on_row(
    a: &[AlignedRow],
    ra: usize,
    b: &[AlignedRow],
    rb: usize,
) -> Result<(Vec<AlignedRow>, Vec<AlignedRow>)> {
    let (la, lb) = (a[ra].len(), b[rb].len());
    let mut out_a: Vec<AlignedRow> = vec![Vec::with_capacity(la.max(lb)); a.len()];
    let mut out_b: Vec<AlignedRow> = vec![Vec::with_capacity(la.max(lb)); b.len()];

    let push = |out: &mut Vec<AlignedRow>, rows: &[AlignedRow], col: Option<usize>| {
        for (k, row) in out.iter_mut().enumerate() {
            row.push(col.and_then(|c| rows[k][c].clone()));
        }
    };

    let (mut i, mut j) = (0, 0);
    while i < la || j < lb {
        let ca = a[ra].get(i);
        let cb = b[rb].get(j);
        match (ca, cb) {
            (Some(None), Some(None)) => {
                push(&mut out_a, a, Some(i));
                push(&mut out_b, b, Some(j));
                i += 1;
                j += 1;
            }
            (Some(None), _) => {
                push(&mut out_a, a, Some(i));
                push(&mut out_b, b, None);
                i += 1;
            }
            (_, Some(None)) => {
                push(&mut out_a, a, None);
                push(&mut out_b, b, Some(j));
                j += 1;
            }
            (Some(Some(sa)), Some(Some(sb))) => {
                if sa != sb {
                    return Err(FamilyError::Alignment(format!(
                        "shared row disagrees: '{}' vs '{}'",
                        sa, sb
                    )));
                }
                push(&mut out_a, a, Some(i));
                push(&mut out_b, b, Some(j));
                i += 1;
                j += 1;
            }
            _ => {
                return Err(FamilyError::Alignment(
                    "shared row has different lengths".to_string(),
                ))
            }
        }
    }

    Ok((out_a, out_b))
}

fn drop_gap_columns(rows: &mut [AlignedRow]) {
    let columns = rows.first().map_or(0, |r| r.len());
    let keep: Vec<bool> = (0..columns)
        .map(|c| rows.iter().any(|r| r[c].is_some()))
        .collect();
    if keep.iter().all(|&k| k) {
        return;
    }
    for row in rows.iter_mut() {
        let mut col = 0;
        row.retain(|_| {
            let k = keep[col];
            col += 1;
            k
        });
    }
}
