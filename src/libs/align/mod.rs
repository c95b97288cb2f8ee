pub mod costs;

pub use costs::{CostModel, MismatchCosts, RvdCosts, SymbolCosts};

use crate::libs::error::{FamilyError, Result};
use crate::libs::item::Item;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentType {
    /// Needleman-Wunsch, every gap costs the same
    Global,
    /// Terminal gaps use the extra (cheaper) penalties
    #[default]
    #[serde(rename = "semi-global", alias = "semiglobal")]
    SemiGlobal,
}

impl std::str::FromStr for AlignmentType {
    type Err = FamilyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "global" => Ok(AlignmentType::Global),
            "semiglobal" => Ok(AlignmentType::SemiGlobal),
            _ => Err(FamilyError::InvalidConfig(format!(
                "unknown alignment type '{}'",
                s
            ))),
        }
    }
}

/// One aligned symbol row; `None` is a gap.
pub type AlignedRow = Vec<Option<String>>;

/// Result of aligning two items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseAlignment {
    pub cost: f64,
    pub rows: [AlignedRow; 2],
}

impl PairwiseAlignment {
    /// Number of columns
    pub fn len(&self) -> usize {
        self.rows[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows[0].is_empty()
    }

    /// The same alignment seen from the second item.
    pub fn reversed(&self) -> Self {
        Self {
            cost: self.cost,
            rows: [self.rows[1].clone(), self.rows[0].clone()],
        }
    }

    pub fn render(&self) -> [String; 2] {
        let mut lines = render_rows(&self.rows).into_iter();
        [
            lines.next().unwrap_or_default(),
            lines.next().unwrap_or_default(),
        ]
    }
}

/// Symbols of a row with the gaps removed.
pub fn strip_gaps(row: &[Option<String>]) -> Vec<String> {
    row.iter().flatten().cloned().collect()
}

/// Render aligned rows as text, one line per row.
///
/// Cells of a column are padded to the widest symbol, gaps are dashes and
/// cells are separated by a space.
///
/// ```
/// use tfam::libs::align::render_rows;
/// let rows = vec![
///     vec![Some("NI".to_string()), None, Some("NN".to_string())],
///     vec![Some("HD".to_string()), Some("N".to_string()), Some("NN".to_string())],
/// ];
/// assert_eq!(render_rows(&rows), vec!["NI - NN", "HD N NN"]);
/// ```
pub fn render_rows(rows: &[AlignedRow]) -> Vec<String> {
    let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|c| {
            rows.iter()
                .filter_map(|r| r.get(c).and_then(|s| s.as_ref()))
                .map(|s| s.chars().count())
                .max()
                .unwrap_or(1)
                .max(1)
        })
        .collect();

    rows.iter()
        .map(|row| {
            row.iter()
                .zip(widths.iter())
                .map(|(cell, &width)| match cell {
                    Some(s) => format!("{:<width$}", s, width = width),
                    None => "-".repeat(width),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// The pairwise alignment collaborator used for distances and induced
/// alignments.
pub trait Aligner: Send + Sync {
    fn align(&self, a: &Item, b: &Item) -> Result<PairwiseAlignment>;

    /// Per-symbol substitution costs, for significance estimates.
    fn symbol_costs(&self) -> &dyn SymbolCosts;

    /// Gap open and extension penalties charged for the overhang when a
    /// shorter item slides along a longer one.
    fn overhang_penalties(&self) -> (f64, f64);
}

/// Affine-gap alignment over symbols (Gotoh), minimising cost.
///
/// A gap of length `k` costs `gap_open + (k - 1) * gap_extend`; in
/// semi-global mode terminal gaps use `extra_gap_open`/`extra_gap_extend`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffineAligner {
    pub costs: CostModel,
    pub gap_open: f64,
    pub gap_extend: f64,
    pub extra_gap_open: f64,
    pub extra_gap_extend: f64,
    pub align_type: AlignmentType,
}

impl Default for AffineAligner {
    fn default() -> Self {
        Self {
            costs: CostModel::default(),
            gap_open: 5.0,
            gap_extend: 5.0,
            extra_gap_open: 1.0,
            extra_gap_extend: 0.1,
            align_type: AlignmentType::SemiGlobal,
        }
    }
}

const MATCH: usize = 0;
const GAP_B: usize = 1; // symbol of a against a gap
const GAP_A: usize = 2; // symbol of b against a gap

impl AffineAligner {
    pub fn new(costs: CostModel, align_type: AlignmentType) -> Self {
        Self {
            costs,
            align_type,
            ..Default::default()
        }
    }

    // (open, extend) for a gap run at `pos` of the other sequence with length `len`
    fn gap_costs(&self, pos: usize, len: usize) -> (f64, f64) {
        if self.align_type == AlignmentType::SemiGlobal && (pos == 0 || pos == len) {
            (self.extra_gap_open, self.extra_gap_extend)
        } else {
            (self.gap_open, self.gap_extend)
        }
    }
}

fn min3(values: [f64; 3]) -> (f64, usize) {
    let mut best = (values[0], 0);
    for (state, &v) in values.iter().enumerate().skip(1) {
        if v < best.0 {
            best = (v, state);
        }
    }
    best
}

impl Aligner for AffineAligner {
    fn align(&self, a: &Item, b: &Item) -> Result<PairwiseAlignment> {
        let n = a.len();
        let m = b.len();
        let width = m + 1;
        let size = (n + 1) * width;
        let at = |i: usize, j: usize| i * width + j;

        let mut score = [
            vec![f64::INFINITY; size],
            vec![f64::INFINITY; size],
            vec![f64::INFINITY; size],
        ];
        let mut from = [vec![MATCH; size], vec![MATCH; size], vec![MATCH; size]];

        score[MATCH][0] = 0.0;

        let (open, extend) = self.gap_costs(0, m);
        for i in 1..=n {
            if i == 1 {
                score[GAP_B][at(i, 0)] = open;
                from[GAP_B][at(i, 0)] = MATCH;
            } else {
                score[GAP_B][at(i, 0)] = score[GAP_B][at(i - 1, 0)] + extend;
                from[GAP_B][at(i, 0)] = GAP_B;
            }
        }
        let (open, extend) = self.gap_costs(0, n);
        for j in 1..=m {
            if j == 1 {
                score[GAP_A][at(0, j)] = open;
                from[GAP_A][at(0, j)] = MATCH;
            } else {
                score[GAP_A][at(0, j)] = score[GAP_A][at(0, j - 1)] + extend;
                from[GAP_A][at(0, j)] = GAP_A;
            }
        }

        for i in 1..=n {
            for j in 1..=m {
                let sub = self.costs.cost(a.symbol_at(i - 1), b.symbol_at(j - 1));
                if sub.is_nan() {
                    return Err(FamilyError::Alignment(format!(
                        "cost of {} vs {} is not a number",
                        a.symbol_at(i - 1),
                        b.symbol_at(j - 1)
                    )));
                }

                let diag = at(i - 1, j - 1);
                let (best, state) = min3([
                    score[MATCH][diag],
                    score[GAP_B][diag],
                    score[GAP_A][diag],
                ]);
                score[MATCH][at(i, j)] = best + sub;
                from[MATCH][at(i, j)] = state;

                let up = at(i - 1, j);
                let (open, extend) = self.gap_costs(j, m);
                let (best, state) = min3([
                    score[MATCH][up] + open,
                    score[GAP_B][up] + extend,
                    score[GAP_A][up] + open,
                ]);
                score[GAP_B][at(i, j)] = best;
                from[GAP_B][at(i, j)] = state;

                let left = at(i, j - 1);
                let (open, extend) = self.gap_costs(i, n);
                let (best, state) = min3([
                    score[MATCH][left] + open,
                    score[GAP_B][left] + open,
                    score[GAP_A][left] + extend,
                ]);
                score[GAP_A][at(i, j)] = best;
                from[GAP_A][at(i, j)] = state;
            }
        }

        let end = at(n, m);
        let (cost, mut state) = min3([score[MATCH][end], score[GAP_B][end], score[GAP_A][end]]);
        if !cost.is_finite() {
            return Err(FamilyError::Alignment(format!(
                "no finite alignment between {} and {}",
                a.id, b.id
            )));
        }

        let mut row_a = Vec::with_capacity(n + m);
        let mut row_b = Vec::with_capacity(n + m);
        let (mut i, mut j) = (n, m);
        while i > 0 || j > 0 {
            let prev = from[state][at(i, j)];
            match state {
                MATCH => {
                    row_a.push(Some(a.symbols[i - 1].clone()));
                    row_b.push(Some(b.symbols[j - 1].clone()));
                    i -= 1;
                    j -= 1;
                }
                GAP_B => {
                    row_a.push(Some(a.symbols[i - 1].clone()));
                    row_b.push(None);
                    i -= 1;
                }
                _ => {
                    row_a.push(None);
                    row_b.push(Some(b.symbols[j - 1].clone()));
                    j -= 1;
                }
            }
            state = prev;
        }
        row_a.reverse();
        row_b.reverse();

        Ok(PairwiseAlignment {
            cost,
            rows: [row_a, row_b],
        })
    }

    fn symbol_costs(&self) -> &dyn SymbolCosts {
        &self.costs
    }

    fn overhang_penalties(&self) -> (f64, f64) {
        (self.extra_gap_open, self.extra_gap_extend)
    }
}
