use crate::libs::error::{FamilyError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Dense square matrix of pairwise alignment costs.
///
/// Rows are addressed by the stable index an item received when it entered
/// the builder. `d(i, i) = 0`; symmetry holds for every matrix built here
/// because each pair is computed once and mirrored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    size: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    /// A `size`×`size` matrix of zeros.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            data: vec![0.0; size * size],
        }
    }

    /// Fill the upper triangle sequentially and mirror it.
    pub fn from_fn<F>(size: usize, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> Result<f64>,
    {
        let mut matrix = Self::new(size);
        for i in 0..size {
            for j in (i + 1)..size {
                let d = f(i, j)?;
                matrix.set_symmetric(i, j, d);
            }
        }
        Ok(matrix)
    }

    /// Fill the upper triangle with one rayon task per row, then mirror.
    ///
    /// Each cell is produced by exactly one call of `f`, so the result is
    /// identical to [`DistanceMatrix::from_fn`].
    pub fn from_fn_par<F>(size: usize, f: F) -> Result<Self>
    where
        F: Fn(usize, usize) -> Result<f64> + Sync,
    {
        let rows: Vec<Vec<f64>> = (0..size)
            .into_par_iter()
            .map(|i| ((i + 1)..size).map(|j| f(i, j)).collect::<Result<Vec<f64>>>())
            .collect::<Result<Vec<_>>>()?;

        let mut matrix = Self::new(size);
        for (i, row) in rows.into_iter().enumerate() {
            for (k, d) in row.into_iter().enumerate() {
                matrix.set_symmetric(i, i + 1 + k, d);
            }
        }
        Ok(matrix)
    }

    /// Build from nested rows, e.g. a matrix restored from disk.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let size = rows.len();
        let mut matrix = Self::new(size);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != size {
                return Err(FamilyError::DimensionMismatch {
                    expected: size,
                    found: row.len(),
                });
            }
            matrix.data[i * size..(i + 1) * size].copy_from_slice(row);
        }
        Ok(matrix)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Panics when out of range; use [`DistanceMatrix::try_get`] for indices
    /// coming from tree bookkeeping.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.size + j]
    }

    /// Look up a cell by tree index. Negative or out-of-range indices are a
    /// bookkeeping error.
    pub fn try_get(&self, i: isize, j: isize) -> Result<f64> {
        let row = self.check_index(i)?;
        let col = self.check_index(j)?;
        Ok(self.get(row, col))
    }

    pub fn check_index(&self, i: isize) -> Result<usize> {
        if i < 0 || i as usize >= self.size {
            Err(FamilyError::MissingIndex(i))
        } else {
            Ok(i as usize)
        }
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.size + j] = value;
    }

    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.set(i, j, value);
        self.set(j, i, value);
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.size..(i + 1) * self.size]
    }

    /// Grow to `new_size`, keeping every existing cell and computing only
    /// the pairs that involve at least one new row.
    ///
    /// Returns the grown matrix and the number of newly computed pairs.
    pub fn extend<F>(&self, new_size: usize, f: F) -> Result<(Self, usize)>
    where
        F: Fn(usize, usize) -> Result<f64> + Sync,
    {
        if new_size < self.size {
            return Err(FamilyError::DimensionMismatch {
                expected: self.size,
                found: new_size,
            });
        }

        let old = self.size;
        let rows: Vec<Vec<f64>> = (old..new_size)
            .into_par_iter()
            .map(|j| (0..j).map(|i| f(i, j)).collect::<Result<Vec<f64>>>())
            .collect::<Result<Vec<_>>>()?;

        let mut matrix = Self::new(new_size);
        for i in 0..old {
            for j in 0..old {
                matrix.set(i, j, self.get(i, j));
            }
        }
        let mut computed = 0;
        for (k, row) in rows.into_iter().enumerate() {
            let j = old + k;
            for (i, d) in row.into_iter().enumerate() {
                matrix.set_symmetric(i, j, d);
                computed += 1;
            }
        }
        Ok((matrix, computed))
    }

    /// Keep only the listed rows, in the given order.
    ///
    /// The remap records where each surviving old index lives now.
    pub fn restrict(&self, keep: &[usize]) -> Result<(Self, IndexRemap)> {
        let mut remap = IndexRemap::new(self.size);
        for (new, &old) in keep.iter().enumerate() {
            if old >= self.size {
                return Err(FamilyError::MissingIndex(old as isize));
            }
            remap.insert(old, new);
        }

        let mut matrix = Self::new(keep.len());
        for (a, &i) in keep.iter().enumerate() {
            for (b, &j) in keep.iter().enumerate() {
                matrix.set(a, b, self.get(i, j));
            }
        }
        Ok((matrix, remap))
    }

    /// Check `d(i, i) = 0` and `|d(i, j) - d(j, i)| <= tolerance`.
    pub fn validate_symmetric(&self, tolerance: f64) -> Result<()> {
        if self.data.len() != self.size * self.size {
            return Err(FamilyError::DimensionMismatch {
                expected: self.size * self.size,
                found: self.data.len(),
            });
        }
        for i in 0..self.size {
            if self.get(i, i).abs() > tolerance {
                return Err(FamilyError::AsymmetricMatrix {
                    i,
                    j: i,
                    dij: self.get(i, i),
                    dji: 0.0,
                });
            }
            for j in (i + 1)..self.size {
                let dij = self.get(i, j);
                let dji = self.get(j, i);
                if !dij.is_finite() || !dji.is_finite() || (dij - dji).abs() > tolerance {
                    return Err(FamilyError::AsymmetricMatrix { i, j, dij, dji });
                }
            }
        }
        Ok(())
    }
}

/// Old-index to new-index table produced when matrix rows are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRemap {
    map: Vec<Option<usize>>,
}

impl IndexRemap {
    pub fn new(old_size: usize) -> Self {
        Self {
            map: vec![None; old_size],
        }
    }

    pub fn identity(size: usize) -> Self {
        Self {
            map: (0..size).map(Some).collect(),
        }
    }

    pub fn insert(&mut self, old: usize, new: usize) {
        if old >= self.map.len() {
            self.map.resize(old + 1, None);
        }
        self.map[old] = Some(new);
    }

    pub fn get(&self, old: usize) -> Option<usize> {
        self.map.get(old).copied().flatten()
    }

    /// Map a tree index; negative indices belong to internal nodes and
    /// pass through untouched.
    pub fn map_index(&self, old: isize) -> Result<isize> {
        if old < 0 {
            return Ok(old);
        }
        self.get(old as usize)
            .map(|n| n as isize)
            .ok_or(FamilyError::MissingIndex(old))
    }

    /// Number of surviving rows.
    pub fn len(&self) -> usize {
        self.map.iter().filter(|m| m.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
