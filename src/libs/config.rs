//! Builder parameters, loadable from TOML.

use crate::libs::align::{AffineAligner, AlignmentType, CostModel};
use crate::libs::clust::{Hclust, Linkage};
use crate::libs::error::{FamilyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Clustering, alignment and significance parameters.
///
/// Missing keys fall back to the defaults:
///
/// ```
/// let config: tfam::libs::config::BuilderConfig = toml::from_str("cut = 2.5").unwrap();
/// assert_eq!(config.cut, 2.5);
/// assert_eq!(config.gap_open, 5.0);
/// assert_eq!(config.min_symbols, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub linkage: Linkage,
    pub alignment_type: AlignmentType,
    pub gap_open: f64,
    pub gap_extend: f64,
    /// Terminal gap penalties for semi-global alignments
    pub extra_gap_open: f64,
    pub extra_gap_extend: f64,
    /// Dendrogram cut height separating families
    pub cut: f64,
    /// Significance level for related-family reports
    pub pvalue: f64,
    pub costs: CostModel,
    /// Items with fewer symbols are never assigned to a family
    pub min_symbols: usize,
    /// Family ids never handed out by the id pool
    pub reserved_names: Vec<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            linkage: Linkage::Average,
            alignment_type: AlignmentType::SemiGlobal,
            gap_open: 5.0,
            gap_extend: 5.0,
            extra_gap_open: 1.0,
            extra_gap_extend: 0.1,
            cut: 5.0,
            pvalue: 0.01,
            costs: CostModel::default(),
            min_symbols: 4,
            reserved_names: Vec::new(),
        }
    }
}

impl BuilderConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: BuilderConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Reject negative or non-finite penalties and thresholds; no clamping.
    pub fn validate(&self) -> Result<()> {
        let penalties = [
            ("gap_open", self.gap_open),
            ("gap_extend", self.gap_extend),
            ("extra_gap_open", self.extra_gap_open),
            ("extra_gap_extend", self.extra_gap_extend),
            ("cut", self.cut),
        ];
        for (name, value) in penalties {
            if !value.is_finite() || value < 0.0 {
                return Err(FamilyError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if !(self.pvalue > 0.0 && self.pvalue <= 1.0) {
            return Err(FamilyError::InvalidConfig(format!(
                "pvalue must be in (0, 1], got {}",
                self.pvalue
            )));
        }
        Ok(())
    }

    pub fn aligner(&self) -> AffineAligner {
        AffineAligner {
            costs: self.costs,
            gap_open: self.gap_open,
            gap_extend: self.gap_extend,
            extra_gap_open: self.extra_gap_open,
            extra_gap_extend: self.extra_gap_extend,
            align_type: self.alignment_type,
        }
    }

    pub fn hclust(&self) -> Hclust {
        Hclust::new(self.linkage)
    }

    /// log10 of the related-family significance level.
    pub fn log10_pvalue(&self) -> f64 {
        self.pvalue.log10()
    }
}
