use serde::{Deserialize, Serialize};

/// Substitution cost between two symbols.
pub trait SymbolCosts: Send + Sync {
    fn cost(&self, a: &str, b: &str) -> f64;
}

/// RVD substitution costs.
///
/// Identical symbols cost `equal`. Otherwise the first residue and the rest
/// of the symbol are compared separately, weighted by `first` and `second`,
/// and the sum is scaled: `NI` vs `NG` costs `scale * second`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RvdCosts {
    pub scale: f64,
    pub first: f64,
    pub second: f64,
    pub equal: f64,
}

impl Default for RvdCosts {
    fn default() -> Self {
        Self {
            scale: 1.0,
            first: 0.2,
            second: 0.8,
            equal: 0.0,
        }
    }
}

impl SymbolCosts for RvdCosts {
    fn cost(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return self.equal;
        }
        let mut ca = a.chars();
        let mut cb = b.chars();
        let first = if ca.next() != cb.next() { self.first } else { 0.0 };
        let second = if ca.as_str() != cb.as_str() {
            self.second
        } else {
            0.0
        };
        self.scale * (first + second)
    }
}

/// 0 for identical symbols, `mismatch` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MismatchCosts {
    pub mismatch: f64,
}

impl Default for MismatchCosts {
    fn default() -> Self {
        Self { mismatch: 1.0 }
    }
}

impl SymbolCosts for MismatchCosts {
    fn cost(&self, a: &str, b: &str) -> f64 {
        if a == b {
            0.0
        } else {
            self.mismatch
        }
    }
}

/// Cost models selectable from configuration files.
///
/// ```toml
/// [costs]
/// model = "rvd"
/// scale = 1.0
/// first = 0.2
/// second = 0.8
/// equal = 0.0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum CostModel {
    Rvd(RvdCosts),
    Mismatch(MismatchCosts),
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel::Rvd(RvdCosts::default())
    }
}

impl SymbolCosts for CostModel {
    fn cost(&self, a: &str, b: &str) -> f64 {
        match self {
            CostModel::Rvd(c) => c.cost(a, b),
            CostModel::Mismatch(c) => c.cost(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rvd_costs() {
        let costs = RvdCosts::default();
        assert_eq!(costs.cost("NI", "NI"), 0.0);
        assert_relative_eq!(costs.cost("NI", "NG"), 0.8);
        assert_relative_eq!(costs.cost("NI", "HI"), 0.2);
        assert_relative_eq!(costs.cost("NI", "HD"), 1.0);
        assert_relative_eq!(costs.cost("N*", "NG"), 0.8);
        assert_relative_eq!(costs.cost("NG", "N*"), costs.cost("N*", "NG"));

        let scaled = RvdCosts {
            scale: 2.0,
            ..Default::default()
        };
        assert_relative_eq!(scaled.cost("NI", "HD"), 2.0);
    }

    #[test]
    fn test_cost_model() {
        let model = CostModel::Mismatch(MismatchCosts { mismatch: 1.0 });
        assert_eq!(model.cost("HD", "NG"), 1.0);
        assert_eq!(model.cost("HD", "HD"), 0.0);

        let rvd: CostModel = toml::from_str("model = \"rvd\"\nscale = 1.0\nfirst = 0.2\nsecond = 0.8\nequal = 0.0\n").unwrap();
        assert_eq!(rvd, CostModel::default());
    }
}
