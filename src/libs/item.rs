use serde::{Deserialize, Serialize};

/// One classified effector: an identifier plus its repeat-variable symbols.
///
/// Symbols are written `NI-NG-NN` in files and reports; internally they are
/// kept as separate strings so multi-character symbols (`N*`, `HD`) align as
/// single units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strain: Option<String>,
    /// Set on items placed by the latest assignment round
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_new: bool,
}

impl Item {
    pub fn new(id: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            id: id.into(),
            symbols,
            strain: None,
            is_new: false,
        }
    }

    /// Build an item from a `-` delimited symbol string.
    ///
    /// ```
    /// use tfam::libs::Item;
    /// let item = Item::from_rvds("A", "NI-NG-NN");
    /// assert_eq!(item.len(), 3);
    /// assert_eq!(item.symbol_at(1), "NG");
    /// ```
    pub fn from_rvds(id: impl Into<String>, rvds: &str) -> Self {
        let symbols = rvds
            .split('-')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        Self::new(id, symbols)
    }

    pub fn with_strain(mut self, strain: impl Into<String>) -> Self {
        self.strain = Some(strain.into());
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbol_at(&self, i: usize) -> &str {
        &self.symbols[i]
    }

    /// Strain or group label, used only in reports.
    pub fn strain(&self) -> &str {
        self.strain.as_deref().unwrap_or("")
    }

    pub fn rvd_string(&self) -> String {
        self.symbols.join("-")
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}", self.id, self.rvd_string())?;
        if let Some(strain) = &self.strain {
            write!(f, "\t{}", strain)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rvds() {
        let item = Item::from_rvds("T1", "NI-NG-N*-HD").with_strain("PXO99A");
        assert_eq!(item.symbols, vec!["NI", "NG", "N*", "HD"]);
        assert_eq!(item.strain(), "PXO99A");
        assert_eq!(item.rvd_string(), "NI-NG-N*-HD");
        assert_eq!(format!("{}", item), "T1\tNI-NG-N*-HD\tPXO99A");

        let empty = Item::from_rvds("T2", "");
        assert!(empty.is_empty());
        assert_eq!(empty.strain(), "");
    }
}
