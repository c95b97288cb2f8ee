use super::Family;
use crate::libs::align::Aligner;
use crate::libs::error::Result;
use crate::libs::item::Item;
use crate::libs::pvalue::AlignmentPValues;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Outcome of placing one new item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReport {
    pub item: String,
    /// Family the item ended up in; `None` if it was skipped
    pub family: Option<String>,
    /// The item founded (or joined) a freshly created family
    pub new_family: bool,
    /// Distance to the closest existing family
    pub distance: Option<f64>,
    /// log10 p-value against the family it joined
    pub log10_p: Option<f64>,
    /// Other families below the significance level, most significant first
    pub related: Vec<(String, f64)>,
    /// Too few symbols to be assigned
    pub skipped: bool,
}

impl AssignmentReport {
    pub fn new(item: &Item) -> Self {
        Self {
            item: item.id.clone(),
            family: None,
            new_family: false,
            distance: None,
            log10_p: None,
            related: Vec::new(),
            skipped: false,
        }
    }

    pub fn skipped(item: &Item) -> Self {
        Self {
            skipped: true,
            ..Self::new(item)
        }
    }

    pub fn header() -> &'static str {
        "#item\tfamily\tstatus\tdistance\tlog10_p\trelated"
    }

    pub fn to_tsv(&self) -> String {
        let status = if self.skipped {
            "skipped"
        } else if self.new_family {
            "new"
        } else {
            "joined"
        };
        let num = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |x| format!("{:.4}", x));
        let related = if self.related.is_empty() {
            "-".to_string()
        } else {
            self.related
                .iter()
                .map(|(id, p)| format!("{}:{:.2}", id, p))
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.item,
            self.family.as_deref().unwrap_or("-"),
            status,
            num(self.distance),
            num(self.log10_p),
            related
        )
    }
}

/// A member of one family that aligns significantly with a member of
/// another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedPair {
    pub member: String,
    pub family: String,
    pub other: String,
    pub cost: f64,
    pub log10_p: f64,
}

impl RelatedPair {
    pub fn header() -> &'static str {
        "#member\tfamily\tother\tcost\tlog10_p"
    }

    pub fn to_tsv(&self) -> String {
        format!(
            "{}\t{}\t{}\t{:.4}\t{:.4}",
            self.member, self.family, self.other, self.cost, self.log10_p
        )
    }
}

impl Family {
    /// Human readable summary: header line, induced alignment, Newick tree
    /// and every pairwise cost with its significance.
    pub fn report<A: Aligner + ?Sized>(&self, aligner: &A, engine: Option<&AlignmentPValues>) -> Result<String> {
        let mut out = String::new();
        let members = self.members();

        let _ = write!(
            out,
            "## Family {}\tsize={}\tdistance={:.4}",
            self.id(),
            self.size(),
            self.distance()
        );
        if let Some(engine) = engine {
            let _ = write!(out, "\tlog10_p={:.4}", self.family_significance(aligner, engine)?);
        }
        out.push('\n');

        out.push_str("# Alignment\n");
        out.push_str(&self.induced_alignment()?.to_tsv());

        out.push_str("# Tree\n");
        out.push_str(&self.newick());
        out.push('\n');

        out.push_str("# Pairs\n");
        let (gap_open, gap_extend) = aligner.overhang_penalties();
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let Some(a) = self.alignment(i, j) else {
                    continue;
                };
                let _ = write!(out, "{}\t{}\t{:.4}", members[i].id, members[j].id, a.cost);
                if let Some(engine) = engine {
                    let p = engine.log_p10_pair(members[i], members[j], a.cost, gap_open, gap_extend)?;
                    let _ = write!(out, "\t{:.4}", p);
                }
                out.push('\n');
            }
        }

        Ok(out)
    }
}
