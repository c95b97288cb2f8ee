use crate::libs::align::SymbolCosts;
use crate::libs::error::{FamilyError, Result};
use crate::libs::item::Item;
use log::trace;
use std::collections::{BTreeSet, HashMap};
use std::f64::consts::LN_10;

/// Costs closer than this are merged into one state.
const MERGE_EPS: f64 = 1e-3;

/// `ln(e^a + e^b)` without overflow.
fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// `ln(1 - e^x)` for `x <= 0`.
pub fn ln_1m_exp(x: f64) -> f64 {
    if x > -std::f64::consts::LN_2 {
        (-x.exp_m1()).ln()
    } else {
        (-x.exp()).ln_1p()
    }
}

/// Combine log10 p-values of independent events into the log10 probability
/// that at least one of them happens: `1 - prod(1 - p_i)`.
pub fn log10_any(log10_ps: &[f64]) -> f64 {
    let sum: f64 = log10_ps.iter().map(|&p| ln_1m_exp(p * LN_10)).sum();
    ln_1m_exp(sum) / LN_10
}

/// Null model of alignment costs.
///
/// Symbol frequencies come from a population of items. For every symbol
/// `s` the engine keeps the distribution of `cost(s, s')` with `s'` drawn
/// from those frequencies; a sequence's cost distribution is the
/// convolution of its per-position distributions.
#[derive(Debug, Clone)]
pub struct AlignmentPValues {
    alphabet: Vec<String>,
    positions: HashMap<String, usize>,
    frequencies: Vec<f64>,
    costs: Vec<Vec<f64>>,
    log_probs: Vec<Vec<f64>>,
    non_negative: bool,
}

impl AlignmentPValues {
    /// The alphabet is every distinct symbol of `population`.
    pub fn new(population: &[Item], costs: &dyn SymbolCosts) -> Result<Self> {
        let alphabet: BTreeSet<&String> = population.iter().flat_map(|i| i.symbols.iter()).collect();
        let alphabet = alphabet.into_iter().cloned().collect();
        Self::with_alphabet(alphabet, population, costs)
    }

    /// Frequencies start from a pseudocount of `1 / |alphabet|` per symbol,
    /// then every occurrence in `population` adds one.
    pub fn with_alphabet(
        alphabet: Vec<String>,
        population: &[Item],
        costs: &dyn SymbolCosts,
    ) -> Result<Self> {
        let alphabet: Vec<String> = alphabet
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if alphabet.is_empty() {
            return Err(FamilyError::EmptyInput("alphabet"));
        }

        let positions: HashMap<String, usize> = alphabet
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();

        let k = alphabet.len();
        let mut frequencies = vec![1.0 / k as f64; k];
        for item in population {
            for symbol in &item.symbols {
                let p = *positions
                    .get(symbol)
                    .ok_or_else(|| FamilyError::UnknownSymbol(symbol.clone()))?;
                frequencies[p] += 1.0;
            }
        }
        let total: f64 = frequencies.iter().sum();
        for f in frequencies.iter_mut() {
            *f /= total;
        }

        let mut cost_table = Vec::with_capacity(k);
        let mut log_prob_table = Vec::with_capacity(k);
        let mut non_negative = true;
        for a in &alphabet {
            let mut pairs: Vec<(f64, f64)> = alphabet
                .iter()
                .zip(frequencies.iter())
                .map(|(b, &f)| (costs.cost(a, b), f))
                .collect();
            if let Some(&(c, _)) = pairs.iter().find(|(c, _)| c.is_nan()) {
                return Err(FamilyError::InvalidConfig(format!(
                    "cost of symbol {} is {}",
                    a, c
                )));
            }
            pairs.sort_by(|x, y| x.0.total_cmp(&y.0));

            let mut symbol_costs: Vec<f64> = Vec::new();
            let mut symbol_probs: Vec<f64> = Vec::new();
            for (c, f) in pairs {
                non_negative &= c >= 0.0;
                match symbol_costs.last() {
                    Some(&last) if last == c => {
                        if let Some(p) = symbol_probs.last_mut() {
                            *p += f;
                        }
                    }
                    _ => {
                        symbol_costs.push(c);
                        symbol_probs.push(f);
                    }
                }
            }
            cost_table.push(symbol_costs);
            log_prob_table.push(symbol_probs.into_iter().map(f64::ln).collect());
        }

        Ok(Self {
            alphabet,
            positions,
            frequencies,
            costs: cost_table,
            log_probs: log_prob_table,
            non_negative,
        })
    }

    pub fn alphabet(&self) -> &[String] {
        &self.alphabet
    }

    pub fn frequency(&self, symbol: &str) -> Option<f64> {
        self.positions.get(symbol).map(|&p| self.frequencies[p])
    }

    /// Distinct achievable costs against `symbol`, ascending.
    pub fn symbol_costs(&self, symbol: &str) -> Option<&[f64]> {
        self.positions.get(symbol).map(|&p| self.costs[p].as_slice())
    }

    /// log10 of the probability that a random partner aligns to `symbols`
    /// (position by position, no gaps) with a total cost below `threshold`,
    /// starting from `base`.
    ///
    /// `+inf` gives 0; a threshold below every achievable cost gives `-inf`.
    pub fn log_p10<S: AsRef<str>>(&self, symbols: &[S], threshold: f64, base: f64) -> Result<f64> {
        if threshold.is_nan() || base.is_nan() {
            return Err(FamilyError::InvalidConfig(
                "cost threshold and base must be numbers".to_string(),
            ));
        }
        let rows = symbols
            .iter()
            .map(|s| {
                self.positions
                    .get(s.as_ref())
                    .copied()
                    .ok_or_else(|| FamilyError::UnknownSymbol(s.as_ref().to_string()))
            })
            .collect::<Result<Vec<usize>>>()?;

        if threshold == f64::INFINITY {
            return Ok(0.0);
        }

        // (cost so far, ln probability)
        let mut state: Vec<(f64, f64)> = vec![(base, 0.0)];
        // with non-negative costs a state never comes back down, except that
        // each aggregation can pull it below its own cost by less than
        // MERGE_EPS; states past that slack are dropped
        let prune = self.non_negative;
        let n = rows.len();
        let slack = |merges_left: usize| threshold + merges_left as f64 * MERGE_EPS;

        for (pos, &p) in rows.iter().enumerate() {
            let limit = slack(n - pos);
            let mut next = Vec::with_capacity(state.len() * self.costs[p].len());
            for &(c, lp) in &state {
                for (&dc, &dlp) in self.costs[p].iter().zip(self.log_probs[p].iter()) {
                    let nc = c + dc;
                    if prune && nc >= limit {
                        // costs are sorted, the rest are larger
                        break;
                    }
                    next.push((nc, lp + dlp));
                }
            }
            next.sort_by(|x, y| x.0.total_cmp(&y.0));
            state = aggregate(next);
            if prune {
                let limit = slack(n - pos - 1);
                state.retain(|(c, _)| *c < limit);
            }

            trace!("position {}: {} cost states", pos, state.len());
            if state.is_empty() {
                return Ok(f64::NEG_INFINITY);
            }
        }

        let total = state
            .iter()
            .filter(|(c, _)| *c < threshold)
            .fold(f64::NEG_INFINITY, |acc, &(_, lp)| log_add(acc, lp));

        Ok(total / LN_10)
    }

    /// log10 p-value of `cost` for two items of possibly different length.
    ///
    /// The shorter item slides over the longer one; each offset pays the gap
    /// penalties for the overhang, and offsets are treated as independent
    /// chances. Both directions (random partner for the longer window and
    /// for the shorter item) are folded in.
    pub fn log_p10_pair(
        &self,
        a: &Item,
        b: &Item,
        cost: f64,
        gap_open: f64,
        gap_extend: f64,
    ) -> Result<f64> {
        let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
        let n = short.len();
        let l = long.len() - n + 1;

        let mut sum = 0.0;
        let mut sum_q = 0.0;
        for i in 0..l {
            let mut base = (l - 1) as f64 * gap_extend;
            if l > 1 && i > 0 {
                base += gap_open;
            }
            if l > 1 && i < l - 1 {
                base += gap_open;
            }

            let p = self.log_p10(&long.symbols[i..i + n], cost, base)?;
            sum += ln_1m_exp(p * LN_10);

            let q = self.log_p10(&short.symbols, cost, base)?;
            sum_q += ln_1m_exp(q * LN_10);
        }

        Ok(ln_1m_exp(sum + sum_q) / LN_10)
    }
}

// Merge runs of costs within MERGE_EPS of the run's first cost.
fn aggregate(sorted: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(sorted.len());
    for (c, lp) in sorted {
        match merged.last_mut() {
            Some(last) if (c - last.0).abs() < MERGE_EPS => {
                last.1 = log_add(last.1, lp);
            }
            _ => merged.push((c, lp)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::align::{MismatchCosts, RvdCosts};
    use approx::assert_relative_eq;

    fn engine() -> AlignmentPValues {
        // A and B equally frequent
        let population = vec![Item::from_rvds("x", "A-B")];
        AlignmentPValues::new(&population, &MismatchCosts { mismatch: 1.0 }).unwrap()
    }

    #[test]
    fn test_frequencies() {
        let population = vec![Item::from_rvds("x", "A-A-A"), Item::from_rvds("y", "B")];
        let e = AlignmentPValues::new(&population, &MismatchCosts::default()).unwrap();
        // (0.5 + 3) / 5 and (0.5 + 1) / 5
        assert_relative_eq!(e.frequency("A").unwrap(), 0.7);
        assert_relative_eq!(e.frequency("B").unwrap(), 0.3);
        assert_eq!(e.alphabet(), ["A".to_string(), "B".to_string()]);
        assert_eq!(e.symbol_costs("A").unwrap(), [0.0, 1.0]);
        assert!(e.frequency("C").is_none());
    }

    #[test]
    fn test_log_p10() {
        let e = engine();

        assert_relative_eq!(e.log_p10(&["A"], 0.5, 0.0).unwrap(), 0.5f64.log10());
        // costs 0, 1, 2 with 1/4, 1/2, 1/4
        assert_relative_eq!(e.log_p10(&["A", "B"], 1.5, 0.0).unwrap(), 0.75f64.log10());
        assert_relative_eq!(e.log_p10(&["A", "B"], 2.5, 0.0).unwrap(), 0.0, epsilon = 1e-12);
        // base shifts every cost
        assert_relative_eq!(e.log_p10(&["A", "B"], 1.5, 1.0).unwrap(), 0.25f64.log10());
    }

    #[test]
    fn test_log_p10_boundaries() {
        let e = engine();
        let seq = ["A", "B", "A", "A"];

        assert_eq!(e.log_p10(&seq, f64::INFINITY, 0.0).unwrap(), 0.0);
        assert_eq!(e.log_p10(&seq, 0.0, 0.0).unwrap(), f64::NEG_INFINITY);
        assert_eq!(e.log_p10(&seq, -1.0, 0.0).unwrap(), f64::NEG_INFINITY);

        let mut last = f64::NEG_INFINITY;
        for t in [0.5, 1.5, 2.5, 3.5, 4.5] {
            let p = e.log_p10(&seq, t, 0.0).unwrap();
            assert!(p >= last);
            last = p;
        }

        assert!(matches!(
            e.log_p10(&["A", "Z"], 1.0, 0.0),
            Err(FamilyError::UnknownSymbol(s)) if s == "Z"
        ));
    }

    struct NearCosts;

    impl crate::libs::align::SymbolCosts for NearCosts {
        fn cost(&self, a: &str, b: &str) -> f64 {
            match (a, b) {
                _ if a == b => 0.0,
                ("A", "C") | ("C", "A") => 1.0005,
                _ => 1.0,
            }
        }
    }

    #[test]
    fn test_log_p10_merges_before_threshold() {
        // A, B, C equally frequent; from A the costs are 0, 1 and 1.0005
        let population = vec![Item::from_rvds("x", "A-B-C")];
        let e = AlignmentPValues::new(&population, &NearCosts).unwrap();

        // 1.0005 joins the state at 1.0, which is below the threshold
        assert_relative_eq!(e.log_p10(&["A"], 1.0003, 0.0).unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(e.log_p10(&["A"], 0.5, 0.0).unwrap(), (1.0f64 / 3.0).log10());

        // the merged state carries into the next position
        let p = e.log_p10(&["A", "A"], 1.0003, 0.0).unwrap();
        assert_relative_eq!(p, (1.0f64 / 9.0 + 4.0 / 9.0).log10(), epsilon = 1e-12);
    }

    #[test]
    fn test_log_p10_pair() {
        let e = engine();
        let a = Item::from_rvds("a", "A-A");
        let b = Item::from_rvds("b", "A-B");

        // both directions have p = 1/4
        let p = e.log_p10_pair(&a, &b, 1.0, 5.0, 5.0).unwrap();
        assert_relative_eq!(p, (1.0 - 0.75f64 * 0.75).log10(), epsilon = 1e-12);

        // overhang penalties above the observed cost leave no chance
        let c = Item::from_rvds("c", "A-B-A");
        let longer = e.log_p10_pair(&a, &c, 1.0, 5.0, 5.0).unwrap();
        assert_eq!(longer, f64::NEG_INFINITY);

        // cheap overhangs: two offsets, four independent chances
        let cheap = e.log_p10_pair(&a, &c, 1.0, 0.5, 0.1).unwrap();
        assert_relative_eq!(cheap, (1.0 - 0.75f64.powi(4)).log10(), epsilon = 1e-12);
        assert!(cheap > p);
    }

    #[test]
    fn test_helpers() {
        assert_relative_eq!(ln_1m_exp(0.5f64.ln()), 0.5f64.ln());
        assert_eq!(ln_1m_exp(0.0), f64::NEG_INFINITY);
        assert_eq!(ln_1m_exp(f64::NEG_INFINITY), 0.0);
        assert_relative_eq!(log10_any(&[0.5f64.log10(), 0.5f64.log10()]), 0.75f64.log10());
        assert_relative_eq!(log_add(0.25f64.ln(), 0.5f64.ln()), 0.75f64.ln());

        let population = vec![Item::from_rvds("x", "NI-NG")];
        let rvd = AlignmentPValues::new(&population, &RvdCosts::default()).unwrap();
        assert_eq!(rvd.symbol_costs("NI").unwrap().len(), 2);
    }
}
