//! Threshold summaries and truth-aware bookkeeping

use std::fmt;

use serde::Serialize;

use crate::data::GroundTruth;
use crate::error::{Result, SimError};
use crate::stats::{mean, median};

/// Fraction of p-values at or below `threshold`
///
/// Used for the type-I error on null p-values and for power on non-null ones.
pub fn rejection_rate(pvalues: &[f64], threshold: f64) -> Result<f64> {
    if pvalues.is_empty() {
        return Err(SimError::degenerate("no p-values to summarise"));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(SimError::invalid(format!(
            "rejection threshold must be in [0, 1], got {}",
            threshold
        )));
    }
    if pvalues.iter().any(|p| p.is_nan()) {
        return Err(SimError::invalid("rejection rate input contains NaN p-values"));
    }
    let rejected = pvalues.iter().filter(|&&p| p <= threshold).count();
    Ok(rejected as f64 / pvalues.len() as f64)
}

/// Spread of one quantity across repetitions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RepSummary {
    pub n: usize,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    pub mean: f64,
}

impl RepSummary {
    /// Summarise the finite entries of `values`; `None` if there are none
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let n = finite.len();
        Some(Self {
            n,
            min: finite.iter().copied().fold(f64::INFINITY, f64::min),
            median: median(&finite),
            max: finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: mean(&finite),
        })
    }
}

impl fmt::Display for RepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean {:.4} (median {:.4}, range {:.4}-{:.4}, n={})",
            self.mean, self.median, self.min, self.max, self.n
        )
    }
}

/// Fraction of retained rows that are non-null
pub fn nonnull_fraction(retained: &[usize], truth: &GroundTruth) -> Result<f64> {
    if retained.is_empty() {
        return Err(SimError::degenerate("no retained sites"));
    }
    check_rows(retained, truth)?;
    let hits = retained.iter().filter(|&&i| truth.is_nonnull(i)).count();
    Ok(hits as f64 / retained.len() as f64)
}

/// P-values of retained rows, split by their true status
#[derive(Debug, Clone, Default)]
pub struct TruthSplit {
    pub null: Vec<f64>,
    pub nonnull: Vec<f64>,
}

/// Map p-values of retained rows back to the null and non-null sets
///
/// `pvalues[j]` belongs to input row `rows[j]`.
pub fn split_by_truth(rows: &[usize], pvalues: &[f64], truth: &GroundTruth) -> Result<TruthSplit> {
    if rows.len() != pvalues.len() {
        return Err(SimError::DimensionMismatch {
            expected: format!("{} p-values (one per retained row)", rows.len()),
            got: format!("{}", pvalues.len()),
        });
    }
    check_rows(rows, truth)?;

    let mut split = TruthSplit::default();
    for (&row, &p) in rows.iter().zip(pvalues) {
        if truth.is_nonnull(row) {
            split.nonnull.push(p);
        } else {
            split.null.push(p);
        }
    }
    Ok(split)
}

/// Realised false discovery proportion of a set of selected rows; zero when
/// nothing is selected
pub fn false_discovery_proportion(selected: &[usize], truth: &GroundTruth) -> f64 {
    if selected.is_empty() {
        return 0.0;
    }
    let false_hits = selected
        .iter()
        .filter(|&&i| i < truth.n_sites() && !truth.is_nonnull(i))
        .count();
    false_hits as f64 / selected.len() as f64
}

fn check_rows(rows: &[usize], truth: &GroundTruth) -> Result<()> {
    match rows.iter().find(|&&i| i >= truth.n_sites()) {
        Some(i) => Err(SimError::invalid(format!(
            "row {} out of range for {} sites",
            i,
            truth.n_sites()
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_rate() {
        let p = [0.001, 0.04, 0.05, 0.2, 0.9];
        assert!((rejection_rate(&p, 0.05).unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(rejection_rate(&p, 0.0).unwrap(), 0.0);
        assert!(matches!(rejection_rate(&[], 0.05), Err(SimError::DegenerateInput { .. })));
        assert!(matches!(
            rejection_rate(&[0.1, f64::NAN], 0.05),
            Err(SimError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_rep_summary() {
        let s = RepSummary::from_values(&[0.04, 0.06, f64::NAN, 0.05]).unwrap();
        assert_eq!(s.n, 3);
        assert_eq!(s.min, 0.04);
        assert_eq!(s.max, 0.06);
        assert!((s.median - 0.05).abs() < 1e-12);
        assert!((s.mean - 0.05).abs() < 1e-12);
        assert!(RepSummary::from_values(&[f64::NAN]).is_none());
        assert!(s.to_string().starts_with("mean 0.0500"));
    }

    #[test]
    fn test_nonnull_fraction() {
        let truth = GroundTruth::leading(10, 2);
        assert!((nonnull_fraction(&[0, 5, 6, 7], &truth).unwrap() - 0.25).abs() < 1e-12);
        assert!(nonnull_fraction(&[], &truth).is_err());
        assert!(nonnull_fraction(&[10], &truth).is_err());
    }

    #[test]
    fn test_split_by_truth() {
        let truth = GroundTruth::from_nonnull(6, &[1, 4]).unwrap();
        let split = split_by_truth(&[1, 2, 4, 5], &[0.01, 0.3, 0.02, 0.7], &truth).unwrap();
        assert_eq!(split.nonnull, vec![0.01, 0.02]);
        assert_eq!(split.null, vec![0.3, 0.7]);
        assert!(matches!(
            split_by_truth(&[1, 2], &[0.1], &truth),
            Err(SimError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_false_discovery_proportion() {
        let truth = GroundTruth::leading(10, 4);
        assert_eq!(false_discovery_proportion(&[], &truth), 0.0);
        assert!((false_discovery_proportion(&[0, 1, 8, 9], &truth) - 0.5).abs() < 1e-12);
    }
}
