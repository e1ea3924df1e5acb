//! The four simulation studies and the pieces they share
//!
//! - `filter`: ad hoc peak-selection filters and type-I error
//! - `fdr`: the directional empirical FDR against Benjamini-Hochberg
//! - `subtraction`: subtracting control counts before testing
//! - `normalization`: TMM at low counts with a spiked composition bias
//!
//! Each study has a `*Params` struct with defaults, a `run` entry point, a
//! per-repetition record and a serializable report.

pub mod fdr;
pub mod filter;
mod harness;
pub mod normalization;
pub mod subtraction;

use serde::Serialize;

use crate::evaluate::{log_spaced_levels, rejection_rate, CalibrationCurve, RepSummary};
use crate::error::Result;

pub use fdr::{FdrParams, FdrReport};
pub use filter::{FilterParams, FilterReport};
pub use harness::{run_repetitions, RepetitionFailure, RepetitionOutcome, Survivors};
pub use normalization::{NormalizationParams, NormalizationReport};
pub use subtraction::{SubtractionParams, SubtractionReport};

/// Nominal levels at which rejection rates are reported
pub const REPORT_THRESHOLDS: [f64; 2] = [0.01, 0.05];

/// Range and resolution of the grid the calibration tables are evaluated on
const CALIBRATION_GRID: (f64, f64, usize) = (1e-3, 0.5, 25);

/// Rejection rate at one nominal level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdRate {
    pub threshold: f64,
    pub rate: f64,
}

/// Rejection rates of `pvalues` at each threshold
pub fn rates_at(pvalues: &[f64], thresholds: &[f64]) -> Result<Vec<ThresholdRate>> {
    thresholds
        .iter()
        .map(|&threshold| {
            Ok(ThresholdRate {
                threshold,
                rate: rejection_rate(pvalues, threshold)?,
            })
        })
        .collect()
}

/// Rejection rate at one level, summarised across repetitions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdSummary {
    pub threshold: f64,
    pub summary: RepSummary,
}

/// Summarise per-repetition rates threshold by threshold
///
/// Repetitions without rates at a threshold are ignored for that threshold.
pub fn summarise_rates<'a, I>(per_repetition: I, thresholds: &[f64]) -> Vec<ThresholdSummary>
where
    I: IntoIterator<Item = &'a [ThresholdRate]>,
{
    let per_repetition: Vec<&[ThresholdRate]> = per_repetition.into_iter().collect();
    thresholds
        .iter()
        .filter_map(|&threshold| {
            let values: Vec<f64> = per_repetition
                .iter()
                .filter_map(|rates| rates.iter().find(|r| r.threshold == threshold))
                .map(|r| r.rate)
                .collect();
            RepSummary::from_values(&values).map(|summary| ThresholdSummary { threshold, summary })
        })
        .collect()
}

/// One row of a calibration table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationRow {
    pub series: String,
    pub level: f64,
    /// Mean observed/expected ratio over the repetitions covering `level`
    pub mean_ratio: Option<f64>,
    pub repetitions: usize,
}

/// Mean calibration ratios on a log-spaced grid, one series per curve set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalibrationTable {
    pub rows: Vec<CalibrationRow>,
}

impl CalibrationTable {
    /// Add a series averaged over one curve per repetition
    pub fn add_series<'a, I>(&mut self, series: &str, curves: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a CalibrationCurve>,
    {
        let curves: Vec<&CalibrationCurve> = curves.into_iter().collect();
        let (lo, hi, n) = CALIBRATION_GRID;
        for level in log_spaced_levels(lo, hi, n)? {
            let ratios: Vec<f64> = curves.iter().filter_map(|c| c.ratio_at(level)).collect();
            let mean_ratio = if ratios.is_empty() {
                None
            } else {
                Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
            };
            self.rows.push(CalibrationRow {
                series: series.to_string(),
                level,
                mean_ratio,
                repetitions: ratios.len(),
            });
        }
        Ok(())
    }

    /// Append the rows of another table
    pub fn extend(&mut self, other: CalibrationTable) {
        self.rows.extend(other.rows);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Largest mean ratio of a series
    pub fn max_ratio(&self, series: &str) -> Option<f64> {
        self.rows
            .iter()
            .filter(|r| r.series == series)
            .filter_map(|r| r.mean_ratio)
            .reduce(f64::max)
    }
}

/// `Some(summary)` line for reports, or a placeholder
pub(crate) fn fmt_summary(summary: &Option<RepSummary>) -> String {
    match summary {
        Some(s) => s.to_string(),
        None => "n/a".to_string(),
    }
}

/// Summary of one field across the completed repetitions
pub(crate) fn summarise<T>(records: &[T], field: impl Fn(&T) -> Option<f64>) -> Option<RepSummary> {
    let values: Vec<f64> = records.iter().filter_map(field).collect();
    RepSummary::from_values(&values)
}
