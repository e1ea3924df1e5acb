//! Ad hoc peak-selection filters and type-I error control
//!
//! Sites are filtered on a score that looks at the group split (the second
//! highest or the largest count) and the survivors are tested. Under a pure
//! null the retained p-values are no longer uniform.

use std::fmt;

use serde::Serialize;

use super::{
    fmt_summary, rates_at, run_repetitions, summarise, summarise_rates, CalibrationTable,
    RepetitionFailure, ThresholdRate, ThresholdSummary, REPORT_THRESHOLDS,
};
use crate::data::Design;
use crate::error::{Result, SimError};
use crate::evaluate::{calibration_curve, nonnull_fraction, split_by_truth, CalibrationCurve, RepSummary};
use crate::filter::{retain_top, FilterStrategy};
use crate::rng::SimRng;
use crate::simulate::{simulate_counts, DispersionFn, EffectLayout, SimulationParams};
use crate::testing::{Contrast, DifferentialTest};

/// Parameters of the filter study
#[derive(Debug, Clone, Serialize)]
pub struct FilterParams {
    pub libs_per_group: usize,
    pub n_sites: usize,
    pub baseline_mean: f64,
    pub dispersion: f64,
    pub prop_nonnull: f64,
    pub fold_change: f64,
    pub layout: EffectLayout,
    pub strategy: FilterStrategy,
    /// Fraction of sites kept by the filter
    pub retain_fraction: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            libs_per_group: 2,
            n_sites: 20_000,
            baseline_mean: 10.0,
            dispersion: 0.1,
            prop_nonnull: 0.0,
            fold_change: 2.0,
            layout: EffectLayout::Balanced,
            strategy: FilterStrategy::SecondHighest,
            retain_fraction: 0.1,
        }
    }
}

impl FilterParams {
    /// Number of sites the filter keeps, at least one
    pub fn retain_count(&self) -> usize {
        ((self.n_sites as f64 * self.retain_fraction).round() as usize).max(1)
    }

    fn validate(&self) -> Result<()> {
        if !(self.retain_fraction > 0.0 && self.retain_fraction <= 1.0) {
            return Err(SimError::invalid(format!(
                "retain_fraction must be in (0, 1], got {}",
                self.retain_fraction
            )));
        }
        if !(self.dispersion.is_finite() && self.dispersion > 0.0) {
            return Err(SimError::invalid(format!(
                "dispersion must be finite and > 0, got {}",
                self.dispersion
            )));
        }
        Ok(())
    }
}

/// One repetition of the filter study
#[derive(Debug, Clone, Serialize)]
pub struct FilterRepetition {
    pub repetition: usize,
    pub retained: usize,
    pub nonnull_fraction: f64,
    pub common_dispersion: f64,
    pub null_rejection: Vec<ThresholdRate>,
    /// Empty when no non-null site was retained
    pub power: Vec<ThresholdRate>,
    pub max_calibration_ratio: Option<f64>,
    #[serde(skip)]
    pub calibration: CalibrationCurve,
}

/// Aggregated filter study
#[derive(Debug, Clone, Serialize)]
pub struct FilterReport {
    pub params: FilterParams,
    pub test: String,
    pub repetitions: usize,
    pub n_failed: usize,
    pub failures: Vec<RepetitionFailure>,
    pub null_rejection: Vec<ThresholdSummary>,
    pub power: Vec<ThresholdSummary>,
    pub nonnull_fraction: Option<RepSummary>,
    pub common_dispersion: Option<RepSummary>,
    pub max_calibration_ratio: Option<RepSummary>,
    pub calibration: CalibrationTable,
    pub records: Vec<FilterRepetition>,
}

/// Run the filter study
pub fn run(
    params: &FilterParams,
    reps: usize,
    seed: u64,
    test: &dyn DifferentialTest,
) -> Result<FilterReport> {
    params.validate()?;
    let design = Design::balanced(&["control", "treated"], params.libs_per_group)?;
    let contrast = Contrast::last_level(&design)?;
    let sim_params = SimulationParams::from_layout(
        &design,
        params.n_sites,
        params.prop_nonnull,
        params.baseline_mean,
        params.fold_change,
        params.layout,
        DispersionFn::constant(params.dispersion),
    );
    let k = params.retain_count();

    let survivors = run_repetitions("filter", reps, seed, |repetition, rng: &mut SimRng| {
        let sim = simulate_counts(&design, &sim_params, rng)?;
        let retained = retain_top(&sim.counts, params.strategy, k, rng)?;
        let filtered = sim.counts.subset_rows(retained.rows())?;
        let outcome = test.test(&filtered, &design, &contrast)?;
        let split = split_by_truth(retained.rows(), &outcome.pvalues, &sim.truth)?;

        let calibration = calibration_curve(&split.null)?;
        let power = if split.nonnull.is_empty() {
            Vec::new()
        } else {
            rates_at(&split.nonnull, &REPORT_THRESHOLDS)?
        };
        Ok(FilterRepetition {
            repetition,
            retained: retained.len(),
            nonnull_fraction: nonnull_fraction(retained.rows(), &sim.truth)?,
            common_dispersion: outcome.common_dispersion,
            null_rejection: rates_at(&split.null, &REPORT_THRESHOLDS)?,
            power,
            max_calibration_ratio: calibration.max_ratio(),
            calibration,
        })
    })?;

    let records = survivors.records;
    let mut calibration = CalibrationTable::default();
    calibration.add_series(
        &params.strategy.to_string(),
        records.iter().map(|r| &r.calibration),
    )?;

    Ok(FilterReport {
        params: params.clone(),
        test: test.name().to_string(),
        repetitions: reps,
        n_failed: survivors.failures.len(),
        failures: survivors.failures,
        null_rejection: summarise_rates(
            records.iter().map(|r| r.null_rejection.as_slice()),
            &REPORT_THRESHOLDS,
        ),
        power: summarise_rates(records.iter().map(|r| r.power.as_slice()), &REPORT_THRESHOLDS),
        nonnull_fraction: summarise(&records, |r| Some(r.nonnull_fraction)),
        common_dispersion: summarise(&records, |r| Some(r.common_dispersion)),
        max_calibration_ratio: summarise(&records, |r| r.max_calibration_ratio),
        calibration,
        records,
    })
}

impl fmt::Display for FilterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Filter study ({} filter, {} test)", self.params.strategy, self.test)?;
        writeln!(f, "==================================")?;
        writeln!(
            f,
            "Sites: {}, retained: {}, libraries per group: {}",
            self.params.n_sites,
            self.params.retain_count(),
            self.params.libs_per_group
        )?;
        writeln!(
            f,
            "Repetitions: {} ({} failed)",
            self.repetitions, self.n_failed
        )?;
        for t in &self.null_rejection {
            writeln!(f, "Null rejection at {}: {}", t.threshold, t.summary)?;
        }
        for t in &self.power {
            writeln!(f, "Power at {}: {}", t.threshold, t.summary)?;
        }
        writeln!(f, "Non-null fraction retained: {}", fmt_summary(&self.nonnull_fraction))?;
        writeln!(f, "Common dispersion: {}", fmt_summary(&self.common_dispersion))?;
        writeln!(
            f,
            "Max calibration ratio: {}",
            fmt_summary(&self.max_calibration_ratio)
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::QlfTest;

    fn small(strategy: FilterStrategy) -> FilterParams {
        FilterParams {
            n_sites: 5000,
            strategy,
            ..Default::default()
        }
    }

    #[test]
    fn test_mean_filter_keeps_error_control() {
        let report = run(&small(FilterStrategy::Mean), 2, 11, &QlfTest::default()).unwrap();
        assert_eq!(report.n_failed, 0);
        assert_eq!(report.records.len(), 2);
        assert!(report.records.iter().all(|r| r.retained == 500));
        let at_05 = report.null_rejection[1];
        assert_eq!(at_05.threshold, 0.05);
        assert!(
            at_05.summary.mean > 0.01 && at_05.summary.mean < 0.09,
            "null rejection {}",
            at_05.summary.mean
        );
        assert!(report.power.is_empty());
        assert!(!report.calibration.is_empty());
    }

    #[test]
    fn test_enrichment_reported() {
        let params = FilterParams {
            prop_nonnull: 0.1,
            layout: EffectLayout::Elevated,
            ..small(FilterStrategy::SecondHighest)
        };
        let report = run(&params, 2, 5, &QlfTest::default()).unwrap();
        let enrichment = report.nonnull_fraction.unwrap();
        assert!(enrichment.mean > 0.15, "non-null fraction {}", enrichment.mean);
        assert_eq!(report.power.len(), 2);
        assert!(report.to_string().contains("Power at 0.05"));
    }

    #[test]
    fn test_invalid_params() {
        let params = FilterParams {
            retain_fraction: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            run(&params, 1, 1, &QlfTest::default()),
            Err(SimError::InvalidParameter { .. })
        ));
    }
}
