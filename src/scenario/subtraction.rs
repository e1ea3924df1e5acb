//! Subtracting control counts before testing
//!
//! Each ChIP library has a matched control. The same simulated data are
//! tested twice: once on the ChIP counts and once on ChIP minus control,
//! clamped at zero. Subtraction adds the control noise back without its mean
//! and so distorts the mean-variance relationship of the test.

use std::fmt;

use serde::Serialize;

use super::{fmt_summary, run_repetitions, summarise, CalibrationTable, RepetitionFailure};
use crate::data::Design;
use crate::error::Result;
use crate::evaluate::{calibration_curve, rejection_rate, split_by_truth, CalibrationCurve, RepSummary};
use crate::rng::SimRng;
use crate::simulate::{simulate_with_controls, DispersionFn, EffectLayout, SimulationParams};
use crate::stats::mean;
use crate::testing::{Contrast, DifferentialTest};

/// Parameters of the subtraction study
#[derive(Debug, Clone, Serialize)]
pub struct SubtractionParams {
    pub libs_per_group: usize,
    pub n_sites: usize,
    pub chip_mean: f64,
    pub control_mean: f64,
    pub dispersion: f64,
    pub prop_nonnull: f64,
    pub fold_change: f64,
    /// Level for the rejection rates
    pub alpha: f64,
}

impl Default for SubtractionParams {
    fn default() -> Self {
        Self {
            libs_per_group: 2,
            n_sites: 10_000,
            chip_mean: 50.0,
            control_mean: 20.0,
            dispersion: 0.1,
            prop_nonnull: 0.1,
            fold_change: 2.0,
            alpha: 0.05,
        }
    }
}

/// One repetition of the subtraction study
#[derive(Debug, Clone, Serialize)]
pub struct SubtractionRepetition {
    pub repetition: usize,
    pub mean_null_p_chip: f64,
    pub mean_null_p_subtracted: f64,
    /// Fraction of null sites with a larger p-value after subtraction
    pub null_p_increased: f64,
    pub null_rejection_chip: f64,
    pub null_rejection_subtracted: f64,
    pub power_chip: Option<f64>,
    pub power_subtracted: Option<f64>,
    pub dispersion_chip: f64,
    pub dispersion_subtracted: f64,
    #[serde(skip)]
    pub calibration_chip: CalibrationCurve,
    #[serde(skip)]
    pub calibration_subtracted: CalibrationCurve,
}

/// Aggregated subtraction study
#[derive(Debug, Clone, Serialize)]
pub struct SubtractionReport {
    pub params: SubtractionParams,
    pub test: String,
    pub repetitions: usize,
    pub n_failed: usize,
    pub failures: Vec<RepetitionFailure>,
    pub mean_null_p_chip: Option<RepSummary>,
    pub mean_null_p_subtracted: Option<RepSummary>,
    pub null_p_increased: Option<RepSummary>,
    pub null_rejection_chip: Option<RepSummary>,
    pub null_rejection_subtracted: Option<RepSummary>,
    pub power_chip: Option<RepSummary>,
    pub power_subtracted: Option<RepSummary>,
    pub dispersion_chip: Option<RepSummary>,
    pub dispersion_subtracted: Option<RepSummary>,
    pub calibration: CalibrationTable,
    pub records: Vec<SubtractionRepetition>,
}

/// Run the subtraction study
pub fn run(
    params: &SubtractionParams,
    reps: usize,
    seed: u64,
    test: &dyn DifferentialTest,
) -> Result<SubtractionReport> {
    let design = Design::balanced(&["control", "treated"], params.libs_per_group)?;
    let contrast = Contrast::last_level(&design)?;
    let sim_params = SimulationParams::from_layout(
        &design,
        params.n_sites,
        params.prop_nonnull,
        params.chip_mean,
        params.fold_change,
        EffectLayout::Elevated,
        DispersionFn::constant(params.dispersion),
    );

    let survivors = run_repetitions("subtract", reps, seed, |repetition, rng: &mut SimRng| {
        let sim = simulate_with_controls(&design, &sim_params, params.control_mean, rng)?;
        let subtracted = sim.chip.subtract_clamped(&sim.control)?;

        let chip = test.test(&sim.chip, &design, &contrast)?;
        let sub = test.test(&subtracted, &design, &contrast)?;

        let rows: Vec<usize> = (0..params.n_sites).collect();
        let chip_split = split_by_truth(&rows, &chip.pvalues, &sim.truth)?;
        let sub_split = split_by_truth(&rows, &sub.pvalues, &sim.truth)?;

        let increased = chip_split
            .null
            .iter()
            .zip(&sub_split.null)
            .filter(|(c, s)| s > c)
            .count();
        let n_null = chip_split.null.len().max(1);
        let power = |p: &[f64]| -> Result<Option<f64>> {
            if p.is_empty() {
                Ok(None)
            } else {
                rejection_rate(p, params.alpha).map(Some)
            }
        };

        Ok(SubtractionRepetition {
            repetition,
            mean_null_p_chip: mean(&chip_split.null),
            mean_null_p_subtracted: mean(&sub_split.null),
            null_p_increased: increased as f64 / n_null as f64,
            null_rejection_chip: rejection_rate(&chip_split.null, params.alpha)?,
            null_rejection_subtracted: rejection_rate(&sub_split.null, params.alpha)?,
            power_chip: power(&chip_split.nonnull)?,
            power_subtracted: power(&sub_split.nonnull)?,
            dispersion_chip: chip.common_dispersion,
            dispersion_subtracted: sub.common_dispersion,
            calibration_chip: calibration_curve(&chip_split.null)?,
            calibration_subtracted: calibration_curve(&sub_split.null)?,
        })
    })?;

    let records = survivors.records;
    let mut calibration = CalibrationTable::default();
    calibration.add_series("chip", records.iter().map(|r| &r.calibration_chip))?;
    calibration.add_series("subtracted", records.iter().map(|r| &r.calibration_subtracted))?;

    Ok(SubtractionReport {
        params: params.clone(),
        test: test.name().to_string(),
        repetitions: reps,
        n_failed: survivors.failures.len(),
        failures: survivors.failures,
        mean_null_p_chip: summarise(&records, |r| Some(r.mean_null_p_chip)),
        mean_null_p_subtracted: summarise(&records, |r| Some(r.mean_null_p_subtracted)),
        null_p_increased: summarise(&records, |r| Some(r.null_p_increased)),
        null_rejection_chip: summarise(&records, |r| Some(r.null_rejection_chip)),
        null_rejection_subtracted: summarise(&records, |r| Some(r.null_rejection_subtracted)),
        power_chip: summarise(&records, |r| r.power_chip),
        power_subtracted: summarise(&records, |r| r.power_subtracted),
        dispersion_chip: summarise(&records, |r| Some(r.dispersion_chip)),
        dispersion_subtracted: summarise(&records, |r| Some(r.dispersion_subtracted)),
        calibration,
        records,
    })
}

impl fmt::Display for SubtractionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Control subtraction study ({} test)", self.test)?;
        writeln!(f, "==================================")?;
        writeln!(
            f,
            "Sites: {}, ChIP mean: {}, control mean: {}",
            self.params.n_sites, self.params.chip_mean, self.params.control_mean
        )?;
        writeln!(f, "Repetitions: {} ({} failed)", self.repetitions, self.n_failed)?;
        writeln!(f, "Mean null p-value")?;
        writeln!(f, "  ChIP only:  {}", fmt_summary(&self.mean_null_p_chip))?;
        writeln!(f, "  subtracted: {}", fmt_summary(&self.mean_null_p_subtracted))?;
        writeln!(f, "Null p-values increased: {}", fmt_summary(&self.null_p_increased))?;
        writeln!(f, "Null rejection at {}", self.params.alpha)?;
        writeln!(f, "  ChIP only:  {}", fmt_summary(&self.null_rejection_chip))?;
        writeln!(f, "  subtracted: {}", fmt_summary(&self.null_rejection_subtracted))?;
        writeln!(f, "Power at {}", self.params.alpha)?;
        writeln!(f, "  ChIP only:  {}", fmt_summary(&self.power_chip))?;
        writeln!(f, "  subtracted: {}", fmt_summary(&self.power_subtracted))?;
        writeln!(f, "Common dispersion")?;
        writeln!(f, "  ChIP only:  {}", fmt_summary(&self.dispersion_chip))?;
        writeln!(f, "  subtracted: {}", fmt_summary(&self.dispersion_subtracted))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::QlfTest;

    #[test]
    fn test_subtraction_is_conservative() {
        let params = SubtractionParams {
            n_sites: 3000,
            ..Default::default()
        };
        let report = run(&params, 2, 17, &QlfTest::default()).unwrap();
        assert_eq!(report.n_failed, 0);
        for r in &report.records {
            assert!(
                r.mean_null_p_subtracted > r.mean_null_p_chip,
                "subtracted {} vs chip {}",
                r.mean_null_p_subtracted,
                r.mean_null_p_chip
            );
            assert!(r.null_p_increased > 0.5, "increased {}", r.null_p_increased);
            assert!(r.dispersion_subtracted > r.dispersion_chip);
        }
        assert!(report.calibration.max_ratio("subtracted").is_some());
    }
}
