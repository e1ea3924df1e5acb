//! Directional empirical FDR against Benjamini-Hochberg
//!
//! Sites whose estimated effect points the wrong way are used as stand-ins
//! for false discoveries. When the control libraries are more dispersed than
//! the treated ones, null sites reach significance more often through a low
//! control count than a high one. Wrong-direction rejections then undercount
//! the false discoveries, so the realised FDP exceeds the target while
//! Benjamini-Hochberg stays in control.

use std::fmt;

use serde::Serialize;

use super::{fmt_summary, run_repetitions, summarise, CalibrationTable, RepetitionFailure};
use crate::data::Design;
use crate::error::{Result, SimError};
use crate::evaluate::{calibration_curve, false_discovery_proportion, CalibrationCurve, RepSummary};
use crate::rng::SimRng;
use crate::simulate::{simulate_counts, DispersionFn, EffectLayout, SimulationParams};
use crate::testing::{benjamini_hochberg, directional_fdr, Contrast, DifferentialTest};

/// Parameters of the FDR study
#[derive(Debug, Clone, Serialize)]
pub struct FdrParams {
    pub control_libs: usize,
    pub treated_libs: usize,
    pub n_sites: usize,
    pub baseline_mean: f64,
    pub dispersion: f64,
    /// Multiplies `dispersion` in the control libraries
    pub control_dispersion_scale: f64,
    /// Multiplies `dispersion` in the treated libraries
    pub treated_dispersion_scale: f64,
    pub prop_nonnull: f64,
    /// Non-null sites are up by this factor in the treated group
    pub fold_change: f64,
    /// Target FDR for both procedures
    pub alpha: f64,
}

impl Default for FdrParams {
    fn default() -> Self {
        Self {
            control_libs: 3,
            treated_libs: 3,
            n_sites: 10_000,
            baseline_mean: 50.0,
            dispersion: 0.05,
            control_dispersion_scale: 4.0,
            treated_dispersion_scale: 1.0,
            prop_nonnull: 0.1,
            fold_change: 3.0,
            alpha: 0.05,
        }
    }
}

/// One repetition of the FDR study
#[derive(Debug, Clone, Serialize)]
pub struct FdrRepetition {
    pub repetition: usize,
    pub directional_discoveries: usize,
    pub directional_fdp: f64,
    pub bh_discoveries: usize,
    pub bh_fdp: f64,
    pub common_dispersion: f64,
    #[serde(skip)]
    pub calibration: CalibrationCurve,
}

/// Aggregated FDR study
#[derive(Debug, Clone, Serialize)]
pub struct FdrReport {
    pub params: FdrParams,
    pub test: String,
    pub repetitions: usize,
    pub n_failed: usize,
    pub failures: Vec<RepetitionFailure>,
    pub directional_discoveries: Option<RepSummary>,
    pub directional_fdp: Option<RepSummary>,
    pub bh_discoveries: Option<RepSummary>,
    pub bh_fdp: Option<RepSummary>,
    pub common_dispersion: Option<RepSummary>,
    pub calibration: CalibrationTable,
    pub records: Vec<FdrRepetition>,
}

/// Run the FDR study
pub fn run(params: &FdrParams, reps: usize, seed: u64, test: &dyn DifferentialTest) -> Result<FdrReport> {
    if !(params.alpha > 0.0 && params.alpha < 1.0) {
        return Err(SimError::invalid(format!(
            "alpha must be in (0, 1), got {}",
            params.alpha
        )));
    }
    for (name, scale) in [
        ("control", params.control_dispersion_scale),
        ("treated", params.treated_dispersion_scale),
    ] {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(SimError::invalid(format!(
                "{} dispersion scale must be finite and > 0, got {}",
                name, scale
            )));
        }
    }
    let design = Design::unbalanced(&[
        ("control", params.control_libs),
        ("treated", params.treated_libs),
    ])?;
    let contrast = Contrast::last_level(&design)?;
    let sim_params = SimulationParams::from_layout(
        &design,
        params.n_sites,
        params.prop_nonnull,
        params.baseline_mean,
        params.fold_change,
        EffectLayout::Elevated,
        DispersionFn::constant(params.dispersion),
    )
    .with_dispersion_scale(
        design
            .group_codes()
            .into_iter()
            .map(|code| {
                if code == 0 {
                    params.control_dispersion_scale
                } else {
                    params.treated_dispersion_scale
                }
            })
            .collect(),
    );

    let survivors = run_repetitions("fdr", reps, seed, |repetition, rng: &mut SimRng| {
        let sim = simulate_counts(&design, &sim_params, rng)?;
        let outcome = test.test(&sim.counts, &design, &contrast)?;
        let signs = outcome.signs();

        let fdr = directional_fdr(&outcome.pvalues, &signs)?;
        let directional: Vec<usize> = (0..fdr.len())
            .filter(|&i| signs[i] > 0.0 && fdr[i] <= params.alpha)
            .collect();

        let padj = benjamini_hochberg(&outcome.pvalues);
        let bh: Vec<usize> = (0..padj.len()).filter(|&i| padj[i] <= params.alpha).collect();

        let null: Vec<f64> = sim.truth.null_sites().iter().map(|&i| outcome.pvalues[i]).collect();
        log::debug!(
            "fdr repetition {}: {} directional and {} BH discoveries",
            repetition,
            directional.len(),
            bh.len()
        );

        Ok(FdrRepetition {
            repetition,
            directional_discoveries: directional.len(),
            directional_fdp: false_discovery_proportion(&directional, &sim.truth),
            bh_discoveries: bh.len(),
            bh_fdp: false_discovery_proportion(&bh, &sim.truth),
            common_dispersion: outcome.common_dispersion,
            calibration: calibration_curve(&null)?,
        })
    })?;

    let records = survivors.records;
    let mut calibration = CalibrationTable::default();
    calibration.add_series("null", records.iter().map(|r| &r.calibration))?;

    Ok(FdrReport {
        params: params.clone(),
        test: test.name().to_string(),
        repetitions: reps,
        n_failed: survivors.failures.len(),
        failures: survivors.failures,
        directional_discoveries: summarise(&records, |r| Some(r.directional_discoveries as f64)),
        directional_fdp: summarise(&records, |r| Some(r.directional_fdp)),
        bh_discoveries: summarise(&records, |r| Some(r.bh_discoveries as f64)),
        bh_fdp: summarise(&records, |r| Some(r.bh_fdp)),
        common_dispersion: summarise(&records, |r| Some(r.common_dispersion)),
        calibration,
        records,
    })
}

impl fmt::Display for FdrReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Empirical FDR study ({} test)", self.test)?;
        writeln!(f, "============================")?;
        writeln!(
            f,
            "Sites: {}, control: {}, treated: {}, alpha: {}",
            self.params.n_sites, self.params.control_libs, self.params.treated_libs, self.params.alpha
        )?;
        writeln!(
            f,
            "Dispersion: {} (x{} control, x{} treated)",
            self.params.dispersion,
            self.params.control_dispersion_scale,
            self.params.treated_dispersion_scale
        )?;
        writeln!(f, "Repetitions: {} ({} failed)", self.repetitions, self.n_failed)?;
        writeln!(f, "Directional discoveries: {}", fmt_summary(&self.directional_discoveries))?;
        writeln!(f, "  realised FDP: {}", fmt_summary(&self.directional_fdp))?;
        writeln!(f, "BH discoveries: {}", fmt_summary(&self.bh_discoveries))?;
        writeln!(f, "  realised FDP: {}", fmt_summary(&self.bh_fdp))?;
        writeln!(f, "Common dispersion: {}", fmt_summary(&self.common_dispersion))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::QlfTest;

    #[test]
    fn test_directional_fdr_is_anticonservative() {
        let params = FdrParams {
            n_sites: 4000,
            ..Default::default()
        };
        let report = run(&params, 2, 21, &QlfTest::default()).unwrap();
        assert_eq!(report.n_failed, 0);

        let bh = report.bh_discoveries.unwrap();
        assert!(bh.mean > 100.0, "BH discoveries {}", bh.mean);
        let bh_fdp = report.bh_fdp.unwrap().mean;
        assert!(bh_fdp <= params.alpha, "BH FDP {}", bh_fdp);

        let directional = report.directional_discoveries.unwrap();
        assert!(directional.mean > bh.mean);
        let directional_fdp = report.directional_fdp.unwrap().mean;
        assert!(directional_fdp > params.alpha, "directional FDP {}", directional_fdp);
        assert!(directional_fdp > bh_fdp);
        assert!(report.to_string().contains("x4 control"));
    }

    #[test]
    fn test_rejects_bad_dispersion_scale() {
        let params = FdrParams {
            n_sites: 100,
            treated_dispersion_scale: 0.0,
            ..Default::default()
        };
        let err = run(&params, 1, 1, &QlfTest::default()).unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { .. }));
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let params = FdrParams {
            alpha: 1.5,
            ..Default::default()
        };
        assert!(run(&params, 1, 1, &QlfTest::default()).is_err());
    }
}
