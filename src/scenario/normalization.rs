//! TMM normalization at low counts
//!
//! A random tenth of the sites is spiked in the treated libraries, which
//! inflates their library sizes without changing the background. The ideal
//! factors are the ones that equalise the background; TMM recovers them at
//! high counts but drifts at low counts, where log-ratios are coarse and the
//! zero-count pairs are dropped.

use std::fmt;

use ndarray::Axis;
use serde::Serialize;

use super::{
    fmt_summary, rates_at, run_repetitions, summarise, summarise_rates, CalibrationTable,
    RepetitionFailure, ThresholdRate, ThresholdSummary, REPORT_THRESHOLDS,
};
use crate::data::{CountMatrix, Design, GroundTruth};
use crate::error::{Result, SimError};
use crate::evaluate::{calibration_curve, split_by_truth, CalibrationCurve, RepSummary};
use crate::normalization::{normalization_factors, NormalizationMethod};
use crate::rng::SimRng;
use crate::simulate::{simulate_spiked, DispersionFn, SpikeParams};
use crate::testing::{Contrast, DifferentialTest};

/// Parameters of the normalization study
#[derive(Debug, Clone, Serialize)]
pub struct NormalizationParams {
    pub libs_per_group: usize,
    pub n_sites: usize,
    pub background_mean: f64,
    pub prop_spiked: f64,
    pub spike_fold: f64,
    pub dispersion: f64,
}

impl Default for NormalizationParams {
    fn default() -> Self {
        Self {
            libs_per_group: 2,
            n_sites: 20_000,
            background_mean: 2.0,
            prop_spiked: 0.1,
            spike_fold: 4.0,
            dispersion: 0.05,
        }
    }
}

/// One repetition of the normalization study
#[derive(Debug, Clone, Serialize)]
pub struct NormalizationRepetition {
    pub repetition: usize,
    pub tmm_factors: Vec<f64>,
    pub ideal_factors: Vec<f64>,
    /// `log2(tmm / ideal)` per library
    pub log2_error: Vec<f64>,
    pub max_abs_log2_error: f64,
    pub null_rejection: Vec<ThresholdRate>,
    pub power: Vec<ThresholdRate>,
    pub common_dispersion: f64,
    #[serde(skip)]
    pub calibration: CalibrationCurve,
}

/// Aggregated normalization study at one background level
#[derive(Debug, Clone, Serialize)]
pub struct NormalizationReport {
    pub params: NormalizationParams,
    pub test: String,
    pub repetitions: usize,
    pub n_failed: usize,
    pub failures: Vec<RepetitionFailure>,
    /// Per-library `log2(tmm / ideal)` across repetitions
    pub log2_error: Vec<Option<RepSummary>>,
    pub max_abs_log2_error: Option<RepSummary>,
    pub null_rejection: Vec<ThresholdSummary>,
    pub power: Vec<ThresholdSummary>,
    pub common_dispersion: Option<RepSummary>,
    pub calibration: CalibrationTable,
    pub records: Vec<NormalizationRepetition>,
}

/// Normalization study repeated over several background levels
#[derive(Debug, Clone, Serialize)]
pub struct NormalizationSweep {
    pub reports: Vec<NormalizationReport>,
}

/// Factors that make the background rows of every library the same size,
/// scaled to a geometric mean of one
pub fn ideal_factors(counts: &CountMatrix, truth: &GroundTruth) -> Result<Vec<f64>> {
    let background = counts.counts().select(Axis(0), &truth.null_sites());
    let lib_sizes = counts.library_sizes();
    let raw: Vec<f64> = background
        .columns()
        .into_iter()
        .zip(&lib_sizes)
        .map(|(col, &lib)| col.iter().map(|&c| c as f64).sum::<f64>() / lib)
        .collect();
    if let Some(j) = raw.iter().position(|r| !(r.is_finite() && *r > 0.0)) {
        return Err(SimError::degenerate(format!(
            "library {} has no background counts",
            j
        )));
    }
    let log_geo = raw.iter().map(|f| f.ln()).sum::<f64>() / raw.len() as f64;
    Ok(raw.iter().map(|f| f / log_geo.exp()).collect())
}

/// Run the normalization study at `params.background_mean`
pub fn run(
    params: &NormalizationParams,
    reps: usize,
    seed: u64,
    test: &dyn DifferentialTest,
) -> Result<NormalizationReport> {
    let design = Design::balanced(&["control", "treated"], params.libs_per_group)?;
    let contrast = Contrast::last_level(&design)?;
    let spike_params = SpikeParams {
        n_sites: params.n_sites,
        background_mean: params.background_mean,
        prop_spiked: params.prop_spiked,
        spike_fold: params.spike_fold,
        dispersion: DispersionFn::constant(params.dispersion),
    };
    let name = format!("normalize (mean {})", params.background_mean);

    let survivors = run_repetitions(&name, reps, seed, |repetition, rng: &mut SimRng| {
        let sim = simulate_spiked(&design, &spike_params, rng)?;
        let tmm = normalization_factors(&sim.counts, NormalizationMethod::Tmm)?;
        let ideal = ideal_factors(&sim.counts, &sim.truth)?;
        let log2_error: Vec<f64> = tmm.iter().zip(&ideal).map(|(t, i)| (t / i).log2()).collect();
        let max_abs_log2_error = log2_error.iter().fold(0.0f64, |m, e| m.max(e.abs()));
        log::debug!(
            "{} repetition {}: TMM {:?}, ideal {:?}",
            name,
            repetition,
            tmm,
            ideal
        );

        let outcome = test.test(&sim.counts, &design, &contrast)?;
        let rows: Vec<usize> = (0..params.n_sites).collect();
        let split = split_by_truth(&rows, &outcome.pvalues, &sim.truth)?;
        let power = if split.nonnull.is_empty() {
            Vec::new()
        } else {
            rates_at(&split.nonnull, &REPORT_THRESHOLDS)?
        };

        Ok(NormalizationRepetition {
            repetition,
            tmm_factors: tmm,
            ideal_factors: ideal,
            log2_error,
            max_abs_log2_error,
            null_rejection: rates_at(&split.null, &REPORT_THRESHOLDS)?,
            power,
            common_dispersion: outcome.common_dispersion,
            calibration: calibration_curve(&split.null)?,
        })
    })?;

    let records = survivors.records;
    let mut calibration = CalibrationTable::default();
    calibration.add_series(
        &format!("mean={}", params.background_mean),
        records.iter().map(|r| &r.calibration),
    )?;
    let log2_error = (0..design.n_libraries())
        .map(|j| summarise(&records, |r| r.log2_error.get(j).copied()))
        .collect();

    Ok(NormalizationReport {
        params: params.clone(),
        test: test.name().to_string(),
        repetitions: reps,
        n_failed: survivors.failures.len(),
        failures: survivors.failures,
        log2_error,
        max_abs_log2_error: summarise(&records, |r| Some(r.max_abs_log2_error)),
        null_rejection: summarise_rates(
            records.iter().map(|r| r.null_rejection.as_slice()),
            &REPORT_THRESHOLDS,
        ),
        power: summarise_rates(records.iter().map(|r| r.power.as_slice()), &REPORT_THRESHOLDS),
        common_dispersion: summarise(&records, |r| Some(r.common_dispersion)),
        calibration,
        records,
    })
}

/// Run the study once per background mean, with the same seed for each
pub fn run_sweep(
    params: &NormalizationParams,
    means: &[f64],
    reps: usize,
    seed: u64,
    test: &dyn DifferentialTest,
) -> Result<NormalizationSweep> {
    if means.is_empty() {
        return Err(SimError::invalid("no background means to sweep"));
    }
    if let Some(m) = means.iter().find(|m| !(m.is_finite() && **m > 0.0)) {
        return Err(SimError::invalid(format!(
            "background means must be finite and > 0, got {}",
            m
        )));
    }
    let reports = means
        .iter()
        .map(|&background_mean| {
            let level = NormalizationParams {
                background_mean,
                ..params.clone()
            };
            run(&level, reps, seed, test)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(NormalizationSweep { reports })
}

impl NormalizationSweep {
    /// Calibration series of every background level in one table
    pub fn calibration(&self) -> CalibrationTable {
        let mut table = CalibrationTable::default();
        for report in &self.reports {
            table.extend(report.calibration.clone());
        }
        table
    }
}

impl fmt::Display for NormalizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "TMM normalization study (background mean {}, {} test)",
            self.params.background_mean, self.test
        )?;
        writeln!(f, "=====================================================")?;
        writeln!(
            f,
            "Sites: {}, spiked: {} x{}",
            self.params.n_sites, self.params.prop_spiked, self.params.spike_fold
        )?;
        writeln!(f, "Repetitions: {} ({} failed)", self.repetitions, self.n_failed)?;
        for (j, e) in self.log2_error.iter().enumerate() {
            writeln!(f, "log2(TMM / ideal), library {}: {}", j + 1, fmt_summary(e))?;
        }
        writeln!(f, "Max |log2 error|: {}", fmt_summary(&self.max_abs_log2_error))?;
        for t in &self.null_rejection {
            writeln!(f, "Null rejection at {}: {}", t.threshold, t.summary)?;
        }
        for t in &self.power {
            writeln!(f, "Power at {}: {}", t.threshold, t.summary)?;
        }
        writeln!(f, "Common dispersion: {}", fmt_summary(&self.common_dispersion))?;
        Ok(())
    }
}

impl fmt::Display for NormalizationSweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, report) in self.reports.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", report)?;
        }
        Ok(())
    }
}
