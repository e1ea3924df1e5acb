//! Simulation variants: matched control libraries and low-count spike-ins

use ndarray::Array2;
use rand::seq::index;
use rand::Rng;

use super::{block_dispersion, block_samplers, fill_rows, simulate_counts, DispersionFn, SimulationParams};
use crate::data::{CountMatrix, Design, GroundTruth};
use crate::error::{Result, SimError};

/// ChIP counts with a matched control library for every ChIP library
#[derive(Debug, Clone)]
pub struct ControlledCounts {
    pub chip: CountMatrix,
    pub control: CountMatrix,
    pub truth: GroundTruth,
}

/// Simulate ChIP counts as in `simulate_counts`, plus a control matrix of the
/// same shape drawn NB(`control_mean`) in every library regardless of group.
pub fn simulate_with_controls<R: Rng + ?Sized>(
    design: &Design,
    params: &SimulationParams,
    control_mean: f64,
    rng: &mut R,
) -> Result<ControlledCounts> {
    if !control_mean.is_finite() || control_mean < 0.0 {
        return Err(SimError::invalid(format!(
            "control mean must be finite and >= 0, got {}",
            control_mean
        )));
    }
    let sim = simulate_counts(design, params, rng)?;

    let n = params.n_sites;
    let phi = block_dispersion(&params.dispersion, n, "control")?;
    let control_means = vec![control_mean; design.n_libraries()];
    let samplers = block_samplers(&control_means, phi, &params.dispersion_scale)?;
    let mut control = Array2::<u32>::zeros((n, design.n_libraries()));
    fill_rows(&mut control, 0..n, &samplers, rng);

    let control_ids = sim.counts.library_ids().iter().map(|id| format!("{}_input", id)).collect();

    Ok(ControlledCounts {
        chip: sim.counts,
        control: CountMatrix::new(control, control_ids)?,
        truth: sim.truth,
    })
}

/// Parameters for `simulate_spiked`
#[derive(Debug, Clone)]
pub struct SpikeParams {
    pub n_sites: usize,
    /// Mean of every background row in every library
    pub background_mean: f64,
    /// Fraction of rows that receive the spike
    pub prop_spiked: f64,
    /// Multiplier on the mean of spiked rows in treatment libraries
    pub spike_fold: f64,
    pub dispersion: DispersionFn,
}

/// Low-count counts where a random subset of rows is spiked in treatment libraries
#[derive(Debug, Clone)]
pub struct SpikedCounts {
    pub counts: CountMatrix,
    /// Sorted indices of spiked rows
    pub spiked: Vec<usize>,
    pub truth: GroundTruth,
}

/// Draw background rows with mean `background_mean`, then multiply the mean of
/// a random `round(n * prop_spiked)` rows by `spike_fold` in every library
/// outside the reference group.
pub fn simulate_spiked<R: Rng + ?Sized>(
    design: &Design,
    params: &SpikeParams,
    rng: &mut R,
) -> Result<SpikedCounts> {
    let n = params.n_sites;
    if n == 0 {
        return Err(SimError::invalid("n_sites must be positive"));
    }
    if !(0.0..=1.0).contains(&params.prop_spiked) {
        return Err(SimError::invalid(format!(
            "prop_spiked must be in [0, 1], got {}",
            params.prop_spiked
        )));
    }
    if !params.spike_fold.is_finite() || params.spike_fold <= 0.0 {
        return Err(SimError::invalid(format!(
            "spike_fold must be finite and > 0, got {}",
            params.spike_fold
        )));
    }

    let n_spiked = ((n as f64) * params.prop_spiked).round() as usize;
    let mut spiked = index::sample(rng, n, n_spiked).into_vec();
    spiked.sort_unstable();
    let truth = GroundTruth::from_nonnull(n, &spiked)?;

    let n_libraries = design.n_libraries();
    let unit_scale = vec![1.0; n_libraries];
    let background = vec![params.background_mean; n_libraries];
    let spiked_means: Vec<f64> = design
        .group_codes()
        .into_iter()
        .map(|g| {
            if g == 0 {
                params.background_mean
            } else {
                params.background_mean * params.spike_fold
            }
        })
        .collect();

    let mut counts = Array2::<u32>::zeros((n, n_libraries));
    let phi_spiked = block_dispersion(&params.dispersion, n_spiked, "spiked")?;
    let phi_background = block_dispersion(&params.dispersion, n - n_spiked, "background")?;
    if n_spiked > 0 {
        let samplers = block_samplers(&spiked_means, phi_spiked, &unit_scale)?;
        fill_rows(&mut counts, spiked.iter().copied(), &samplers, rng);
    }
    if n_spiked < n {
        let samplers = block_samplers(&background, phi_background, &unit_scale)?;
        fill_rows(&mut counts, truth.null_sites().into_iter(), &samplers, rng);
    }

    Ok(SpikedCounts {
        counts: CountMatrix::from_counts(counts),
        spiked,
        truth,
    })
}
