//! Negative binomial count simulation
//!
//! Rows `0..n_nonnull` are the non-null (differentially bound) sites, the rest
//! are null. The dispersion of each block is a function of how many sites the
//! block contains, so the same `DispersionFn` can mimic the precision limits of
//! dispersion estimation at different sample sizes.

mod nb;
mod variants;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::{CountMatrix, Design, GroundTruth};
use crate::error::{Result, SimError};

pub use nb::NbSampler;
pub use variants::{
    simulate_spiked, simulate_with_controls, ControlledCounts, SpikeParams, SpikedCounts,
};

/// Maps a number of sites to an NB dispersion (the reciprocal of `size`)
#[derive(Clone)]
pub struct DispersionFn(Arc<dyn Fn(usize) -> f64 + Send + Sync>);

impl DispersionFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(usize) -> f64 + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Same dispersion regardless of site count
    pub fn constant(phi: f64) -> Self {
        Self::new(move |_| phi)
    }

    pub fn eval(&self, n_sites: usize) -> f64 {
        (self.0)(n_sites)
    }
}

impl fmt::Debug for DispersionFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispersionFn(phi(1000)={})", self.eval(1000))
    }
}

/// How a fold change is placed across the groups of a design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectLayout {
    /// Reference groups keep the baseline mean, treatment groups get
    /// baseline * fold change
    Elevated,
    /// Reference groups get `2mu/(1+f)`, treatment groups `2mu*f/(1+f)`;
    /// with two equal groups the average stays at the baseline
    Balanced,
}

impl EffectLayout {
    /// Per-library `(null_means, nonnull_means)` for a design
    pub fn means(&self, design: &Design, baseline: f64, fold_change: f64) -> (Vec<f64>, Vec<f64>) {
        let (reference, treated) = match self {
            EffectLayout::Elevated => (baseline, baseline * fold_change),
            EffectLayout::Balanced => {
                let low = 2.0 * baseline / (1.0 + fold_change);
                (low, low * fold_change)
            }
        };
        let null_means = vec![baseline; design.n_libraries()];
        let nonnull_means = design
            .group_codes()
            .into_iter()
            .map(|g| if g == 0 { reference } else { treated })
            .collect();
        (null_means, nonnull_means)
    }
}

impl fmt::Display for EffectLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectLayout::Elevated => write!(f, "elevated"),
            EffectLayout::Balanced => write!(f, "balanced"),
        }
    }
}

impl FromStr for EffectLayout {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "elevated" => Ok(EffectLayout::Elevated),
            "balanced" => Ok(EffectLayout::Balanced),
            other => Err(SimError::invalid(format!(
                "unknown effect layout '{}' (expected 'elevated' or 'balanced')",
                other
            ))),
        }
    }
}

/// Parameters for `simulate_counts`
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub n_sites: usize,
    /// Fraction of sites that are non-null, in [0, 1]
    pub prop_nonnull: f64,
    /// Mean of null sites, one entry per library
    pub null_means: Vec<f64>,
    /// Mean of non-null sites, one entry per library
    pub nonnull_means: Vec<f64>,
    pub dispersion: DispersionFn,
    /// Multiplier on the dispersion of each library
    pub dispersion_scale: Vec<f64>,
}

impl SimulationParams {
    pub fn new(
        n_sites: usize,
        prop_nonnull: f64,
        null_means: Vec<f64>,
        nonnull_means: Vec<f64>,
        dispersion: DispersionFn,
    ) -> Self {
        let n_libraries = null_means.len();
        Self {
            n_sites,
            prop_nonnull,
            null_means,
            nonnull_means,
            dispersion,
            dispersion_scale: vec![1.0; n_libraries],
        }
    }

    /// Means laid out over `design` by an `EffectLayout`
    pub fn from_layout(
        design: &Design,
        n_sites: usize,
        prop_nonnull: f64,
        baseline: f64,
        fold_change: f64,
        layout: EffectLayout,
        dispersion: DispersionFn,
    ) -> Self {
        let (null_means, nonnull_means) = layout.means(design, baseline, fold_change);
        Self::new(n_sites, prop_nonnull, null_means, nonnull_means, dispersion)
    }

    pub fn with_dispersion_scale(mut self, scale: Vec<f64>) -> Self {
        self.dispersion_scale = scale;
        self
    }

    /// `round(n_sites * prop_nonnull)`
    pub fn n_nonnull(&self) -> usize {
        ((self.n_sites as f64) * self.prop_nonnull).round() as usize
    }

    pub fn validate(&self, n_libraries: usize) -> Result<()> {
        if self.n_sites == 0 {
            return Err(SimError::invalid("n_sites must be positive"));
        }
        if !(0.0..=1.0).contains(&self.prop_nonnull) {
            return Err(SimError::invalid(format!(
                "prop_nonnull must be in [0, 1], got {}",
                self.prop_nonnull
            )));
        }
        for (name, v) in [
            ("null_means", &self.null_means),
            ("nonnull_means", &self.nonnull_means),
            ("dispersion_scale", &self.dispersion_scale),
        ] {
            if v.len() != n_libraries {
                return Err(SimError::invalid(format!(
                    "{} has {} entries but the design has {} libraries",
                    name,
                    v.len(),
                    n_libraries
                )));
            }
        }
        if let Some(m) = self
            .null_means
            .iter()
            .chain(&self.nonnull_means)
            .find(|m| !m.is_finite() || **m < 0.0)
        {
            return Err(SimError::invalid(format!("means must be finite and >= 0, got {}", m)));
        }
        if let Some(s) = self.dispersion_scale.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(SimError::invalid(format!(
                "dispersion_scale entries must be finite and > 0, got {}",
                s
            )));
        }
        Ok(())
    }
}

/// Counts plus the labels that generated them
#[derive(Debug, Clone)]
pub struct SimulatedCounts {
    pub counts: CountMatrix,
    pub truth: GroundTruth,
}

/// Dispersion for a block of `n` sites, checked only when the block is non-empty
pub(crate) fn block_dispersion(dispersion: &DispersionFn, n: usize, block: &str) -> Result<f64> {
    if n == 0 {
        return Ok(f64::NAN);
    }
    let phi = dispersion.eval(n);
    if !phi.is_finite() || phi <= 0.0 {
        return Err(SimError::invalid(format!(
            "dispersion function returned {} for the {} block of {} sites",
            phi, block, n
        )));
    }
    Ok(phi)
}

/// One sampler per library for a block of rows
pub(crate) fn block_samplers(means: &[f64], phi: f64, scale: &[f64]) -> Result<Vec<NbSampler>> {
    means
        .iter()
        .zip(scale)
        .map(|(&mu, &s)| NbSampler::new(mu, 1.0 / (phi * s)))
        .collect()
}

/// Fill rows `rows` of `out` from per-library samplers, row by row
pub(crate) fn fill_rows<R: Rng + ?Sized>(
    out: &mut Array2<u32>,
    rows: impl Iterator<Item = usize>,
    samplers: &[NbSampler],
    rng: &mut R,
) {
    for i in rows {
        for (j, sampler) in samplers.iter().enumerate() {
            out[[i, j]] = sampler.sample(rng);
        }
    }
}

/// Simulate a `n_sites x n_libraries` NB count matrix
///
/// Non-null rows come first and use `nonnull_means` with size
/// `1/dispfun(n_nonnull)`; null rows use `null_means` with size
/// `1/dispfun(n_null)`.
pub fn simulate_counts<R: Rng + ?Sized>(
    design: &Design,
    params: &SimulationParams,
    rng: &mut R,
) -> Result<SimulatedCounts> {
    let n_libraries = design.n_libraries();
    params.validate(n_libraries)?;

    let n = params.n_sites;
    let n_nonnull = params.n_nonnull().min(n);
    let n_null = n - n_nonnull;

    let phi_nonnull = block_dispersion(&params.dispersion, n_nonnull, "non-null")?;
    let phi_null = block_dispersion(&params.dispersion, n_null, "null")?;

    let mut counts = Array2::<u32>::zeros((n, n_libraries));
    if n_nonnull > 0 {
        let samplers = block_samplers(&params.nonnull_means, phi_nonnull, &params.dispersion_scale)?;
        fill_rows(&mut counts, 0..n_nonnull, &samplers, rng);
    }
    if n_null > 0 {
        let samplers = block_samplers(&params.null_means, phi_null, &params.dispersion_scale)?;
        fill_rows(&mut counts, n_nonnull..n, &samplers, rng);
    }

    log::debug!(
        "Simulated {} sites x {} libraries ({} non-null)",
        n,
        n_libraries,
        n_nonnull
    );

    Ok(SimulatedCounts {
        counts: CountMatrix::from_counts(counts),
        truth: GroundTruth::leading(n, n_nonnull),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seeded;

    fn two_by_two() -> Design {
        Design::balanced(&["control", "treated"], 2).unwrap()
    }

    #[test]
    fn test_shape_and_truth() {
        let design = two_by_two();
        let params = SimulationParams::from_layout(
            &design,
            1000,
            0.1,
            10.0,
            2.0,
            EffectLayout::Elevated,
            DispersionFn::constant(0.1),
        );
        let sim = simulate_counts(&design, &params, &mut seeded(1)).unwrap();
        assert_eq!(sim.counts.n_sites(), 1000);
        assert_eq!(sim.counts.n_libraries(), 4);
        assert_eq!(sim.truth.n_nonnull(), 100);
        assert!(sim.truth.is_nonnull(99));
        assert!(!sim.truth.is_nonnull(100));
    }

    #[test]
    fn test_reproducible_with_same_seed() {
        let design = two_by_two();
        let params = SimulationParams::new(
            200,
            0.0,
            vec![20.0; 4],
            vec![20.0; 4],
            DispersionFn::constant(0.2),
        );
        let a = simulate_counts(&design, &params, &mut seeded(9)).unwrap();
        let b = simulate_counts(&design, &params, &mut seeded(9)).unwrap();
        assert_eq!(a.counts, b.counts);
    }

    #[test]
    fn test_invalid_parameters() {
        let design = two_by_two();
        let mut rng = seeded(0);
        let base = SimulationParams::new(
            100,
            0.1,
            vec![10.0; 4],
            vec![20.0; 4],
            DispersionFn::constant(0.1),
        );

        let mut p = base.clone();
        p.prop_nonnull = 1.5;
        assert!(matches!(
            simulate_counts(&design, &p, &mut rng),
            Err(SimError::InvalidParameter { .. })
        ));

        let mut p = base.clone();
        p.prop_nonnull = f64::NAN;
        assert!(simulate_counts(&design, &p, &mut rng).is_err());

        let mut p = base.clone();
        p.n_sites = 0;
        assert!(simulate_counts(&design, &p, &mut rng).is_err());

        let mut p = base.clone();
        p.null_means = vec![10.0; 3];
        assert!(simulate_counts(&design, &p, &mut rng).is_err());

        let p = base.clone().with_dispersion_scale(vec![1.0; 2]);
        assert!(simulate_counts(&design, &p, &mut rng).is_err());

        let mut p = base;
        p.dispersion = DispersionFn::new(|n| if n < 50 { 0.0 } else { 0.1 });
        assert!(simulate_counts(&design, &p, &mut rng).is_err());
    }

    #[test]
    fn test_dispersion_depends_on_block_size() {
        // the small non-null block gets a large dispersion
        let design = two_by_two();
        let params = SimulationParams::new(
            4000,
            0.25,
            vec![100.0; 4],
            vec![100.0; 4],
            DispersionFn::new(|n| if n >= 2000 { 0.01 } else { 1.0 }),
        );
        let sim = simulate_counts(&design, &params, &mut seeded(5)).unwrap();
        assert_eq!(sim.truth.n_nonnull(), 1000);
        let col: Vec<f64> = sim.counts.counts().column(0).iter().map(|&c| c as f64).collect();
        let var_nonnull = crate::stats::variance(&col[..1000]);
        let var_null = crate::stats::variance(&col[1000..]);
        // expected variances: 100 + 1e4 versus 100 + 100
        assert!(var_nonnull > 10.0 * var_null, "{} vs {}", var_nonnull, var_null);
    }

    #[test]
    fn test_balanced_layout_preserves_average() {
        let design = two_by_two();
        let (null, nonnull) = EffectLayout::Balanced.means(&design, 10.0, 3.0);
        assert_eq!(null, vec![10.0; 4]);
        assert!((nonnull[0] - 5.0).abs() < 1e-12);
        assert!((nonnull[3] - 15.0).abs() < 1e-12);
        let avg: f64 = nonnull.iter().sum::<f64>() / 4.0;
        assert!((avg - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_effect_layout_parse() {
        assert_eq!("Balanced".parse::<EffectLayout>().unwrap(), EffectLayout::Balanced);
        assert_eq!(EffectLayout::Elevated.to_string(), "elevated");
        assert!("sideways".parse::<EffectLayout>().is_err());
    }
}
