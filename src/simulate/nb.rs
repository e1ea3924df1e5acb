//! Negative binomial sampling via the Gamma-Poisson mixture

use rand::Rng;
use rand_distr::{Distribution, Gamma, Poisson};

use crate::error::{Result, SimError};

/// Sampler for NB(mean, size) with variance `mean + mean^2 / size`
#[derive(Debug, Clone, Copy)]
pub struct NbSampler {
    gamma: Option<Gamma<f64>>,
}

impl NbSampler {
    /// A zero mean gives a point mass at zero.
    pub fn new(mean: f64, size: f64) -> Result<Self> {
        if !mean.is_finite() || mean < 0.0 {
            return Err(SimError::invalid(format!("NB mean must be finite and >= 0, got {}", mean)));
        }
        if !size.is_finite() || size <= 0.0 {
            return Err(SimError::invalid(format!("NB size must be finite and > 0, got {}", size)));
        }
        if mean == 0.0 {
            return Ok(Self { gamma: None });
        }
        let gamma = Gamma::new(size, mean / size).map_err(|e| {
            SimError::invalid(format!("NB(mean={}, size={}): {}", mean, size, e))
        })?;
        Ok(Self { gamma: Some(gamma) })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let Some(gamma) = self.gamma else {
            return 0;
        };
        let lambda = gamma.sample(rng);
        if lambda.is_nan() || lambda <= 0.0 {
            return 0;
        }
        match Poisson::new(lambda) {
            Ok(poisson) => {
                let draw: f64 = poisson.sample(rng);
                draw.min(u32::MAX as f64) as u32
            }
            Err(_) => 0,
        }
    }
}
