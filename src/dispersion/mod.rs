//! Dispersion estimation for negative binomial models
//!
//! One common NB dispersion per dataset, plus the empirical Bayes prior on
//! per-site quasi-likelihood dispersions.

mod common;
mod squeeze;

pub use common::{adjusted_profile_likelihood, estimate_common_dispersion};
pub use squeeze::{fit_f_dist, QlPrior};

/// Configurable parameters for common dispersion estimation
#[derive(Debug, Clone)]
pub struct DispersionParams {
    /// Lower end of the search interval
    pub min_disp: f64,
    /// Upper end of the search interval
    pub max_disp: f64,
    /// Dispersion used for the first fit of the means
    pub pilot: f64,
    /// Width of the final search bracket on the log scale
    pub log_tol: f64,
    pub maxit: usize,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-4,
            max_disp: 10.0,
            pilot: 0.1,
            log_tol: 1e-5,
            maxit: 100,
        }
    }
}
