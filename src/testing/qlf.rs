//! Quasi-likelihood F-test on negative binomial GLMs

use ndarray::Axis;
use rayon::prelude::*;

use super::{Contrast, DifferentialTest, NullDistribution, TestOutcome};
use crate::data::{CountMatrix, Design};
use crate::dispersion::{estimate_common_dispersion, fit_f_dist, DispersionParams};
use crate::error::{Result, SimError};
use crate::glm::{design_matrix, drop_column, fit_nb_glm, GlmFitParams, NbGlmFit};
use crate::normalization::{effective_library_sizes, NormalizationMethod};

/// NB GLM quasi-likelihood F-test with a common NB dispersion and an
/// empirical Bayes prior on the QL dispersions
///
/// For each site the full model and the model without the contrast column
/// are fitted at the common dispersion. The deviance difference is scaled by
/// the squeezed QL dispersion and referred to F(1, d0 + df_residual).
#[derive(Debug, Clone, Default)]
pub struct QlfTest {
    pub normalization: NormalizationMethod,
    pub dispersion: DispersionParams,
    pub glm: GlmFitParams,
}

impl QlfTest {
    pub fn new(normalization: NormalizationMethod) -> Self {
        Self {
            normalization,
            ..Default::default()
        }
    }
}

struct SiteFit {
    dev_full: f64,
    dev_reduced: f64,
    log2_fc: f64,
    converged: bool,
}

impl SiteFit {
    /// A pair of fits with a non-finite deviance counts as not converged
    fn from_fits(full: &NbGlmFit, reduced: &NbGlmFit, column: usize) -> Self {
        let finite = full.deviance.is_finite() && reduced.deviance.is_finite();
        Self {
            dev_full: full.deviance,
            dev_reduced: reduced.deviance,
            log2_fc: full.coefficients[column] / std::f64::consts::LN_2,
            converged: full.converged && reduced.converged && finite,
        }
    }

    /// Deviance drop from removing the contrast column
    fn likelihood_ratio(&self) -> Option<f64> {
        if self.dev_full.is_finite() && self.dev_reduced.is_finite() {
            Some((self.dev_reduced - self.dev_full).max(0.0))
        } else {
            None
        }
    }
}

impl DifferentialTest for QlfTest {
    fn name(&self) -> &str {
        "qlf"
    }

    fn test(&self, counts: &CountMatrix, design: &Design, contrast: &Contrast) -> Result<TestOutcome> {
        let n_sites = counts.n_sites();
        if n_sites == 0 {
            return Err(SimError::degenerate("no sites to test"));
        }
        if counts.n_libraries() != design.n_libraries() {
            return Err(SimError::DimensionMismatch {
                expected: format!("{} libraries in the design", design.n_libraries()),
                got: format!("{} count columns", counts.n_libraries()),
            });
        }

        let (x, info) = design_matrix(design)?;
        let column = contrast.resolve(&info)?;
        let x_reduced = drop_column(&x, column);
        let df_residual = (x.nrows() - x.ncols()) as f64;
        if df_residual <= 0.0 {
            return Err(SimError::TestFailed {
                reason: "no residual degrees of freedom".to_string(),
            });
        }

        let lib_sizes = effective_library_sizes(counts, self.normalization)?;
        let y = counts.to_f64();
        let testable: Vec<usize> = (0..n_sites)
            .filter(|&i| y.row(i).iter().any(|&c| c > 0.0))
            .collect();
        if testable.is_empty() {
            return Err(SimError::TestFailed {
                reason: "no testable sites: every site has zero counts".to_string(),
            });
        }
        let y_testable = y.select(Axis(0), &testable);

        let phi = estimate_common_dispersion(&y_testable, &x, &lib_sizes, &self.dispersion, &self.glm)
            .map_err(|e| SimError::TestFailed {
                reason: format!("dispersion estimation failed: {}", e),
            })?;
        log::debug!(
            "{}: common dispersion {:.4} from {} of {} sites",
            self.name(),
            phi,
            testable.len(),
            n_sites
        );

        let fits: Vec<SiteFit> = (0..testable.len())
            .into_par_iter()
            .map(|r| {
                let row = y_testable.row(r);
                let full = fit_nb_glm(row, &x, &lib_sizes, phi, &self.glm);
                let reduced = fit_nb_glm(row, &x_reduced, &lib_sizes, phi, &self.glm);
                SiteFit::from_fits(&full, &reduced, column)
            })
            .collect();

        let n_nonconverged = fits.iter().filter(|f| !f.converged).count();
        if 2 * n_nonconverged > testable.len() {
            return Err(SimError::TestFailed {
                reason: format!(
                    "{} of {} site fits did not converge",
                    n_nonconverged,
                    testable.len()
                ),
            });
        }
        if n_nonconverged > 0 {
            log::debug!("{} site fits did not converge", n_nonconverged);
        }

        let s2: Vec<f64> = fits.iter().map(|f| f.dev_full / df_residual).collect();
        let prior = fit_f_dist(&s2, df_residual)?;
        let null = NullDistribution::new(1.0, prior.df + df_residual)?;

        let mut pvalues = vec![1.0; n_sites];
        let mut log_fold_changes = vec![0.0; n_sites];
        for (fit, (&site, &s2_site)) in fits.iter().zip(testable.iter().zip(&s2)) {
            // non-finite fits are already counted in n_nonconverged
            let Some(lr) = fit.likelihood_ratio() else {
                continue;
            };
            let s2_post = prior.posterior(s2_site, df_residual);
            let f_stat = if s2_post > 0.0 {
                lr / s2_post
            } else if lr > 0.0 {
                f64::INFINITY
            } else {
                0.0
            };
            pvalues[site] = null.pvalue(f_stat);
            log_fold_changes[site] = fit.log2_fc;
        }

        Ok(TestOutcome {
            pvalues,
            log_fold_changes,
            common_dispersion: phi,
            prior_df: prior.df,
            prior_s2: prior.s2,
            n_nonconverged,
        })
    }
}
