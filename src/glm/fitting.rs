//! NB GLM fitting using Iteratively Reweighted Least Squares (IRLS)

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use super::negative_binomial::{nb_mean, nb_unit_deviance, nb_weight, MAX_LFC_BETA, MIN_MU};

/// Configurable parameters for GLM fitting
#[derive(Debug, Clone)]
pub struct GlmFitParams {
    /// Maximum IRLS iterations
    pub maxit: usize,
    /// Relative deviance change at which IRLS stops
    pub dev_tol: f64,
}

impl Default for GlmFitParams {
    fn default() -> Self {
        Self {
            maxit: 100,
            dev_tol: 1e-8,
        }
    }
}

/// Fit of one site
#[derive(Debug, Clone)]
pub struct NbGlmFit {
    /// Coefficients on the natural log scale
    pub coefficients: Vec<f64>,
    pub mu: Vec<f64>,
    pub deviance: f64,
    pub converged: bool,
    /// A non-intercept coefficient reached `MAX_LFC_BETA`, which happens
    /// when a whole group has zero counts
    pub at_boundary: bool,
    pub iterations: usize,
}

/// Ridge added to X'WX so an all-zero group stays solvable
const RIDGE: f64 = 1e-6;

fn linear_predictor(design: &Array2<f64>, beta: &[f64], i: usize) -> f64 {
    (0..beta.len()).map(|j| design[[i, j]] * beta[j]).sum()
}

fn fitted_means(design: &Array2<f64>, beta: &[f64], lib_sizes: &[f64], mus: &mut [f64]) {
    for (i, mu) in mus.iter_mut().enumerate() {
        *mu = nb_mean(linear_predictor(design, beta, i), lib_sizes[i]).max(MIN_MU);
    }
}

fn total_deviance(counts: ArrayView1<'_, f64>, mus: &[f64], phi: f64) -> f64 {
    counts.iter().zip(mus).map(|(&y, &mu)| nb_unit_deviance(y, mu, phi)).sum()
}

/// Fit an NB GLM with known dispersion to one site
///
/// `lib_sizes` are the effective library sizes, so `mu = lib_size * exp(x'beta)`.
pub fn fit_nb_glm(
    counts: ArrayView1<'_, f64>,
    design: &Array2<f64>,
    lib_sizes: &[f64],
    phi: f64,
    params: &GlmFitParams,
) -> NbGlmFit {
    let n_libraries = counts.len();
    let n_coefs = design.ncols();

    // start from least squares on log(y + 0.1) - log(lib_size)
    let log_counts: Vec<f64> = counts
        .iter()
        .zip(lib_sizes)
        .map(|(&y, &s)| ((y + 0.1) / s).ln())
        .collect();
    let mut beta = weighted_least_squares(design, &vec![1.0; n_libraries], &log_counts);
    if beta.iter().any(|b| !b.is_finite()) {
        let total: f64 = counts.iter().sum();
        let lib_total: f64 = lib_sizes.iter().sum();
        beta = vec![0.0; n_coefs];
        beta[0] = ((total + 0.1) / lib_total).ln();
    }

    let mut mus = vec![0.0; n_libraries];
    let mut weights = vec![0.0; n_libraries];
    let mut working_response = vec![0.0; n_libraries];
    fitted_means(design, &beta, lib_sizes, &mut mus);
    let mut dev_old = total_deviance(counts, &mus, phi);

    let mut converged = false;
    let mut at_boundary = false;
    let mut iterations = 0;

    for iter in 0..params.maxit {
        iterations = iter + 1;
        for i in 0..n_libraries {
            let mu = mus[i];
            weights[i] = nb_weight(mu, phi);
            working_response[i] = (mu / lib_sizes[i]).ln() + (counts[i] - mu) / mu;
        }

        let next = weighted_least_squares(design, &weights, &working_response);
        if next.iter().any(|b| !b.is_finite()) {
            break;
        }
        beta = next;

        if beta.iter().skip(1).any(|b| b.abs() > MAX_LFC_BETA) {
            for b in beta.iter_mut().skip(1) {
                *b = b.clamp(-MAX_LFC_BETA, MAX_LFC_BETA);
            }
            fitted_means(design, &beta, lib_sizes, &mut mus);
            at_boundary = true;
            converged = true;
            break;
        }

        fitted_means(design, &beta, lib_sizes, &mut mus);
        let dev = total_deviance(counts, &mus, phi);
        let conv_test = (dev - dev_old).abs() / (dev.abs() + 0.1);
        if conv_test.is_nan() {
            break;
        }
        dev_old = dev;
        if conv_test < params.dev_tol {
            converged = true;
            break;
        }
    }

    let deviance = total_deviance(counts, &mus, phi);
    NbGlmFit {
        coefficients: beta,
        mu: mus,
        deviance,
        converged,
        at_boundary,
        iterations,
    }
}

/// Fit every row of `counts` in parallel
pub fn fit_nb_glm_rows(
    counts: &Array2<f64>,
    design: &Array2<f64>,
    lib_sizes: &[f64],
    phi: f64,
    params: &GlmFitParams,
) -> Vec<NbGlmFit> {
    (0..counts.nrows())
        .into_par_iter()
        .map(|i| fit_nb_glm(counts.row(i), design, lib_sizes, phi, params))
        .collect()
}

/// X'WX as a flat row-major matrix
pub fn xtwx(design: &Array2<f64>, weights: &[f64]) -> Vec<f64> {
    let n_coefs = design.ncols();
    let mut out = vec![0.0; n_coefs * n_coefs];
    for (i, &w) in weights.iter().enumerate() {
        for j in 0..n_coefs {
            for k in 0..n_coefs {
                out[j * n_coefs + k] += w * design[[i, j]] * design[[i, k]];
            }
        }
    }
    out
}

/// Solve (X'WX + ridge) beta = X'Wz
fn weighted_least_squares(design: &Array2<f64>, weights: &[f64], response: &[f64]) -> Vec<f64> {
    let n_coefs = design.ncols();
    let mut a = xtwx(design, weights);
    for j in 0..n_coefs {
        a[j * n_coefs + j] += RIDGE;
    }

    let mut b = vec![0.0; n_coefs];
    for (i, &w) in weights.iter().enumerate() {
        for (j, bj) in b.iter_mut().enumerate() {
            *bj += w * design[[i, j]] * response[i];
        }
    }
    solve_symmetric_system(&a, &b, n_coefs)
}

/// Cholesky factor of a symmetric matrix; non-positive pivots are replaced by
/// a tiny value so the factor always exists
fn cholesky(a: &[f64], n: usize) -> Vec<f64> {
    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                l[i * n + j] = sum.max(1e-12).sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    l
}

fn solve_symmetric_system(a: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let l = cholesky(a, n);

    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * y[j];
        }
        y[i] = sum / l[i * n + i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
    x
}

/// log det(X'WX), as used by the Cox-Reid adjustment
pub fn log_det_xtwx(design: &Array2<f64>, weights: &[f64]) -> f64 {
    let n = design.ncols();
    let l = cholesky(&xtwx(design, weights), n);
    2.0 * (0..n).map(|i| l[i * n + i].ln()).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_group() -> Array2<f64> {
        array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]
    }

    #[test]
    fn test_fit_recovers_group_means() {
        let x = two_group();
        let y = array![10.0, 12.0, 8.0, 40.0, 44.0, 36.0];
        let lib = vec![1.0; 6];
        let fit = fit_nb_glm(y.view(), &x, &lib, 0.1, &GlmFitParams::default());
        assert!(fit.converged);
        assert!(!fit.at_boundary);
        // the MLE of a group-saturated NB GLM is the group mean
        assert!((fit.coefficients[0] - 10.0f64.ln()).abs() < 1e-6);
        assert!((fit.coefficients[1] - 4.0f64.ln()).abs() < 1e-6);
        assert!((fit.mu[3] - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_library_sizes_act_as_offsets() {
        let x = two_group();
        let y = array![10.0, 20.0, 10.0, 10.0, 20.0, 10.0];
        let lib = vec![1.0, 2.0, 1.0, 1.0, 2.0, 1.0];
        let fit = fit_nb_glm(y.view(), &x, &lib, 0.05, &GlmFitParams::default());
        assert!(fit.coefficients[1].abs() < 1e-6);
        assert!(fit.deviance < 1e-8);
    }

    #[test]
    fn test_zero_group_reaches_small_mean() {
        let x = two_group();
        let y = array![0.0, 0.0, 0.0, 15.0, 9.0, 12.0];
        let lib = vec![1.0; 6];
        let fit = fit_nb_glm(y.view(), &x, &lib, 0.1, &GlmFitParams::default());
        assert!(fit.converged);
        assert!(fit.mu[0] < 1e-3, "mu {}", fit.mu[0]);
        assert!(fit.coefficients[1] > 5.0);
    }

    #[test]
    fn test_reduced_model_deviance_is_larger() {
        let x = two_group();
        let y = array![10.0, 12.0, 8.0, 40.0, 44.0, 36.0];
        let lib = vec![1.0; 6];
        let full = fit_nb_glm(y.view(), &x, &lib, 0.1, &GlmFitParams::default());
        let reduced_x = crate::glm::drop_column(&x, 1);
        let reduced = fit_nb_glm(y.view(), &reduced_x, &lib, 0.1, &GlmFitParams::default());
        assert!(reduced.deviance > full.deviance + 1.0);
        assert!((reduced.mu[0] - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_log_det() {
        let x = two_group();
        // X'X = [[6, 3], [3, 3]], det = 9
        let ld = log_det_xtwx(&x, &[1.0; 6]);
        assert!((ld - 9.0f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn test_parallel_rows_match_single_fits() {
        let x = two_group();
        let y = array![[10.0, 12.0, 8.0, 40.0, 44.0, 36.0], [3.0, 0.0, 5.0, 2.0, 4.0, 1.0]];
        let lib = vec![1.0; 6];
        let fits = fit_nb_glm_rows(&y, &x, &lib, 0.1, &GlmFitParams::default());
        let single = fit_nb_glm(y.row(1), &x, &lib, 0.1, &GlmFitParams::default());
        assert_eq!(fits.len(), 2);
        assert!((fits[1].deviance - single.deviance).abs() < 1e-12);
    }
}
