//! Common NB dispersion by Cox-Reid adjusted profile likelihood

use ndarray::Array2;
use rayon::prelude::*;

use super::DispersionParams;
use crate::error::{Result, SimError};
use crate::glm::{fit_nb_glm_rows, log_det_xtwx, nb_log_likelihood, nb_weight, GlmFitParams};

const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Summed Cox-Reid adjusted profile log-likelihood at dispersion `phi`,
/// holding the fitted means fixed
pub fn adjusted_profile_likelihood(
    counts: &Array2<f64>,
    mu: &[Vec<f64>],
    design: &Array2<f64>,
    phi: f64,
) -> f64 {
    mu.par_iter()
        .enumerate()
        .map(|(i, mu_row)| {
            let ll: f64 = counts
                .row(i)
                .iter()
                .zip(mu_row)
                .map(|(&y, &m)| nb_log_likelihood(y, m, phi))
                .sum();
            let weights: Vec<f64> = mu_row.iter().map(|&m| nb_weight(m, phi)).collect();
            ll - 0.5 * log_det_xtwx(design, &weights)
        })
        .sum()
}

/// Maximize `f` over `[lo, hi]` by golden-section search
fn golden_section_max<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64, tol: f64, maxit: usize) -> f64 {
    let (mut a, mut b) = (lo, hi);
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    for _ in 0..maxit {
        if (b - a).abs() < tol {
            break;
        }
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d);
        }
    }
    (a + b) / 2.0
}

fn maximize_at_fixed_means(
    counts: &Array2<f64>,
    mu: &[Vec<f64>],
    design: &Array2<f64>,
    params: &DispersionParams,
) -> f64 {
    let log_phi = golden_section_max(
        |lp| adjusted_profile_likelihood(counts, mu, design, lp.exp()),
        params.min_disp.ln(),
        params.max_disp.ln(),
        params.log_tol,
        params.maxit,
    );
    log_phi.exp()
}

/// Estimate one dispersion shared by all rows of `counts`
///
/// Means are fitted at `params.pilot`, the adjusted profile likelihood is
/// maximised over log-dispersion, then the means are refitted at the estimate
/// and the maximisation is repeated once. Rows with all-zero counts carry no
/// information and must be removed by the caller.
pub fn estimate_common_dispersion(
    counts: &Array2<f64>,
    design: &Array2<f64>,
    lib_sizes: &[f64],
    params: &DispersionParams,
    glm_params: &GlmFitParams,
) -> Result<f64> {
    if counts.nrows() == 0 {
        return Err(SimError::degenerate("no sites with counts for dispersion estimation"));
    }
    if design.nrows() <= design.ncols() {
        return Err(SimError::invalid(
            "no residual degrees of freedom for dispersion estimation",
        ));
    }

    let mut phi = params.pilot;
    for round in 0..2 {
        let fits = fit_nb_glm_rows(counts, design, lib_sizes, phi, glm_params);
        let mu: Vec<Vec<f64>> = fits.into_iter().map(|f| f.mu).collect();
        phi = maximize_at_fixed_means(counts, &mu, design, params);
        log::debug!("Common dispersion round {}: {:.5}", round + 1, phi);
    }

    if !phi.is_finite() || phi <= 0.0 {
        return Err(SimError::NumericalInstability {
            operation: "common dispersion".to_string(),
            details: format!("estimate {} is not a positive finite value", phi),
        });
    }
    Ok(phi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Design;
    use crate::glm::design_matrix;
    use crate::rng::seeded;
    use crate::simulate::{simulate_counts, DispersionFn, SimulationParams};

    #[test]
    fn test_golden_section() {
        let x = golden_section_max(|x| -(x - 1.3).powi(2), -5.0, 5.0, 1e-8, 200);
        assert!((x - 1.3).abs() < 1e-6);
    }

    fn estimate_for(phi: f64, seed: u64) -> f64 {
        let design = Design::balanced(&["a", "b"], 3).unwrap();
        let params = SimulationParams::new(
            3000,
            0.0,
            vec![50.0; 6],
            vec![50.0; 6],
            DispersionFn::constant(phi),
        );
        let sim = simulate_counts(&design, &params, &mut seeded(seed)).unwrap();
        let (x, _) = design_matrix(&design).unwrap();
        let lib = sim.counts.library_sizes();
        estimate_common_dispersion(
            &sim.counts.to_f64(),
            &x,
            &lib,
            &DispersionParams::default(),
            &GlmFitParams::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_recovers_simulated_dispersion() {
        for (phi, seed) in [(0.1, 1), (0.3, 2)] {
            let est = estimate_for(phi, seed);
            assert!((est / phi - 1.0).abs() < 0.1, "phi {} estimated as {}", phi, est);
        }
    }

    #[test]
    fn test_empty_input() {
        let design = Design::balanced(&["a", "b"], 2).unwrap();
        let (x, _) = design_matrix(&design).unwrap();
        let empty = Array2::<f64>::zeros((0, 4));
        assert!(matches!(
            estimate_common_dispersion(
                &empty,
                &x,
                &[1.0; 4],
                &DispersionParams::default(),
                &GlmFitParams::default()
            ),
            Err(SimError::DegenerateInput { .. })
        ));
    }
}
