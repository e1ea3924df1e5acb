//! Negative binomial distribution utilities
//!
//! Parameterised by mean `mu` and dispersion `phi`, with `Var(Y) = mu + phi * mu^2`.

use statrs::function::gamma::ln_gamma;

/// Floor on fitted means; small enough that sites with an all-zero group
/// can reach their boundary fit
pub const MIN_MU: f64 = 1e-10;

/// Bound on the absolute value of non-intercept coefficients (natural log scale)
pub const MAX_LFC_BETA: f64 = 30.0;

/// Maximum eta value to prevent overflow (exp(700) ≈ 1e304)
pub const MAX_ETA: f64 = 700.0;

/// mu = library_size * exp(eta)
pub fn nb_mean(eta: f64, library_size: f64) -> f64 {
    library_size * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

pub fn nb_variance(mu: f64, phi: f64) -> f64 {
    mu + phi * mu * mu
}

/// Log probability of `y` under NB(mu, size = 1/phi), as R's `dnbinom(mu=)`
pub fn nb_log_likelihood(y: f64, mu: f64, phi: f64) -> f64 {
    if mu <= 0.0 || phi <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let size = 1.0 / phi;
    let prob = size / (size + mu);
    ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0) + size * prob.ln() + y * (1.0 - prob).ln()
}

/// Unit deviance `2 [ y ln(y/mu) - (y + 1/phi) ln((y + 1/phi)/(mu + 1/phi)) ]`
pub fn nb_unit_deviance(y: f64, mu: f64, phi: f64) -> f64 {
    let size = 1.0 / phi;
    let mu = mu.max(MIN_MU);
    let term_y = if y > 0.0 { y * (y / mu).ln() } else { 0.0 };
    let dev = 2.0 * (term_y - (y + size) * ((y + size) / (mu + size)).ln());
    dev.max(0.0)
}

/// IRLS working weight `mu / (1 + phi * mu)`
pub fn nb_weight(mu: f64, phi: f64) -> f64 {
    mu / (1.0 + phi * mu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_mean() {
        let mu = nb_mean(2.0, 1.0);
        assert!((mu - 2.0_f64.exp()).abs() < 1e-10);
        assert!(nb_mean(1e6, 1.0).is_finite());
    }

    #[test]
    fn test_nb_variance() {
        assert!((nb_variance(10.0, 0.1) - 20.0).abs() < 1e-10);
    }

    #[test]
    fn test_log_likelihood_sums_to_one() {
        let total: f64 = (0..2000).map(|y| nb_log_likelihood(y as f64, 20.0, 0.3).exp()).sum();
        assert!((total - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_unit_deviance() {
        assert!(nb_unit_deviance(5.0, 5.0, 0.1).abs() < 1e-12);
        assert!(nb_unit_deviance(0.0, 3.0, 0.1) > 0.0);
        // deviance equals twice the log-likelihood gap to the saturated model
        let (y, mu, phi) = (7.0, 3.0, 0.2);
        let expected = 2.0 * (nb_log_likelihood(y, y, phi) - nb_log_likelihood(y, mu, phi));
        assert!((nb_unit_deviance(y, mu, phi) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_nb_weight() {
        assert!((nb_weight(10.0, 0.1) - 5.0).abs() < 1e-10);
    }
}
