//! Empirical Bayes squeezing of quasi-likelihood dispersions
//!
//! Residual variances `s2` with `df` degrees of freedom are modelled as
//! scaled F draws, `s2 / s0 ~ F(df, d0)`. The prior `(d0, s0)` is fitted by
//! moments of `log(s2)`.

use serde::Serialize;

use crate::error::{Result, SimError};
use crate::stats::{digamma, mean, median, trigamma, trigamma_inverse, variance};

/// Scaled-F prior on the quasi-likelihood dispersions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QlPrior {
    /// Prior degrees of freedom `d0`; infinite when the variances show no
    /// spread beyond sampling error
    pub df: f64,
    /// Prior location `s0`
    pub s2: f64,
}

impl QlPrior {
    /// Posterior dispersion `(d0 * s0 + df * s2) / (d0 + df)`
    pub fn posterior(&self, s2: f64, df: f64) -> f64 {
        if self.df.is_infinite() {
            self.s2
        } else {
            (self.df * self.s2 + df * s2) / (self.df + df)
        }
    }
}

/// Fit the prior from residual variances that share `df` degrees of freedom
///
/// Non-finite values are ignored and tiny values are floored at
/// `1e-5 * median`, so exact zeros do not send `log(s2)` to minus infinity.
pub fn fit_f_dist(s2: &[f64], df: f64) -> Result<QlPrior> {
    if !df.is_finite() || df <= 0.0 {
        return Err(SimError::invalid(format!("residual df must be positive, got {}", df)));
    }
    let values: Vec<f64> = s2.iter().copied().filter(|v| v.is_finite()).map(|v| v.max(0.0)).collect();
    if values.is_empty() {
        return Err(SimError::degenerate("no finite residual variances to fit a prior"));
    }

    let mut m = median(&values);
    if m <= 0.0 {
        log::warn!("More than half of the residual variances are zero");
        m = 1.0;
    }
    let half_df = df / 2.0;
    let e: Vec<f64> = values
        .iter()
        .map(|&v| v.max(1e-5 * m).ln() - digamma(half_df) + half_df.ln())
        .collect();
    let e_mean = mean(&e);

    if e.len() < 2 {
        return Ok(QlPrior {
            df: 0.0,
            s2: e_mean.exp(),
        });
    }

    let e_var = variance(&e) - trigamma(half_df);
    let prior = if e_var > 0.0 {
        let d0 = 2.0 * trigamma_inverse(e_var);
        QlPrior {
            df: d0,
            s2: (e_mean + digamma(d0 / 2.0) - (d0 / 2.0).ln()).exp(),
        }
    } else {
        QlPrior {
            df: f64::INFINITY,
            s2: e_mean.exp(),
        }
    };
    log::debug!("QL prior: df={:.3}, s2={:.4}", prior.df, prior.s2);
    Ok(prior)
}
