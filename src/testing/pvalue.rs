//! P-value calculation from test statistics

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor};

use crate::error::{Result, SimError};

/// Reference distribution of a quasi-likelihood F statistic
#[derive(Debug, Clone)]
pub enum NullDistribution {
    F(FisherSnedecor),
    /// Used when the denominator df is infinite; evaluated on `F * df_test`
    ChiSquared { dist: ChiSquared, df_test: f64 },
}

impl NullDistribution {
    /// F(`df_test`, `df_denominator`), or chi-square when `df_denominator` is infinite
    pub fn new(df_test: f64, df_denominator: f64) -> Result<Self> {
        let instability = |e: String| SimError::NumericalInstability {
            operation: "null distribution".to_string(),
            details: e,
        };
        if df_denominator.is_infinite() {
            let dist = ChiSquared::new(df_test).map_err(|e| instability(e.to_string()))?;
            Ok(NullDistribution::ChiSquared { dist, df_test })
        } else {
            let dist = FisherSnedecor::new(df_test, df_denominator).map_err(|e| instability(e.to_string()))?;
            Ok(NullDistribution::F(dist))
        }
    }

    /// Upper-tail probability of an F statistic
    pub fn pvalue(&self, f_stat: f64) -> f64 {
        if f_stat.is_nan() {
            return f64::NAN;
        }
        if f_stat <= 0.0 {
            return 1.0;
        }
        if f_stat.is_infinite() {
            return 0.0;
        }
        let p = match self {
            NullDistribution::F(dist) => dist.sf(f_stat),
            NullDistribution::ChiSquared { dist, df_test } => dist.sf(f_stat * df_test),
        };
        p.clamp(0.0, 1.0)
    }
}
