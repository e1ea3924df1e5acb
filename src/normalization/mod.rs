//! Library normalization: TMM, median-of-ratios, or raw library sizes
//!
//! Every method is expressed as a normalization factor per library, so that
//! the effective library size is `column sum * factor`. Factors have a
//! geometric mean of one.

mod median_ratio;
mod tmm;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::CountMatrix;
use crate::error::{Result, SimError};

pub use median_ratio::median_ratio_size_factors;
pub use tmm::{tmm_factors, TmmParams};

/// Normalization applied before the GLM fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationMethod {
    /// Raw library sizes
    None,
    #[default]
    Tmm,
    MedianRatio,
}

impl fmt::Display for NormalizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationMethod::None => write!(f, "none"),
            NormalizationMethod::Tmm => write!(f, "tmm"),
            NormalizationMethod::MedianRatio => write!(f, "median-ratio"),
        }
    }
}

impl FromStr for NormalizationMethod {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(NormalizationMethod::None),
            "tmm" => Ok(NormalizationMethod::Tmm),
            "median-ratio" | "median_ratio" | "rle" => Ok(NormalizationMethod::MedianRatio),
            other => Err(SimError::invalid(format!("unknown normalization method '{}'", other))),
        }
    }
}

/// Normalization factor for every library
pub fn normalization_factors(counts: &CountMatrix, method: NormalizationMethod) -> Result<Vec<f64>> {
    match method {
        NormalizationMethod::None => Ok(vec![1.0; counts.n_libraries()]),
        NormalizationMethod::Tmm => tmm_factors(counts.counts(), &TmmParams::default()),
        NormalizationMethod::MedianRatio => {
            let lib_sizes = counts.library_sizes();
            let sf = median_ratio_size_factors(counts.counts())?;
            // size factor = lib_size * factor, up to a constant
            let raw: Vec<f64> = sf.iter().zip(&lib_sizes).map(|(s, l)| s / l).collect();
            let log_geo = raw.iter().map(|f| f.ln()).sum::<f64>() / raw.len() as f64;
            Ok(raw.iter().map(|f| f / log_geo.exp()).collect())
        }
    }
}

/// Column sums multiplied by the normalization factors
pub fn effective_library_sizes(counts: &CountMatrix, method: NormalizationMethod) -> Result<Vec<f64>> {
    let factors = normalization_factors(counts, method)?;
    let lib_sizes = counts.library_sizes();
    if let Some(j) = lib_sizes.iter().position(|&s| s <= 0.0) {
        return Err(SimError::degenerate(format!("library {} has no counts", j)));
    }
    Ok(lib_sizes.iter().zip(&factors).map(|(l, f)| l * f).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_none_uses_library_sizes() {
        let counts = CountMatrix::from_counts(array![[10, 30], [10, 10]]);
        let eff = effective_library_sizes(&counts, NormalizationMethod::None).unwrap();
        assert_eq!(eff, vec![20.0, 40.0]);
    }

    #[test]
    fn test_median_ratio_factors_are_centered() {
        let counts = CountMatrix::from_counts(array![[10, 20], [5, 10], [30, 60], [8, 100]]);
        let f = normalization_factors(&counts, NormalizationMethod::MedianRatio).unwrap();
        let log_geo: f64 = f.iter().map(|x| x.ln()).sum();
        assert!(log_geo.abs() < 1e-12);
    }

    #[test]
    fn test_parse() {
        assert_eq!("TMM".parse::<NormalizationMethod>().unwrap(), NormalizationMethod::Tmm);
        assert_eq!(NormalizationMethod::MedianRatio.to_string(), "median-ratio");
        assert!("quantile".parse::<NormalizationMethod>().is_err());
    }
}
