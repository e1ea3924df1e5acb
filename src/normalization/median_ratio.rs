//! Median-of-ratios size factors

use ndarray::{ArrayView2, Axis};

use crate::error::{Result, SimError};
use crate::stats::median;

/// Median-of-ratios size factor for every library
///
/// Only rows with a positive count in every library contribute to the
/// geometric-mean reference.
pub fn median_ratio_size_factors(counts: ArrayView2<'_, u32>) -> Result<Vec<f64>> {
    let (n_sites, n_libraries) = counts.dim();
    if n_sites == 0 || n_libraries == 0 {
        return Err(SimError::degenerate("count matrix is empty"));
    }

    // log geometric mean of each all-positive row
    let reference: Vec<(usize, f64)> = counts
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().all(|&c| c > 0))
        .map(|(i, row)| {
            let log_mean = row.iter().map(|&c| (c as f64).ln()).sum::<f64>() / n_libraries as f64;
            (i, log_mean)
        })
        .collect();

    if reference.is_empty() {
        return Err(SimError::degenerate(
            "median-ratio normalization needs at least one site with all counts positive",
        ));
    }

    let size_factors: Vec<f64> = (0..n_libraries)
        .map(|j| {
            let log_ratios: Vec<f64> = reference
                .iter()
                .map(|&(i, log_geo)| (counts[[i, j]] as f64).ln() - log_geo)
                .collect();
            median(&log_ratios).exp()
        })
        .collect();

    if size_factors.iter().any(|&s| !s.is_finite() || s <= 0.0) {
        return Err(SimError::NumericalInstability {
            operation: "median-ratio normalization".to_string(),
            details: format!("invalid size factors {:?}", size_factors),
        });
    }
    Ok(size_factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_proportional_libraries() {
        let counts = array![[10u32, 20, 40], [5, 10, 20], [30, 60, 120]];
        let sf = median_ratio_size_factors(counts.view()).unwrap();
        assert!((sf[1] / sf[0] - 2.0).abs() < 1e-10);
        assert!((sf[2] / sf[0] - 4.0).abs() < 1e-10);
        let geo: f64 = sf.iter().map(|s| s.ln()).sum::<f64>() / 3.0;
        assert!(geo.abs() < 1e-10);
    }

    #[test]
    fn test_rows_with_zeros_skipped() {
        let counts = array![[0u32, 20], [5, 10], [30, 60]];
        let sf = median_ratio_size_factors(counts.view()).unwrap();
        assert!((sf[1] / sf[0] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_all_rows_have_zeros() {
        let counts = array![[0u32, 1], [1, 0]];
        assert!(matches!(
            median_ratio_size_factors(counts.view()),
            Err(SimError::DegenerateInput { .. })
        ));
    }
}
