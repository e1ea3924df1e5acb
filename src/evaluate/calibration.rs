//! Observed-versus-expected calibration curves for null p-values

use serde::Serialize;

use crate::error::{Result, SimError};

/// Points supported by fewer observations than this are unstable and dropped
pub const MIN_STABLE_COUNT: usize = 20;

/// One point of a calibration curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationPoint {
    /// Nominal level `(i - 0.5) / m`
    pub expected: f64,
    /// Fraction of p-values below the nominal level
    pub observed: f64,
    /// Number of p-values below the nominal level
    pub count: usize,
    /// `observed / expected`; above one means anticonservative
    pub ratio: f64,
}

/// Calibration curve restricted to its stable range
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationCurve {
    n_pvalues: usize,
    points: Vec<CalibrationPoint>,
}

/// Build the calibration curve of a set of null p-values
///
/// For `i = 1..m` the expected level is `(i - 0.5)/m` and the count is the
/// number of p-values strictly below it. Only points with a count of at least
/// `MIN_STABLE_COUNT` are kept.
pub fn calibration_curve(null_pvalues: &[f64]) -> Result<CalibrationCurve> {
    let m = null_pvalues.len();
    if m == 0 {
        return Err(SimError::degenerate("no null p-values for calibration"));
    }
    if null_pvalues.iter().any(|p| p.is_nan()) {
        return Err(SimError::invalid("calibration input contains NaN p-values"));
    }

    let mut sorted = null_pvalues.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mf = m as f64;
    let points = (1..=m)
        .filter_map(|i| {
            let expected = (i as f64 - 0.5) / mf;
            let count = sorted.partition_point(|&p| p < expected);
            if count < MIN_STABLE_COUNT {
                return None;
            }
            let observed = count as f64 / mf;
            Some(CalibrationPoint {
                expected,
                observed,
                count,
                ratio: observed / expected,
            })
        })
        .collect();

    Ok(CalibrationCurve { n_pvalues: m, points })
}

impl CalibrationCurve {
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn n_pvalues(&self) -> usize {
        self.n_pvalues
    }

    /// True when no point reaches the stability threshold
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest and largest expected level in the stable range
    pub fn stable_range(&self) -> Option<(f64, f64)> {
        Some((self.points.first()?.expected, self.points.last()?.expected))
    }

    /// Step-function ratio at a nominal level; `None` outside the stable range
    pub fn ratio_at(&self, alpha: f64) -> Option<f64> {
        let (lo, hi) = self.stable_range()?;
        if alpha.is_nan() || alpha < lo || alpha > hi {
            return None;
        }
        let idx = self.points.partition_point(|pt| pt.expected <= alpha);
        self.points.get(idx.checked_sub(1)?).map(|pt| pt.ratio)
    }

    /// Largest ratio over the stable range
    pub fn max_ratio(&self) -> Option<f64> {
        self.points.iter().map(|p| p.ratio).reduce(f64::max)
    }

    /// Mean ratio over the stable range
    pub fn mean_ratio(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.points.iter().map(|p| p.ratio).sum::<f64>() / self.points.len() as f64)
    }
}

/// `n` nominal levels evenly spaced on the log scale between `lo` and `hi`
pub fn log_spaced_levels(lo: f64, hi: f64, n: usize) -> Result<Vec<f64>> {
    if !(lo > 0.0 && hi > lo && hi <= 1.0) || n < 2 {
        return Err(SimError::invalid(format!(
            "nominal level grid needs 0 < lo < hi <= 1 and n >= 2, got lo={}, hi={}, n={}",
            lo, hi, n
        )));
    }
    let (a, b) = (lo.ln(), hi.ln());
    Ok((0..n)
        .map(|k| (a + (b - a) * k as f64 / (n - 1) as f64).exp())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seeded;
    use rand::Rng;

    #[test]
    fn test_uniform_pvalues_are_calibrated() {
        // one uniform draw per stratum of width 1/m
        let mut rng = seeded(31);
        let m = 10_000;
        let p: Vec<f64> = (0..m).map(|k| (k as f64 + rng.gen::<f64>()) / m as f64).collect();
        let curve = calibration_curve(&p).unwrap();
        assert!(!curve.is_empty());
        for pt in curve.points() {
            assert!(pt.count >= MIN_STABLE_COUNT);
            assert!((pt.ratio - 1.0).abs() <= 0.15, "ratio {} at {}", pt.ratio, pt.expected);
        }
    }

    #[test]
    fn test_iid_uniform_pvalues_are_calibrated() {
        let mut rng = seeded(32);
        let p: Vec<f64> = (0..20_000).map(|_| rng.gen::<f64>()).collect();
        let curve = calibration_curve(&p).unwrap();
        for pt in curve.points().iter().filter(|pt| pt.count >= 1000) {
            assert!((pt.ratio - 1.0).abs() <= 0.15, "ratio {} at {}", pt.ratio, pt.expected);
        }
        let mean = curve.mean_ratio().unwrap();
        assert!((mean - 1.0).abs() < 0.05, "mean ratio {}", mean);
    }

    #[test]
    fn test_exact_counts() {
        // p = 0, 0.01, ..., 0.99, so exactly i values lie below (i - 0.5)/m
        let m = 100;
        let p: Vec<f64> = (0..m).map(|k| k as f64 / m as f64).collect();
        let curve = calibration_curve(&p).unwrap();
        let first = curve.points()[0];
        assert_eq!(first.count, 20);
        assert!((first.expected - 0.195).abs() < 1e-12);
        assert!((first.observed - 0.2).abs() < 1e-12);
        assert_eq!(curve.points().len(), 81);
    }

    #[test]
    fn test_unstable_points_dropped() {
        let p: Vec<f64> = (0..15).map(|i| i as f64 / 15.0).collect();
        let curve = calibration_curve(&p).unwrap();
        assert!(curve.is_empty());
        assert_eq!(curve.ratio_at(0.5), None);
    }

    #[test]
    fn test_anticonservative_curve() {
        // squaring pushes uniform p-values towards zero
        let mut rng = seeded(3);
        let p: Vec<f64> = (0..5000).map(|_| rng.gen::<f64>().powi(2)).collect();
        let curve = calibration_curve(&p).unwrap();
        let r = curve.ratio_at(0.05).unwrap();
        // P(U^2 < a) = sqrt(a), so the ratio at 0.05 is about 4.5
        assert!(r > 3.5 && r < 5.5, "ratio {}", r);
    }

    #[test]
    fn test_ratio_at_outside_range() {
        let mut rng = seeded(9);
        let p: Vec<f64> = (0..1000).map(|_| rng.gen::<f64>()).collect();
        let curve = calibration_curve(&p).unwrap();
        let (lo, _) = curve.stable_range().unwrap();
        assert!(curve.ratio_at(lo / 2.0).is_none());
        assert!(curve.ratio_at(lo).is_some());
    }

    #[test]
    fn test_errors() {
        assert!(matches!(calibration_curve(&[]), Err(SimError::DegenerateInput { .. })));
        assert!(matches!(
            calibration_curve(&[0.1, f64::NAN]),
            Err(SimError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_log_spaced_levels() {
        let g = log_spaced_levels(1e-3, 1e-1, 3).unwrap();
        assert!((g[1] - 1e-2).abs() < 1e-12);
        assert!(log_spaced_levels(0.0, 0.1, 3).is_err());
    }
}
