//! Statistical utility functions shared across modules
//!
//! Polygamma functions for the quasi-likelihood prior, plus the order
//! statistics used by the evaluator and the repetition summaries.

use std::cmp::Ordering;

/// Digamma function
pub fn digamma(x: f64) -> f64 {
    statrs::function::gamma::digamma(x)
}

/// Trigamma function (derivative of digamma)
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }

    if x >= 8.0 {
        let x2 = x * x;
        let mut result = 1.0 / x + 0.5 / x2;
        result += 1.0 / (6.0 * x2 * x);
        result -= 1.0 / (30.0 * x2 * x2 * x);
        result += 1.0 / (42.0 * x2 * x2 * x2 * x);
        return result;
    }

    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result += 1.0 / (z * z);
        z += 1.0;
    }
    result + trigamma(z)
}

/// Tetragamma function, psi''(x), for x > 0
pub fn tetragamma(x: f64) -> f64 {
    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result -= 2.0 / (z * z * z);
        z += 1.0;
    }
    let z2 = z * z;
    result - 1.0 / z2 - 1.0 / (z2 * z) - 0.5 / (z2 * z2) + 1.0 / (6.0 * z2 * z2 * z2)
        - 1.0 / (6.0 * z2 * z2 * z2 * z2)
}

/// Solve trigamma(x) = y for x > 0 by Newton iteration.
///
/// Follows the starting value and stopping rule of limma's `trigammaInverse`.
pub fn trigamma_inverse(y: f64) -> f64 {
    if !y.is_finite() || y <= 0.0 {
        return f64::NAN;
    }
    if y > 1e7 {
        return 1.0 / y.sqrt();
    }
    if y < 1e-6 {
        return 1.0 / y;
    }

    let mut x = 0.5 + 1.0 / y;
    for _ in 0..50 {
        let tri = trigamma(x);
        let dif = tri * (1.0 - tri / y) / tetragamma(x);
        x += dif;
        if -dif / x < 1e-8 {
            break;
        }
    }
    x
}

fn total_cmp_nan_last(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or_else(|| match (a.is_nan(), b.is_nan()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => Ordering::Equal,
    })
}

/// Sort finite values ascending, dropping NaN and infinities
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(total_cmp_nan_last);
    sorted
}

/// R's quantile type=7 on already sorted data
pub fn quantile_type7(sorted_x: &[f64], p: f64) -> f64 {
    let n = sorted_x.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted_x[0];
    }

    let h = (n as f64 - 1.0) * p.clamp(0.0, 1.0);
    let lo = (h.floor() as usize).min(n - 1);
    let hi = (h.ceil() as usize).min(n - 1);

    if lo == hi {
        sorted_x[lo]
    } else {
        let frac = h - lo as f64;
        sorted_x[lo] + frac * (sorted_x[hi] - sorted_x[lo])
    }
}

/// Median of the finite values, NaN when there are none
pub fn median(values: &[f64]) -> f64 {
    quantile_type7(&sorted_finite(values), 0.5)
}

/// Arithmetic mean of the finite values, NaN when there are none
pub fn mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Sample variance (n - 1 denominator) of the finite values
pub fn variance(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return f64::NAN;
    }
    let m = mean(&finite);
    finite.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (finite.len() as f64 - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigamma() {
        // trigamma(1) = pi^2/6
        let t1 = trigamma(1.0);
        assert!((t1 - std::f64::consts::PI.powi(2) / 6.0).abs() < 1e-8);
        // trigamma(2) = pi^2/6 - 1
        let t2 = trigamma(2.0);
        assert!((t2 - (std::f64::consts::PI.powi(2) / 6.0 - 1.0)).abs() < 1e-8);
    }

    #[test]
    fn test_tetragamma() {
        // psi''(1) = -2 * zeta(3)
        let expected = -2.0 * 1.202_056_903_159_594;
        assert!((tetragamma(1.0) - expected).abs() < 1e-7);
    }

    #[test]
    fn test_trigamma_inverse_round_trip() {
        for &x in &[0.3, 1.0, 2.5, 10.0, 150.0] {
            let y = trigamma(x);
            let back = trigamma_inverse(y);
            assert!((back - x).abs() / x < 1e-6, "x={}, back={}", x, back);
        }
        assert!(trigamma_inverse(-1.0).is_nan());
    }

    #[test]
    fn test_quantile_type7() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_type7(&x, 0.5), 3.0);
        assert_eq!(quantile_type7(&x, 0.0), 1.0);
        assert_eq!(quantile_type7(&x, 1.0), 5.0);
        assert!((quantile_type7(&x, 0.3) - 2.2).abs() < 1e-12);
    }

    #[test]
    fn test_median_and_mean_skip_nan() {
        let x = vec![3.0, f64::NAN, 1.0, 2.0];
        assert_eq!(median(&x), 2.0);
        assert_eq!(mean(&x), 2.0);
        assert!(median(&[]).is_nan());
    }
}
