//! False discovery rate procedures
//!
//! - Benjamini-Hochberg adjusted p-values
//! - the empirical directional estimate, which compares rejections in the
//!   expected direction against rejections in the opposite direction

use crate::error::{Result, SimError};

fn ascending_order(pvalues: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..pvalues.len()).collect();
    // NaN sorts last
    indices.sort_by(|&a, &b| match (pvalues[a].is_nan(), pvalues[b].is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => pvalues[a].total_cmp(&pvalues[b]),
    });
    indices
}

/// Apply Benjamini-Hochberg FDR correction to p-values
///
/// NaN p-values stay NaN and do not count towards the number of tests.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    let m = pvalues.iter().filter(|p| !p.is_nan()).count();
    if m == 0 {
        return vec![f64::NAN; n];
    }

    let mut padj = vec![f64::NAN; n];
    let mut cummin = f64::INFINITY;
    let mut rank = m;
    for &i in ascending_order(pvalues).iter().rev() {
        let p = pvalues[i];
        if p.is_nan() {
            continue;
        }
        let adj = (p * m as f64 / rank as f64).min(1.0);
        cummin = cummin.min(adj);
        padj[i] = cummin;
        rank -= 1;
    }
    padj
}

/// Empirical FDR from a directional sign test
///
/// `signs[i] > 0` marks a site whose estimated effect points in the expected
/// direction, `signs[i] < 0` the opposite direction; zero counts as neither.
/// At each threshold `t` the estimate is
/// `#{wrong, p <= t} / #{right, p <= t}`, capped at one and equal to one when
/// nothing in the right direction is rejected. Sites with `p >= 1` get one.
/// A cumulative minimum from the largest p-value down makes the estimate
/// non-increasing as the threshold tightens. Tied p-values share an estimate.
pub fn directional_fdr(pvalues: &[f64], signs: &[f64]) -> Result<Vec<f64>> {
    if pvalues.len() != signs.len() {
        return Err(SimError::invalid(format!(
            "{} p-values but {} signs",
            pvalues.len(),
            signs.len()
        )));
    }
    if pvalues.iter().chain(signs).any(|v| v.is_nan()) {
        return Err(SimError::invalid("directional FDR input contains NaN"));
    }

    let order = ascending_order(pvalues);
    let n = order.len();

    // (end index into `order`, estimate) for each block of tied p-values
    let mut blocks: Vec<(usize, f64)> = Vec::new();
    let (mut right, mut wrong) = (0usize, 0usize);
    let mut start = 0;
    while start < n {
        let p = pvalues[order[start]];
        let mut end = start;
        while end < n && pvalues[order[end]] == p {
            let s = signs[order[end]];
            if s > 0.0 {
                right += 1;
            } else if s < 0.0 {
                wrong += 1;
            }
            end += 1;
        }
        let estimate = if p >= 1.0 || right == 0 {
            1.0
        } else {
            (wrong as f64 / right as f64).min(1.0)
        };
        blocks.push((end, estimate));
        start = end;
    }

    let mut fdr = vec![1.0; n];
    let mut running = 1.0f64;
    for (b, &(end, estimate)) in blocks.iter().enumerate().rev() {
        running = running.min(estimate);
        let begin = if b == 0 { 0 } else { blocks[b - 1].0 };
        for &i in &order[begin..end] {
            fdr[i] = running;
        }
    }
    Ok(fdr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seeded;
    use rand::Rng;

    #[test]
    fn test_bh_basic() {
        let pvalues = vec![0.01, 0.04, 0.03, 0.02];
        let padj = benjamini_hochberg(&pvalues);
        assert!(padj.iter().all(|&p| (p - 0.04).abs() < 1e-12));
    }

    #[test]
    fn test_bh_with_nan() {
        let padj = benjamini_hochberg(&[0.01, f64::NAN, 0.03, 0.02]);
        assert!((padj[0] - 0.03).abs() < 1e-12);
        assert!(padj[1].is_nan());
        assert!((padj[2] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_bh_ordering() {
        let padj = benjamini_hochberg(&[0.001, 0.01, 0.05, 0.1]);
        assert!(padj.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_directional_fdr_simple() {
        let p = [0.01, 0.02, 0.03, 0.04];
        let s = [1.0, 1.0, -1.0, 1.0];
        let fdr = directional_fdr(&p, &s).unwrap();
        // raw estimates 0, 0, 1/2, 1/3; the cumulative minimum lowers 1/2 to 1/3
        assert_eq!(fdr[0], 0.0);
        assert_eq!(fdr[1], 0.0);
        assert!((fdr[2] - 1.0 / 3.0).abs() < 1e-12);
        assert!((fdr[3] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_right_direction_rejections() {
        let fdr = directional_fdr(&[0.01, 0.5], &[-1.0, -1.0]).unwrap();
        assert_eq!(fdr, vec![1.0, 1.0]);
    }

    #[test]
    fn test_p_equal_one_gets_one() {
        let fdr = directional_fdr(&[0.2, 1.0, 1.0], &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(fdr, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_ties_share_estimate() {
        let fdr = directional_fdr(&[0.1, 0.1, 0.1], &[1.0, -1.0, 1.0]).unwrap();
        assert!(fdr.iter().all(|&f| (f - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_monotone_for_random_input() {
        let mut rng = seeded(77);
        for _ in 0..50 {
            let n = rng.gen_range(1..200);
            let p: Vec<f64> = (0..n).map(|_| (rng.gen::<f64>() * 20.0).floor() / 19.0).collect();
            let s: Vec<f64> = (0..n).map(|_| rng.gen_range(-1..=1) as f64).collect();
            let fdr = directional_fdr(&p, &s).unwrap();
            let order = ascending_order(&p);
            for w in order.windows(2) {
                assert!(fdr[w[0]] <= fdr[w[1]] + 1e-15);
            }
            assert!(fdr.iter().all(|&f| (0.0..=1.0).contains(&f)));
        }
    }

    #[test]
    fn test_anticonservative_when_nulls_lean_one_way() {
        // every null site drifts in the expected direction, so nothing is
        // counted as wrong and the estimate is zero although all are false
        let p: Vec<f64> = (1..=100).map(|i| i as f64 / 1000.0).collect();
        let s = vec![1.0; 100];
        let fdr = directional_fdr(&p, &s).unwrap();
        assert!(fdr.iter().all(|&f| f == 0.0));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(directional_fdr(&[0.1], &[1.0, 1.0]).is_err());
        assert!(matches!(
            directional_fdr(&[f64::NAN], &[1.0]),
            Err(SimError::InvalidParameter { .. })
        ));
    }
}
