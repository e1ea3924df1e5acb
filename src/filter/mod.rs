//! Count-based site filters applied before differential testing
//!
//! A filter only sees the count matrix. Rows are ranked by score, ties are
//! broken by a random key drawn per row, and the top `k` rows are kept.

mod strategy;

use rand::Rng;
use serde::Serialize;

use crate::data::CountMatrix;
use crate::error::{Result, SimError};

pub use strategy::FilterStrategy;

/// Rows kept by a filter, in ascending row order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetainedSet {
    strategy: FilterStrategy,
    rows: Vec<usize>,
    scores: Vec<f64>,
}

impl RetainedSet {
    pub fn strategy(&self) -> FilterStrategy {
        self.strategy
    }

    /// Sorted retained row indices
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Score of each retained row, aligned with `rows()`
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Smallest retained score, i.e. the effective threshold
    pub fn min_score(&self) -> Option<f64> {
        self.scores.iter().copied().reduce(f64::min)
    }
}

/// Keep the `k` highest-scoring rows of `counts`
///
/// Rows are stable-sorted by (score descending, tie-break key ascending),
/// where the keys are uniform draws from `rng`, one per row.
pub fn retain_top<R: Rng + ?Sized>(
    counts: &CountMatrix,
    strategy: FilterStrategy,
    k: usize,
    rng: &mut R,
) -> Result<RetainedSet> {
    let n = counts.n_sites();
    if k == 0 {
        return Err(SimError::degenerate("filter asked to retain zero sites"));
    }
    if k > n {
        return Err(SimError::invalid(format!(
            "cannot retain {} sites from a matrix with {} sites",
            k, n
        )));
    }

    let view = counts.counts();
    let scores: Vec<f64> = view.rows().into_iter().map(|row| strategy.score(row)).collect();
    let keys: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .total_cmp(&scores[a])
            .then_with(|| keys[a].total_cmp(&keys[b]))
    });

    let mut rows: Vec<usize> = order[..k].to_vec();
    rows.sort_unstable();
    let kept_scores = rows.iter().map(|&i| scores[i]).collect();

    log::debug!(
        "{} filter kept {} of {} sites (threshold score {})",
        strategy,
        k,
        n,
        scores[order[k - 1]]
    );

    Ok(RetainedSet {
        strategy,
        rows,
        scores: kept_scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Design;
    use crate::rng::seeded;
    use crate::simulate::{simulate_counts, DispersionFn, EffectLayout, SimulationParams};
    use ndarray::array;

    #[test]
    fn test_retains_exactly_k_in_range() {
        let design = Design::balanced(&["a", "b"], 2).unwrap();
        let params = SimulationParams::new(
            1000,
            0.1,
            vec![10.0; 4],
            vec![10.0, 10.0, 20.0, 20.0],
            DispersionFn::constant(0.1),
        );
        let sim = simulate_counts(&design, &params, &mut seeded(2)).unwrap();
        for strategy in FilterStrategy::ALL {
            for &k in &[1, 100, 999, 1000] {
                let kept = retain_top(&sim.counts, strategy, k, &mut seeded(7)).unwrap();
                assert_eq!(kept.len(), k);
                assert!(kept.rows().iter().all(|&r| r < 1000));
                assert!(kept.rows().windows(2).all(|w| w[0] < w[1]));
                assert_eq!(kept.scores().len(), k);
            }
        }
    }

    #[test]
    fn test_k_out_of_range() {
        let counts = CountMatrix::from_counts(array![[1, 2], [3, 4]]);
        let mut rng = seeded(0);
        assert!(matches!(
            retain_top(&counts, FilterStrategy::Mean, 3, &mut rng),
            Err(SimError::InvalidParameter { .. })
        ));
        assert!(matches!(
            retain_top(&counts, FilterStrategy::Mean, 0, &mut rng),
            Err(SimError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn test_keeps_highest_scores() {
        let counts = CountMatrix::from_counts(array![[1, 1], [9, 9], [5, 5], [7, 7]]);
        let kept = retain_top(&counts, FilterStrategy::Mean, 2, &mut seeded(0)).unwrap();
        assert_eq!(kept.rows(), &[1, 3]);
        assert_eq!(kept.min_score(), Some(7.0));
    }

    #[test]
    fn test_ties_broken_randomly() {
        // all rows tie, so the kept row should vary with the seed
        let counts = CountMatrix::from_counts(ndarray::Array2::from_elem((50, 2), 3));
        let picks: std::collections::HashSet<usize> = (0..20)
            .map(|s| retain_top(&counts, FilterStrategy::Maximum, 1, &mut seeded(s)).unwrap().rows()[0])
            .collect();
        assert!(picks.len() > 5);
        assert!(picks.iter().any(|&r| r > 10));
    }

    fn mean_nonnull_fraction(strategy: FilterStrategy, layout: EffectLayout, reps: u64) -> f64 {
        let design = Design::balanced(&["a", "b"], 2).unwrap();
        let n = 10_000;
        let params = SimulationParams::from_layout(
            &design,
            n,
            0.1,
            10.0,
            2.0,
            layout,
            DispersionFn::constant(0.1),
        );
        let mut total = 0.0;
        for seed in 0..reps {
            let mut rng = seeded(100 + seed);
            let sim = simulate_counts(&design, &params, &mut rng).unwrap();
            let kept = retain_top(&sim.counts, strategy, n / 10, &mut rng).unwrap();
            let hits = kept.rows().iter().filter(|&&r| sim.truth.is_nonnull(r)).count();
            total += hits as f64 / kept.len() as f64;
        }
        total / reps as f64
    }

    #[test]
    fn test_mean_filter_does_not_enrich() {
        let frac = mean_nonnull_fraction(FilterStrategy::Mean, EffectLayout::Balanced, 5);
        assert!((frac - 0.1).abs() < 0.03, "mean filter non-null fraction {}", frac);
    }

    #[test]
    fn test_second_highest_and_maximum_enrich() {
        let second = mean_nonnull_fraction(FilterStrategy::SecondHighest, EffectLayout::Balanced, 5);
        let maximum = mean_nonnull_fraction(FilterStrategy::Maximum, EffectLayout::Balanced, 5);
        assert!(second > 0.12, "second-highest fraction {}", second);
        assert!(maximum > second, "maximum {} vs second-highest {}", maximum, second);
    }

    #[test]
    fn test_second_highest_doubled_mean() {
        let frac = mean_nonnull_fraction(FilterStrategy::SecondHighest, EffectLayout::Elevated, 3);
        assert!(frac > 0.15, "non-null fraction {}", frac);
    }
}
