//! # dbsim
//!
//! Monte Carlo studies of statistical pitfalls in ChIP-seq differential
//! binding analyses. Counts are simulated from negative binomial models,
//! optionally filtered, tested with an NB GLM quasi-likelihood F-test and
//! evaluated against the known truth.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dbsim::prelude::*;
//!
//! fn main() -> dbsim::error::Result<()> {
//!     let params = FilterParams {
//!         n_sites: 5000,
//!         ..Default::default()
//!     };
//!     let report = dbsim::scenario::filter::run(&params, 4, 42, &QlfTest::default())?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod data;
pub mod dispersion;
pub mod error;
pub mod evaluate;
pub mod filter;
pub mod glm;
pub mod io;
pub mod normalization;
pub mod rng;
pub mod scenario;
pub mod simulate;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::data::{CountMatrix, Design, GroundTruth};
    pub use crate::error::{Result, SimError};
    pub use crate::evaluate::{calibration_curve, rejection_rate, split_by_truth, CalibrationCurve};
    pub use crate::filter::{retain_top, FilterStrategy, RetainedSet};
    pub use crate::normalization::NormalizationMethod;
    pub use crate::rng::{seeded, RepetitionSeeds, SimRng};
    pub use crate::scenario::{FdrParams, FilterParams, NormalizationParams, SubtractionParams};
    pub use crate::simulate::{simulate_counts, DispersionFn, EffectLayout, SimulationParams};
    pub use crate::testing::{directional_fdr, Contrast, DifferentialTest, QlfTest, TestOutcome};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::stats::median;

    #[test]
    fn test_full_pipeline() {
        let design = Design::balanced(&["control", "treated"], 2).unwrap();
        let params = SimulationParams::from_layout(
            &design,
            2000,
            0.1,
            20.0,
            4.0,
            EffectLayout::Elevated,
            DispersionFn::constant(0.05),
        );
        let mut rng = seeded(2024);
        let sim = simulate_counts(&design, &params, &mut rng).unwrap();

        let retained = retain_top(&sim.counts, FilterStrategy::Mean, 1000, &mut rng).unwrap();
        let filtered = sim.counts.subset_rows(retained.rows()).unwrap();
        let outcome = QlfTest::default()
            .test(&filtered, &design, &Contrast::last_level(&design).unwrap())
            .unwrap();
        assert_eq!(outcome.len(), retained.len());

        let split = split_by_truth(retained.rows(), &outcome.pvalues, &sim.truth).unwrap();
        assert!(!split.nonnull.is_empty());
        assert!(median(&split.nonnull) < 0.01);
        assert!(median(&split.null) > 0.3);
    }
}
