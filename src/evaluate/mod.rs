//! Evaluation of test outputs against ground truth
//!
//! This is the only module that reads `GroundTruth`.

mod calibration;
mod summary;

pub use calibration::{
    calibration_curve, log_spaced_levels, CalibrationCurve, CalibrationPoint, MIN_STABLE_COUNT,
};
pub use summary::{
    false_discovery_proportion, nonnull_fraction, rejection_rate, split_by_truth, RepSummary,
    TruthSplit,
};
