//! Core data structures: counts, designs and ground-truth labels

mod count_matrix;
mod design;
mod truth;

pub use count_matrix::CountMatrix;
pub use design::{Design, Factor};
pub use truth::GroundTruth;
