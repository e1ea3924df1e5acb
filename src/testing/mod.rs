//! Differential binding tests
//!
//! A test takes counts, a design and a contrast, and returns one p-value per
//! input row. It never sees ground-truth labels.

mod fdr;
mod pvalue;
mod qlf;

pub use fdr::{benjamini_hochberg, directional_fdr};
pub use pvalue::NullDistribution;
pub use qlf::QlfTest;

use serde::{Deserialize, Serialize};

use crate::data::{CountMatrix, Design};
use crate::error::{Result, SimError};
use crate::glm::DesignInfo;

/// Coefficient to test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Contrast {
    /// A group level against the reference level
    Level(String),
    /// A design-matrix column by index; column 0 is the intercept
    Coefficient(usize),
}

impl Contrast {
    pub fn level(level: &str) -> Self {
        Contrast::Level(level.to_string())
    }

    /// Last group level against the reference level
    pub fn last_level(design: &Design) -> Result<Self> {
        let levels = design.group().levels();
        if levels.len() < 2 {
            return Err(SimError::invalid("a group contrast needs at least two groups"));
        }
        Ok(Contrast::Level(levels[levels.len() - 1].clone()))
    }

    /// Design-matrix column tested by this contrast
    pub fn resolve(&self, info: &DesignInfo) -> Result<usize> {
        match self {
            Contrast::Level(level) => info.column_for_level(level),
            Contrast::Coefficient(0) => Err(SimError::invalid("the intercept cannot be tested")),
            Contrast::Coefficient(j) if *j < info.coef_names.len() => Ok(*j),
            Contrast::Coefficient(j) => Err(SimError::invalid(format!(
                "coefficient {} out of range for {} coefficients",
                j,
                info.coef_names.len()
            ))),
        }
    }
}

/// Per-row results of a differential test
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    /// One p-value per input row
    pub pvalues: Vec<f64>,
    /// log2 fold change of the tested coefficient, per input row
    pub log_fold_changes: Vec<f64>,
    pub common_dispersion: f64,
    pub prior_df: f64,
    pub prior_s2: f64,
    /// Rows whose fit did not converge
    pub n_nonconverged: usize,
}

impl TestOutcome {
    pub fn len(&self) -> usize {
        self.pvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pvalues.is_empty()
    }

    /// Sign of each log fold change (+1, -1, or 0)
    pub fn signs(&self) -> Vec<f64> {
        self.log_fold_changes
            .iter()
            .map(|&l| if l > 0.0 { 1.0 } else if l < 0.0 { -1.0 } else { 0.0 })
            .collect()
    }
}

/// A differential binding test
pub trait DifferentialTest: Sync {
    fn name(&self) -> &str;

    /// Test every row of `counts` for the `contrast` coefficient of `design`
    fn test(&self, counts: &CountMatrix, design: &Design, contrast: &Contrast) -> Result<TestOutcome>;
}
