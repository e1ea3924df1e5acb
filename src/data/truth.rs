//! Ground-truth labels of simulated sites
//!
//! Only the evaluator reads these. Filters and differential tests take a
//! `CountMatrix` and never see a `GroundTruth`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Null / non-null status for every simulated site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    nonnull: Vec<bool>,
}

impl GroundTruth {
    /// Labels with the given rows marked non-null
    pub fn from_nonnull(n_sites: usize, nonnull_rows: &[usize]) -> Result<Self> {
        let mut nonnull = vec![false; n_sites];
        for &r in nonnull_rows {
            if r >= n_sites {
                return Err(SimError::invalid(format!(
                    "non-null row {} out of range for {} sites",
                    r, n_sites
                )));
            }
            nonnull[r] = true;
        }
        Ok(Self { nonnull })
    }

    /// Labels where the first `n_nonnull` rows are non-null
    pub fn leading(n_sites: usize, n_nonnull: usize) -> Self {
        let nonnull = (0..n_sites).map(|i| i < n_nonnull).collect();
        Self { nonnull }
    }

    pub fn n_sites(&self) -> usize {
        self.nonnull.len()
    }

    pub fn is_nonnull(&self, site: usize) -> bool {
        self.nonnull.get(site).copied().unwrap_or(false)
    }

    pub fn n_nonnull(&self) -> usize {
        self.nonnull.iter().filter(|&&b| b).count()
    }

    pub fn n_null(&self) -> usize {
        self.n_sites() - self.n_nonnull()
    }

    pub fn null_sites(&self) -> Vec<usize> {
        (0..self.n_sites()).filter(|&i| !self.nonnull[i]).collect()
    }

    pub fn nonnull_sites(&self) -> Vec<usize> {
        (0..self.n_sites()).filter(|&i| self.nonnull[i]).collect()
    }
}
