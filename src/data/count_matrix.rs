//! Count matrix representation for ChIP-seq window counts

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{Result, SimError};

/// Read counts for genomic sites (rows) in sequencing libraries (columns)
///
/// The matrix is never modified in place. Filtering and control subtraction
/// produce new matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct CountMatrix {
    counts: Array2<u32>,
    library_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a count matrix with explicit library identifiers
    pub fn new(counts: Array2<u32>, library_ids: Vec<String>) -> Result<Self> {
        if library_ids.len() != counts.ncols() {
            return Err(SimError::DimensionMismatch {
                expected: format!("{} library IDs", counts.ncols()),
                got: format!("{} library IDs", library_ids.len()),
            });
        }
        Ok(Self { counts, library_ids })
    }

    /// Create a count matrix with generated library identifiers (`lib1`, `lib2`, ...)
    pub fn from_counts(counts: Array2<u32>) -> Self {
        let library_ids = (1..=counts.ncols()).map(|j| format!("lib{}", j)).collect();
        Self { counts, library_ids }
    }

    pub fn n_sites(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_libraries(&self) -> usize {
        self.counts.ncols()
    }

    pub fn counts(&self) -> ArrayView2<'_, u32> {
        self.counts.view()
    }

    pub fn library_ids(&self) -> &[String] {
        &self.library_ids
    }

    /// Counts as floating point, as consumed by the GLM code
    pub fn to_f64(&self) -> Array2<f64> {
        self.counts.mapv(f64::from)
    }

    /// Total counts per library
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts
            .axis_iter(Axis(1))
            .map(|col| col.iter().map(|&c| c as f64).sum())
            .collect()
    }

    /// Mean count per site across libraries
    pub fn site_means(&self) -> Vec<f64> {
        let n = self.n_libraries().max(1) as f64;
        self.counts
            .axis_iter(Axis(0))
            .map(|row| row.iter().map(|&c| c as f64).sum::<f64>() / n)
            .collect()
    }

    /// Keep the given rows, in the given order
    pub fn subset_rows(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.n_sites()) {
            return Err(SimError::invalid(format!(
                "row index {} out of range for {} sites",
                bad,
                self.n_sites()
            )));
        }
        Ok(Self {
            counts: self.counts.select(Axis(0), rows),
            library_ids: self.library_ids.clone(),
        })
    }

    /// Element-wise `self - other`, with negative differences clamped to zero
    ///
    /// `other` must have the same shape; it is usually the matched control
    /// library for each ChIP library.
    pub fn subtract_clamped(&self, other: &CountMatrix) -> Result<Self> {
        if self.counts.dim() != other.counts.dim() {
            return Err(SimError::DimensionMismatch {
                expected: format!("{:?}", self.counts.dim()),
                got: format!("{:?}", other.counts.dim()),
            });
        }
        let mut out = self.counts.clone();
        out.zip_mut_with(&other.counts, |a, &b| *a = a.saturating_sub(b));
        Ok(Self {
            counts: out,
            library_ids: self.library_ids.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_count_matrix_creation() {
        let m = CountMatrix::new(
            array![[10, 20, 30], [5, 15, 25]],
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap();
        assert_eq!(m.n_sites(), 2);
        assert_eq!(m.n_libraries(), 3);
    }

    #[test]
    fn test_library_id_mismatch_rejected() {
        let result = CountMatrix::new(array![[1, 2]], vec!["a".into()]);
        assert!(matches!(result, Err(SimError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_library_sizes_and_means() {
        let m = CountMatrix::from_counts(array![[10, 20], [5, 15]]);
        assert_eq!(m.library_sizes(), vec![15.0, 35.0]);
        assert_eq!(m.site_means(), vec![15.0, 10.0]);
        assert_eq!(m.library_ids(), &["lib1".to_string(), "lib2".to_string()]);
    }

    #[test]
    fn test_subset_rows() {
        let m = CountMatrix::from_counts(array![[1, 1], [2, 2], [3, 3]]);
        let s = m.subset_rows(&[2, 0]).unwrap();
        assert_eq!(s.counts(), array![[3, 3], [1, 1]].view());
        assert!(m.subset_rows(&[3]).is_err());
    }

    #[test]
    fn test_subtract_clamped() {
        let chip = CountMatrix::from_counts(array![[10, 2], [0, 7]]);
        let ctrl = CountMatrix::from_counts(array![[4, 5], [3, 7]]);
        let sub = chip.subtract_clamped(&ctrl).unwrap();
        assert_eq!(sub.counts(), array![[6, 0], [0, 0]].view());

        let wrong = CountMatrix::from_counts(array![[1, 1, 1]]);
        assert!(chip.subtract_clamped(&wrong).is_err());
    }
}
