//! Design matrix creation for the NB GLM

use ndarray::Array2;

use crate::data::Design;
use crate::error::{Result, SimError};

/// Column layout of a design matrix
#[derive(Debug, Clone, PartialEq)]
pub struct DesignInfo {
    /// Names of the coefficients
    pub coef_names: Vec<String>,
    /// Reference level of the group factor
    pub reference_level: String,
    /// Group levels, reference first
    pub levels: Vec<String>,
    /// Column of each non-reference group level, aligned with `levels[1..]`
    pub group_columns: Vec<usize>,
}

impl DesignInfo {
    /// Column holding the `level` vs reference coefficient
    pub fn column_for_level(&self, level: &str) -> Result<usize> {
        if level == self.reference_level {
            return Err(SimError::invalid(format!(
                "'{}' is the reference level and has no coefficient",
                level
            )));
        }
        self.levels
            .iter()
            .skip(1)
            .position(|l| l == level)
            .map(|idx| self.group_columns[idx])
            .ok_or_else(|| SimError::invalid(format!("unknown group level '{}'", level)))
    }
}

/// Treatment-coded design matrix: intercept, group levels, then levels of the
/// second factor when present
pub fn design_matrix(design: &Design) -> Result<(Array2<f64>, DesignInfo)> {
    let group = design.group();
    let levels = group.levels().to_vec();
    if levels.len() < 2 {
        return Err(SimError::invalid("a group contrast needs at least two groups"));
    }

    let n = design.n_libraries();
    let second = design.second_factor();
    let n_second = second.map_or(0, |f| f.levels().len().saturating_sub(1));
    let n_coefs = levels.len() + n_second;

    let mut x = Array2::zeros((n, n_coefs));
    let group_codes = group.codes();
    for i in 0..n {
        x[[i, 0]] = 1.0;
        if group_codes[i] > 0 {
            x[[i, group_codes[i]]] = 1.0;
        }
    }

    let mut coef_names = vec!["Intercept".to_string()];
    for level in levels.iter().skip(1) {
        coef_names.push(format!("{}_{}_vs_{}", group.name(), level, levels[0]));
    }

    if let Some(factor) = second {
        let codes = factor.codes();
        let offset = levels.len() - 1;
        for i in 0..n {
            if codes[i] > 0 {
                x[[i, offset + codes[i]]] = 1.0;
            }
        }
        for level in factor.levels().iter().skip(1) {
            coef_names.push(format!(
                "{}_{}_vs_{}",
                factor.name(),
                level,
                factor.reference_level().unwrap_or_default()
            ));
        }
    }

    check_full_rank(&x)?;
    if n <= n_coefs {
        return Err(SimError::invalid(format!(
            "{} libraries leave no residual degrees of freedom for {} coefficients",
            n, n_coefs
        )));
    }

    let info = DesignInfo {
        coef_names,
        reference_level: levels[0].clone(),
        group_columns: (1..levels.len()).collect(),
        levels,
    };
    Ok((x, info))
}

/// Drop one column, e.g. to build the reduced model of a likelihood ratio test
pub fn drop_column(x: &Array2<f64>, column: usize) -> Array2<f64> {
    let keep: Vec<usize> = (0..x.ncols()).filter(|&j| j != column).collect();
    x.select(ndarray::Axis(1), &keep)
}

/// Check whether a design matrix has full column rank
///
/// Rank is computed by Householder QR with column pivoting and the tolerance
/// `max(nrow, ncol) * eps * max(|diag(R)|)`.
pub fn check_full_rank(matrix: &Array2<f64>) -> Result<()> {
    let ncol = matrix.ncols();
    if matrix.nrows() == 0 || ncol == 0 {
        return Err(SimError::invalid("design matrix has zero rows or columns"));
    }

    if qr_rank(matrix) < ncol {
        let has_zero_column = (0..ncol).any(|j| matrix.column(j).iter().all(|&v| v == 0.0));
        let reason = if has_zero_column {
            "design matrix is not full rank: a level has no libraries"
        } else {
            "design matrix is not full rank: factors are confounded"
        };
        return Err(SimError::invalid(reason));
    }
    Ok(())
}

fn qr_rank(matrix: &Array2<f64>) -> usize {
    let nrow = matrix.nrows();
    let ncol = matrix.ncols();
    let k = nrow.min(ncol);
    let mut r = matrix.to_owned();

    let mut col_norms_sq: Vec<f64> = (0..ncol)
        .map(|j| r.column(j).iter().map(|&v| v * v).sum())
        .collect();

    for step in 0..k {
        let best_col = (step..ncol)
            .max_by(|&a, &b| col_norms_sq[a].total_cmp(&col_norms_sq[b]))
            .unwrap_or(step);
        if best_col != step {
            for i in 0..nrow {
                r.swap([i, step], [i, best_col]);
            }
            col_norms_sq.swap(step, best_col);
        }

        let mut alpha = (step..nrow).map(|i| r[[i, step]] * r[[i, step]]).sum::<f64>().sqrt();
        if alpha < f64::EPSILON * 1e3 {
            break;
        }
        if r[[step, step]] > 0.0 {
            alpha = -alpha;
        }

        let v0 = r[[step, step]] - alpha;
        r[[step, step]] = alpha;
        let v_norm_sq = v0 * v0 + ((step + 1)..nrow).map(|i| r[[i, step]] * r[[i, step]]).sum::<f64>();
        if v_norm_sq.abs() < f64::MIN_POSITIVE {
            continue;
        }
        let tau = 2.0 / v_norm_sq;

        for j in (step + 1)..ncol {
            let dot = v0 * r[[step, j]] + ((step + 1)..nrow).map(|i| r[[i, step]] * r[[i, j]]).sum::<f64>();
            let scale = tau * dot;
            r[[step, j]] -= scale * v0;
            for i in (step + 1)..nrow {
                r[[i, j]] -= scale * r[[i, step]];
            }
            col_norms_sq[j] = (col_norms_sq[j] - r[[step, j]] * r[[step, j]]).max(0.0);
        }
    }

    let max_abs_diag = (0..k).map(|i| r[[i, i]].abs()).fold(0.0f64, f64::max);
    let tol = nrow.max(ncol) as f64 * f64::EPSILON * max_abs_diag;
    (0..k).filter(|&i| r[[i, i]].abs() > tol).count()
}
