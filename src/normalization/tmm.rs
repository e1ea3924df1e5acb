//! Trimmed mean of M-values (TMM) normalization factors

use ndarray::ArrayView2;

use crate::error::{Result, SimError};
use crate::stats::{quantile_type7, sorted_finite};

/// Trimming settings for TMM
#[derive(Debug, Clone, Copy)]
pub struct TmmParams {
    /// Fraction trimmed from each end of the log-ratios
    pub logratio_trim: f64,
    /// Fraction trimmed from each end of the average abundances
    pub sum_trim: f64,
    /// Weight log-ratios by their inverse asymptotic variance
    pub weighted: bool,
}

impl Default for TmmParams {
    fn default() -> Self {
        Self {
            logratio_trim: 0.3,
            sum_trim: 0.05,
            weighted: true,
        }
    }
}

/// 1-based ranks with ties given the average rank
pub(crate) fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end share ranks start+1..=end
        let avg = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
        start = end;
    }
    ranks
}

/// Library whose upper-quartile proportion is closest to the mean upper quartile
fn reference_library(counts: ArrayView2<'_, u32>, lib_sizes: &[f64]) -> usize {
    let upper_quartiles: Vec<f64> = (0..counts.ncols())
        .map(|j| {
            let props: Vec<f64> = counts
                .column(j)
                .iter()
                .map(|&c| c as f64 / lib_sizes[j])
                .collect();
            quantile_type7(&sorted_finite(&props), 0.75)
        })
        .collect();
    let mean_uq = upper_quartiles.iter().sum::<f64>() / upper_quartiles.len() as f64;

    upper_quartiles
        .iter()
        .enumerate()
        .min_by(|a, b| (a.1 - mean_uq).abs().total_cmp(&(b.1 - mean_uq).abs()))
        .map(|(j, _)| j)
        .unwrap_or(0)
}

/// TMM factor of one library against the reference library
fn tmm_factor(obs: &[f64], reference: &[f64], n_obs: f64, n_ref: f64, params: &TmmParams) -> f64 {
    let mut log_ratio = Vec::with_capacity(obs.len());
    let mut abundance = Vec::with_capacity(obs.len());
    let mut variance = Vec::with_capacity(obs.len());

    for (&o, &r) in obs.iter().zip(reference) {
        let lr = ((o / n_obs) / (r / n_ref)).log2();
        let ae = ((o / n_obs).log2() + (r / n_ref).log2()) / 2.0;
        if lr.is_finite() && ae.is_finite() {
            log_ratio.push(lr);
            abundance.push(ae);
            variance.push((n_obs - o) / n_obs / o + (n_ref - r) / n_ref / r);
        }
    }

    let max_abs = log_ratio.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if log_ratio.is_empty() || max_abs < 1e-6 {
        return 1.0;
    }

    let n = log_ratio.len() as f64;
    let lo_l = (n * params.logratio_trim).floor() + 1.0;
    let hi_l = n + 1.0 - lo_l;
    let lo_s = (n * params.sum_trim).floor() + 1.0;
    let hi_s = n + 1.0 - lo_s;

    let rank_lr = average_ranks(&log_ratio);
    let rank_ae = average_ranks(&abundance);

    let (mut num, mut den) = (0.0, 0.0);
    for i in 0..log_ratio.len() {
        let keep = rank_lr[i] >= lo_l && rank_lr[i] <= hi_l && rank_ae[i] >= lo_s && rank_ae[i] <= hi_s;
        if !keep {
            continue;
        }
        if params.weighted {
            num += log_ratio[i] / variance[i];
            den += 1.0 / variance[i];
        } else {
            num += log_ratio[i];
            den += 1.0;
        }
    }

    let f = if den > 0.0 { num / den } else { 0.0 };
    if f.is_finite() {
        2f64.powf(f)
    } else {
        1.0
    }
}

/// TMM normalization factors, scaled to a geometric mean of one
pub fn tmm_factors(counts: ArrayView2<'_, u32>, params: &TmmParams) -> Result<Vec<f64>> {
    let (n_sites, n_libraries) = counts.dim();
    if n_sites == 0 || n_libraries == 0 {
        return Err(SimError::degenerate("count matrix is empty"));
    }

    let lib_sizes: Vec<f64> = (0..n_libraries)
        .map(|j| counts.column(j).iter().map(|&c| c as f64).sum())
        .collect();
    if let Some(j) = lib_sizes.iter().position(|&s| s <= 0.0) {
        return Err(SimError::degenerate(format!("library {} has no counts", j)));
    }

    let ref_col = reference_library(counts, &lib_sizes);
    let reference: Vec<f64> = counts.column(ref_col).iter().map(|&c| c as f64).collect();
    log::debug!("TMM reference library: {}", ref_col);

    let factors: Vec<f64> = (0..n_libraries)
        .map(|j| {
            let obs: Vec<f64> = counts.column(j).iter().map(|&c| c as f64).collect();
            tmm_factor(&obs, &reference, lib_sizes[j], lib_sizes[ref_col], params)
        })
        .collect();

    let log_geo = factors.iter().map(|f| f.ln()).sum::<f64>() / n_libraries as f64;
    Ok(factors.iter().map(|f| f / log_geo.exp()).collect())
}
