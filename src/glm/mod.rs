//! Generalized Linear Model fitting for negative binomial data

mod design;
mod fitting;
mod negative_binomial;

pub use design::{check_full_rank, design_matrix, drop_column, DesignInfo};
pub use fitting::{fit_nb_glm, fit_nb_glm_rows, log_det_xtwx, xtwx, GlmFitParams, NbGlmFit};
pub use negative_binomial::{
    nb_log_likelihood, nb_mean, nb_unit_deviance, nb_variance, nb_weight, MAX_LFC_BETA, MIN_MU,
};
