//! Command-line interface for dbsim

use clap::{Args, Parser, Subcommand};

use crate::filter::FilterStrategy;
use crate::normalization::NormalizationMethod;
use crate::scenario::{FdrParams, FilterParams, NormalizationParams, SubtractionParams};
use crate::simulate::EffectLayout;

#[derive(Parser, Debug)]
#[command(name = "dbsim")]
#[command(version)]
#[command(about = "Simulations of statistical pitfalls in ChIP-seq differential binding")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of threads (0 = auto)
    #[arg(short = 't', long, global = true, default_value_t = 0)]
    pub threads: usize,
}

/// Options shared by every study
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Number of repetitions
    #[arg(short, long, default_value_t = 10)]
    pub reps: usize,

    /// Master seed; every repetition derives its own generator from it
    #[arg(short, long, default_value_t = 42)]
    pub seed: u64,

    /// Output prefix; writes <prefix>.json and <prefix>_calibration.csv
    #[arg(short, long)]
    pub output: Option<String>,

    /// Library normalization used by the test
    #[arg(long, default_value_t = NormalizationMethod::Tmm,
        long_help = "Library normalization used by the differential test.\n\
            tmm:          trimmed mean of M-values\n\
            median-ratio: median of ratios to the geometric mean\n\
            none:         raw library sizes")]
    pub normalization: NormalizationMethod,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ad hoc peak-selection filters and type-I error
    #[command(
        long_about = "Simulate two groups of libraries, keep the top sites by a filter score,\n\
            test the survivors with the quasi-likelihood F-test and report the\n\
            calibration of the null p-values.",
        after_long_help = "\
Examples:
  # Pure null, second-highest count filter
  dbsim filter --reps 10 -o filter_null

  # 10% non-null sites, union-style filter
  dbsim filter --prop-nonnull 0.1 --strategy maximum -o filter_max"
    )]
    Filter {
        /// Libraries in each of the two groups
        #[arg(long, default_value_t = FilterParams::default().libs_per_group)]
        libs_per_group: usize,

        /// Number of simulated sites
        #[arg(short = 'n', long, default_value_t = FilterParams::default().n_sites)]
        sites: usize,

        /// Baseline NB mean
        #[arg(long, default_value_t = FilterParams::default().baseline_mean)]
        mean: f64,

        /// NB dispersion
        #[arg(long, default_value_t = FilterParams::default().dispersion)]
        dispersion: f64,

        /// Fraction of non-null sites
        #[arg(long, default_value_t = FilterParams::default().prop_nonnull)]
        prop_nonnull: f64,

        /// Fold change of non-null sites
        #[arg(long, default_value_t = FilterParams::default().fold_change)]
        fold_change: f64,

        /// Placement of the fold change: elevated or balanced
        #[arg(long, default_value_t = FilterParams::default().layout)]
        layout: EffectLayout,

        /// Filter score: second-highest, maximum or mean
        #[arg(long, default_value_t = FilterParams::default().strategy)]
        strategy: FilterStrategy,

        /// Fraction of sites retained by the filter
        #[arg(long, default_value_t = FilterParams::default().retain_fraction)]
        retain_fraction: f64,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Directional empirical FDR against Benjamini-Hochberg
    #[command(
        long_about = "Simulate a fraction of sites up in the treated group, with more dispersed\n\
            control libraries, estimate the FDR from wrong-direction rejections and\n\
            compare the realised false discovery proportion with Benjamini-Hochberg.",
        after_long_help = "\
Examples:
  dbsim fdr --reps 10 -o fdr
  dbsim fdr --control-libs 4 --treated-libs 2 --alpha 0.1

  # Symmetric null: equal dispersion in both groups
  dbsim fdr --control-dispersion-scale 1"
    )]
    Fdr {
        /// Libraries in the control group
        #[arg(long, default_value_t = FdrParams::default().control_libs)]
        control_libs: usize,

        /// Libraries in the treated group
        #[arg(long, default_value_t = FdrParams::default().treated_libs)]
        treated_libs: usize,

        /// Number of simulated sites
        #[arg(short = 'n', long, default_value_t = FdrParams::default().n_sites)]
        sites: usize,

        /// Baseline NB mean
        #[arg(long, default_value_t = FdrParams::default().baseline_mean)]
        mean: f64,

        /// NB dispersion
        #[arg(long, default_value_t = FdrParams::default().dispersion)]
        dispersion: f64,

        /// Dispersion multiplier for the control libraries
        #[arg(long, default_value_t = FdrParams::default().control_dispersion_scale)]
        control_dispersion_scale: f64,

        /// Dispersion multiplier for the treated libraries
        #[arg(long, default_value_t = FdrParams::default().treated_dispersion_scale)]
        treated_dispersion_scale: f64,

        /// Fraction of non-null sites
        #[arg(long, default_value_t = FdrParams::default().prop_nonnull)]
        prop_nonnull: f64,

        /// Fold change of non-null sites in the treated group
        #[arg(long, default_value_t = FdrParams::default().fold_change)]
        fold_change: f64,

        /// Target FDR
        #[arg(short, long, default_value_t = FdrParams::default().alpha)]
        alpha: f64,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Subtracting control counts before testing
    #[command(
        long_about = "Simulate ChIP libraries with matched controls and test the same data\n\
            with and without subtracting the control counts.",
        after_long_help = "\
Examples:
  dbsim subtract --reps 10 -o subtract
  dbsim subtract --chip-mean 100 --control-mean 50"
    )]
    Subtract {
        /// Libraries in each of the two groups
        #[arg(long, default_value_t = SubtractionParams::default().libs_per_group)]
        libs_per_group: usize,

        /// Number of simulated sites
        #[arg(short = 'n', long, default_value_t = SubtractionParams::default().n_sites)]
        sites: usize,

        /// NB mean of the ChIP libraries
        #[arg(long, default_value_t = SubtractionParams::default().chip_mean)]
        chip_mean: f64,

        /// NB mean of the control libraries
        #[arg(long, default_value_t = SubtractionParams::default().control_mean)]
        control_mean: f64,

        /// NB dispersion
        #[arg(long, default_value_t = SubtractionParams::default().dispersion)]
        dispersion: f64,

        /// Fraction of non-null sites
        #[arg(long, default_value_t = SubtractionParams::default().prop_nonnull)]
        prop_nonnull: f64,

        /// Fold change of non-null sites in the treated group
        #[arg(long, default_value_t = SubtractionParams::default().fold_change)]
        fold_change: f64,

        /// Level for the rejection rates
        #[arg(short, long, default_value_t = SubtractionParams::default().alpha)]
        alpha: f64,

        #[command(flatten)]
        run: RunArgs,
    },

    /// TMM normalization at low counts
    #[command(
        long_about = "Simulate low-count background with a spiked subset of sites in the\n\
            treated group, and compare TMM factors with the factors that equalise\n\
            the background. Several background levels can be swept in one run.",
        after_long_help = "\
Examples:
  dbsim normalize --reps 10 -o tmm
  dbsim normalize --means 2,20,200 -o tmm_sweep"
    )]
    Normalize {
        /// Libraries in each of the two groups
        #[arg(long, default_value_t = NormalizationParams::default().libs_per_group)]
        libs_per_group: usize,

        /// Number of simulated sites
        #[arg(short = 'n', long, default_value_t = NormalizationParams::default().n_sites)]
        sites: usize,

        /// Background NB means, comma-separated
        #[arg(long, value_delimiter = ',', default_value = "2")]
        means: Vec<f64>,

        /// Fraction of spiked sites
        #[arg(long, default_value_t = NormalizationParams::default().prop_spiked)]
        prop_spiked: f64,

        /// Fold change of spiked sites in the treated group
        #[arg(long, default_value_t = NormalizationParams::default().spike_fold)]
        spike_fold: f64,

        /// NB dispersion
        #[arg(long, default_value_t = NormalizationParams::default().dispersion)]
        dispersion: f64,

        #[command(flatten)]
        run: RunArgs,
    },
}
