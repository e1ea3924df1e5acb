//! dbsim command-line interface

use std::fmt::Display;

use clap::Parser;
use log::{info, LevelFilter};
use serde::Serialize;

use dbsim::cli::{Cli, Commands, RunArgs};
use dbsim::io::{output_paths, write_calibration, write_report};
use dbsim::prelude::*;
use dbsim::scenario::{self, CalibrationTable};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .ok();
    }

    let result = match cli.command {
        Some(Commands::Filter {
            libs_per_group,
            sites,
            mean,
            dispersion,
            prop_nonnull,
            fold_change,
            layout,
            strategy,
            retain_fraction,
            run,
        }) => {
            let params = FilterParams {
                libs_per_group,
                n_sites: sites,
                baseline_mean: mean,
                dispersion,
                prop_nonnull,
                fold_change,
                layout,
                strategy,
                retain_fraction,
            };
            run_filter(&params, &run)
        }
        Some(Commands::Fdr {
            control_libs,
            treated_libs,
            sites,
            mean,
            dispersion,
            control_dispersion_scale,
            treated_dispersion_scale,
            prop_nonnull,
            fold_change,
            alpha,
            run,
        }) => {
            let params = FdrParams {
                control_libs,
                treated_libs,
                n_sites: sites,
                baseline_mean: mean,
                dispersion,
                control_dispersion_scale,
                treated_dispersion_scale,
                prop_nonnull,
                fold_change,
                alpha,
            };
            run_fdr(&params, &run)
        }
        Some(Commands::Subtract {
            libs_per_group,
            sites,
            chip_mean,
            control_mean,
            dispersion,
            prop_nonnull,
            fold_change,
            alpha,
            run,
        }) => {
            let params = SubtractionParams {
                libs_per_group,
                n_sites: sites,
                chip_mean,
                control_mean,
                dispersion,
                prop_nonnull,
                fold_change,
                alpha,
            };
            run_subtract(&params, &run)
        }
        Some(Commands::Normalize {
            libs_per_group,
            sites,
            means,
            prop_spiked,
            spike_fold,
            dispersion,
            run,
        }) => {
            let params = NormalizationParams {
                libs_per_group,
                n_sites: sites,
                prop_spiked,
                spike_fold,
                dispersion,
                ..Default::default()
            };
            run_normalize(&params, &means, &run)
        }
        None => {
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_no_args() {
    println!("dbsim v{}", VERSION);
    println!("Run `dbsim -h` for usage or `dbsim --help` for detailed information.");
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn run_filter(params: &FilterParams, args: &RunArgs) -> Result<()> {
    let test = QlfTest::new(args.normalization);
    let report = scenario::filter::run(params, args.reps, args.seed, &test)?;
    finish(&report, &report.calibration, args)
}

fn run_fdr(params: &FdrParams, args: &RunArgs) -> Result<()> {
    let test = QlfTest::new(args.normalization);
    let report = scenario::fdr::run(params, args.reps, args.seed, &test)?;
    finish(&report, &report.calibration, args)
}

fn run_subtract(params: &SubtractionParams, args: &RunArgs) -> Result<()> {
    let test = QlfTest::new(args.normalization);
    let report = scenario::subtraction::run(params, args.reps, args.seed, &test)?;
    finish(&report, &report.calibration, args)
}

fn run_normalize(params: &NormalizationParams, means: &[f64], args: &RunArgs) -> Result<()> {
    let test = QlfTest::new(args.normalization);
    let sweep = scenario::normalization::run_sweep(params, means, args.reps, args.seed, &test)?;
    finish(&sweep, &sweep.calibration(), args)
}

/// Print the summary and write the report files when an output prefix is set
fn finish<R: Serialize + Display>(report: &R, calibration: &CalibrationTable, args: &RunArgs) -> Result<()> {
    println!("{}", report);

    if let Some(prefix) = &args.output {
        let paths = output_paths(prefix);
        info!("Writing report to: {}", paths.report.display());
        write_report(&paths.report, report)?;
        info!("Writing calibration table to: {}", paths.calibration.display());
        write_calibration(&paths.calibration, calibration)?;
    }
    Ok(())
}
