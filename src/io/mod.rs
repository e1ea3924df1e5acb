//! Report output: JSON reports and calibration tables

mod report;

pub use report::{output_paths, write_calibration, write_report, OutputPaths};
