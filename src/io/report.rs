//! Writers for scenario reports

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::scenario::CalibrationTable;

/// Files written for one output prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// `<prefix>.json`
    pub report: PathBuf,
    /// `<prefix>_calibration.csv`
    pub calibration: PathBuf,
}

pub fn output_paths(prefix: &str) -> OutputPaths {
    OutputPaths {
        report: PathBuf::from(format!("{}.json", prefix)),
        calibration: PathBuf::from(format!("{}_calibration.csv", prefix)),
    }
}

/// Write any serializable report as pretty-printed JSON
pub fn write_report<T: Serialize, P: AsRef<Path>>(path: P, report: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Write a calibration table as CSV with a header row
///
/// Levels not covered by any repetition have an empty `mean_ratio`.
pub fn write_calibration<P: AsRef<Path>>(path: P, table: &CalibrationTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in &table.rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::CalibrationRow;
    use std::fs;
    use tempfile::tempdir;

    fn table() -> CalibrationTable {
        CalibrationTable {
            rows: vec![
                CalibrationRow {
                    series: "null".to_string(),
                    level: 0.001,
                    mean_ratio: None,
                    repetitions: 0,
                },
                CalibrationRow {
                    series: "null".to_string(),
                    level: 0.05,
                    mean_ratio: Some(1.25),
                    repetitions: 3,
                },
            ],
        }
    }

    #[test]
    fn test_output_paths() {
        let paths = output_paths("out/filter");
        assert_eq!(paths.report, PathBuf::from("out/filter.json"));
        assert_eq!(paths.calibration, PathBuf::from("out/filter_calibration.csv"));
    }

    #[test]
    fn test_write_calibration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cal.csv");
        write_calibration(&path, &table()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "series,level,mean_ratio,repetitions");
        assert_eq!(lines[1], "null,0.001,,0");
        assert_eq!(lines[2], "null,0.05,1.25,3");
    }

    #[test]
    fn test_write_report() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report(&path, &table()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["rows"][1]["mean_ratio"], 1.25);
        assert!(value["rows"][0]["mean_ratio"].is_null());
    }
}
