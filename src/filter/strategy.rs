//! Per-site filter scores

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Score used to rank sites before retaining the top `k`
///
/// `SecondHighest` and `Maximum` look at the largest counts of a row and so
/// favour rows where one group is elevated. `Mean` is independent of the
/// group split under the null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterStrategy {
    SecondHighest,
    /// Union-style filter: any library with a high count keeps the site
    Maximum,
    Mean,
}

impl FilterStrategy {
    pub const ALL: [FilterStrategy; 3] = [
        FilterStrategy::SecondHighest,
        FilterStrategy::Maximum,
        FilterStrategy::Mean,
    ];

    /// Score one row of counts
    pub fn score(&self, row: ArrayView1<'_, u32>) -> f64 {
        match self {
            FilterStrategy::SecondHighest => second_highest(row),
            FilterStrategy::Maximum => row.iter().copied().max().unwrap_or(0) as f64,
            FilterStrategy::Mean => {
                if row.is_empty() {
                    0.0
                } else {
                    row.iter().map(|&c| c as f64).sum::<f64>() / row.len() as f64
                }
            }
        }
    }
}

/// Second-largest value of a row; the only value when there is one library
fn second_highest(row: ArrayView1<'_, u32>) -> f64 {
    let mut first = 0u32;
    let mut second: Option<u32> = None;
    for (idx, &c) in row.iter().enumerate() {
        if idx == 0 {
            first = c;
        } else if c > first {
            second = Some(first);
            first = c;
        } else if second.map_or(true, |s| c > s) {
            second = Some(c);
        }
    }
    second.unwrap_or(first) as f64
}

impl fmt::Display for FilterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStrategy::SecondHighest => write!(f, "second-highest"),
            FilterStrategy::Maximum => write!(f, "maximum"),
            FilterStrategy::Mean => write!(f, "mean"),
        }
    }
}

impl FromStr for FilterStrategy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "second-highest" | "secondhighest" | "second" => Ok(FilterStrategy::SecondHighest),
            "maximum" | "max" | "union" => Ok(FilterStrategy::Maximum),
            "mean" | "average" => Ok(FilterStrategy::Mean),
            other => Err(SimError::invalid(format!(
                "unknown filter '{}' (expected second-highest, maximum or mean)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_scores() {
        let row = array![3u32, 9, 1, 7];
        assert_eq!(FilterStrategy::SecondHighest.score(row.view()), 7.0);
        assert_eq!(FilterStrategy::Maximum.score(row.view()), 9.0);
        assert_eq!(FilterStrategy::Mean.score(row.view()), 5.0);
    }

    #[test]
    fn test_second_highest_with_ties() {
        let row = array![5u32, 5, 2];
        assert_eq!(FilterStrategy::SecondHighest.score(row.view()), 5.0);
        let single = array![4u32];
        assert_eq!(FilterStrategy::SecondHighest.score(single.view()), 4.0);
        let descending = array![9u32, 4, 6];
        assert_eq!(FilterStrategy::SecondHighest.score(descending.view()), 6.0);
    }

    #[test]
    fn test_parse_and_display() {
        for s in FilterStrategy::ALL {
            assert_eq!(s.to_string().parse::<FilterStrategy>().unwrap(), s);
        }
        assert_eq!("union".parse::<FilterStrategy>().unwrap(), FilterStrategy::Maximum);
        assert!("median".parse::<FilterStrategy>().is_err());
    }
}
