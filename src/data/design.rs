//! Experimental design: which group (and batch) each library belongs to

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// A categorical factor over libraries
///
/// Levels are kept in order of first appearance; the first level is the
/// reference level for treatment coding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    name: String,
    values: Vec<String>,
    levels: Vec<String>,
}

impl Factor {
    pub fn new(name: &str, values: Vec<String>) -> Self {
        let mut levels: Vec<String> = Vec::new();
        for v in &values {
            if !levels.contains(v) {
                levels.push(v.clone());
            }
        }
        Self {
            name: name.to_string(),
            values,
            levels,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// First level in order of appearance; `None` for a factor with no values
    pub fn reference_level(&self) -> Option<&str> {
        self.levels.first().map(String::as_str)
    }

    /// Level index of every library
    pub fn codes(&self) -> Vec<usize> {
        self.values
            .iter()
            .map(|v| self.levels.iter().position(|l| l == v).unwrap_or(0))
            .collect()
    }
}

/// Assignment of libraries to experimental groups, with an optional second factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Design {
    group: Factor,
    second: Option<Factor>,
}

impl Design {
    /// Create a design from one group label per library
    pub fn new(groups: Vec<String>) -> Result<Self> {
        if groups.is_empty() {
            return Err(SimError::invalid("design must contain at least one library"));
        }
        Ok(Self {
            group: Factor::new("group", groups),
            second: None,
        })
    }

    /// Balanced design: `per_group` libraries in each of the named groups
    pub fn balanced(levels: &[&str], per_group: usize) -> Result<Self> {
        Self::unbalanced(&levels.iter().map(|l| (*l, per_group)).collect::<Vec<_>>())
    }

    /// Design from `(level, n_libraries)` pairs, laid out group after group
    pub fn unbalanced(layout: &[(&str, usize)]) -> Result<Self> {
        if layout.iter().any(|&(_, n)| n == 0) {
            return Err(SimError::invalid("every group needs at least one library"));
        }
        let groups = layout
            .iter()
            .flat_map(|&(level, n)| std::iter::repeat(level.to_string()).take(n))
            .collect();
        Self::new(groups)
    }

    /// Add a second factor, e.g. batch or sample type
    pub fn with_second_factor(mut self, name: &str, values: Vec<String>) -> Result<Self> {
        if values.len() != self.n_libraries() {
            return Err(SimError::DimensionMismatch {
                expected: format!("{} values for factor '{}'", self.n_libraries(), name),
                got: format!("{} values", values.len()),
            });
        }
        if name == self.group.name() {
            return Err(SimError::invalid(format!("factor name '{}' is already used", name)));
        }
        self.second = Some(Factor::new(name, values));
        Ok(self)
    }

    pub fn n_libraries(&self) -> usize {
        self.group.values().len()
    }

    pub fn group(&self) -> &Factor {
        &self.group
    }

    pub fn second_factor(&self) -> Option<&Factor> {
        self.second.as_ref()
    }

    pub fn n_groups(&self) -> usize {
        self.group.levels().len()
    }

    /// Group index of every library
    pub fn group_codes(&self) -> Vec<usize> {
        self.group.codes()
    }

    /// Library indices belonging to a group level
    pub fn libraries_in(&self, level: &str) -> Vec<usize> {
        self.group
            .values()
            .iter()
            .enumerate()
            .filter(|(_, v)| v.as_str() == level)
            .map(|(j, _)| j)
            .collect()
    }

    /// Number of libraries in each group, in level order
    pub fn group_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_groups()];
        for code in self.group_codes() {
            sizes[code] += 1;
        }
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_design() {
        let d = Design::balanced(&["control", "treated"], 3).unwrap();
        assert_eq!(d.n_libraries(), 6);
        assert_eq!(d.n_groups(), 2);
        assert_eq!(d.group().reference_level(), Some("control"));
        assert_eq!(d.group_codes(), vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(d.libraries_in("treated"), vec![3, 4, 5]);
    }

    #[test]
    fn test_empty_factor_has_no_reference() {
        let f = Factor::new("batch", Vec::new());
        assert!(f.levels().is_empty());
        assert_eq!(f.reference_level(), None);
        assert!(f.codes().is_empty());
    }

    #[test]
    fn test_unbalanced_design() {
        let d = Design::unbalanced(&[("control", 2), ("treated", 4)]).unwrap();
        assert_eq!(d.group_sizes(), vec![2, 4]);
        assert!(Design::unbalanced(&[("a", 0), ("b", 2)]).is_err());
    }

    #[test]
    fn test_second_factor_length_checked() {
        let d = Design::balanced(&["a", "b"], 2).unwrap();
        let bad = d.clone().with_second_factor("batch", vec!["x".into(); 3]);
        assert!(bad.is_err());
        let ok = d
            .with_second_factor("batch", vec!["x".into(), "y".into(), "x".into(), "y".into()])
            .unwrap();
        assert_eq!(ok.second_factor().unwrap().levels().len(), 2);
    }
}
