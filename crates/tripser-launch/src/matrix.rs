//! Build matrix expansion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type MatrixVars = BTreeMap<String, String>;

/// Named dimensions whose cartesian product gives the CI runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    pub dimensions: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<MatrixVars>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<MatrixVars>,
    #[serde(default)]
    pub fail_fast: bool,
}

/// A single run of an expanded matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixCell {
    pub index: usize,
    pub variables: MatrixVars,
    pub display_name: String,
}

impl Default for Matrix {
    fn default() -> Self {
        let mut dimensions = BTreeMap::new();
        dimensions.insert(
            "os".to_string(),
            ["ubuntu-latest", "ubuntu-22.04", "macos-latest", "windows-latest"]
                .map(String::from)
                .to_vec(),
        );
        dimensions.insert(
            "toolchain".to_string(),
            ["1.85", "stable"].map(String::from).to_vec(),
        );

        Self {
            dimensions,
            include: Vec::new(),
            exclude: Vec::new(),
            fail_fast: false,
        }
    }
}

impl Matrix {
    /// Expand into individual runs: the product of all dimensions (keys in
    /// name order, values in declared order), then `include` entries not
    /// already present, minus every run matching an `exclude` entry.
    pub fn expand(&self, job_name: &str) -> Vec<MatrixCell> {
        let mut combinations = self.combinations();

        for include in &self.include {
            if !combinations.contains(include) {
                combinations.push(include.clone());
            }
        }

        combinations.retain(|combo| !self.exclude.iter().any(|ex| matches_exclude(combo, ex)));

        combinations
            .into_iter()
            .enumerate()
            .map(|(index, variables)| MatrixCell {
                index,
                display_name: display_name(job_name, &variables),
                variables,
            })
            .collect()
    }

    fn combinations(&self) -> Vec<MatrixVars> {
        let mut result = vec![MatrixVars::new()];

        for (key, values) in &self.dimensions {
            let mut next = Vec::with_capacity(result.len() * values.len());
            for combo in &result {
                for value in values {
                    let mut extended = combo.clone();
                    extended.insert(key.clone(), value.clone());
                    next.push(extended);
                }
            }
            result = next;
        }

        result
    }
}

fn matches_exclude(combo: &MatrixVars, exclude: &MatrixVars) -> bool {
    exclude.iter().all(|(key, value)| combo.get(key) == Some(value))
}

fn display_name(job_name: &str, vars: &MatrixVars) -> String {
    if vars.is_empty() {
        return job_name.to_string();
    }
    let parts: Vec<String> = vars.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{} ({})", job_name, parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn vars(pairs: &[(&str, &str)]) -> MatrixVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_matrix_has_eight_distinct_cells() {
        let cells = Matrix::default().expand("build");
        assert_eq!(cells.len(), 8);

        let distinct: HashSet<_> = cells.iter().map(|c| c.variables.clone()).collect();
        assert_eq!(distinct.len(), 8);
        assert_eq!(cells[0].display_name, "build (os=ubuntu-latest, toolchain=1.85)");
        assert_eq!(cells[7].index, 7);
    }

    #[test]
    fn test_exclude_and_include() {
        let mut matrix = Matrix::default();
        matrix.exclude.push(vars(&[("os", "windows-latest"), ("toolchain", "1.85")]));
        matrix.include.push(vars(&[("os", "ubuntu-latest"), ("toolchain", "nightly")]));
        // Already part of the product, so not added twice.
        matrix.include.push(vars(&[("os", "macos-latest"), ("toolchain", "stable")]));

        let cells = matrix.expand("build");
        assert_eq!(cells.len(), 8);
        assert!(cells.iter().any(|c| c.variables["toolchain"] == "nightly"));
        assert!(!cells.iter().any(|c| c.variables == vars(&[("os", "windows-latest"), ("toolchain", "1.85")])));
    }

    #[test]
    fn test_empty_matrix_is_one_run() {
        let matrix = Matrix {
            dimensions: BTreeMap::new(),
            include: vec![],
            exclude: vec![],
            fail_fast: true,
        };
        let cells = matrix.expand("build");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].display_name, "build");
    }
}
