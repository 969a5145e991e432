//! The CI workflow: triggers, build matrix and steps, rendered as a
//! GitHub Actions workflow file.

use crate::error::{LaunchError, Result};
use crate::matrix::{Matrix, MatrixCell, MatrixVars};
use crate::targets::BuildPlan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const JOB_NAME: &str = "build";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BranchFilter {
    #[serde(default)]
    pub branches: Vec<String>,
}

impl BranchFilter {
    pub fn branches(branches: &[&str]) -> Self {
        Self {
            branches: branches.iter().map(|b| b.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triggers {
    #[serde(default)]
    pub push: Option<BranchFilter>,
    #[serde(default)]
    pub pull_request: Option<BranchFilter>,
    #[serde(default)]
    pub workflow_dispatch: bool,
}

impl Triggers {
    pub fn is_empty(&self) -> bool {
        self.push.is_none() && self.pull_request.is_none() && !self.workflow_dispatch
    }
}

impl Default for Triggers {
    fn default() -> Self {
        Self {
            push: Some(BranchFilter::branches(&["main", "develop"])),
            pull_request: Some(BranchFilter::branches(&["main", "develop"])),
            workflow_dispatch: true,
        }
    }
}

/// One workflow step: either a third-party action (`uses`) or a shell
/// command (`run`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub with: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
}

impl Step {
    pub fn uses(name: &str, action: &str) -> Self {
        Self {
            name: name.to_string(),
            uses: Some(action.to_string()),
            with: BTreeMap::new(),
            run: None,
        }
    }

    pub fn run(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            uses: None,
            with: BTreeMap::new(),
            run: Some(command.to_string()),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.with.insert(key.to_string(), value.to_string());
        self
    }

    /// Targets named by `make` invocations in this step's command.
    pub fn make_targets(&self) -> Vec<String> {
        let Some(run) = &self.run else {
            return Vec::new();
        };

        let mut targets = Vec::new();
        for command in run.split(['\n', ';', '&', '|']) {
            let mut words = command.split_whitespace();
            if words.next() != Some("make") {
                continue;
            }
            let mut skip_value = false;
            for word in words {
                if skip_value {
                    skip_value = false;
                } else if matches!(word, "-C" | "-f" | "-j") {
                    skip_value = true;
                } else if !word.starts_with('-') && !word.contains('=') {
                    targets.push(word.to_string());
                }
            }
        }
        targets
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub triggers: Triggers,
    #[serde(default)]
    pub matrix: Matrix,
    pub steps: Vec<Step>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            name: "CI".to_string(),
            triggers: Triggers::default(),
            matrix: Matrix::default(),
            steps: vec![
                Step::uses("Checkout", "actions/checkout@v4"),
                Step::uses("Set up Rust ${{ matrix.toolchain }}", "dtolnay/rust-toolchain@master")
                    .with("toolchain", "${{ matrix.toolchain }}")
                    .with("components", "rustfmt, clippy, llvm-tools-preview"),
                Step::run(
                    "Install dependencies",
                    "cargo install cargo-llvm-cov --locked\ncargo fetch",
                ),
                Step::run("Test", "make test"),
                Step::run("Coverage", "make coverage"),
            ],
        }
    }
}

impl Workflow {
    pub fn cells(&self) -> Vec<MatrixCell> {
        self.matrix.expand(JOB_NAME)
    }

    /// Check the workflow on its own and against the build targets its
    /// steps call.
    pub fn validate(&self, plan: &BuildPlan) -> Result<()> {
        let invalid = |msg: String| Err(LaunchError::InvalidWorkflow(msg));

        if self.triggers.is_empty() {
            return invalid("no trigger is enabled".to_string());
        }
        if self.matrix.dimensions.is_empty() {
            return invalid("matrix has no dimensions".to_string());
        }
        if let Some((name, _)) = self.matrix.dimensions.iter().find(|(_, v)| v.is_empty()) {
            return invalid(format!("matrix dimension {} has no values", name));
        }
        if self.steps.is_empty() {
            return invalid("workflow has no steps".to_string());
        }

        for step in &self.steps {
            if step.uses.is_some() == step.run.is_some() {
                return invalid(format!("step {} needs exactly one of uses or run", step.name));
            }
            for target in step.make_targets() {
                if plan.target(&target).is_none() {
                    return Err(LaunchError::UnknownTarget(target));
                }
            }
        }

        Ok(())
    }

    /// Render as a GitHub Actions workflow file.
    pub fn render(&self) -> Result<String> {
        let rendered = RenderedWorkflow {
            name: &self.name,
            on: RenderedTriggers {
                push: self.triggers.push.as_ref(),
                pull_request: self.triggers.pull_request.as_ref(),
                workflow_dispatch: self.triggers.workflow_dispatch.then(BTreeMap::new),
            },
            jobs: BTreeMap::from([(
                JOB_NAME,
                RenderedJob {
                    runs_on: "${{ matrix.os }}",
                    strategy: RenderedStrategy {
                        fail_fast: self.matrix.fail_fast,
                        matrix: RenderedMatrix {
                            dimensions: &self.matrix.dimensions,
                            include: &self.matrix.include,
                            exclude: &self.matrix.exclude,
                        },
                    },
                    steps: &self.steps,
                },
            )]),
        };
        Ok(serde_yaml::to_string(&rendered)?)
    }
}

#[derive(Serialize)]
struct RenderedWorkflow<'a> {
    name: &'a str,
    on: RenderedTriggers<'a>,
    jobs: BTreeMap<&'a str, RenderedJob<'a>>,
}

#[derive(Serialize)]
struct RenderedTriggers<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    push: Option<&'a BranchFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pull_request: Option<&'a BranchFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow_dispatch: Option<BTreeMap<String, String>>,
}

#[derive(Serialize)]
struct RenderedJob<'a> {
    #[serde(rename = "runs-on")]
    runs_on: &'a str,
    strategy: RenderedStrategy<'a>,
    steps: &'a [Step],
}

#[derive(Serialize)]
struct RenderedStrategy<'a> {
    #[serde(rename = "fail-fast")]
    fail_fast: bool,
    matrix: RenderedMatrix<'a>,
}

#[derive(Serialize)]
struct RenderedMatrix<'a> {
    #[serde(flatten)]
    dimensions: &'a BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "slice_is_empty")]
    include: &'a [MatrixVars],
    #[serde(skip_serializing_if = "slice_is_empty")]
    exclude: &'a [MatrixVars],
}

fn slice_is_empty(slice: &&[MatrixVars]) -> bool {
    slice.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::Target;

    #[test]
    fn test_default_workflow_is_valid() {
        Workflow::default().validate(&BuildPlan::default()).unwrap();
        assert_eq!(Workflow::default().cells().len(), 8);
    }

    #[test]
    fn test_steps_run_test_then_coverage() {
        let targets: Vec<String> = Workflow::default()
            .steps
            .iter()
            .flat_map(|s| s.make_targets())
            .collect();
        assert_eq!(targets, vec!["test", "coverage"]);
    }

    #[test]
    fn test_make_targets_parsing() {
        let step = Step::run("x", "make -j 4 lint unittest SOURCES=x && make -C docs html; echo make");
        assert_eq!(step.make_targets(), vec!["lint", "unittest", "html"]);
        assert!(Step::uses("x", "actions/checkout@v4").make_targets().is_empty());
    }

    #[test]
    fn test_unknown_make_target_is_rejected() {
        let plan = BuildPlan {
            variables: BTreeMap::new(),
            targets: vec![Target::new("test", "")],
        };
        assert!(matches!(
            Workflow::default().validate(&plan),
            Err(LaunchError::UnknownTarget(t)) if t == "coverage"
        ));
    }

    #[test]
    fn test_invalid_workflows() {
        let plan = BuildPlan::default();

        let mut no_triggers = Workflow::default();
        no_triggers.triggers = Triggers {
            push: None,
            pull_request: None,
            workflow_dispatch: false,
        };
        assert!(no_triggers.validate(&plan).is_err());

        let mut empty_dimension = Workflow::default();
        empty_dimension.matrix.dimensions.insert("arch".to_string(), vec![]);
        assert!(empty_dimension.validate(&plan).is_err());

        let mut ambiguous = Workflow::default();
        ambiguous.steps[0].run = Some("true".to_string());
        assert!(ambiguous.validate(&plan).is_err());
    }

    #[test]
    fn test_render() {
        let yaml = Workflow::default().render().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(value["name"], "CI");
        assert_eq!(value["on"]["push"]["branches"][1], "develop");
        assert!(value["on"]["workflow_dispatch"].is_mapping());
        let job = &value["jobs"]["build"];
        assert_eq!(job["runs-on"], "${{ matrix.os }}");
        assert_eq!(job["strategy"]["fail-fast"], false);
        assert_eq!(job["strategy"]["matrix"]["os"].as_sequence().unwrap().len(), 4);
        assert_eq!(job["strategy"]["matrix"]["toolchain"][0], "1.85");
        assert!(job["strategy"]["matrix"].get("include").is_none());
        assert_eq!(job["steps"][0]["uses"], "actions/checkout@v4");
        assert_eq!(job["steps"][3]["run"], "make test");
        assert!(job["steps"][3].get("uses").is_none());
    }

    #[test]
    fn test_config_yaml_uses_defaults_for_missing_sections() {
        let workflow: Workflow = serde_yaml::from_str("name: Nightly\nsteps:\n  - name: Test\n    run: make test\n").unwrap();
        assert_eq!(workflow.triggers, Triggers::default());
        assert_eq!(workflow.matrix, Matrix::default());
        workflow.validate(&BuildPlan::default()).unwrap();
    }
}
