//! Makefile-style build targets.

use crate::error::{LaunchError, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(([A-Za-z_][A-Za-z0-9_]*)\)").expect("variable pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Target {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            prerequisites: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn after(mut self, prerequisites: &[&str]) -> Self {
        self.prerequisites = prerequisites.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn run(mut self, command: &str) -> Self {
        self.commands.push(command.to_string());
        self
    }
}

/// Variables plus an ordered list of targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub targets: Vec<Target>,
}

impl Default for BuildPlan {
    fn default() -> Self {
        let mut variables = BTreeMap::new();
        variables.insert("sources".to_string(), "tripser".to_string());

        Self {
            variables,
            targets: vec![
                Target::new("format", "Format the code").run("cargo fmt --all"),
                Target::new("lint", "Lint the code")
                    .run("cargo clippy --workspace --all-targets -- -D warnings"),
                Target::new("unittest", "Run the unit tests").run("cargo test --workspace"),
                Target::new("test", "Format, lint and unit test").after(&["format", "lint", "unittest"]),
                Target::new("coverage", "Unit tests with coverage report")
                    .run("cargo llvm-cov --package $(sources) --lcov --output-path lcov.info"),
                Target::new("pre-commit", "Run the pre-commit hooks").run("pre-commit run --all-files"),
                Target::new("docs", "Build the documentation").run("cargo doc --no-deps --package $(sources)"),
                Target::new("clean", "Remove build artifacts")
                    .run("cargo clean")
                    .run("rm -f lcov.info"),
            ],
        }
    }
}

impl BuildPlan {
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// The first target, which `make` runs without arguments.
    pub fn default_target(&self) -> Option<&Target> {
        self.targets.first()
    }

    /// Check names, prerequisites, cycles and variable references.
    pub fn validate(&self) -> Result<()> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();

        for target in &self.targets {
            if index.contains_key(target.name.as_str()) {
                return Err(LaunchError::DuplicateTarget(target.name.clone()));
            }
            index.insert(&target.name, graph.add_node(&target.name));
        }

        for target in &self.targets {
            for prerequisite in &target.prerequisites {
                let &from = index.get(prerequisite.as_str()).ok_or_else(|| {
                    LaunchError::UnknownPrerequisite {
                        target: target.name.clone(),
                        prerequisite: prerequisite.clone(),
                    }
                })?;
                graph.add_edge(from, index[target.name.as_str()], ());
            }
            for command in &target.commands {
                self.expand_for(&target.name, command)?;
            }
        }

        toposort(&graph, None)
            .map(|_| ())
            .map_err(|cycle| LaunchError::Cycle(graph[cycle.node_id()].to_string()))
    }

    /// Targets to run for `name`, in order: prerequisites depth-first in
    /// declared order, each target once, every target after its
    /// prerequisites.
    pub fn resolve(&self, name: &str) -> Result<Vec<&Target>> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut visiting = Vec::new();
        self.visit(name, &mut order, &mut done, &mut visiting)?;
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &str,
        order: &mut Vec<&'a Target>,
        done: &mut HashSet<String>,
        visiting: &mut Vec<String>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }
        if visiting.iter().any(|v| v == name) {
            return Err(LaunchError::Cycle(name.to_string()));
        }
        let target = self
            .target(name)
            .ok_or_else(|| LaunchError::UnknownTarget(name.to_string()))?;

        visiting.push(name.to_string());
        for prerequisite in &target.prerequisites {
            if self.target(prerequisite).is_none() {
                return Err(LaunchError::UnknownPrerequisite {
                    target: name.to_string(),
                    prerequisite: prerequisite.clone(),
                });
            }
            self.visit(prerequisite, order, done, visiting)?;
        }
        visiting.pop();

        done.insert(name.to_string());
        order.push(target);
        Ok(())
    }

    /// Substitute `$(var)` references in `command`.
    pub fn expand(&self, command: &str) -> Result<String> {
        self.expand_for("", command)
    }

    fn expand_for(&self, target: &str, command: &str) -> Result<String> {
        if let Some(missing) = VARIABLE
            .captures_iter(command)
            .map(|c| c[1].to_string())
            .find(|name| !self.variables.contains_key(name))
        {
            return Err(LaunchError::UndefinedVariable {
                variable: missing,
                target: target.to_string(),
            });
        }

        Ok(VARIABLE
            .replace_all(command, |caps: &regex::Captures| self.variables[&caps[1]].clone())
            .into_owned())
    }

    /// Every command that `resolve(name)` would run, expanded, paired with
    /// its target name.
    pub fn commands(&self, name: &str) -> Result<Vec<(String, String)>> {
        let mut commands = Vec::new();
        for target in self.resolve(name)? {
            for command in &target.commands {
                commands.push((target.name.clone(), self.expand_for(&target.name, command)?));
            }
        }
        Ok(commands)
    }

    /// Render as a Makefile.
    pub fn render(&self) -> String {
        let mut out = String::new();

        for (name, value) in &self.variables {
            out.push_str(&format!("{} = {}\n", name, value));
        }
        if !self.variables.is_empty() {
            out.push('\n');
        }

        let names: Vec<&str> = self.targets.iter().map(|t| t.name.as_str()).collect();
        out.push_str(&format!(".PHONY: {}\n", names.join(" ")));

        for target in &self.targets {
            out.push('\n');
            let mut rule = format!("{}:", target.name);
            for prerequisite in &target.prerequisites {
                rule.push(' ');
                rule.push_str(prerequisite);
            }
            if !target.description.is_empty() {
                rule.push_str(&format!(" ## {}", target.description));
            }
            out.push_str(&rule);
            out.push('\n');
            for command in &target.commands {
                out.push('\t');
                out.push_str(command);
                out.push('\n');
            }
        }

        out
    }
}
