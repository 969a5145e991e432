//! Deciding whether a repository event starts the CI workflow.

use crate::workflow::Workflow;

/// Repository event that can start a workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Push {
        branch: String,
    },
    PullRequest {
        source_branch: String,
        target_branch: String,
    },
    Manual {
        actor: Option<String>,
    },
}

impl TriggerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerEvent::Push { .. } => "push",
            TriggerEvent::PullRequest { .. } => "pull_request",
            TriggerEvent::Manual { .. } => "workflow_dispatch",
        }
    }
}

/// Matcher for determining if a workflow should run for an event.
pub struct TriggerMatcher;

impl TriggerMatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn matches(&self, workflow: &Workflow, event: &TriggerEvent) -> bool {
        let triggers = &workflow.triggers;
        match event {
            TriggerEvent::Push { branch } => triggers
                .push
                .as_ref()
                .is_some_and(|filter| self.branch_matches(&filter.branches, branch)),
            // Pull requests are filtered on the branch they merge into.
            TriggerEvent::PullRequest { target_branch, .. } => triggers
                .pull_request
                .as_ref()
                .is_some_and(|filter| self.branch_matches(&filter.branches, target_branch)),
            TriggerEvent::Manual { .. } => triggers.workflow_dispatch,
        }
    }

    fn branch_matches(&self, patterns: &[String], branch: &str) -> bool {
        if patterns.is_empty() {
            return true;
        }
        patterns.iter().any(|p| glob_match(p, branch))
    }
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Branch globs: `*` and `**` match anything, `prefix/**` any depth below
/// `prefix`, `prefix/*` exactly one level, otherwise a single `*`
/// wildcard or an exact name.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return text.starts_with(&format!("{}/", prefix));
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return text
            .strip_prefix(&format!("{}/", prefix))
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'));
    }
    if let Some((head, tail)) = pattern.split_once('*') {
        if !tail.contains('*') {
            return text.len() >= head.len() + tail.len()
                && text.starts_with(head)
                && text.ends_with(tail);
        }
    }
    pattern == text
}
