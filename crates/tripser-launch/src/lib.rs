//! Orchestration around the crawler: the SLURM batch job that launches
//! it on a cluster, the CI workflow that tests it, and the build targets
//! both of them call.

pub mod batch;
pub mod error;
pub mod matrix;
pub mod rank;
pub mod runner;
pub mod targets;
pub mod triggers;
pub mod workflow;

pub use batch::{BatchJob, Launcher, WallTime};
pub use error::{LaunchError, Result};
pub use matrix::{Matrix, MatrixCell};
pub use rank::MpiRank;
pub use runner::{BatchSubmitter, OutputLine, OutputStream, RunSummary, TargetRunner};
pub use targets::{BuildPlan, Target};
pub use triggers::{TriggerEvent, TriggerMatcher};
pub use workflow::{BranchFilter, Step, Triggers, Workflow};
