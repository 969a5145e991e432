//! Configuration file handling.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tripser_crawler::CrawlerConfig;
use tripser_launch::{BatchJob, BuildPlan, Workflow};

/// Name of the per-project configuration file.
pub const LOCAL_CONFIG: &str = "tripser.yaml";

/// Everything the tool can be configured with. Missing sections take the
/// built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripserConfig {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub job: BatchJob,
    #[serde(default)]
    pub workflow: Workflow,
    #[serde(default)]
    pub build: BuildPlan,
}

impl TripserConfig {
    /// Load the configuration. An explicit path must exist; otherwise
    /// `./tripser.yaml` and then the user config file are tried, falling
    /// back to defaults. Returns the file that was read, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), Box<dyn std::error::Error>> {
        if let Some(path) = explicit {
            return Ok((Self::load_from(path)?, Some(path.to_path_buf())));
        }

        let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Ok(path) = Self::config_path() {
            candidates.push(path);
        }

        for path in candidates {
            if path.exists() {
                let config = Self::load_from(&path)?;
                return Ok((config, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Could not read {}: {}", path.display(), e))?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// The user-wide configuration file.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("de", "mpg.evolbio", "tripser")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tripser.yaml");
        std::fs::write(&path, "crawler:\n  workers: 32\njob:\n  partition: highmem\n").unwrap();

        let config = TripserConfig::load_from(&path).unwrap();
        assert_eq!(config.crawler.workers, 32);
        assert_eq!(config.crawler.page_size, 25);
        assert_eq!(config.job.partition, "highmem");
        assert_eq!(config.job.ntasks, 200);
        assert_eq!(config.workflow, Workflow::default());
        assert_eq!(config.build, BuildPlan::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = TripserConfig::default();
        config.crawler.max_pages = Some(10);
        config.job.nodes = 4;
        config.save(&path).unwrap();

        let (loaded, source) = TripserConfig::load(Some(&path)).unwrap();
        assert_eq!(source, Some(path));
        assert_eq!(loaded.crawler.max_pages, Some(10));
        assert_eq!(loaded.job, config.job);
        assert_eq!(loaded.build, config.build);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(TripserConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "job:\n  time_limit: forever\n").unwrap();
        assert!(TripserConfig::load_from(&path).is_err());
    }
}
