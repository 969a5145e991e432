//! Crawler configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tripser_core::vocab;

/// Settings for a crawl. Every field has a default, so a partial YAML
/// section deserializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Only IRIs under this prefix are followed.
    pub content_prefix: String,
    /// Maximum number of pages fetched concurrently.
    pub workers: usize,
    /// Stop scheduling new pages once this many have been scheduled.
    pub max_pages: Option<usize>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Additional attempts after a transport error.
    pub retries: u32,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Literal replacements applied to every response body, in order.
    pub rewrites: Vec<Rewrite>,
    /// Collection page size used for pagination links.
    pub page_size: u64,
    /// Write every fetched page graph to its own Turtle file.
    pub serialize_nodes: bool,
    /// Target directory for per-page files.
    pub node_dir: PathBuf,
    /// Run pagination cleanup on the final graph.
    pub cleanup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub from: String,
    pub to: String,
}

impl Rewrite {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            content_prefix: vocab::PFLU_CONTENT_ROOT.to_string(),
            workers: 8,
            max_pages: None,
            request_timeout_secs: 600,
            retries: 0,
            retry_delay_ms: 1000,
            rewrites: vec![Rewrite::new("https://pflu", "http://pflu")],
            page_size: 25,
            serialize_nodes: false,
            node_dir: PathBuf::from("."),
            cleanup: true,
        }
    }
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Apply the configured rewrites to a response body.
    pub fn rewrite(&self, body: &str) -> String {
        self.rewrites
            .iter()
            .fold(body.to_string(), |acc, r| acc.replace(&r.from, &r.to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.request_timeout(), Duration::from_secs(600));
        assert_eq!(config.retries, 0);
        assert!(config.cleanup);
        assert!(!config.serialize_nodes);
        assert_eq!(
            config.content_prefix,
            "http://pflu.evolbio.mpg.de/web-services/content/"
        );
    }

    #[test]
    fn test_rewrite_https_links() {
        let config = CrawlerConfig::default();
        assert_eq!(
            config.rewrite(r#"{"@id": "https://pflu.evolbio.mpg.de/x"}"#),
            r#"{"@id": "http://pflu.evolbio.mpg.de/x"}"#
        );
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: CrawlerConfig = serde_json::from_str(r#"{"workers": 2, "retries": 3}"#).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.retries, 3);
        assert_eq!(config.page_size, 25);
        assert_eq!(config.rewrites.len(), 1);
    }
}
