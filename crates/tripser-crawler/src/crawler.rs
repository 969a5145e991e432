//! The crawl driver.

use crate::config::CrawlerConfig;
use crate::error::{CrawlError, Result};
use crate::fetch::{DocumentFetcher, HttpFetcher, PageLoader};
use crate::page::visit_page;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tripser_core::{Graph, cleanup};
use url::Url;

const PROGRESS_INTERVAL: usize = 100;

/// Summary of a finished crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub entry_point: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub pages_parsed: usize,
    pub pages_failed: usize,
    pub failed_pages: Vec<String>,
    pub triples: usize,
    pub removed_by_cleanup: usize,
    /// Whether `max_pages` stopped pages from being scheduled.
    pub truncated: bool,
}

#[derive(Debug)]
pub struct CrawlOutcome {
    pub graph: Graph,
    /// Pages in the order they completed.
    pub parsed_pages: Vec<String>,
    pub report: CrawlReport,
}

/// Crawls a web service from an entry point with a bounded number of
/// concurrent page visits.
pub struct Crawler<F> {
    loader: Arc<PageLoader<F>>,
}

impl Crawler<HttpFetcher> {
    /// A crawler fetching over HTTP.
    pub fn http(config: CrawlerConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::new(fetcher, config))
    }
}

impl<F: DocumentFetcher + 'static> Crawler<F> {
    pub fn new(fetcher: F, config: CrawlerConfig) -> Self {
        Self {
            loader: Arc::new(PageLoader::new(fetcher, config)),
        }
    }

    pub fn config(&self) -> &CrawlerConfig {
        self.loader.config()
    }

    /// Crawl everything reachable from `entry_point`.
    ///
    /// `seed` is copied into the result graph before crawling; the
    /// caller's graph is not modified. A page that fails to load is
    /// logged and counted, and the crawl carries on.
    pub async fn crawl(&self, entry_point: &str, seed: Option<&Graph>) -> Result<CrawlOutcome> {
        validate_entry_point(entry_point)?;

        let config = self.config();
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut graph = seed.cloned().unwrap_or_default();
        let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
        let mut join_set = JoinSet::new();

        let mut frontier = VecDeque::from([entry_point.to_string()]);
        let mut scheduled: HashSet<String> = HashSet::from([entry_point.to_string()]);
        let mut parsed_pages = Vec::new();
        let mut failed_pages = Vec::new();
        let mut truncated = false;

        info!(
            entry_point,
            workers = config.workers,
            max_pages = ?config.max_pages,
            "Starting crawl"
        );

        loop {
            while let Some(page) = frontier.pop_front() {
                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    frontier.push_front(page);
                    break;
                };
                let loader = Arc::clone(&self.loader);
                join_set.spawn(async move {
                    let _permit = permit;
                    let result = visit_page(&loader, &page).await;
                    (page, result)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (page, result) = joined?;

            match result {
                Ok(visit) => {
                    debug!(page = %visit.page, tasks = visit.tasks.len(), "Visited page");
                    graph.merge(visit.graph);
                    parsed_pages.push(page);

                    for task in visit.tasks {
                        if scheduled.contains(&task) {
                            continue;
                        }
                        if config.max_pages.is_some_and(|max| scheduled.len() >= max) {
                            truncated = true;
                            continue;
                        }
                        scheduled.insert(task.clone());
                        frontier.push_back(task);
                    }
                }
                Err(e) => {
                    error!(page, error = %e, "Failed to visit page");
                    failed_pages.push(page);
                }
            }

            let completed = parsed_pages.len() + failed_pages.len();
            if completed % PROGRESS_INTERVAL == 0 {
                info!(
                    parsed = parsed_pages.len(),
                    completed,
                    pending = frontier.len() + join_set.len(),
                    triples = graph.len(),
                    "Crawl progress"
                );
            }
        }

        if truncated {
            warn!(max_pages = ?config.max_pages, "Page limit reached, crawl is incomplete");
        }

        let removed_by_cleanup = if config.cleanup { cleanup(&mut graph) } else { 0 };

        let report = CrawlReport {
            entry_point: entry_point.to_string(),
            started_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
            pages_parsed: parsed_pages.len(),
            pages_failed: failed_pages.len(),
            failed_pages,
            triples: graph.len(),
            removed_by_cleanup,
            truncated,
        };

        info!(
            pages = report.pages_parsed,
            failed = report.pages_failed,
            triples = report.triples,
            elapsed_ms = report.elapsed_ms,
            "Crawl complete"
        );

        Ok(CrawlOutcome {
            graph,
            parsed_pages,
            report,
        })
    }
}

fn validate_entry_point(entry_point: &str) -> Result<()> {
    let url = Url::parse(entry_point)
        .map_err(|e| CrawlError::InvalidEntryPoint(format!("{}: {}", entry_point, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(CrawlError::InvalidEntryPoint(format!(
            "{}: unsupported scheme {}",
            entry_point, other
        ))),
    }
}
