//! Downloading pages and turning them into graphs.

use crate::config::CrawlerConfig;
use crate::error::{CrawlError, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tripser_core::jsonld::{self, RemoteContexts};
use tripser_core::serialize::to_turtle;
use tripser_core::Graph;
use url::Url;

const MAX_CONTEXT_ROUNDS: usize = 8;

/// Source of raw documents.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch the body of `url` as text.
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Fetches documents over HTTP with a request timeout and fixed-delay
/// retries on transport errors.
pub struct HttpFetcher {
    client: reqwest::Client,
    retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("tripser/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            retries: config.retries,
            retry_delay: config.retry_delay(),
        })
    }

    async fn get(&self, url: &str) -> reqwest::Result<String> {
        self.client
            .get(url)
            .header(ACCEPT, "application/ld+json, application/json;q=0.9, */*;q=0.1")
            .send()
            .await?
            .text()
            .await
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.get(url).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(url, attempt, error = %e, "Request failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(CrawlError::Http(e)),
            }
        }
    }
}

/// Loads page graphs through a [`DocumentFetcher`], caching remote
/// JSON-LD contexts across pages.
pub struct PageLoader<F> {
    fetcher: F,
    config: CrawlerConfig,
    /// Fetched context documents by resolved URL.
    contexts: RwLock<HashMap<String, Value>>,
}

impl<F: DocumentFetcher> PageLoader<F> {
    pub fn new(fetcher: F, config: CrawlerConfig) -> Self {
        Self {
            fetcher,
            config,
            contexts: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Download `page` and convert it into a graph.
    ///
    /// A body that is not JSON yields an empty graph. Transport and
    /// conversion errors are returned.
    pub async fn get_graph(&self, page: &str) -> Result<Graph> {
        debug!(page, "Fetching page");
        let body = self.fetcher.fetch_text(page).await?;

        let document: Value = match serde_json::from_str(&body) {
            Ok(document) => document,
            Err(e) => {
                warn!(page, error = %e, "Not a valid JSON document");
                return Ok(Graph::new());
            }
        };

        let text = serde_json::to_string(&document).map_err(tripser_core::Error::from)?;
        let text = percent_decode(&self.config.rewrite(&text));
        let document: Value = serde_json::from_str(&text).map_err(tripser_core::Error::from)?;

        let remote = self.remote_contexts(page, &document).await;
        let graph = jsonld::parse_document(&document, Some(page), &remote)?;
        debug!(page, triples = graph.len(), "Parsed page");

        if self.config.serialize_nodes {
            self.write_node(page, &graph).await?;
        }

        Ok(graph)
    }

    /// Resolve every remote context `document` references, including
    /// contexts referenced by fetched contexts, keyed by the reference as
    /// written. References are resolved against the page (or the context
    /// that contains them), and fetched documents are cached by their
    /// resolved URL. Unavailable contexts are skipped with a warning.
    async fn remote_contexts(&self, page: &str, document: &Value) -> RemoteContexts {
        let mut resolved = RemoteContexts::new();
        let mut pending: Vec<(String, String)> = jsonld::remote_context_urls(document)
            .into_iter()
            .map(|reference| (page.to_string(), reference))
            .collect();
        let mut rounds = 0;

        while !pending.is_empty() && rounds < MAX_CONTEXT_ROUNDS {
            rounds += 1;
            let mut discovered = Vec::new();

            for (base, reference) in pending {
                if resolved.contains_key(&reference) {
                    continue;
                }
                let Some(url) = resolve_reference(&base, &reference) else {
                    warn!(page, context = %reference, "Cannot resolve context reference");
                    continue;
                };
                match self.context(&url).await {
                    Ok(context) => {
                        discovered.extend(
                            jsonld::remote_context_urls(&context)
                                .into_iter()
                                .map(|nested| (url.clone(), nested)),
                        );
                        resolved.insert(reference, context);
                    }
                    Err(e) => warn!(context = %url, error = %e, "Failed to load remote context"),
                }
            }

            pending = discovered;
        }

        resolved
    }

    async fn context(&self, url: &str) -> Result<Value> {
        if let Some(context) = self.contexts.read().await.get(url) {
            return Ok(context.clone());
        }
        let context = self.fetch_context(url).await?;
        self.contexts.write().await.insert(url.to_string(), context.clone());
        Ok(context)
    }

    async fn fetch_context(&self, url: &str) -> Result<Value> {
        let body = self.fetcher.fetch_text(url).await?;
        let body = self.config.rewrite(&body);
        let context = serde_json::from_str(&body).map_err(tripser_core::Error::from)?;
        debug!(context = url, "Loaded remote context");
        Ok(context)
    }

    async fn write_node(&self, page: &str, graph: &Graph) -> Result<()> {
        let path = self.config.node_dir.join(node_file_name(page));
        info!(page, path = %path.display(), "Writing page graph");
        tokio::fs::create_dir_all(&self.config.node_dir).await?;
        tokio::fs::write(&path, to_turtle(graph)).await?;
        Ok(())
    }
}

/// File name for the per-page graph: the URL without its scheme, with
/// `/` replaced by `__`, plus `.ttl`.
pub fn node_file_name(page: &str) -> PathBuf {
    let without_scheme = page.split_once("://").map_or(page, |(_, rest)| rest);
    PathBuf::from(format!("{}.ttl", without_scheme.replace('/', "__")))
}

fn percent_decode(text: &str) -> String {
    match urlencoding::decode(text) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!(error = %e, "Percent-decoded body is not UTF-8, keeping it encoded");
            text.to_string()
        }
    }
}

fn resolve_reference(page: &str, reference: &str) -> Option<String> {
    Url::parse(page)
        .and_then(|base| base.join(reference))
        .ok()
        .map(String::from)
}
