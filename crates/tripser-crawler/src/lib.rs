//! Recursive crawler for Tripal JSON-LD web services.
//!
//! Starting from an entry point, every page of the service reachable
//! through links under the content root is fetched, converted to RDF and
//! merged into one graph. Hydra collections are expanded page by page.

pub mod config;
pub mod crawler;
pub mod error;
pub mod fetch;
pub mod page;

#[cfg(test)]
mod test_support;

pub use config::CrawlerConfig;
pub use crawler::{CrawlOutcome, CrawlReport, Crawler};
pub use error::{CrawlError, Result};
pub use fetch::{DocumentFetcher, HttpFetcher, PageLoader};
