//! Visiting a single page: fetch it and work out which pages to visit next.

use crate::config::CrawlerConfig;
use crate::error::Result;
use crate::fetch::{DocumentFetcher, PageLoader};
use tracing::debug;
use tripser_core::{Graph, Term, vocab};

/// The result of visiting one page.
#[derive(Debug)]
pub struct PageVisit {
    pub page: String,
    pub graph: Graph,
    /// Candidate pages discovered on this page, in discovery order and
    /// without duplicates. Already-visited pages are not filtered here.
    pub tasks: Vec<String>,
}

/// Fetch `page` and collect its follow-up tasks.
pub async fn visit_page<F: DocumentFetcher>(loader: &PageLoader<F>, page: &str) -> Result<PageVisit> {
    let graph = loader.get_graph(page).await?;
    let tasks = discover_tasks(&graph, page, loader.config());

    Ok(PageVisit {
        page: page.to_string(),
        graph,
        tasks,
    })
}

/// Links under the content prefix plus, for an unpaginated collection,
/// one link per collection page.
pub fn discover_tasks(graph: &Graph, page: &str, config: &CrawlerConfig) -> Vec<String> {
    let mut tasks = linked_pages(graph, &config.content_prefix);

    if is_paginated(page) {
        return tasks;
    }

    if let Some(total) = total_items(graph) {
        debug!(page, total, "Found collection");
        for link in pagination_links(page, total, config.page_size) {
            if !tasks.contains(&link) {
                tasks.push(link);
            }
        }
    }

    tasks
}

/// Object IRIs starting with `prefix`, skipping pagination and item-count
/// statements.
pub fn linked_pages(graph: &Graph, prefix: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    for triple in graph {
        let predicate = triple.predicate.as_str();
        if predicate == vocab::HYDRA_PARTIAL_COLLECTION_VIEW || predicate == vocab::HYDRA_TOTAL_ITEMS {
            continue;
        }
        if let Term::Iri(iri) = &triple.object {
            let link = iri.as_str();
            if link.starts_with(prefix) && !links.iter().any(|l| l == link) {
                links.push(link.to_string());
            }
        }
    }

    links
}

/// Pages carrying a query with several parameters are collection pages
/// and are not paginated again.
pub fn is_paginated(page: &str) -> bool {
    page.contains('&')
}

/// The first `hydra:totalItems` value of the graph.
pub fn total_items(graph: &Graph) -> Option<u64> {
    graph
        .objects(&tripser_core::Iri::from_static(vocab::HYDRA_TOTAL_ITEMS))
        .next()
        .and_then(Term::as_literal)
        .and_then(|literal| literal.lexical().trim().parse::<i64>().ok())
        .map(|n| n.max(0) as u64)
}

/// `<page>?limit=<size>&page=<p>` for every page of a collection with
/// `total` members. Empty for an empty collection.
pub fn pagination_links(page: &str, total: u64, page_size: u64) -> Vec<String> {
    if total == 0 || page_size == 0 {
        return Vec::new();
    }
    let separator = if page.contains('?') { '&' } else { '?' };
    let pages = total.div_ceil(page_size);

    (1..=pages)
        .map(|p| format!("{}{}limit={}&page={}", page, separator, page_size, p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripser_core::{Iri, Literal, Triple};

    const COLLECTION: &str = "http://pflu.evolbio.mpg.de/web-services/content/v0.1/Gene";

    fn iri(value: &str) -> Iri {
        Iri::new(value).unwrap()
    }

    fn collection_graph(total: i64) -> Graph {
        let mut graph = Graph::new();
        let subject = iri(COLLECTION);
        graph.insert(Triple::new(
            subject.clone(),
            iri(vocab::HYDRA_TOTAL_ITEMS),
            Literal::integer(total),
        ));
        graph.insert(Triple::new(
            subject.clone(),
            iri("http://www.w3.org/ns/hydra/core#member"),
            iri("http://pflu.evolbio.mpg.de/web-services/content/v0.1/Gene/1"),
        ));
        graph.insert(Triple::new(
            subject.clone(),
            iri(vocab::HYDRA_PARTIAL_COLLECTION_VIEW),
            iri("http://pflu.evolbio.mpg.de/web-services/content/v0.1/Gene?page=1&limit=25"),
        ));
        graph.insert(Triple::new(
            subject,
            iri("https://schema.org/url"),
            iri("http://example.org/elsewhere"),
        ));
        graph
    }

    #[test]
    fn test_pagination_links() {
        let links = pagination_links(COLLECTION, 66, 25);
        assert_eq!(
            links,
            vec![
                format!("{}?limit=25&page=1", COLLECTION),
                format!("{}?limit=25&page=2", COLLECTION),
                format!("{}?limit=25&page=3", COLLECTION),
            ]
        );
        assert_eq!(pagination_links(COLLECTION, 25, 25).len(), 1);
        assert!(pagination_links(COLLECTION, 0, 25).is_empty());
    }

    #[test]
    fn test_linked_pages_skip_views_and_foreign_links() {
        let links = linked_pages(&collection_graph(3), vocab::PFLU_CONTENT_ROOT);
        assert_eq!(links, vec!["http://pflu.evolbio.mpg.de/web-services/content/v0.1/Gene/1"]);
    }

    #[test]
    fn test_discover_tasks_paginates_collections() {
        let config = CrawlerConfig::default();
        let tasks = discover_tasks(&collection_graph(30), COLLECTION, &config);
        assert_eq!(tasks.len(), 3);
        assert!(tasks[1].ends_with("Gene?limit=25&page=1"));
        assert!(tasks[2].ends_with("Gene?limit=25&page=2"));
    }

    #[test]
    fn test_paginated_page_is_not_paginated_again() {
        let config = CrawlerConfig::default();
        let page = format!("{}?limit=25&page=2", COLLECTION);
        let tasks = discover_tasks(&collection_graph(30), &page, &config);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_empty_collection_has_no_pages() {
        let config = CrawlerConfig::default();
        let tasks = discover_tasks(&collection_graph(0), COLLECTION, &config);
        assert_eq!(tasks.len(), 1);
        assert_eq!(total_items(&collection_graph(0)), Some(0));
        assert_eq!(total_items(&Graph::new()), None);
    }
}
