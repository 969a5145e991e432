//! Removal of Hydra pagination artifacts from crawled graphs.

use crate::graph::{Graph, TriplePattern};
use crate::term::Iri;
use crate::vocab;
use tracing::debug;

const PARTIAL_COLLECTION_VIEW: &str = "PartialCollectionView";

/// Remove all triples matching `pattern`; returns how many were removed.
pub fn remove_terms(graph: &mut Graph, pattern: &TriplePattern) -> usize {
    let removed = graph.retain(|t| !pattern.matches(t));

    debug!(removed, pattern = %pattern, "Removed terms matching triple pattern");

    removed
}

/// Whether `iri` is the `PartialCollectionView` type as a relative
/// reference resolves it, e.g. `file:///tmp/PartialCollectionView` or
/// `<content base>/PartialCollectionView`.
fn is_partial_collection_view_type(iri: &Iri) -> bool {
    iri.as_str()
        .rsplit_once('/')
        .is_some_and(|(_, last)| last == PARTIAL_COLLECTION_VIEW)
}

/// Remove pagination views: every triple whose object is a
/// `PartialCollectionView` type and every `hydra:PartialCollectionView`
/// link. Returns the total number of removed triples.
pub fn cleanup(graph: &mut Graph) -> usize {
    let removed_types = graph.retain(|t| {
        !t.object
            .as_iri()
            .is_some_and(is_partial_collection_view_type)
    });
    debug!(removed = removed_types, "Removed PartialCollectionView typed terms");

    let pattern =
        TriplePattern::any().predicate(Iri::from_static(vocab::HYDRA_PARTIAL_COLLECTION_VIEW));
    removed_types + remove_terms(graph, &pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{BlankNode, Literal, Triple};

    fn iri(value: &str) -> Iri {
        Iri::new(value).unwrap()
    }

    fn messy_graph() -> Graph {
        let collection = iri("http://pflu.evolbio.mpg.de/web-services/content/v0.1/TRNA");
        let view = iri("http://pflu.evolbio.mpg.de/web-services/content/v0.1/TRNA?page=1&limit=25");
        let rdf_type = iri(vocab::RDF_TYPE);

        let mut graph = Graph::new();
        graph.insert(Triple::new(
            collection.clone(),
            rdf_type.clone(),
            iri("http://www.w3.org/ns/hydra/core#Collection"),
        ));
        graph.insert(Triple::new(
            collection.clone(),
            iri(vocab::HYDRA_TOTAL_ITEMS),
            Literal::integer(66),
        ));
        graph.insert(Triple::new(
            collection.clone(),
            iri(vocab::HYDRA_PARTIAL_COLLECTION_VIEW),
            view.clone(),
        ));
        graph.insert(Triple::new(
            view.clone(),
            rdf_type.clone(),
            iri("http://pflu.evolbio.mpg.de/web-services/content/v0.1/PartialCollectionView"),
        ));
        graph.insert(Triple::new(
            BlankNode::new("v"),
            rdf_type,
            iri("file:///tmp/PartialCollectionView"),
        ));
        graph.insert(Triple::new(
            view,
            iri("http://www.w3.org/ns/hydra/core#first"),
            Literal::string("first"),
        ));
        graph
    }

    #[test]
    fn test_remove_terms_counts() {
        let mut graph = messy_graph();
        let pattern = TriplePattern::any().predicate(iri(vocab::RDF_TYPE));
        assert_eq!(remove_terms(&mut graph, &pattern), 3);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_remove_terms_no_match() {
        let mut graph = messy_graph();
        let pattern = TriplePattern::any().predicate(iri("http://ex.org/none"));
        assert_eq!(remove_terms(&mut graph, &pattern), 0);
        assert_eq!(graph.len(), 6);
    }

    #[test]
    fn test_cleanup_removes_only_views() {
        let mut graph = messy_graph();
        assert_eq!(cleanup(&mut graph), 3);
        assert_eq!(graph.len(), 3);

        let total_items = TriplePattern::any().predicate(iri(vocab::HYDRA_TOTAL_ITEMS));
        assert_eq!(graph.triples(&total_items).count(), 1);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut graph = messy_graph();
        cleanup(&mut graph);
        assert_eq!(cleanup(&mut graph), 0);
    }
}
