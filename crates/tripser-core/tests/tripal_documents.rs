//! Conversion tests on documents shaped like Tripal web-service responses.

use serde_json::json;
use tripser_core::jsonld::{RemoteContexts, parse_document};
use tripser_core::ntriples::parse_ntriples;
use tripser_core::serialize::{to_ntriples, to_turtle};
use tripser_core::{Iri, TriplePattern, cleanup, vocab};

const CDS_URL: &str = "http://pflu.evolbio.mpg.de/web-services/content/v0.1/CDS/11845";
const COLLECTION_URL: &str = "http://pflu.evolbio.mpg.de/web-services/content/v0.1/TMRNA";

fn cds_document() -> serde_json::Value {
    json!({
        "@context": {
            "rdfs": "http://www.w3.org/2000/01/rdf-schema#",
            "xsd": "http://www.w3.org/2001/XMLSchema#",
            "hydra": "http://www.w3.org/ns/hydra/core#",
            "schema": "https://schema.org/",
            "SO": "http://www.sequenceontology.org/browser/current_svn/term/SO:",
            "SIO": "http://semanticscience.org/resource/SIO_",
            "data": "http://edamontology.org/data_",
            "label": "rdfs:label",
            "name": "schema:name",
            "sequence_length": "data:1249",
            "ItemPage": "schema:ItemPage",
            "organism": {"@id": "SIO:010000", "@type": "@id"},
            "database_cross_reference": {"@id": "SIO:000651", "@type": "@id"}
        },
        "@id": CDS_URL,
        "@type": "SO:0000316",
        "label": "PFLU_0001",
        "name": "dnaA",
        "sequence_length": 1503,
        "ItemPage": "http://pflu.evolbio.mpg.de/bio_data/11845",
        "organism": "http://pflu.evolbio.mpg.de/web-services/content/v0.1/Organism/1",
        "database_cross_reference": "http://pflu.evolbio.mpg.de/web-services/content/v0.1/CDS/11845/database cross reference"
    })
}

fn collection_document() -> serde_json::Value {
    json!({
        "@context": {
            "rdfs": "http://www.w3.org/2000/01/rdf-schema#",
            "hydra": "http://www.w3.org/ns/hydra/core#",
            "SO": "http://www.sequenceontology.org/browser/current_svn/term/SO:",
            "label": "rdfs:label",
            "Collection": "hydra:Collection",
            "totalItems": "hydra:totalItems",
            "member": "hydra:member",
            "view": "hydra:PartialCollectionView"
        },
        "@id": COLLECTION_URL,
        "@type": "Collection",
        "totalItems": 1,
        "label": "tmRNA collection",
        "member": [
            {"@id": "http://pflu.evolbio.mpg.de/web-services/content/v0.1/TMRNA/93", "@type": "SO:0000584", "label": "ssrA"}
        ],
        "view": {
            "@id": "http://pflu.evolbio.mpg.de/web-services/content/v0.1/TMRNA?page=1&limit=25",
            "@type": "PartialCollectionView",
            "first": "http://pflu.evolbio.mpg.de/web-services/content/v0.1/TMRNA?page=1&limit=25"
        }
    })
}

#[test]
fn test_cds_document_triples() {
    let graph = parse_document(&cds_document(), Some(CDS_URL), &RemoteContexts::new()).unwrap();

    assert_eq!(graph.len(), 7);
    assert_eq!(graph.count_without_blank_nodes(), 7);

    let xref = TriplePattern::any()
        .predicate(Iri::new("http://semanticscience.org/resource/SIO_000651").unwrap());
    let object = graph.triples(&xref).next().unwrap().object.value().to_string();
    assert_eq!(
        object,
        "http://pflu.evolbio.mpg.de/web-services/content/v0.1/CDS/11845/database%20cross%20reference"
    );
}

#[test]
fn test_collection_document_and_cleanup() {
    let mut graph =
        parse_document(&collection_document(), Some(COLLECTION_URL), &RemoteContexts::new()).unwrap();

    // type, totalItems, label, member link, member type, member label,
    // view link, view type ("first" is not mapped and is dropped).
    assert_eq!(graph.len(), 8);

    let removed = cleanup(&mut graph);
    assert_eq!(removed, 2);
    assert_eq!(graph.len(), 6);

    let total = graph
        .objects(&Iri::from_static(vocab::HYDRA_TOTAL_ITEMS))
        .next()
        .and_then(|t| t.as_literal())
        .and_then(|l| l.as_integer());
    assert_eq!(total, Some(1));
}

#[test]
fn test_turtle_uses_tripal_prefixes() {
    let graph = parse_document(&cds_document(), Some(CDS_URL), &RemoteContexts::new()).unwrap();
    let turtle = to_turtle(&graph);

    assert!(turtle.contains("@prefix cds: <http://pflu.evolbio.mpg.de/web-services/content/v0.1/CDS/> ."));
    assert!(turtle.contains("\ncds:11845 "));
    assert!(turtle.contains(" a so:0000316 ;"));
    assert!(turtle.contains("organism:1"));
}

#[test]
fn test_ntriples_output_reparses_to_same_size() {
    let graph = parse_document(&collection_document(), Some(COLLECTION_URL), &RemoteContexts::new()).unwrap();
    let reparsed = parse_ntriples(&to_ntriples(&graph)).unwrap();
    assert_eq!(reparsed.len(), graph.len());
    assert_eq!(reparsed.count_without_blank_nodes(), graph.count_without_blank_nodes());
}

#[test]
fn test_parsing_is_deterministic() {
    let first = parse_document(&cds_document(), Some(CDS_URL), &RemoteContexts::new()).unwrap();
    let second = parse_document(&cds_document(), Some(CDS_URL), &RemoteContexts::new()).unwrap();
    assert_eq!(to_turtle(&first), to_turtle(&second));
}
