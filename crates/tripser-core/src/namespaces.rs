//! Prefix bindings used when writing Turtle.

use crate::vocab;

/// Tripal content types exposed under the content base, as
/// `(prefix, path segment)`.
const TRIPAL_CONTENT_TYPES: &[(&str, &str)] = &[
    ("analysis", "Analysis"),
    ("binding_site", "Binding_Site"),
    ("biological_region", "Biological_Region"),
    ("cds", "CDS"),
    ("exon", "Exon"),
    ("gene", "Gene"),
    ("genetic_map", "Genetic_Map"),
    ("genetic_marker", "Genetic_Marker"),
    ("genome_annotation", "Genome_Annotation"),
    ("genome_assembly", "Genome_Assembly"),
    ("germplasm_accession", "Germplasm_Accession"),
    ("heritable_phenotypic_marker", "Heritable_Phenotypic_Marker"),
    ("mrna", "mRNA"),
    ("ncrna", "ncRNA"),
    ("organism", "Organism"),
    ("phylogenetic_tree", "Phylogenetic_Tree"),
    ("physical_map", "Physical_Map"),
    ("protein_binding_site", "Protein_Binding_Site"),
    ("pseudogene", "Pseudogene"),
    ("pseudogenic_cds", "Pseudogenic_CDS"),
    ("pseudogenic_exon", "Pseudogenic_Exon"),
    ("pseudogenic_transcript", "Pseudogenic_Transcript"),
    ("publication", "Publication"),
    ("qtl", "QTL"),
    ("regulatory_region", "Regulatory_Region"),
    ("repeat_region", "Repeat_Region"),
    ("rrna", "RRNA"),
    ("sequence_difference", "Sequence_Difference"),
    ("sequence_variant", "Sequence_Variant"),
    ("signal_peptide", "Signal_Peptide"),
    ("stem_loop", "Stem_Loop"),
    ("tmrna", "TmRNA"),
    ("trna", "TRNA"),
    ("transcript", "Transcript"),
];

/// Ordered `prefix -> namespace` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    bindings: Vec<(String, String)>,
}

impl Namespaces {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Bind `prefix` to `namespace`, replacing an existing binding of the
    /// same prefix.
    pub fn bind(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        let prefix = prefix.into();
        let namespace = namespace.into();
        match self.bindings.iter_mut().find(|(p, _)| *p == prefix) {
            Some(binding) => binding.1 = namespace,
            None => self.bindings.push((prefix, namespace)),
        }
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, ns)| (p.as_str(), ns.as_str()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Split `iri` into `(prefix, local)` using the longest matching
    /// namespace. The local part may be empty.
    pub fn split<'a>(&'a self, iri: &'a str) -> Option<(&'a str, &'a str)> {
        self.bindings
            .iter()
            .filter(|(_, ns)| iri.starts_with(ns.as_str()))
            .max_by_key(|(_, ns)| ns.len())
            .map(|(prefix, ns)| (prefix.as_str(), &iri[ns.len()..]))
    }
}

impl Default for Namespaces {
    /// Standard RDF vocabularies plus the bioinformatics ontologies and
    /// Tripal content types found in the pflu knowledge base.
    fn default() -> Self {
        let mut ns = Self::empty();
        ns.bind("rdf", vocab::RDF);
        ns.bind("rdfs", vocab::RDFS);
        ns.bind("xsd", vocab::XSD);
        ns.bind("owl", vocab::OWL);
        ns.bind("ssr", "http://semanticscience.org/resource/");
        ns.bind("edam", "http://edamontology.org/");
        ns.bind("schema", "https://schema.org/");
        ns.bind("obo", "http://purl.obolibrary.org/obo/");
        ns.bind(
            "so",
            "http://www.sequenceontology.org/browser/current_svn/term/SO:",
        );
        ns.bind("hydra", vocab::HYDRA);
        ns.bind(
            "ncbitax",
            "https://www.ncbi.nlm.nih.gov/Taxonomy/Browser/wwwtax.cgi?id=",
        );
        ns.bind("pflu", vocab::PFLU_CONTENT_BASE);
        ns.bind("tripal3", "http://pflu.evolbio.mpg.de/cv/lookup/local/");
        for (prefix, segment) in TRIPAL_CONTENT_TYPES {
            ns.bind(*prefix, format!("{}{}/", vocab::PFLU_CONTENT_BASE, segment));
        }
        ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_contains_pflu_namespaces() {
        let ns = Namespaces::default();
        let namespaces: Vec<&str> = ns.iter().map(|(_, n)| n).collect();
        for expected in [
            "http://pflu.evolbio.mpg.de/cv/lookup/local/",
            "http://pflu.evolbio.mpg.de/web-services/content/v0.1/",
            "http://pflu.evolbio.mpg.de/web-services/content/v0.1/CDS/",
            "http://pflu.evolbio.mpg.de/web-services/content/v0.1/mRNA/",
            "http://pflu.evolbio.mpg.de/web-services/content/v0.1/Gene/",
            "http://pflu.evolbio.mpg.de/web-services/content/v0.1/Exon/",
            "http://pflu.evolbio.mpg.de/web-services/content/v0.1/Organism/",
            "http://pflu.evolbio.mpg.de/web-services/content/v0.1/Transcript/",
        ] {
            assert!(namespaces.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_rebinding_replaces() {
        let mut ns = Namespaces::empty();
        ns.bind("ex", "http://example.org/");
        ns.bind("ex", "http://example.com/");
        assert_eq!(ns.len(), 1);
        assert_eq!(ns.get("ex"), Some("http://example.com/"));
    }

    #[test]
    fn test_split_prefers_longest_namespace() {
        let ns = Namespaces::default();
        assert_eq!(
            ns.split("http://pflu.evolbio.mpg.de/web-services/content/v0.1/CDS/11845"),
            Some(("cds", "11845"))
        );
        assert_eq!(
            ns.split("http://pflu.evolbio.mpg.de/web-services/content/v0.1/Unknown"),
            Some(("pflu", "Unknown"))
        );
        assert_eq!(ns.split("http://example.org/x"), None);
    }
}
