//! In-memory RDF graph with set semantics.

use crate::namespaces::Namespaces;
use crate::term::{Iri, Subject, Term, Triple};
use std::collections::BTreeSet;

/// A triple pattern; `None` positions match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: Option<Subject>,
    pub predicate: Option<Iri>,
    pub object: Option<Term>,
}

impl TriplePattern {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: impl Into<Subject>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn predicate(mut self, predicate: Iri) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn object(mut self, object: impl Into<Term>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn matches(&self, triple: &Triple) -> bool {
        self.subject.as_ref().is_none_or(|s| *s == triple.subject)
            && self.predicate.as_ref().is_none_or(|p| *p == triple.predicate)
            && self.object.as_ref().is_none_or(|o| *o == triple.object)
    }
}

impl std::fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn slot<T: std::fmt::Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "None".to_string())
        }
        write!(
            f,
            "({}, {}, {})",
            slot(&self.subject),
            slot(&self.predicate),
            slot(&self.object)
        )
    }
}

/// A set of triples plus the prefix table used when serializing it.
///
/// Iteration order is deterministic (sorted), so serialized output is
/// stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    triples: BTreeSet<Triple>,
    namespaces: Namespaces,
}

impl Graph {
    /// An empty graph with the default namespace bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty graph with the given namespace bindings.
    pub fn with_namespaces(namespaces: Namespaces) -> Self {
        Self {
            triples: BTreeSet::new(),
            namespaces,
        }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn namespaces_mut(&mut self) -> &mut Namespaces {
        &mut self.namespaces
    }

    /// Insert a triple; returns `false` if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    pub fn remove(&mut self, triple: &Triple) -> bool {
        self.triples.remove(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Triples matching `pattern`.
    pub fn triples<'a>(&'a self, pattern: &'a TriplePattern) -> impl Iterator<Item = &'a Triple> {
        self.triples.iter().filter(move |t| pattern.matches(t))
    }

    /// Objects of all triples with the given predicate.
    pub fn objects<'a>(&'a self, predicate: &'a Iri) -> impl Iterator<Item = &'a Term> {
        self.triples
            .iter()
            .filter(move |t| t.predicate == *predicate)
            .map(|t| &t.object)
    }

    /// Merge every triple of `other` into this graph. Namespace bindings of
    /// `other` are added where this graph lacks the prefix.
    pub fn merge(&mut self, other: Graph) {
        for (prefix, namespace) in other.namespaces.iter() {
            if self.namespaces.get(prefix).is_none() {
                self.namespaces.bind(prefix, namespace);
            }
        }
        self.triples.extend(other.triples);
    }

    /// Keep only triples for which `keep` returns true; returns the number
    /// removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Triple) -> bool) -> usize {
        let before = self.triples.len();
        self.triples.retain(|t| keep(t));
        before - self.triples.len()
    }

    /// Number of triples mentioning no blank node. Blank node labels are
    /// arbitrary, so this is the comparable size of two parses of the same
    /// data.
    pub fn count_without_blank_nodes(&self) -> usize {
        self.triples.iter().filter(|t| !t.has_blank_node()).count()
    }
}

impl Extend<Triple> for Graph {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        self.triples.extend(iter);
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut graph = Graph::new();
        graph.triples.extend(iter);
        graph
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = std::collections::btree_set::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}
