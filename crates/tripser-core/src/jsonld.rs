//! JSON-LD to RDF conversion.
//!
//! Covers the part of JSON-LD 1.1 that Tripal web services emit: inline and
//! remote contexts, prefixes and term aliases, typed term definitions,
//! nested node objects, `@graph`, value objects and `@list`. Framing,
//! `@reverse`, `@nest`, scoped contexts and compaction are not supported.
//!
//! Remote contexts are never fetched here; callers collect their URLs with
//! [`remote_context_urls`], fetch them and hand the documents in through
//! [`RemoteContexts`].

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::term::{BlankNode, Iri, Literal, Subject, Term, Triple};
use crate::vocab;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

/// Remote context documents, keyed by the reference exactly as written in
/// the document. Relative references are only meaningful for one page, so
/// a map is built per document.
pub type RemoteContexts = HashMap<String, Value>;

const MAX_EXPANSION_DEPTH: u8 = 16;
const MAX_CONTEXT_DEPTH: u8 = 8;

/// Parse a JSON-LD document into a new graph with default namespaces.
///
/// `base` is the document URL that relative `@id` references resolve
/// against.
pub fn parse_document(document: &Value, base: Option<&str>, remote: &RemoteContexts) -> Result<Graph> {
    let mut graph = Graph::new();
    parse_into(&mut graph, document, base, remote)?;
    Ok(graph)
}

/// Parse a JSON-LD document, inserting its triples into `graph`. Returns
/// the number of triples produced.
pub fn parse_into(
    graph: &mut Graph,
    document: &Value,
    base: Option<&str>,
    remote: &RemoteContexts,
) -> Result<usize> {
    let base = match base {
        Some(b) => Some(
            Url::parse(b).map_err(|e| Error::InvalidIri(format!("{}: {}", b, e)))?,
        ),
        None => None,
    };
    let context = Context {
        base,
        ..Default::default()
    };

    let mut converter = Converter {
        remote,
        blank_nodes: HashMap::new(),
        triples: Vec::new(),
    };
    converter.top_level(document, &context)?;

    let produced = converter.triples.len();
    graph.extend(converter.triples);
    Ok(produced)
}

/// URLs of every remote context referenced anywhere in `document`.
pub fn remote_context_urls(document: &Value) -> Vec<String> {
    let mut urls = Vec::new();
    collect_context_urls(document, &mut urls);
    urls
}

fn collect_context_urls(value: &Value, urls: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_context_urls(v, urls)),
        Value::Object(map) => {
            if let Some(context) = map.get("@context") {
                let entries = match context {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                for entry in entries {
                    if let Value::String(url) = entry {
                        if !urls.contains(url) {
                            urls.push(url.clone());
                        }
                    }
                }
            }
            for (key, v) in map {
                if key != "@context" {
                    collect_context_urls(v, urls);
                }
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, PartialEq)]
enum IdMapping {
    /// Explicitly mapped to `null`: the term is ignored.
    Null,
    Raw(String),
    /// Expanded definition without `@id`; the term expands on its own.
    Implicit,
}

#[derive(Debug, Clone)]
struct TermDefinition {
    id: IdMapping,
    type_mapping: Option<String>,
    language: Option<String>,
    list: bool,
}

#[derive(Debug, Clone, Default)]
struct Context {
    base: Option<Url>,
    vocab: Option<String>,
    language: Option<String>,
    terms: HashMap<String, TermDefinition>,
}

impl Context {
    fn apply(&self, local: &Value, remote: &RemoteContexts, depth: u8) -> Result<Context> {
        if depth > MAX_CONTEXT_DEPTH {
            return Err(Error::JsonLd("context recursion too deep".to_string()));
        }

        match local {
            Value::Null => Ok(Context {
                base: self.base.clone(),
                ..Default::default()
            }),
            Value::String(url) => match remote.get(url) {
                Some(document) => {
                    let inner = document.get("@context").unwrap_or(document);
                    self.apply(inner, remote, depth + 1)
                }
                None => {
                    warn!(context = %url, "Remote context not available, skipping");
                    Ok(self.clone())
                }
            },
            Value::Array(items) => {
                let mut result = self.clone();
                for item in items {
                    result = result.apply(item, remote, depth + 1)?;
                }
                Ok(result)
            }
            Value::Object(map) => self.apply_object(map),
            other => Err(Error::JsonLd(format!("invalid @context entry: {}", other))),
        }
    }

    fn apply_object(&self, map: &Map<String, Value>) -> Result<Context> {
        let mut result = self.clone();

        if let Some(base) = map.get("@base") {
            result.base = match base {
                Value::Null => None,
                Value::String(b) => {
                    let resolved = match &self.base {
                        Some(current) => current.join(b),
                        None => Url::parse(b),
                    };
                    Some(resolved.map_err(|e| Error::JsonLd(format!("invalid @base {}: {}", b, e)))?)
                }
                other => return Err(Error::JsonLd(format!("invalid @base: {}", other))),
            };
        }

        if let Some(language) = map.get("@language") {
            result.language = match language {
                Value::Null => None,
                Value::String(l) => Some(l.to_ascii_lowercase()),
                other => return Err(Error::JsonLd(format!("invalid @language: {}", other))),
            };
        }

        for (key, value) in map {
            if key.starts_with('@') {
                continue;
            }
            let definition = match value {
                Value::Null => TermDefinition {
                    id: IdMapping::Null,
                    type_mapping: None,
                    language: None,
                    list: false,
                },
                Value::String(id) => TermDefinition {
                    id: IdMapping::Raw(id.clone()),
                    type_mapping: None,
                    language: None,
                    list: false,
                },
                Value::Object(def) => parse_term_definition(key, def)?,
                other => {
                    return Err(Error::JsonLd(format!(
                        "invalid definition for term {}: {}",
                        key, other
                    )));
                }
            };
            result.terms.insert(key.clone(), definition);
        }

        // @vocab may itself be a compact IRI or term, so it expands against
        // the definitions collected above.
        if let Some(vocab_value) = map.get("@vocab") {
            result.vocab = match vocab_value {
                Value::Null => None,
                Value::String(v) if v.is_empty() => {
                    result.base.as_ref().map(|b| b.to_string())
                }
                Value::String(v) => Some(
                    result
                        .expand_iri(v, true, true, 0)
                        .ok_or_else(|| Error::JsonLd(format!("invalid @vocab: {}", v)))?,
                ),
                other => return Err(Error::JsonLd(format!("invalid @vocab: {}", other))),
            };
        }

        Ok(result)
    }

    /// Expand a term, compact IRI or relative reference.
    ///
    /// `vocab` enables term lookup and `@vocab`; `document_relative`
    /// enables resolution against the base.
    fn expand_iri(&self, value: &str, vocab: bool, document_relative: bool, depth: u8) -> Option<String> {
        if depth > MAX_EXPANSION_DEPTH || value.starts_with('@') {
            return None;
        }

        if vocab {
            if let Some(definition) = self.terms.get(value) {
                match &definition.id {
                    IdMapping::Null => return None,
                    IdMapping::Raw(id) if id != value => {
                        return self.expand_iri(id, true, false, depth + 1);
                    }
                    _ => {}
                }
            }
        }

        if let Some((prefix, suffix)) = value.split_once(':') {
            if prefix == "_" {
                return Some(value.to_string());
            }
            if !suffix.starts_with("//") {
                if let Some(TermDefinition {
                    id: IdMapping::Raw(id),
                    ..
                }) = self.terms.get(prefix)
                {
                    if id != value {
                        if let Some(namespace) = self.expand_iri(id, true, false, depth + 1) {
                            return Some(format!("{}{}", namespace, suffix));
                        }
                    }
                }
            }
            if has_scheme(prefix) {
                return Some(value.to_string());
            }
        }

        if vocab {
            if let Some(vocab_iri) = &self.vocab {
                return Some(format!("{}{}", vocab_iri, value));
            }
        }

        if document_relative {
            if let Some(base) = &self.base {
                return base.join(value).ok().map(String::from);
            }
        }

        None
    }
}

fn parse_term_definition(term: &str, def: &Map<String, Value>) -> Result<TermDefinition> {
    let id = match def.get("@id") {
        None => IdMapping::Implicit,
        Some(Value::Null) => IdMapping::Null,
        Some(Value::String(id)) => IdMapping::Raw(id.clone()),
        Some(other) => {
            return Err(Error::JsonLd(format!("invalid @id for term {}: {}", term, other)));
        }
    };

    let type_mapping = match def.get("@type") {
        None | Some(Value::Null) => None,
        Some(Value::String(t)) => Some(t.clone()),
        Some(other) => {
            return Err(Error::JsonLd(format!("invalid @type for term {}: {}", term, other)));
        }
    };

    let language = match def.get("@language") {
        Some(Value::String(l)) => Some(l.to_ascii_lowercase()),
        _ => None,
    };

    let list = match def.get("@container") {
        Some(Value::String(c)) => c == "@list",
        Some(Value::Array(cs)) => cs.iter().any(|c| c.as_str() == Some("@list")),
        _ => false,
    };

    Ok(TermDefinition {
        id,
        type_mapping,
        language,
        list,
    })
}

/// Percent-encode characters that may not appear in an IRI. Tripal
/// documents are percent-decoded before parsing, which reintroduces
/// spaces into identifiers.
fn encode_unsafe(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '`' | '\\' | '|' | '^') {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        } else {
            encoded.push(c);
        }
    }
    encoded
}

struct Converter<'a> {
    remote: &'a RemoteContexts,
    blank_nodes: HashMap<String, BlankNode>,
    triples: Vec<Triple>,
}

impl Converter<'_> {
    fn top_level(&mut self, document: &Value, context: &Context) -> Result<()> {
        match document {
            Value::Array(items) => {
                for item in items {
                    self.top_level(item, context)?;
                }
                Ok(())
            }
            Value::Object(map) => {
                let context = match map.get("@context") {
                    Some(local) => context.apply(local, self.remote, 0)?,
                    None => context.clone(),
                };
                let only_graph = map.contains_key("@graph")
                    && map.keys().all(|k| k == "@context" || k == "@graph" || k == "@id");
                if only_graph && !map.contains_key("@id") {
                    if let Some(graph) = map.get("@graph") {
                        self.top_level(graph, &context)?;
                    }
                    return Ok(());
                }
                self.node(map, &context)?;
                Ok(())
            }
            Value::Null => Ok(()),
            other => Err(Error::JsonLd(format!(
                "top-level value must be an object or array, got {}",
                other
            ))),
        }
    }

    fn blank_node(&mut self, label: &str) -> BlankNode {
        self.blank_nodes
            .entry(label.to_string())
            .or_insert_with(BlankNode::fresh)
            .clone()
    }

    /// Turn an expanded identifier into a subject; `_:` labels become
    /// document-scoped blank nodes.
    fn subject_for(&mut self, expanded: &str) -> Option<Subject> {
        if let Some(label) = expanded.strip_prefix("_:") {
            return Some(Subject::BlankNode(self.blank_node(label)));
        }
        Iri::new(encode_unsafe(expanded)).ok().map(Subject::Iri)
    }

    fn node(&mut self, map: &Map<String, Value>, parent: &Context) -> Result<Subject> {
        let context = match map.get("@context") {
            Some(local) => parent.apply(local, self.remote, 0)?,
            None => parent.clone(),
        };

        let subject = match map.get("@id") {
            Some(Value::String(id)) => {
                let expanded = context.expand_iri(id, false, true, 0);
                match expanded.and_then(|e| self.subject_for(&e)) {
                    Some(subject) => subject,
                    None => {
                        debug!(id = %id, "Node identifier does not expand to an IRI, using blank node");
                        Subject::BlankNode(BlankNode::fresh())
                    }
                }
            }
            Some(other) => {
                return Err(Error::JsonLd(format!("@id must be a string, got {}", other)));
            }
            None => Subject::BlankNode(BlankNode::fresh()),
        };

        if let Some(types) = map.get("@type") {
            let rdf_type = Iri::from_static(vocab::RDF_TYPE);
            for t in as_array(types) {
                let Value::String(t) = t else {
                    return Err(Error::JsonLd(format!("@type must be a string, got {}", t)));
                };
                let expanded = context.expand_iri(t, true, true, 0);
                match expanded.and_then(|e| self.subject_for(&e)) {
                    Some(object) => self.triples.push(Triple::new(
                        subject.clone(),
                        rdf_type.clone(),
                        Term::from(object),
                    )),
                    None => debug!(type_name = %t, "Type does not expand to an IRI, dropped"),
                }
            }
        }

        if let Some(graph) = map.get("@graph") {
            self.top_level(graph, &context)?;
        }

        for (key, value) in map {
            if key.starts_with('@') {
                continue;
            }

            let Some(predicate) = context.expand_iri(key, true, false, 0) else {
                debug!(key = %key, "Property does not expand to an IRI, dropped");
                continue;
            };
            if predicate.starts_with("_:") {
                continue;
            }
            let Ok(predicate) = Iri::new(encode_unsafe(&predicate)) else {
                debug!(key = %key, "Property expands to an invalid IRI, dropped");
                continue;
            };

            let definition = context.terms.get(key).cloned();
            let objects = if definition.as_ref().is_some_and(|d| d.list) {
                vec![self.list(as_array(value), definition.as_ref(), &context)?]
            } else {
                self.values(value, definition.as_ref(), &context)?
            };

            for object in objects {
                self.triples
                    .push(Triple::new(subject.clone(), predicate.clone(), object));
            }
        }

        Ok(subject)
    }

    fn values(
        &mut self,
        value: &Value,
        definition: Option<&TermDefinition>,
        context: &Context,
    ) -> Result<Vec<Term>> {
        let mut terms = Vec::new();
        for item in as_array(value) {
            if let Some(set) = item.get("@set") {
                terms.extend(self.values(set, definition, context)?);
            } else if let Some(term) = self.value(item, definition, context)? {
                terms.push(term);
            }
        }
        Ok(terms)
    }

    fn value(
        &mut self,
        value: &Value,
        definition: Option<&TermDefinition>,
        context: &Context,
    ) -> Result<Option<Term>> {
        let type_mapping = definition.and_then(|d| d.type_mapping.as_deref());

        match value {
            Value::Null => Ok(None),
            Value::Array(items) => {
                // Nested arrays only occur inside lists.
                Ok(Some(self.list(items.iter().collect(), definition, context)?))
            }
            Value::String(s) => Ok(self.string_value(s, definition, context)),
            Value::Bool(b) => Ok(Some(match type_mapping {
                Some(t) if t != "@id" && t != "@vocab" => self.typed_literal(b.to_string(), t, context),
                _ => Literal::boolean(*b).into(),
            })),
            Value::Number(n) => {
                let literal = match (n.as_i64(), type_mapping) {
                    (_, Some(t)) if t != "@id" && t != "@vocab" => {
                        return Ok(Some(self.typed_literal(n.to_string(), t, context)));
                    }
                    (Some(i), _) => Literal::integer(i),
                    (None, _) => Literal::double(n.as_f64().unwrap_or(f64::NAN)),
                };
                Ok(Some(literal.into()))
            }
            Value::Object(map) => {
                if map.contains_key("@value") {
                    return self.value_object(map, context);
                }
                if let Some(list) = map.get("@list") {
                    return Ok(Some(self.list(as_array(list), definition, context)?));
                }
                let subject = self.node(map, context)?;
                Ok(Some(subject.into()))
            }
        }
    }

    fn string_value(&mut self, s: &str, definition: Option<&TermDefinition>, context: &Context) -> Option<Term> {
        match definition.and_then(|d| d.type_mapping.as_deref()) {
            Some("@id") => {
                let expanded = context.expand_iri(s, false, true, 0)?;
                self.subject_for(&expanded).map(Term::from)
            }
            Some("@vocab") => {
                let expanded = context.expand_iri(s, true, true, 0)?;
                self.subject_for(&expanded).map(Term::from)
            }
            Some(datatype) => Some(self.typed_literal(s.to_string(), datatype, context)),
            None => {
                let language = definition
                    .and_then(|d| d.language.clone())
                    .or_else(|| context.language.clone());
                Some(match language {
                    Some(l) => Literal::lang(s, &l).into(),
                    None => Literal::string(s).into(),
                })
            }
        }
    }

    fn typed_literal(&self, lexical: String, datatype: &str, context: &Context) -> Term {
        match context
            .expand_iri(datatype, true, true, 0)
            .and_then(|d| Iri::new(encode_unsafe(&d)).ok())
        {
            Some(datatype) => Literal::typed(lexical, datatype).into(),
            None => Literal::string(lexical).into(),
        }
    }

    fn value_object(&mut self, map: &Map<String, Value>, context: &Context) -> Result<Option<Term>> {
        let lexical = match map.get("@value") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(Error::JsonLd(format!("invalid @value: {}", other)));
            }
        };

        if let Some(Value::String(datatype)) = map.get("@type") {
            return Ok(Some(self.typed_literal(lexical, datatype, context)));
        }
        if let Some(Value::String(language)) = map.get("@language") {
            return Ok(Some(Literal::lang(lexical, language).into()));
        }

        Ok(Some(match map.get("@value") {
            Some(Value::Bool(b)) => Literal::boolean(*b).into(),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => Literal::integer(i).into(),
                None => Literal::double(n.as_f64().unwrap_or(f64::NAN)).into(),
            },
            _ => Literal::string(lexical).into(),
        }))
    }

    /// Emit an `rdf:first` / `rdf:rest` chain and return its head.
    fn list(
        &mut self,
        items: Vec<&Value>,
        definition: Option<&TermDefinition>,
        context: &Context,
    ) -> Result<Term> {
        let mut members = Vec::new();
        for item in items {
            if let Some(term) = self.value(item, definition, context)? {
                members.push(term);
            }
        }

        let first = Iri::from_static(vocab::RDF_FIRST);
        let rest = Iri::from_static(vocab::RDF_REST);
        let mut head: Term = Iri::from_static(vocab::RDF_NIL).into();

        for member in members.into_iter().rev() {
            let node = BlankNode::fresh();
            self.triples
                .push(Triple::new(node.clone(), first.clone(), member));
            self.triples.push(Triple::new(node.clone(), rest.clone(), head));
            head = node.into();
        }

        Ok(head)
    }
}

/// `scheme ":"` per RFC 3986; whitespace in the remainder is tolerated
/// because it gets encoded later.
fn has_scheme(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn as_array(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}
