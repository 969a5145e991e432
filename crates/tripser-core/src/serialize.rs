//! Turtle and N-Triples output.

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::namespaces::Namespaces;
use crate::term::{Iri, Literal, Subject, Term, escape_literal};
use crate::vocab;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Supported RDF output syntaxes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RdfFormat {
    #[default]
    Turtle,
    NTriples,
}

impl RdfFormat {
    /// Pick the format from a file extension; anything but `.nt` is Turtle.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("nt") => RdfFormat::NTriples,
            _ => RdfFormat::Turtle,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RdfFormat::Turtle => "ttl",
            RdfFormat::NTriples => "nt",
        }
    }
}

impl FromStr for RdfFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "turtle" | "ttl" => Ok(RdfFormat::Turtle),
            "ntriples" | "n-triples" | "nt" => Ok(RdfFormat::NTriples),
            other => Err(Error::Serialization(format!("unknown RDF format: {}", other))),
        }
    }
}

/// Write `graph` in `format`.
pub fn write_graph<W: Write>(graph: &Graph, format: RdfFormat, writer: &mut W) -> Result<()> {
    let text = match format {
        RdfFormat::Turtle => to_turtle(graph),
        RdfFormat::NTriples => to_ntriples(graph),
    };
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Serialize `graph` to a file, creating parent directories.
pub fn write_graph_file(graph: &Graph, format: RdfFormat, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_graph(graph, format, &mut file)
}

pub fn to_ntriples(graph: &Graph) -> String {
    let mut out = String::new();
    for triple in graph {
        out.push_str(&triple.to_string());
        out.push('\n');
    }
    out
}

pub fn to_turtle(graph: &Graph) -> String {
    let mut writer = TurtleWriter {
        namespaces: graph.namespaces(),
        used: BTreeSet::new(),
    };

    let mut body = String::new();
    let mut triples = graph.iter().peekable();

    while let Some(first) = triples.next() {
        let subject = &first.subject;
        body.push_str(&writer.subject(subject));

        let mut predicate = &first.predicate;
        body.push(' ');
        body.push_str(&writer.predicate(predicate));
        body.push(' ');
        body.push_str(&writer.object(&first.object));

        while let Some(next) = triples.next_if(|t| t.subject == *subject) {
            if next.predicate == *predicate {
                body.push_str(", ");
            } else {
                predicate = &next.predicate;
                body.push_str(" ;\n    ");
                body.push_str(&writer.predicate(predicate));
                body.push(' ');
            }
            body.push_str(&writer.object(&next.object));
        }
        body.push_str(" .\n\n");
    }

    let mut out = String::new();
    for (prefix, namespace) in graph.namespaces().iter() {
        if writer.used.contains(prefix) {
            out.push_str(&format!("@prefix {}: <{}> .\n", prefix, namespace));
        }
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&body);
    out
}

struct TurtleWriter<'a> {
    namespaces: &'a Namespaces,
    used: BTreeSet<String>,
}

impl TurtleWriter<'_> {
    fn iri(&mut self, iri: &Iri) -> String {
        if let Some((prefix, local)) = self.namespaces.split(iri.as_str()) {
            if is_pn_local(local) {
                self.used.insert(prefix.to_string());
                return format!("{}:{}", prefix, local);
            }
        }
        iri.to_string()
    }

    fn subject(&mut self, subject: &Subject) -> String {
        match subject {
            Subject::Iri(iri) => self.iri(iri),
            Subject::BlankNode(node) => node.to_string(),
        }
    }

    fn predicate(&mut self, predicate: &Iri) -> String {
        if predicate.as_str() == vocab::RDF_TYPE {
            "a".to_string()
        } else {
            self.iri(predicate)
        }
    }

    fn object(&mut self, object: &Term) -> String {
        match object {
            Term::Iri(iri) => self.iri(iri),
            Term::BlankNode(node) => node.to_string(),
            Term::Literal(literal) => self.literal(literal),
        }
    }

    fn literal(&mut self, literal: &Literal) -> String {
        let quoted = format!("\"{}\"", escape_literal(literal.lexical()));
        if let Some(language) = literal.language() {
            format!("{}@{}", quoted, language)
        } else if literal.is_plain_string() {
            quoted
        } else {
            let datatype = self.iri(literal.datatype());
            format!("{}^^{}", quoted, datatype)
        }
    }
}

/// Conservative PN_LOCAL check (ASCII subset, no escapes).
fn is_pn_local(local: &str) -> bool {
    if local.is_empty() {
        return true;
    }
    let mut chars = local.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
    first_ok
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        && !local.ends_with('.')
}
