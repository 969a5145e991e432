//! N-Triples parsing, used to seed a crawl with an existing graph.

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::term::{BlankNode, Iri, Literal, Subject, Term, Triple};
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

/// Parse an N-Triples document into a new graph.
///
/// Blank node labels are replaced by fresh blank nodes, consistently within
/// the document, so they cannot collide with nodes of other graphs.
pub fn parse_ntriples(text: &str) -> Result<Graph> {
    let mut graph = Graph::new();
    let mut blank_nodes: HashMap<String, BlankNode> = HashMap::new();

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let mut parser = LineParser {
            chars: line.chars().peekable(),
            line: line_number,
            blank_nodes: &mut blank_nodes,
        };

        parser.skip_whitespace();
        if parser.at_end_or_comment() {
            continue;
        }

        let subject = match parser.term()? {
            Term::Iri(iri) => Subject::Iri(iri),
            Term::BlankNode(node) => Subject::BlankNode(node),
            Term::Literal(_) => return Err(parser.error("literal in subject position")),
        };
        parser.skip_whitespace();
        let predicate = match parser.term()? {
            Term::Iri(iri) => iri,
            _ => return Err(parser.error("predicate must be an IRI")),
        };
        parser.skip_whitespace();
        let object = parser.term()?;
        parser.skip_whitespace();
        if parser.chars.next() != Some('.') {
            return Err(parser.error("expected '.'"));
        }
        parser.skip_whitespace();
        if !parser.at_end_or_comment() {
            return Err(parser.error("trailing content after '.'"));
        }

        graph.insert(Triple::new(subject, predicate, object));
    }

    Ok(graph)
}

struct LineParser<'a, 'b> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    blank_nodes: &'b mut HashMap<String, BlankNode>,
}

impl LineParser<'_, '_> {
    fn error(&self, message: &str) -> Error {
        Error::Parse {
            line: self.line,
            message: message.to_string(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn at_end_or_comment(&mut self) -> bool {
        matches!(self.chars.peek(), None | Some('#'))
    }

    fn term(&mut self) -> Result<Term> {
        match self.chars.peek() {
            Some('<') => Ok(Term::Iri(self.iri()?)),
            Some('_') => Ok(Term::BlankNode(self.blank_node()?)),
            Some('"') => Ok(Term::Literal(self.literal()?)),
            _ => Err(self.error("expected IRI, blank node or literal")),
        }
    }

    fn iri(&mut self) -> Result<Iri> {
        self.chars.next();
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some('>') => break,
                Some('\\') => value.push(self.unicode_escape()?),
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated IRI")),
            }
        }
        Iri::new(value).map_err(|e| self.error(&e.to_string()))
    }

    fn blank_node(&mut self) -> Result<BlankNode> {
        self.chars.next();
        if self.chars.next() != Some(':') {
            return Err(self.error("expected '_:'"));
        }
        let is_label_char = |c: char| c.is_alphanumeric() || matches!(c, '_' | '-');
        let mut label = String::new();
        loop {
            match self.chars.peek() {
                Some(&c) if is_label_char(c) => label.push(c),
                // A '.' belongs to the label only when more label follows;
                // otherwise it ends the statement.
                Some('.') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if !ahead.peek().is_some_and(|&c| is_label_char(c) || c == '.') {
                        break;
                    }
                    label.push('.');
                }
                _ => break,
            }
            self.chars.next();
        }
        if label.is_empty() {
            return Err(self.error("empty blank node label"));
        }
        Ok(self
            .blank_nodes
            .entry(label)
            .or_insert_with(BlankNode::fresh)
            .clone())
    }

    fn literal(&mut self) -> Result<Literal> {
        self.chars.next();
        let mut lexical = String::new();
        loop {
            match self.chars.next() {
                Some('"') => break,
                Some('\\') => match self.chars.peek() {
                    Some('u') | Some('U') => lexical.push(self.unicode_escape()?),
                    _ => {
                        let escaped = match self.chars.next() {
                            Some('t') => '\t',
                            Some('b') => '\u{8}',
                            Some('n') => '\n',
                            Some('r') => '\r',
                            Some('f') => '\u{c}',
                            Some('"') => '"',
                            Some('\'') => '\'',
                            Some('\\') => '\\',
                            _ => return Err(self.error("invalid string escape")),
                        };
                        lexical.push(escaped);
                    }
                },
                Some(c) => lexical.push(c),
                None => return Err(self.error("unterminated literal")),
            }
        }

        match self.chars.peek() {
            Some('@') => {
                self.chars.next();
                let mut language = String::new();
                while let Some(c) = self.chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '-') {
                    language.push(c);
                }
                if language.is_empty() {
                    return Err(self.error("empty language tag"));
                }
                Ok(Literal::lang(lexical, &language))
            }
            Some('^') => {
                self.chars.next();
                if self.chars.next() != Some('^') {
                    return Err(self.error("expected '^^'"));
                }
                if self.chars.peek() != Some(&'<') {
                    return Err(self.error("expected datatype IRI"));
                }
                let datatype = self.iri()?;
                Ok(Literal::typed(lexical, datatype))
            }
            _ => Ok(Literal::string(lexical)),
        }
    }

    /// Read `uXXXX` or `UXXXXXXXX` after a backslash.
    fn unicode_escape(&mut self) -> Result<char> {
        let width = match self.chars.next() {
            Some('u') => 4,
            Some('U') => 8,
            _ => return Err(self.error("invalid IRI escape")),
        };
        let mut hex = String::with_capacity(width);
        for _ in 0..width {
            match self.chars.next() {
                Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                _ => return Err(self.error("invalid unicode escape")),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid unicode code point"))
    }
}
