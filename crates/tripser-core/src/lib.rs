//! tripser core
//!
//! RDF terms and graphs, the JSON-LD subset served by Tripal web services,
//! graph cleanup and Turtle / N-Triples serialization. Nothing here touches
//! the network; remote JSON-LD contexts are handed in by the caller.

pub mod cleanup;
pub mod error;
pub mod graph;
pub mod jsonld;
pub mod namespaces;
pub mod ntriples;
pub mod serialize;
pub mod term;
pub mod vocab;

pub use cleanup::{cleanup, remove_terms};
pub use error::{Error, Result};
pub use graph::{Graph, TriplePattern};
pub use namespaces::Namespaces;
pub use term::{BlankNode, Iri, Literal, Subject, Term, Triple};
