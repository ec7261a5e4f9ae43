//! RDF statement model for rdforge
//!
//! This crate provides the canonical types the conversion engine works with:
//! [`Term`] (IRI, blank node, or literal), [`Triple`], and [`Graph`] — a
//! set-semantic statement accumulator.
//!
//! # Key Design Principles
//!
//! 1. **Expanded IRIs only** - All IRIs are stored in expanded form.
//!    Compaction is handled by the serializer at output time.
//!
//! 2. **Explicit datatypes** - Literals always carry a datatype IRI; plain
//!    strings use `xsd:string`, language-tagged strings use `rdf:langString`.
//!
//! 3. **Set semantics** - Inserting a duplicate statement is a no-op, so
//!    unioning per-row graphs into the accumulator is idempotent and the
//!    final output is independent of worker completion order.

mod graph;
mod iri;
mod term;
mod triple;

pub use graph::Graph;
pub use iri::is_valid_iri;
pub use term::{BlankId, Term};
pub use triple::Triple;
