//! Turtle (TTL) parsing and serialization for rdforge.
//!
//! The parser turns the sanitized output of the template synthesizer into a
//! [`rdforge_graph::Graph`]; the writers serialize an accumulated statement
//! set to Turtle (triples) or TriG (named-graph quads).
//!
//! # Example
//!
//! ```
//! use rdforge_turtle::parse;
//!
//! let turtle = r#"
//!     @prefix ex: <http://example.org/> .
//!     ex:alice ex:name "Alice" ;
//!              ex:age 30 .
//! "#;
//!
//! let graph = parse(turtle, "").unwrap();
//! assert_eq!(graph.len(), 2);
//! ```

pub mod error;
pub mod lex;
pub mod parser;
pub mod writer;

pub use error::{Result, TurtleError};
pub use lex::{tokenize, Token, TokenKind};
pub use parser::parse;
pub use writer::{write_trig, write_turtle};
