//! Tabular-to-RDF conversion engine for rdforge
//!
//! Turns delimited rows into RDF statements under a frozen
//! [`ResolvedSpec`](rdforge_mapping::ResolvedSpec), through two
//! complementary mechanisms whose outputs are unioned per row:
//!
//! - the **row mapper** ([`row`]) applies structured column rules
//!   (literal/IRI minting, type assertions), and
//! - the **template synthesizer** ([`template`]) renders a free-form
//!   statement template and prunes degenerate output.
//!
//! Rows are fanned out across a bounded worker pool ([`pipeline`]) and the
//! results flow into a size-bounded chunked writer ([`writer`]).

pub mod error;
pub mod functions;
pub mod pipeline;
pub mod row;
pub mod template;
pub mod writer;

pub use error::{ConvertError, ConvertResult};
pub use pipeline::{convert, ConvertSummary};
pub use row::RowConverter;
pub use template::TemplateRenderer;
pub use writer::{ChunkWriter, WriteSummary};
