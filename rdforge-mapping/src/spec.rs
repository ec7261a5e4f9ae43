//! Typed mapping specification
//!
//! The frozen form of a fully merged, validated, and resolved mapping
//! specification. No field is mutated after resolution completes, so the
//! struct is shared by reference across worker threads without locking.

use std::path::PathBuf;

use rdforge_vocab::{xsd, PrefixTable};

/// One column-to-RDF conversion rule.
///
/// Rules are pure and stateless: the same rule applied to the same cell
/// always yields the same statements.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRule {
    /// Source column name (must exist in the header)
    pub column: String,
    /// Target predicate IRI
    pub predicate: String,
    /// Literal datatype IRI (default xsd:string)
    pub datatype: String,
    /// Value separator, literal or regex depending on `regex`
    pub separator: Option<String>,
    /// Treat `separator` as a regular expression
    pub regex: bool,
    /// strftime pattern for reformatting date values
    pub datestr: Option<String>,
    /// Mint IRIs instead of literals
    pub as_iri: bool,
    /// Namespace for minted IRIs
    pub namespace: Option<String>,
    /// Replace the value with a deterministic name-based UUID before minting
    pub as_uuid: bool,
    /// Lower-case the value before minting
    pub ignore_case: bool,
    /// Predicate for a label statement on each minted IRI
    pub label: Option<String>,
    /// rdf:type IRI asserted for each minted IRI
    pub rdf_type: Option<String>,
}

impl ColumnRule {
    /// A minimal rule mapping `column` to `predicate` as xsd:string literals.
    pub fn literal(column: impl Into<String>, predicate: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            predicate: predicate.into(),
            datatype: xsd::STRING.to_string(),
            separator: None,
            regex: false,
            datestr: None,
            as_iri: false,
            namespace: None,
            as_uuid: false,
            ignore_case: false,
            label: None,
            rdf_type: None,
        }
    }
}

/// The frozen mapping specification for one conversion run.
#[derive(Debug, Clone)]
pub struct ResolvedSpec {
    /// Source file, absolute
    pub infile: PathBuf,
    /// Output directory, absolute
    pub outdir: PathBuf,
    /// Source file encoding label (default "utf-8")
    pub encoding: String,
    /// Field delimiter (default `,`)
    pub delimiter: u8,
    /// Named-graph IRI; when set output is TriG quads
    pub graph: Option<String>,
    /// Subject namespace; identifiers are appended to it
    pub namespace: Option<String>,
    /// Identifier column name
    pub identifier: Option<String>,
    /// rdf:type IRIs asserted for every subject
    pub types: Vec<String>,
    /// Column conversion rules
    pub columns: Vec<ColumnRule>,
    /// Statement template, raw and unexpanded
    pub template: Option<String>,
    /// Custom-function module path
    pub functions: Option<PathBuf>,
    /// Chunk flush threshold in megabytes; `None` disables chunking
    pub max_graph_size_mb: Option<f64>,
    /// Rows between size-threshold checks
    pub size_check_frequency: usize,
    /// Worker pool size override
    pub workers: Option<usize>,
    /// Abort on value-cast failures instead of logging and skipping
    pub strict_values: bool,
    /// Prefix bindings, populated during resolution, read-only afterwards
    pub prefixes: PrefixTable,
}

impl ResolvedSpec {
    /// Output file extension: quads when a named graph is configured.
    pub fn output_extension(&self) -> &'static str {
        if self.graph.is_some() {
            "trig"
        } else {
            "ttl"
        }
    }

    /// Column names referenced by the identifier, the column rules, or
    /// (syntactically) the template.
    pub fn mapped_columns(&self) -> Vec<&str> {
        let mut mapped: Vec<&str> = Vec::new();
        if let Some(id) = &self.identifier {
            mapped.push(id);
        }
        mapped.extend(self.columns.iter().map(|c| c.column.as_str()));
        if let Some(template) = &self.template {
            mapped.extend(template_column_refs(template));
        }
        mapped
    }
}

/// Extract `{column}` references from a template body (single braces only;
/// `{{…}}` engine syntax is not a column reference).
pub fn template_column_refs(template: &str) -> Vec<&str> {
    let mut refs = Vec::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                // Skip past the matching `}}`
                if let Some(end) = template[i + 2..].find("}}") {
                    i += end + 4;
                    continue;
                }
                break;
            }
            if let Some(end) = template[i + 1..].find(['{', '}']) {
                if bytes[i + 1 + end] == b'}' {
                    refs.push(&template[i + 1..i + 1 + end]);
                    i += end + 2;
                    continue;
                }
            }
        }
        i += 1;
    }
    refs
}
