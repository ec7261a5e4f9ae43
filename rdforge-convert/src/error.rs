//! Conversion error types
//!
//! Fatal conditions abort the whole run: a malformed IRI during subject or
//! column minting, a template that fails to render or parse, a missing
//! column. Per-value cast failures are non-fatal by default (logged and
//! dropped); the `strictValues` setting promotes them to fatal
//! [`ConvertError::ValueCast`] errors.

use thiserror::Error;

/// Errors raised while converting rows to RDF
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Malformed or unparsable absolute IRI during subject/column minting
    #[error("could not interpret '{value}' as an IRI{}", namespace_note(namespace))]
    InvalidIri {
        value: String,
        namespace: Option<String>,
    },

    /// Template rendering or post-render parse failure
    #[error("could not render templated statements: {reason}\n--- template text ---\n{text}")]
    TemplateRender { reason: String, text: String },

    /// Datatype or date-format conversion failure, fatal under strictValues
    #[error("could not parse '{value}' as {datatype}: {reason}")]
    ValueCast {
        value: String,
        datatype: String,
        reason: String,
    },

    /// Column named by the identifier or a column rule is absent from the header
    #[error("column '{0}' does not exist in the header")]
    MissingColumn(String),

    /// Column rule separator does not compile as a regular expression
    #[error("invalid separator pattern '{pattern}': {reason}")]
    InvalidSeparator { pattern: String, reason: String },

    /// Custom-function module failed to load or compile
    #[error("could not load custom functions from {path}: {reason}")]
    CustomFunctions { path: String, reason: String },

    /// Source file uses an unknown encoding label
    #[error("unknown encoding label '{0}'")]
    UnknownEncoding(String),

    /// Worker pool failure
    #[error("row pipeline failure: {0}")]
    Pipeline(String),

    /// Malformed row in the source file
    #[error("could not read row: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn namespace_note(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) => format!(" using namespace {}", ns),
        None => String::new(),
    }
}

/// Result type for conversion operations
pub type ConvertResult<T> = Result<T, ConvertError>;
