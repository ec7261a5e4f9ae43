//! Mapping specification error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading and resolving a mapping specification
#[derive(Debug, Error)]
pub enum MappingError {
    /// Schema violations for one fragment, all collected before failing
    #[error("invalid mapping specification {}:\n{}", path.display(), bullet_list(violations))]
    Validation {
        path: PathBuf,
        violations: Vec<String>,
    },

    /// A fragment imports itself, directly or transitively
    #[error("circular import detected: {chain}")]
    CircularImport { chain: String },

    /// Source file or imported fragment absent
    #[error("missing input: {0}")]
    MissingInput(String),

    /// YAML syntax error in a fragment
    #[error("could not parse {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn bullet_list(violations: &[String]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for mapping operations
pub type MappingResult<T> = Result<T, MappingError>;
