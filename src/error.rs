//! Error types for the Kelpie transpiler

use thiserror::Error;

/// Main error type for Kelpie
#[derive(Debug, Error)]
pub enum KelpieError {
    #[error("Lex error at line {line}, column {col}: {message}")]
    LexError {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Parse error at line {line}, column {col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Semantic error at line {line}, column {col}: {message}")]
    SemanticError {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Unresolved import '{specifier}' requested by {importer}")]
    UnresolvedImport { importer: String, specifier: String },

    #[error("Cyclic import: {}", .chain.join(" -> "))]
    CyclicImport { chain: Vec<String> },

    #[error("Unsupported construct at line {line}, column {col}: {construct}")]
    UnsupportedConstruct {
        construct: String,
        line: usize,
        col: usize,
    },

    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KelpieError>;
