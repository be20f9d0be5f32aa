//! Error handling types and utilities.

use std::path::PathBuf;

/// A specialized Result type for genizah-search operations.
pub type Result<T, E = SearchError> = std::result::Result<T, E>;

/// Errors surfaced by the parser, the index store, the builder and the searcher.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The corpus file is missing or cannot be read.
    #[error("corpus at {} is unreadable: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No index exists at the given location.
    #[error("no index found at {}; build one first with `genizah-search index`", path.display())]
    IndexNotFound { path: PathBuf },

    /// Bad regex, unknown query mode or malformed filter combination.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// I/O or transaction failure while reading or writing the index.
    #[error("storage failure: {context}")]
    StorageFailure {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Structurally unrecoverable corpus input.
    #[error("corpus parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SearchError {
    /// Wraps an I/O error with a description of the storage operation that failed.
    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::StorageFailure {
            context: context.into(),
            source,
        }
    }

    /// Storage failure that has no underlying I/O error, such as a checksum mismatch.
    pub(crate) fn corrupt(context: impl Into<String>) -> Self {
        let context = context.into();
        Self::StorageFailure {
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, context.clone()),
            context,
        }
    }

    pub(crate) fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Short stable name of the error kind, for logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnreadable { .. } => "source_unreadable",
            Self::IndexNotFound { .. } => "index_not_found",
            Self::InvalidQuery(_) => "invalid_query",
            Self::StorageFailure { .. } => "storage_failure",
            Self::ParseError { .. } => "parse_error",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}
