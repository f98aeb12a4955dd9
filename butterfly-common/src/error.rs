//! Error types for the butterfly-osm toolkit
//!
//! One error enum is shared by every crate of the workspace so that readers,
//! indexes and processors can be combined without conversion layers.

use thiserror::Error;

/// Main error type for butterfly-osm operations
#[derive(Debug, Error)]
pub enum Error {
    /// The input is neither a known file format nor a supported buffer
    #[error("Unsupported input '{0}': expected a path ending in .osm.pbf/.pbf/.opl or an in-memory buffer with an explicit format")]
    UnsupportedInput(String),

    /// Location index strategy name not present in the registry
    #[error("Unknown location index '{name}' (available: {})", available.join(", "))]
    UnknownIndex {
        name: String,
        available: Vec<&'static str>,
    },

    /// Operation not allowed with the current configuration
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary data could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Text input is malformed
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A way references a node whose location is not cached
    #[error("Way {way} references node {node} with unknown location")]
    MissingLocation { way: i64, node: i64 },

    /// Configuration file problems
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for building a [`Error::Parse`]
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Convenience result type for butterfly-osm operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_index_lists_available() {
        let err = Error::UnknownIndex {
            name: "nope".to_string(),
            available: vec!["flex_mem", "sparse_mem_map"],
        };
        assert_eq!(
            err.to_string(),
            "Unknown location index 'nope' (available: flex_mem, sparse_mem_map)"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let err = Error::parse(7, "bad id");
        assert_eq!(err.to_string(), "Parse error on line 7: bad id");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
