//! Error types for the linkrank core library.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

/// Top-level error enum for the linkrank core library.
#[derive(Debug, thiserror::Error)]
pub enum LinkRankError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Id {id} outside [0, {node_count}) in {context}")]
    IdOutOfRange {
        id: i64,
        node_count: usize,
        context: String,
    },

    #[error("Shape mismatch: expected ({expected}, {expected}), found ({found}, {found})")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("Source title not present in the index: {title:?}")]
    SourceNotFound { title: String },

    #[error("Title index mismatch: expected fingerprint {expected}, found {found}")]
    IndexMismatch { expected: String, found: String },

    #[error("Corrupt artifact: {0}")]
    Corrupt(String),

    #[error("Empty graph: no titles were observed")]
    EmptyGraph,

    #[error("Graph with {node_count} nodes exceeds the 32-bit node index")]
    CapacityExceeded { node_count: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LinkRankError {
    /// True for errors that indicate a broken indexer/encoder contract
    /// rather than bad input or an environment failure.
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            LinkRankError::IdOutOfRange { .. }
                | LinkRankError::ShapeMismatch { .. }
                | LinkRankError::SourceNotFound { .. }
                | LinkRankError::IndexMismatch { .. }
        )
    }
}

#[cfg(feature = "python")]
impl From<LinkRankError> for PyErr {
    fn from(err: LinkRankError) -> PyErr {
        match &err {
            LinkRankError::Config(_) => PyValueError::new_err(err.to_string()),
            LinkRankError::Io(_) => PyIOError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

pub type LinkRankResult<T> = Result<T, LinkRankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_classification() {
        let err = LinkRankError::IdOutOfRange {
            id: 7,
            node_count: 3,
            context: "partition 0".to_string(),
        };
        assert!(err.is_consistency());
        assert!(!LinkRankError::EmptyGraph.is_consistency());
        assert!(!LinkRankError::Config("bad".to_string()).is_consistency());
    }

    #[test]
    fn test_out_of_range_message_carries_context() {
        let err = LinkRankError::IdOutOfRange {
            id: -3,
            node_count: 10,
            context: "source column".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("-3"));
        assert!(msg.contains("[0, 10)"));
        assert!(msg.contains("source column"));
    }
}
