use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Broad classes of failure, used to decide whether an error is fatal,
/// isolated to one item, or worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    TransientRemote,
    DataIntegrity,
    EmptyInput,
    Io,
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid chunking configuration: max_length ({max_length}) must be greater than overlap ({overlap})")]
    InvalidConfiguration { max_length: usize, overlap: usize },

    #[error("Missing API key: set OPENAI_API_KEY or service.api_key")]
    MissingApiKey,

    #[error("Persisted index file not found: {}", .0.display())]
    MissingIndexFile(PathBuf),

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("{} of {total} embeddings failed (positions {failed:?})", .failed.len())]
    EmbeddingFailures { failed: Vec<usize>, total: usize },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index unavailable: the knowledge base has no indexed chunks")]
    IndexUnavailable,

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::InvalidConfiguration { .. }
            | Self::MissingApiKey
            | Self::MissingIndexFile(_)
            | Self::Other(_) => ErrorKind::Configuration,
            Self::Remote(_) | Self::EmbeddingFailures { .. } => ErrorKind::TransientRemote,
            Self::DataIntegrity(_)
            | Self::DimensionMismatch { .. }
            | Self::IndexUnavailable
            | Self::Serialization(_) => ErrorKind::DataIntegrity,
            Self::EmptyInput(_) => ErrorKind::EmptyInput,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Only remote failures may succeed on a second attempt.
    #[inline]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientRemote)
    }
}

pub mod answer;
pub mod chunking;
pub mod citations;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod remote;
pub mod retrieval;
pub mod store;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(
            RagError::Remote("timeout".to_string()).kind(),
            ErrorKind::TransientRemote
        );
        assert_eq!(
            RagError::InvalidConfiguration {
                max_length: 2,
                overlap: 2
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(RagError::IndexUnavailable.kind(), ErrorKind::DataIntegrity);
        assert_eq!(
            RagError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
            .kind(),
            ErrorKind::DataIntegrity
        );
        assert_eq!(
            RagError::EmptyInput("query".to_string()).kind(),
            ErrorKind::EmptyInput
        );
    }

    #[test]
    fn only_remote_errors_are_retryable() {
        assert!(RagError::Remote("503".to_string()).is_retryable());
        assert!(!RagError::MissingApiKey.is_retryable());
        assert!(!RagError::IndexUnavailable.is_retryable());
    }

    #[test]
    fn error_messages() {
        let err = RagError::DimensionMismatch {
            expected: 1536,
            actual: 768,
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: index holds 1536-dimensional vectors, got 768"
        );

        let err = RagError::InvalidConfiguration {
            max_length: 8,
            overlap: 8,
        };
        assert!(err.to_string().contains("max_length (8)"));
    }
}
