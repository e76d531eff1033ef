//! Engine error taxonomy

use thiserror::Error;

use crate::doc::Path;

/// Errors surfaced by tree construction, mutations and the codecs
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structurally invalid tree or unrecognized node kind
    #[error("schema error: {0}")]
    Schema(String),

    /// A selection or cursor refers to a node that does not exist
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: Path, reason: String },

    /// Malformed tree JSON
    #[error("invalid tree JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn schema(message: impl Into<String>) -> Self {
        EngineError::Schema(message.into())
    }

    pub fn invalid_path(path: &[usize], reason: impl Into<String>) -> Self {
        EngineError::InvalidPath {
            path: path.to_vec(),
            reason: reason.into(),
        }
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, EngineError::Schema(_))
    }

    pub fn is_invalid_path(&self) -> bool {
        matches!(self, EngineError::InvalidPath { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
