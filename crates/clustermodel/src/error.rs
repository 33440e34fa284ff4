//! Error types for descriptor loading and resource id parsing.

use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading descriptors or parsing ids.
#[derive(Debug, Error)]
pub enum Error {
    /// A string did not have the shape of a fully-qualified resource id.
    #[error("{id} is not a valid Azure resource ID")]
    InvalidResourceId {
        /// The offending id.
        id: String,
    },

    /// The descriptor JSON could not be parsed or written.
    #[error("descriptor JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid resource id error.
    pub fn invalid_resource_id(id: impl Into<String>) -> Self {
        Self::InvalidResourceId { id: id.into() }
    }
}
