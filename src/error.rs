//! Error types for geoshard.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GeoshardError>;

#[derive(Debug, Error)]
pub enum GeoshardError {
    /// Spatial key is empty, too long, or contains a character outside the alphabet
    #[error("Invalid geohash: {0}")]
    InvalidGeohash(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A path tree record in an index log could not be reconstructed
    #[error("Malformed index record for tree '{tree}': {reason}")]
    MalformedIndex { tree: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Unknown filesystem: {0}")]
    UnknownFilesystem(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeoshardError {
    pub(crate) fn malformed(tree: &str, reason: impl Into<String>) -> Self {
        GeoshardError::MalformedIndex {
            tree: tree.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for GeoshardError {
    fn from(e: serde_json::Error) -> Self {
        GeoshardError::Serialization(e.to_string())
    }
}

#[cfg(feature = "bincode")]
impl From<bincode::Error> for GeoshardError {
    fn from(e: bincode::Error) -> Self {
        GeoshardError::Serialization(e.to_string())
    }
}
