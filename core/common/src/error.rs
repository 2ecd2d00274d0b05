//! Common error types for gapitoo.

use thiserror::Error;

/// Top-level error type for gapitoo operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Neither an identifier nor a URL was supplied for a resource.
    #[error("Provide either the {kind} ID or the {kind} URL")]
    MissingReference {
        /// Human readable resource kind ("folder" or "file").
        kind: &'static str,
    },

    /// A shareable URL did not match the expected pattern.
    #[error("Double check the provided {kind} URL: {url}")]
    InvalidUrl {
        /// Human readable resource kind ("folder" or "file").
        kind: &'static str,
        /// The URL as given by the caller.
        url: String,
    },

    /// OAuth2 authorization, token exchange or refresh failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Transport failure or unexpected API response.
    #[error("Network error: {0}")]
    Network(String),

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider refused access to the resource.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this is a usage error detected before any side effect.
    ///
    /// Usage errors are raised while resolving resource references and never
    /// reach the network or the filesystem.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::MissingReference { .. } | Error::InvalidUrl { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
