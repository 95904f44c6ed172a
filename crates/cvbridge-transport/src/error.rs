//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur while fetching or decoding resources.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Malformed URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// URL scheme with no fetcher behind it.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Server answered with a non-success status.
    #[error("Failed to load {url} status: {status}")]
    Status { url: String, status: u16 },

    /// Transport-level failure (connect, TLS, body read).
    #[error("Request failed for {url}: {reason}")]
    Request { url: String, reason: String },

    /// Local file or object URL does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bytes are not a decodable image.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// HTTP status, if the failure was a status response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
