//! Error types for the cover lookup client.

use thiserror::Error;

/// Errors from cover lookup or download. Callers treat all of these as
/// non-fatal: artwork is optional everywhere.
#[derive(Debug, Error)]
pub enum CoverError {
    /// HTTP transport error (connection refused, timeout, TLS failure, etc.).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The download did not return an image body.
    #[error("not an image (Content-Type {0})")]
    NotImage(String),

    /// The oversized image could not be decoded or re-encoded.
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Convenience alias for `Result<T, CoverError>`.
pub type Result<T> = std::result::Result<T, CoverError>;
