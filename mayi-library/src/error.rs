use thiserror::Error;

/// Errors from catalog, ingestion, and unlock operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// File move, read, or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Thumbnail decode/encode failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Audio headers or tags could not be read. Fatal for ingestion:
    /// the file is routed to Trash.
    #[error("metadata extraction failed: {0}")]
    Metadata(String),

    /// Decryption failed during an unlock batch.
    #[error(transparent)]
    Unlock(#[from] mayi_unlock::UnlockError),
}

/// Convenience alias for `Result<T, LibraryError>`.
pub type Result<T> = std::result::Result<T, LibraryError>;
