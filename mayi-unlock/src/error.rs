use base64::DecodeError;
use thiserror::Error;

/// Errors produced while unlocking an encrypted audio file.
#[derive(Debug, Error)]
pub enum UnlockError {
    /// The input path does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The file does not start with the expected container magic.
    #[error("invalid magic (not a valid container)")]
    InvalidMagic,

    /// The extension is not in the dispatch table, or maps to a format
    /// family this build cannot decrypt (KGM, KWM, XM, NCM cache).
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A keyed QMC file (`mgg`/`mflac`) whose per-file mask cannot be
    /// derived. The trailer framing was valid; only the derivation is
    /// missing.
    #[error("keyed QMC mask not supported for .{0}")]
    UnsupportedKeyedMask(String),

    /// AES failure, bad padding, or inconsistent key framing.
    #[error("decryption failed: {0}")]
    Crypto(String),

    /// The embedded metadata blob could not be parsed.
    #[error("metadata parse failed: {0}")]
    MetadataParse(#[from] serde_json::Error),

    /// I/O error while reading the container or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata blob's base64 payload was malformed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] DecodeError),

    /// Tag rewrite on the decrypted file failed.
    #[error("tagging error: {0}")]
    Tag(String),
}

/// Convenience alias for `Result<T, UnlockError>`.
pub type Result<T> = std::result::Result<T, UnlockError>;
