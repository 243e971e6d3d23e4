use worldvault_compress::CompressError;

use crate::BackendError;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("World not found: {0}")]
    NotFound(String),
    #[error("decompression failed: {0}")]
    Decompression(#[from] CompressError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("encoding error: {0}")]
    Encode(String),
    #[error("corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },
    #[error("schema version mismatch: store has v{found}, expected v{expected}")]
    SchemaMismatch { found: u32, expected: u32 },
    #[error("store is closed")]
    Closed,
    #[error("auto-save is not enabled for world {0}")]
    AutoSaveNotEnabled(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("auto-save needs a Tokio runtime")]
    NoRuntime,
}

/// Import rejections. Checksum failures (corruption) and schema failures
/// (malformed but intact input) are distinct variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("schema check failed: {0}")]
    Schema(String),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("unsupported export version {0}")]
    UnsupportedVersion(String),
    /// Intact payload that does not type as a world document. Raised whether
    /// or not the shape check is enabled.
    #[error("world state does not match the document model: {0}")]
    Unreadable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
