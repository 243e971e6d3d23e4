use crate::Algorithm;

/// Errors from the compression engine.
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    /// Payload bytes do not match what the claimed algorithm produces.
    #[error("decompression failed for {algorithm}: {reason}")]
    Decompression { algorithm: Algorithm, reason: String },
    /// An encoder rejected its input. Never surfaced by `compress`.
    #[error("encoding failed for {algorithm}: {reason}")]
    Encode { algorithm: Algorithm, reason: String },
    /// Unknown strategy name. Callers of `compress` never see this; it is
    /// downgraded to the default strategy.
    #[error("unsupported compression strategy: {0}")]
    UnsupportedStrategy(String),
}

impl CompressError {
    pub(crate) fn decompression(algorithm: Algorithm, reason: impl ToString) -> Self {
        Self::Decompression {
            algorithm,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn encode(algorithm: Algorithm, reason: impl ToString) -> Self {
        Self::Encode {
            algorithm,
            reason: reason.to_string(),
        }
    }
}
