//! Error types for the codec module.

use thiserror::Error;

/// Errors raised while decoding or encoding an image.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Source bytes are not in a format the codec understands.
    #[error("Unsupported image format: {mime}")]
    UnsupportedFormat { mime: String },

    /// Source bytes could not be decoded.
    #[error("Failed to decode image: {reason}")]
    Decode { reason: String },

    /// Raster could not be encoded.
    #[error("Failed to encode image: {reason}")]
    Encode { reason: String },

    /// Blocking codec task did not complete.
    #[error("Codec task failed: {0}")]
    Task(String),
}

impl CodecError {
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub fn encode(reason: impl Into<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
        }
    }
}
