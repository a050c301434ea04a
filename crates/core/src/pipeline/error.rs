//! Error taxonomy for a single processing call.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use thiserror::Error;

use crate::codec::CodecError;
use crate::metadata::MetadataError;

type Cause = Box<dyn StdError + Send + Sync>;

/// Stable, serializable classification of a processing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingErrorCode {
    LoadSourceFailed,
    ConvertFailed,
    MetadataDeriveFailed,
    MetadataApplyFailed,
    WorkerUnavailable,
    Aborted,
    Unknown,
}

impl ProcessingErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadSourceFailed => "load_source_failed",
            Self::ConvertFailed => "convert_failed",
            Self::MetadataDeriveFailed => "metadata_derive_failed",
            Self::MetadataApplyFailed => "metadata_apply_failed",
            Self::WorkerUnavailable => "worker_unavailable",
            Self::Aborted => "aborted",
            Self::Unknown => "unknown",
        }
    }
}

/// Errors raised by the pipeline or by the unit executing it.
///
/// Stage variants keep their underlying cause when raised in-process. A
/// failure that crossed the isolation boundary arrives as a code and a
/// message only; `from_code` rebuilds it without a cause.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("{message}")]
    LoadSourceFailed {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    ConvertFailed {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    MetadataDeriveFailed {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    MetadataApplyFailed {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// The isolated unit serving the call went away.
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The call was torn down by cancel-all, terminate or dispose.
    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Unknown(String),
}

impl ProcessingError {
    pub fn load_source(err: CodecError) -> Self {
        Self::LoadSourceFailed {
            message: format!("Failed to load source image: {}", err),
            source: Some(Box::new(err)),
        }
    }

    pub fn convert(err: CodecError) -> Self {
        Self::ConvertFailed {
            message: format!("Failed to convert image: {}", err),
            source: Some(Box::new(err)),
        }
    }

    pub fn metadata_derive(err: MetadataError) -> Self {
        Self::MetadataDeriveFailed {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    pub fn metadata_apply(err: MetadataError) -> Self {
        Self::MetadataApplyFailed {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Rebuilds an error from its wire form. A missing code means `unknown`.
    pub fn from_code(code: Option<ProcessingErrorCode>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code.unwrap_or(ProcessingErrorCode::Unknown) {
            ProcessingErrorCode::LoadSourceFailed => Self::LoadSourceFailed {
                message,
                source: None,
            },
            ProcessingErrorCode::ConvertFailed => Self::ConvertFailed {
                message,
                source: None,
            },
            ProcessingErrorCode::MetadataDeriveFailed => Self::MetadataDeriveFailed {
                message,
                source: None,
            },
            ProcessingErrorCode::MetadataApplyFailed => Self::MetadataApplyFailed {
                message,
                source: None,
            },
            ProcessingErrorCode::WorkerUnavailable => Self::WorkerUnavailable(message),
            ProcessingErrorCode::Aborted => Self::Aborted(message),
            ProcessingErrorCode::Unknown => Self::Unknown(message),
        }
    }

    pub fn code(&self) -> ProcessingErrorCode {
        match self {
            Self::LoadSourceFailed { .. } => ProcessingErrorCode::LoadSourceFailed,
            Self::ConvertFailed { .. } => ProcessingErrorCode::ConvertFailed,
            Self::MetadataDeriveFailed { .. } => ProcessingErrorCode::MetadataDeriveFailed,
            Self::MetadataApplyFailed { .. } => ProcessingErrorCode::MetadataApplyFailed,
            Self::WorkerUnavailable(_) => ProcessingErrorCode::WorkerUnavailable,
            Self::Aborted(_) => ProcessingErrorCode::Aborted,
            Self::Unknown(_) => ProcessingErrorCode::Unknown,
        }
    }

    /// The message without the variant prefix, as surfaced to the job.
    pub fn message(&self) -> String {
        match self {
            Self::WorkerUnavailable(message) | Self::Aborted(message) | Self::Unknown(message) => {
                message.clone()
            }
            other => other.to_string(),
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WorkerUnavailable(_) | Self::Unknown(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}
