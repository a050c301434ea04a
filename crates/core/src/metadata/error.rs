use thiserror::Error;

/// Errors a metadata policy can raise.
///
/// A failed write is not an error: it is reported as a `warning` outcome.
/// These variants cover failures that leave the policy unable to produce
/// any outcome at all.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to derive timestamp: {0}")]
    Derive(String),

    #[error("Failed to apply timestamp: {0}")]
    Apply(String),
}
