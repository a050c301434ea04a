//! Trait definitions for the metadata module.

use async_trait::async_trait;

use super::error::MetadataError;
use super::types::{ApplyResult, DerivedTimestamp, MetadataPolicyMode};
use crate::catalog::DeliveryId;
use crate::codec::ImageFile;

/// Reads a capture timestamp from a source and writes it into converted output.
#[async_trait]
pub trait MetadataPolicy: Send + Sync {
    /// Returns the name of this policy implementation.
    fn name(&self) -> &str;

    /// Finds the best available capture timestamp for a source file.
    ///
    /// Unreadable metadata is not an error; it yields `Unavailable` or the
    /// file-time fallback.
    async fn derive_timestamp(&self, file: &ImageFile) -> Result<DerivedTimestamp, MetadataError>;

    /// Writes `derived` into `file` and classifies the outcome for `delivery`.
    ///
    /// The returned file is byte-identical to the input whenever nothing was
    /// written.
    async fn apply_timestamp(
        &self,
        file: ImageFile,
        derived: &DerivedTimestamp,
        delivery: DeliveryId,
        mode: MetadataPolicyMode,
    ) -> Result<ApplyResult, MetadataError>;
}
