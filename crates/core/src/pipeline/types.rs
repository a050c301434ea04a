//! Types for the pipeline module.

use crate::catalog::{DeliveryId, PickupId, PresetId};
use crate::codec::ImageFile;
use crate::metadata::{JobMetadataInfo, MetadataPolicyMode};

/// Everything one pipeline call needs; owned so it can cross threads.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source: ImageFile,
    pub jpeg_quality: f32,
    pub pickup: PickupId,
    pub delivery: DeliveryId,
    pub preset: PresetId,
    pub mode: MetadataPolicyMode,
}

/// Result of a successful pipeline call.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub file: ImageFile,
    pub size_before: u64,
    pub size_after: u64,
    /// Fraction of bytes saved, in [0, 1].
    pub reduction_ratio: f64,
    pub metadata: JobMetadataInfo,
    /// Set only when the metadata outcome is `warning`.
    pub warning_reason: Option<String>,
}

/// `max(0, (before - after) / before)`, or 0 for an empty source.
pub fn reduction_ratio(size_before: u64, size_after: u64) -> f64 {
    if size_before == 0 {
        return 0.0;
    }
    let saved = size_before as f64 - size_after as f64;
    (saved / size_before as f64).clamp(0.0, 1.0)
}
