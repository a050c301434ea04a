//! Types for the metadata module.

use serde::{Deserialize, Serialize};

use crate::catalog::{DeliveryId, PickupId, PresetId};
use crate::codec::ImageFile;

/// How aggressively a preset wants the timestamp preserved.
///
/// Recorded on every result; the outcome table does not branch on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataPolicyMode {
    #[default]
    Strict,
    StrictBestEffort,
    FallbackFiletime,
}

/// EXIF date fields, in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExifTimestampField {
    DateTimeOriginal,
    DateTimeDigitized,
    DateTime,
}

impl ExifTimestampField {
    pub const PRIORITY: [ExifTimestampField; 3] = [
        Self::DateTimeOriginal,
        Self::DateTimeDigitized,
        Self::DateTime,
    ];
}

/// Where a capture timestamp came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedTimestamp {
    /// Read from an EXIF date field (`YYYY:MM:DD HH:MM:SS`, local time).
    Exif {
        field: ExifTimestampField,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        offset: Option<String>,
    },
    /// The source file's last-modified time.
    File { epoch_ms: i64, offset: String },
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    Exif,
    File,
    Unavailable,
}

impl DerivedTimestamp {
    pub fn kind(&self) -> TimestampKind {
        match self {
            Self::Exif { .. } => TimestampKind::Exif,
            Self::File { .. } => TimestampKind::File,
            Self::Unavailable => TimestampKind::Unavailable,
        }
    }
}

/// Outcome of the metadata step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataStatus {
    Guaranteed,
    BestEffort,
    Warning,
    Skipped,
}

/// Result of `MetadataPolicy::apply_timestamp`.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub file: ImageFile,
    pub status: MetadataStatus,
    pub warning_reason: Option<String>,
}

/// Metadata summary attached to a job's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadataInfo {
    pub pickup: PickupId,
    pub delivery: DeliveryId,
    pub preset: PresetId,
    pub mode: MetadataPolicyMode,
    pub derived: DerivedTimestamp,
    pub status: MetadataStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_timestamp_serializes_with_kind_tag() {
        let derived = DerivedTimestamp::Exif {
            field: ExifTimestampField::DateTimeOriginal,
            value: "2024:05:01 10:20:30".to_string(),
            offset: None,
        };
        let json = serde_json::to_value(&derived).unwrap();
        assert_eq!(json["kind"], "exif");
        assert_eq!(json["field"], "DateTimeOriginal");
        assert!(json.get("offset").is_none());

        let json = serde_json::to_value(DerivedTimestamp::Unavailable).unwrap();
        assert_eq!(json["kind"], "unavailable");
    }

    #[test]
    fn test_mode_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&MetadataPolicyMode::FallbackFiletime).unwrap(),
            "\"fallback-filetime\""
        );
        assert_eq!(
            serde_json::to_string(&MetadataStatus::BestEffort).unwrap(),
            "\"best-effort\""
        );
    }
}
