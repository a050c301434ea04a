//! The metadata outcome table.
//!
//! Rows are evaluated top to bottom; the first match wins:
//!
//! | # | condition                              | status     | reason                      |
//! |---|----------------------------------------|------------|-----------------------------|
//! | 1 | output cannot carry EXIF               | warning    | Unsupported file type       |
//! | 2 | no timestamp could be derived          | warning    | Timestamp unavailable       |
//! | 3 | the write failed                       | warning    | Failed to inject metadata   |
//! | 4 | delivery is experimental or unverified | skipped    | `<title> is not verified yet` |
//! | 5 | otherwise                              | guaranteed |                             |
//!
//! Rows 1 and 2 are decided before any write is attempted; row 4 still
//! writes, it just refuses to promise anything.

use super::types::{MetadataStatus, TimestampKind};
use crate::catalog::DeliveryDefinition;

pub const REASON_UNSUPPORTED: &str = "Unsupported file type";
pub const REASON_TIMESTAMP_UNAVAILABLE: &str = "Timestamp unavailable";
pub const REASON_INJECT_FAILED: &str = "Failed to inject metadata";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: MetadataStatus,
    pub reason: Option<String>,
}

impl Decision {
    fn warning(reason: &str) -> Self {
        Self {
            status: MetadataStatus::Warning,
            reason: Some(reason.to_string()),
        }
    }
}

/// Rows 1-2: returns a decision when no write should be attempted.
pub fn pre_write(carries_metadata: bool, timestamp: TimestampKind) -> Option<Decision> {
    if !carries_metadata {
        return Some(Decision::warning(REASON_UNSUPPORTED));
    }
    if timestamp == TimestampKind::Unavailable {
        return Some(Decision::warning(REASON_TIMESTAMP_UNAVAILABLE));
    }
    None
}

/// Rows 3-5: classifies a write that was attempted.
pub fn post_write(written: bool, delivery: &DeliveryDefinition) -> Decision {
    if !written {
        return Decision::warning(REASON_INJECT_FAILED);
    }
    if !delivery.is_verified() {
        return Decision {
            status: MetadataStatus::Skipped,
            reason: Some(format!("{} is not verified yet", delivery.title)),
        };
    }
    Decision {
        status: MetadataStatus::Guaranteed,
        reason: None,
    }
}
