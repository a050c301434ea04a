//! Capture-timestamp metadata: derivation, injection and the outcome table.
//!
//! `MetadataPolicy` is the capability the pipeline calls. `decision` holds
//! the pure classification that every policy implementation must follow;
//! `ExifMetadataPolicy` is the shipped implementation.

mod decision;
mod error;
mod exif_policy;
mod traits;
mod types;

pub use decision::{
    post_write, pre_write, Decision, REASON_INJECT_FAILED, REASON_TIMESTAMP_UNAVAILABLE,
    REASON_UNSUPPORTED,
};
pub use error::MetadataError;
pub use exif_policy::ExifMetadataPolicy;
pub use traits::MetadataPolicy;
pub use types::{
    ApplyResult, DerivedTimestamp, ExifTimestampField, JobMetadataInfo, MetadataPolicyMode,
    MetadataStatus, TimestampKind,
};
