//! Testing utilities and mock implementations.
//!
//! Mocks for the two capabilities the pipeline depends on, so queue and
//! pool behavior can be exercised deterministically without real image data.
//!
//! # Example
//!
//! ```rust,ignore
//! use jpegstamp_core::testing::{fixtures, MockCodec, MockMetadataPolicy};
//!
//! let codec = Arc::new(MockCodec::new());
//! let metadata = Arc::new(MockMetadataPolicy::new());
//! codec.set_output_size(400).await;
//!
//! let source = fixtures::opaque_source("a.png", 1000);
//! ```

pub mod fixtures;
mod mock_codec;
mod mock_metadata;

pub use mock_codec::MockCodec;
pub use mock_metadata::{MockMetadataPolicy, RecordedApply};
