//! Processing pipeline for a single job.
//!
//! Given a source file and a configuration snapshot, produces the converted
//! file, the metadata outcome and size accounting. Holds no shared state;
//! the execution units decide where it runs.

mod error;
mod processor;
mod types;

pub use error::{ProcessingError, ProcessingErrorCode};
pub use processor::ProcessingPipeline;
pub use types::{reduction_ratio, PipelineOutput, PipelineRequest};
