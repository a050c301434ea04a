//! Jobs, the job store and preview handles.
//!
//! The store is the single source of truth for job status. The scheduler
//! reads it through snapshots and requests transitions with `JobAction`s;
//! the HTTP layer does the same for user actions.

mod memory;
mod preview;
mod selectors;
mod store;
mod types;

pub use memory::{InMemoryJobStore, JobEvent};
pub use preview::{InMemoryPreviewRegistry, PreviewRegistry};
pub use selectors::{job_views, JobActions, JobView, OutputView, SourceView};
pub use store::{JobAction, JobStore, StoreError};
pub use types::{
    CaptureSnapshot, ConvertSettings, Generation, Job, JobErrorInfo, JobOutput, JobSource,
    JobStatus, PreviewHandle, SettingsPatch, StoreSnapshot,
};
