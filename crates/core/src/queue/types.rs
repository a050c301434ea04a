//! Types for the queue manager.

use serde::Serialize;

use crate::jobs::{CaptureSnapshot, Generation};

/// Current state of the queue manager and its pool.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Number of execution units.
    pub capacity: usize,
    /// Jobs admitted and not yet settled.
    pub running: usize,
    /// Calls waiting in the pool for an idle unit.
    pub pending: usize,
    /// Units currently executing a call.
    pub busy: usize,
    pub disposed: bool,
}

/// Book-keeping for one admission of a job.
#[derive(Debug, Clone)]
pub(crate) struct RunEntry {
    /// Distinguishes this admission from later admissions of the same job.
    pub ticket: u64,
    pub capture: CaptureSnapshot,
}

impl RunEntry {
    pub fn generation(&self) -> Generation {
        self.capture.generation
    }
}
