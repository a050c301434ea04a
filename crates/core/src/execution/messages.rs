//! Messages exchanged with an isolated worker.
//!
//! Requests and responses are correlated by `job_id`, a per-call id minted
//! by the unit (not the queue's job id).

use crate::pipeline::{PipelineOutput, PipelineRequest, ProcessingErrorCode};

#[derive(Debug)]
pub enum WorkerRequest {
    /// Run the pipeline once.
    Process {
        job_id: String,
        payload: Box<PipelineRequest>,
    },
    /// One-time capability probe; answered with `Ready`.
    Probe,
}

#[derive(Debug)]
pub enum WorkerResponse {
    Success {
        job_id: String,
        result: Box<PipelineOutput>,
    },
    Error {
        job_id: String,
        reason: String,
        error_code: Option<ProcessingErrorCode>,
    },
    Ready,
}
