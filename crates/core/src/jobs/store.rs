//! Job store trait, actions and errors.

use thiserror::Error;

use super::types::{
    CaptureSnapshot, Generation, Job, JobErrorInfo, JobOutput, JobStatus, SettingsPatch,
    StoreSnapshot,
};
use crate::catalog::{DeliveryId, PickupId, PresetId};

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Cannot {action} job {id}: current status is {status}")]
    InvalidTransition {
        id: String,
        status: JobStatus,
        action: &'static str,
    },

    /// A commit was attempted under a generation that is no longer live, or
    /// that the job was not started under.
    #[error("Stale generation for job {id}: expected {expected}, live {live}")]
    StaleGeneration {
        id: String,
        expected: Generation,
        live: Generation,
    },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

/// State transitions accepted by a `JobStore`.
#[derive(Debug, Clone)]
pub enum JobAction {
    AddJobs {
        jobs: Vec<Job>,
    },
    /// queued → processing under the given snapshot.
    StartJob {
        id: String,
        snapshot: CaptureSnapshot,
    },
    /// processing → done | warning. Applied only while the job is still
    /// processing under `expected` and `expected` is the live generation.
    FinishJob {
        id: String,
        expected: Generation,
        output: JobOutput,
        warning_reason: Option<String>,
    },
    /// processing → error, with the same guard as `FinishJob`.
    FailJob {
        id: String,
        expected: Generation,
        error: JobErrorInfo,
    },
    /// processing → queued after a generation change.
    RequeueJob {
        id: String,
    },
    /// Releases the job from the active set without touching its status.
    EndJob {
        id: String,
    },
    /// queued | processing → canceled. An in-flight call keeps running.
    CancelJob {
        id: String,
    },
    /// error | warning → queued.
    RetryJob {
        id: String,
    },
    ClearSession,
    SetSettings(SettingsPatch),
    SetPreset(PresetId),
    SetDelivery(DeliveryId),
    SetPickup(PickupId),
}

impl JobAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddJobs { .. } => "add",
            Self::StartJob { .. } => "start",
            Self::FinishJob { .. } => "finish",
            Self::FailJob { .. } => "fail",
            Self::RequeueJob { .. } => "requeue",
            Self::EndJob { .. } => "end",
            Self::CancelJob { .. } => "cancel",
            Self::RetryJob { .. } => "retry",
            Self::ClearSession => "clear",
            Self::SetSettings(_) => "set_settings",
            Self::SetPreset(_) => "set_preset",
            Self::SetDelivery(_) => "set_delivery",
            Self::SetPickup(_) => "set_pickup",
        }
    }
}

/// Authoritative list of jobs plus the session configuration.
///
/// All mutations go through `dispatch`, which applies one action atomically.
pub trait JobStore: Send + Sync {
    fn snapshot(&self) -> StoreSnapshot;

    fn generation(&self) -> Generation;

    fn job(&self, id: &str) -> Option<Job>;

    fn dispatch(&self, action: JobAction) -> Result<(), StoreError>;
}
