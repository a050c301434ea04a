//! Job, generation and session settings types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{DeliveryId, PickupId, PresetId};
use crate::codec::ImageFile;
use crate::metadata::{JobMetadataInfo, MetadataPolicyMode};
use crate::pipeline::{ProcessingError, ProcessingErrorCode};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Warning,
    Error,
    Canceled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        Self::Queued,
        Self::Processing,
        Self::Done,
        Self::Warning,
        Self::Error,
        Self::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration generation. A result is only committed under the
/// generation it was started with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generation {
    /// Bumped by a session clear.
    pub run_id: u64,
    /// Bumped by any settings, preset, delivery or pickup change.
    pub settings_rev: u64,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.run_id, self.settings_rev)
    }
}

/// Conversion settings shared by every job of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvertSettings {
    pub jpeg_quality: f32,
    pub preset: PresetId,
    pub metadata_policy_mode: MetadataPolicyMode,
}

impl ConvertSettings {
    pub fn from_preset(preset: PresetId) -> Self {
        let def = preset.definition();
        Self {
            jpeg_quality: def.default_jpeg_quality,
            preset,
            metadata_policy_mode: def.metadata_policy_mode,
        }
    }
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self::from_preset(PresetId::default())
    }
}

/// Partial settings update; unset fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub jpeg_quality: Option<f32>,
    #[serde(default)]
    pub metadata_policy_mode: Option<MetadataPolicyMode>,
}

/// Configuration a job was admitted under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSnapshot {
    pub generation: Generation,
    pub settings: ConvertSettings,
    pub pickup: PickupId,
    pub delivery: DeliveryId,
    pub started_at: DateTime<Utc>,
}

/// Opaque reference to a previewable file held by a `PreviewRegistry`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewHandle(String);

impl PreviewHandle {
    pub fn generate() -> Self {
        Self(format!("preview-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PreviewHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct JobSource {
    pub file: ImageFile,
    pub preview: PreviewHandle,
}

#[derive(Debug, Clone)]
pub struct JobOutput {
    pub file: ImageFile,
    pub preview: PreviewHandle,
    pub size_before: u64,
    pub size_after: u64,
    pub reduction_ratio: f64,
    pub metadata: JobMetadataInfo,
}

/// Job-visible failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorInfo {
    pub code: ProcessingErrorCode,
    pub message: String,
}

impl From<&ProcessingError> for JobErrorInfo {
    fn from(err: &ProcessingError) -> Self {
        Self {
            code: err.code(),
            message: err.message(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Last time the job entered `queued` (creation, retry or requeue).
    pub queued_at: DateTime<Utc>,
    /// Cleared once the job has been started, retried or canceled.
    pub is_new: bool,
    pub status: JobStatus,
    pub source: JobSource,
    pub output: Option<JobOutput>,
    pub error: Option<JobErrorInfo>,
    pub warning_reason: Option<String>,
    pub captured: Option<CaptureSnapshot>,
}

impl Job {
    /// A fresh queued job for `file`.
    pub fn new(file: ImageFile, preview: PreviewHandle) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            queued_at: now,
            is_new: true,
            status: JobStatus::Queued,
            source: JobSource { file, preview },
            output: None,
            error: None,
            warning_reason: None,
            captured: None,
        }
    }
}

/// Point-in-time copy of the whole store.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub jobs: Vec<Job>,
    pub generation: Generation,
    pub settings: ConvertSettings,
    pub preset: PresetId,
    pub pickup: PickupId,
    pub delivery: DeliveryId,
    /// Jobs admitted and not yet released by the scheduler.
    pub active_ids: Vec<String>,
    pub last_added_ids: Vec<String>,
}

impl StoreSnapshot {
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }
}
