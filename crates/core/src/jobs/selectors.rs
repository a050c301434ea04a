//! Read-side projections of jobs for the UI layer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{Job, JobErrorInfo, JobStatus, PreviewHandle};
use crate::metadata::JobMetadataInfo;

/// Actions currently allowed on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobActions {
    pub can_retry: bool,
    pub can_download: bool,
    pub can_cancel: bool,
    pub can_share: bool,
}

impl JobActions {
    pub fn for_status(status: JobStatus) -> Self {
        let finished = matches!(status, JobStatus::Done | JobStatus::Warning);
        Self {
            can_retry: matches!(status, JobStatus::Error | JobStatus::Warning),
            can_download: finished,
            can_cancel: matches!(status, JobStatus::Queued | JobStatus::Processing),
            can_share: finished,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceView {
    pub name: String,
    pub mime: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputView {
    pub name: String,
    pub mime: String,
    pub size_before: u64,
    pub size_after: u64,
    pub reduction_ratio: f64,
    pub metadata: JobMetadataInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Output preview once the job produced one, source preview otherwise.
    pub preview: PreviewHandle,
    pub status: JobStatus,
    pub is_new: bool,
    pub source: SourceView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_reason: Option<String>,
    pub actions: JobActions,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        let finished = matches!(job.status, JobStatus::Done | JobStatus::Warning);
        let preview = match (&job.output, finished) {
            (Some(output), true) => output.preview.clone(),
            _ => job.source.preview.clone(),
        };
        Self {
            id: job.id.clone(),
            created_at: job.created_at,
            preview,
            status: job.status,
            is_new: job.is_new,
            source: SourceView {
                name: job.source.file.name.clone(),
                mime: job.source.file.mime.clone(),
                size: job.source.file.size(),
            },
            output: job.output.as_ref().map(|out| OutputView {
                name: out.file.name.clone(),
                mime: out.file.mime.clone(),
                size_before: out.size_before,
                size_after: out.size_after,
                reduction_ratio: out.reduction_ratio,
                metadata: out.metadata.clone(),
            }),
            error: job.error.clone(),
            warning_reason: job.warning_reason.clone(),
            actions: JobActions::for_status(job.status),
        }
    }
}

pub fn job_views(jobs: &[Job]) -> Vec<JobView> {
    jobs.iter().map(JobView::from).collect()
}
