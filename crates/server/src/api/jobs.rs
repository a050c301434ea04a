//! Job API handlers.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use jpegstamp_core::{
    job_views, ImageFile, JobAction, JobStatus, JobStore, JobView,
};

use super::error::ApiError;
use crate::metrics::UPLOADED_FILES_TOTAL;
use crate::state::AppState;

/// Multipart field carrying a file's last-modified time (epoch ms). The n-th
/// such field applies to the n-th file part.
const LAST_MODIFIED_FIELD: &str = "last_modified";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status
    pub status: Option<JobStatus>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobView>,
    pub total: usize,
}

/// Response for an upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ids: Vec<String>,
    pub jobs: Vec<JobView>,
}

#[derive(Debug, Serialize)]
pub struct CancelActiveResponse {
    pub canceled: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// List jobs in insertion order
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Json<ListJobsResponse> {
    let snapshot = state.store().snapshot();
    let jobs: Vec<JobView> = job_views(&snapshot.jobs)
        .into_iter()
        .filter(|job| params.status.is_none_or(|status| job.status == status))
        .collect();
    let total = jobs.len();
    Json(ListJobsResponse { jobs, total })
}

/// Add one queued job per uploaded file
pub async fn upload_jobs(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let max_bytes = state.config().session.max_upload_bytes;
    let mut files = Vec::new();
    let mut last_modified = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some(LAST_MODIFIED_FIELD) {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?;
            let epoch_ms = text.trim().parse::<i64>().map_err(|_| {
                ApiError::BadRequest(format!("Invalid {} value: {}", LAST_MODIFIED_FIELD, text))
            })?;
            last_modified.push(epoch_ms);
            continue;
        }

        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime = match field.content_type() {
            Some(mime) if mime != "application/octet-stream" => mime.to_string(),
            _ => guess_mime(&name).to_string(),
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read {}: {}", name, e)))?;
        if data.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "{} exceeds the {} byte upload limit",
                name, max_bytes
            )));
        }
        files.push(ImageFile::new(name, mime, data));
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files in upload".to_string()));
    }
    for (file, epoch_ms) in files.iter_mut().zip(last_modified) {
        file.last_modified_ms = Some(epoch_ms);
    }

    let count = files.len();
    let ids = state.store().add_files(files)?;
    UPLOADED_FILES_TOTAL.inc_by(count as u64);
    info!("Queued {} uploaded files", count);
    state.queue().sync();

    let snapshot = state.store().snapshot();
    let jobs = ids
        .iter()
        .filter_map(|id| snapshot.job(id))
        .map(JobView::from)
        .collect();
    Ok((StatusCode::CREATED, Json(UploadResponse { ids, jobs })))
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state
        .store()
        .job(&id)
        .map(|job| Json(JobView::from(&job)))
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", id)))
}

/// Put a failed or warned job back into the queue
pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state
        .store()
        .dispatch(JobAction::RetryJob { id: id.clone() })?;
    state.queue().sync();
    get_job(State(state), Path(id)).await
}

/// Cancel a queued or processing job. A conversion already running is not
/// interrupted; its result is discarded.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state
        .store()
        .dispatch(JobAction::CancelJob { id: id.clone() })?;
    get_job(State(state), Path(id)).await
}

/// Cancel every running job and rebuild the executor pool
pub async fn cancel_active(State(state): State<Arc<AppState>>) -> Json<CancelActiveResponse> {
    let canceled = state.queue().status().running;
    state.queue().cancel_all_active("canceled by user").await;
    Json(CancelActiveResponse { canceled })
}

/// Download the converted file as an attachment
pub async fn download_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let job = state
        .store()
        .job(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", id)))?;

    let output = match (&job.output, job.status) {
        (Some(output), JobStatus::Done | JobStatus::Warning) => output,
        _ => {
            return Err(ApiError::Conflict(format!(
                "Job {} has no converted output (status: {})",
                id, job.status
            )))
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, output.file.mime.clone()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&output.file.name),
            ),
        ],
        Body::from(output.file.data.clone()),
    )
        .into_response())
}

// ============================================================================
// Helpers
// ============================================================================

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

fn guess_mime(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("photo.jpg"),
            "attachment; filename=\"photo.jpg\"; filename*=UTF-8''photo.jpg"
        );
    }

    #[test]
    fn test_content_disposition_unicode() {
        let value = content_disposition("写真 1.jpg");
        assert!(value.starts_with("attachment; filename=\"__ 1.jpg\""));
        assert!(value.ends_with("filename*=UTF-8''%E5%86%99%E7%9C%9F%201.jpg"));
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("A.JPG"), "image/jpeg");
        assert_eq!(guess_mime("shot.png"), "image/png");
        assert_eq!(guess_mime("noext"), "application/octet-stream");
    }
}
