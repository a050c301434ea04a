//! Preview handle resolution.

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use jpegstamp_core::{PreviewHandle, PreviewRegistry};

use super::error::ApiError;
use crate::state::AppState;

pub async fn get_preview(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
) -> Result<Response, ApiError> {
    let file = state
        .previews()
        .resolve(&PreviewHandle::from(handle.clone()))
        .ok_or_else(|| ApiError::NotFound(format!("Preview not found: {}", handle)))?;

    Ok((
        [
            (header::CONTENT_TYPE, file.mime.clone()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        Body::from(file.data),
    )
        .into_response())
}
