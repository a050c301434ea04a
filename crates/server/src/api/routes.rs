use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::metrics_middleware;
use super::{catalog, handlers, jobs, previews, session, ws};
use crate::state::AppState;

/// Upper bound on file parts in a single upload request.
const MAX_FILES_PER_UPLOAD: usize = 64;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state
        .config()
        .session
        .max_upload_bytes
        .saturating_mul(MAX_FILES_PER_UPLOAD);

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/catalog", get(catalog::get_catalog))
        .route("/queue", get(handlers::get_queue_status))
        // Jobs
        .route(
            "/jobs",
            get(jobs::list_jobs)
                .post(jobs::upload_jobs)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/jobs/cancel-active", post(jobs::cancel_active))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/retry", post(jobs::retry_job))
        .route("/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/jobs/{id}/download", get(jobs::download_job))
        // Session
        .route("/session", get(session::get_session))
        .route("/session/settings", put(session::put_settings))
        .route("/session/preset", put(session::put_preset))
        .route("/session/delivery", put(session::put_delivery))
        .route("/session/pickup", put(session::put_pickup))
        .route("/session/clear", post(session::clear_session))
        // Previews
        .route("/previews/{handle}", get(previews::get_preview))
        // Live updates
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
