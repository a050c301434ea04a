//! Session API handlers: settings, preset, delivery, pickup and clear.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use jpegstamp_core::{
    ConvertSettings, DeliveryId, Generation, JobAction, JobStore, PickupId, PresetId,
    QueueStatus, SettingsPatch,
};

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub generation: Generation,
    pub settings: ConvertSettings,
    pub preset: PresetId,
    pub pickup: PickupId,
    pub delivery: DeliveryId,
    pub jobs_total: usize,
    pub queue: QueueStatus,
}

#[derive(Debug, Deserialize)]
pub struct PresetBody {
    pub preset: PresetId,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryBody {
    pub delivery: DeliveryId,
}

#[derive(Debug, Deserialize)]
pub struct PickupBody {
    pub pickup: PickupId,
}

fn session_response(state: &AppState) -> SessionResponse {
    let snapshot = state.store().snapshot();
    SessionResponse {
        generation: snapshot.generation,
        settings: snapshot.settings,
        preset: snapshot.preset,
        pickup: snapshot.pickup,
        delivery: snapshot.delivery,
        jobs_total: snapshot.jobs.len(),
        queue: state.queue().status(),
    }
}

fn apply(state: &AppState, action: JobAction) -> Result<Json<SessionResponse>, ApiError> {
    let name = action.name();
    state.store().dispatch(action)?;
    let response = session_response(state);
    info!(
        action = name,
        run_id = response.generation.run_id,
        settings_rev = response.generation.settings_rev,
        "Session updated"
    );
    Ok(Json(response))
}

pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(session_response(&state))
}

pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<SessionResponse>, ApiError> {
    apply(&state, JobAction::SetSettings(patch))
}

pub async fn put_preset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PresetBody>,
) -> Result<Json<SessionResponse>, ApiError> {
    apply(&state, JobAction::SetPreset(body.preset))
}

pub async fn put_delivery(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeliveryBody>,
) -> Result<Json<SessionResponse>, ApiError> {
    apply(&state, JobAction::SetDelivery(body.delivery))
}

pub async fn put_pickup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PickupBody>,
) -> Result<Json<SessionResponse>, ApiError> {
    apply(&state, JobAction::SetPickup(body.pickup))
}

/// Drop every job and release all previews. Runs still in flight finish in
/// the background and are discarded.
pub async fn clear_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let response = apply(&state, JobAction::ClearSession)?;
    state.queue().sync();
    Ok(response)
}
