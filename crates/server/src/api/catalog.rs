//! Catalog API handler.

use axum::Json;
use serde::Serialize;

use jpegstamp_core::{
    list_deliveries, list_pickups, list_presets, DeliveryDefinition, PickupDefinition,
    PresetDefinition,
};

/// Everything a client needs to render delivery, pickup and preset pickers.
#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub deliveries: &'static [DeliveryDefinition],
    pub pickups: &'static [PickupDefinition],
    pub presets: &'static [PresetDefinition],
}

pub async fn get_catalog() -> Json<CatalogResponse> {
    Json(CatalogResponse {
        deliveries: list_deliveries(),
        pickups: list_pickups(),
        presets: list_presets(),
    })
}
