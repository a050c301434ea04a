//! Delivery, pickup and preset catalog.
//!
//! Pure static data. The metadata decision reads a delivery's category and
//! guarantee; the job store applies presets when the user switches them.

mod types;

pub use types::{
    list_deliveries, list_pickups, list_presets, Category, DeliveryDefinition, DeliveryId,
    Guarantee, PickupDefinition, PickupId, PresetDefinition, PresetId, SortingAxis,
};
