//! Static definitions for delivery scenarios, pickup sources and presets.

use serde::{Deserialize, Serialize};

use crate::metadata::MetadataPolicyMode;

/// Maturity of a delivery scenario or preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Stable,
    Experimental,
}

/// How strongly a delivery scenario honours the written capture timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Guarantee {
    Guaranteed,
    BestEffort,
    Unverified,
}

/// What the destination sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortingAxis {
    Exif,
    File,
    Os,
    Unknown,
}

/// Where converted files end up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryId {
    #[default]
    Photos,
    ShareSheet,
    Files,
    AndroidGallery,
    Desktop,
}

/// Where source files come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupId {
    #[default]
    Photos,
    Files,
    AndroidPicker,
    Desktop,
}

/// Named bundle of pickup, delivery, quality and metadata policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetId {
    #[default]
    PhotosRecommended,
    ShareBeta,
    FilesExperimental,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryDefinition {
    pub id: DeliveryId,
    pub category: Category,
    pub title: &'static str,
    pub description: &'static str,
    pub sorting_axis: SortingAxis,
    pub guarantee: Guarantee,
    pub warning_condition: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_effort_message: Option<&'static str>,
}

impl DeliveryDefinition {
    /// Whether a successful metadata write can be reported as a guarantee.
    pub fn is_verified(&self) -> bool {
        self.category == Category::Stable && self.guarantee != Guarantee::Unverified
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PickupDefinition {
    pub id: PickupId,
    pub title: &'static str,
    pub description: &'static str,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresetDefinition {
    pub id: PresetId,
    pub title: &'static str,
    pub description: &'static str,
    pub pickup: PickupId,
    pub delivery: DeliveryId,
    pub default_jpeg_quality: f32,
    pub metadata_policy_mode: MetadataPolicyMode,
    pub category: Category,
    pub requires_https: bool,
    pub requires_native_share: bool,
}

static DELIVERIES: [DeliveryDefinition; 5] = [
    DeliveryDefinition {
        id: DeliveryId::Photos,
        category: Category::Stable,
        title: "iOS Photos App",
        description: "Converted images are saved back to the camera roll",
        sorting_axis: SortingAxis::Exif,
        guarantee: Guarantee::Guaranteed,
        warning_condition: "Warn when the capture date/time cannot be extracted or written back",
        best_effort_message: None,
    },
    DeliveryDefinition {
        id: DeliveryId::ShareSheet,
        category: Category::Experimental,
        title: "iOS Share Sheet",
        description: "Converted files are shared directly through the share sheet",
        sorting_axis: SortingAxis::Exif,
        guarantee: Guarantee::BestEffort,
        warning_condition:
            "Warn when the capture date/time cannot be written back or ordering differs at the destination",
        best_effort_message: Some(
            "This sharing flow is best-effort. Ordering may depend on the destination app.",
        ),
    },
    DeliveryDefinition {
        id: DeliveryId::Files,
        category: Category::Experimental,
        title: "iOS Files App",
        description: "Converted files are saved into Files for later use",
        sorting_axis: SortingAxis::File,
        guarantee: Guarantee::Unverified,
        warning_condition: "Files sorts by download time; ordering cannot be guaranteed",
        best_effort_message: None,
    },
    DeliveryDefinition {
        id: DeliveryId::AndroidGallery,
        category: Category::Experimental,
        title: "Android Gallery",
        description: "Android gallery / Google Photos flow",
        sorting_axis: SortingAxis::Unknown,
        guarantee: Guarantee::Unverified,
        warning_condition: "Not verified; always treated as a warning candidate",
        best_effort_message: None,
    },
    DeliveryDefinition {
        id: DeliveryId::Desktop,
        category: Category::Experimental,
        title: "Desktop Finder / Explorer",
        description: "Desktop file browser flow",
        sorting_axis: SortingAxis::Os,
        guarantee: Guarantee::Unverified,
        warning_condition: "Not verified; treated as a warning candidate",
        best_effort_message: None,
    },
];

static PICKUPS: [PickupDefinition; 4] = [
    PickupDefinition {
        id: PickupId::Photos,
        title: "Photo Picker",
        description: "Import from the system photo picker (screenshots / camera roll)",
        category: Category::Stable,
    },
    PickupDefinition {
        id: PickupId::Files,
        title: "Files / iCloud Drive",
        description: "Select images via Files, iCloud Drive, or drag-and-drop",
        category: Category::Experimental,
    },
    PickupDefinition {
        id: PickupId::AndroidPicker,
        title: "Android System Picker",
        description: "Android system picker or share targets",
        category: Category::Experimental,
    },
    PickupDefinition {
        id: PickupId::Desktop,
        title: "Desktop Browser",
        description: "Finder/Explorer dialogs or drag-and-drop on desktop",
        category: Category::Experimental,
    },
];

static PRESETS: [PresetDefinition; 3] = [
    PresetDefinition {
        id: PresetId::PhotosRecommended,
        title: "Photos (Recommended)",
        description: "Convert and return to the Photos app",
        pickup: PickupId::Photos,
        delivery: DeliveryId::Photos,
        default_jpeg_quality: 0.85,
        metadata_policy_mode: MetadataPolicyMode::Strict,
        category: Category::Stable,
        requires_https: false,
        requires_native_share: false,
    },
    PresetDefinition {
        id: PresetId::ShareBeta,
        title: "Share Sheet (Beta)",
        description: "Send converted images through the share sheet",
        pickup: PickupId::Photos,
        delivery: DeliveryId::ShareSheet,
        default_jpeg_quality: 0.75,
        metadata_policy_mode: MetadataPolicyMode::StrictBestEffort,
        category: Category::Experimental,
        requires_https: true,
        requires_native_share: true,
    },
    PresetDefinition {
        id: PresetId::FilesExperimental,
        title: "Files (Experimental)",
        description: "Save to Files / Finder for later organization",
        pickup: PickupId::Photos,
        delivery: DeliveryId::Files,
        default_jpeg_quality: 0.85,
        metadata_policy_mode: MetadataPolicyMode::FallbackFiletime,
        category: Category::Experimental,
        requires_https: false,
        requires_native_share: false,
    },
];

impl DeliveryId {
    pub fn definition(&self) -> &'static DeliveryDefinition {
        match self {
            Self::Photos => &DELIVERIES[0],
            Self::ShareSheet => &DELIVERIES[1],
            Self::Files => &DELIVERIES[2],
            Self::AndroidGallery => &DELIVERIES[3],
            Self::Desktop => &DELIVERIES[4],
        }
    }
}

impl PickupId {
    pub fn definition(&self) -> &'static PickupDefinition {
        match self {
            Self::Photos => &PICKUPS[0],
            Self::Files => &PICKUPS[1],
            Self::AndroidPicker => &PICKUPS[2],
            Self::Desktop => &PICKUPS[3],
        }
    }
}

impl PresetId {
    pub fn definition(&self) -> &'static PresetDefinition {
        match self {
            Self::PhotosRecommended => &PRESETS[0],
            Self::ShareBeta => &PRESETS[1],
            Self::FilesExperimental => &PRESETS[2],
        }
    }
}

pub fn list_deliveries() -> &'static [DeliveryDefinition] {
    &DELIVERIES
}

pub fn list_pickups() -> &'static [PickupDefinition] {
    &PICKUPS
}

pub fn list_presets() -> &'static [PresetDefinition] {
    &PRESETS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_match_their_ids() {
        for delivery in list_deliveries() {
            assert_eq!(delivery.id.definition().id, delivery.id);
        }
        for pickup in list_pickups() {
            assert_eq!(pickup.id.definition().id, pickup.id);
        }
        for preset in list_presets() {
            assert_eq!(preset.id.definition().id, preset.id);
        }
    }

    #[test]
    fn test_only_photos_delivery_is_verified() {
        let verified: Vec<DeliveryId> = list_deliveries()
            .iter()
            .filter(|d| d.is_verified())
            .map(|d| d.id)
            .collect();
        assert_eq!(verified, vec![DeliveryId::Photos]);
    }

    #[test]
    fn test_preset_quality_in_range() {
        for preset in list_presets() {
            assert!(preset.default_jpeg_quality > 0.0 && preset.default_jpeg_quality <= 1.0);
        }
    }

    #[test]
    fn test_default_preset_targets_photos() {
        let preset = PresetId::default().definition();
        assert_eq!(preset.delivery, DeliveryId::Photos);
        assert_eq!(preset.pickup, PickupId::Photos);
        assert_eq!(preset.metadata_policy_mode, MetadataPolicyMode::Strict);
    }

    #[test]
    fn test_ids_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&DeliveryId::ShareSheet).unwrap(),
            "\"share_sheet\""
        );
        assert_eq!(
            serde_json::to_string(&PresetId::FilesExperimental).unwrap(),
            "\"files_experimental\""
        );
        assert_eq!(
            serde_json::to_string(&Guarantee::BestEffort).unwrap(),
            "\"best-effort\""
        );
    }
}
