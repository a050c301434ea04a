pub mod catalog;
pub mod codec;
pub mod config;
pub mod execution;
pub mod jobs;
pub mod metadata;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod testing;

pub use catalog::{
    list_deliveries, list_pickups, list_presets, Category, DeliveryDefinition, DeliveryId,
    Guarantee, PickupDefinition, PickupId, PresetDefinition, PresetId,
};
pub use codec::{CodecError, ImageCodec, ImageFile, RasterCodec};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError,
    ExecutionPreference, QueueConfig, ServerConfig, SessionConfig,
};
pub use execution::{
    ExecutionUnit, ExecutorPool, PipelineUnitFactory, UnitFactory, UnitMode,
};
pub use jobs::{
    job_views, ConvertSettings, Generation, InMemoryJobStore, InMemoryPreviewRegistry, Job,
    JobAction, JobEvent, JobStatus, JobStore, JobView, PreviewHandle, PreviewRegistry,
    SettingsPatch, StoreError,
};
pub use metadata::{ExifMetadataPolicy, MetadataPolicy, MetadataPolicyMode, MetadataStatus};
pub use pipeline::{ProcessingError, ProcessingErrorCode, ProcessingPipeline};
pub use queue::{QueueManager, QueueStatus};
