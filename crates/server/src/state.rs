use std::sync::Arc;
use std::time::Duration;

use jpegstamp_core::{
    Config, ExecutorPool, ExifMetadataPolicy, ImageCodec, InMemoryJobStore,
    InMemoryPreviewRegistry, MetadataPolicy, PipelineUnitFactory, ProcessingPipeline,
    QueueManager, RasterCodec,
};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<InMemoryJobStore>,
    previews: Arc<InMemoryPreviewRegistry>,
    queue: QueueManager,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<InMemoryJobStore>,
        previews: Arc<InMemoryPreviewRegistry>,
        queue: QueueManager,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            store,
            previews,
            queue,
            ws_broadcaster,
        }
    }

    /// Wires a session around the given codec and metadata policy.
    pub async fn with_capabilities(
        config: Config,
        codec: Arc<dyn ImageCodec>,
        metadata: Arc<dyn MetadataPolicy>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        let previews = Arc::new(InMemoryPreviewRegistry::new());
        let store = Arc::new(InMemoryJobStore::from_config(
            previews.clone(),
            &config.session,
        ));

        let pipeline = ProcessingPipeline::new(codec, metadata);
        let factory = Arc::new(PipelineUnitFactory::new(
            pipeline,
            Duration::from_millis(config.queue.probe_timeout_ms),
        ));
        let pool = ExecutorPool::new(factory, &config.queue).await;
        let queue = QueueManager::new(store.clone(), pool, previews.clone());

        Self::new(config, store, previews, queue, ws_broadcaster)
    }

    /// Production wiring: raster codec and EXIF policy.
    pub async fn build(config: Config, ws_broadcaster: WsBroadcaster) -> Self {
        Self::with_capabilities(
            config,
            Arc::new(RasterCodec::new()),
            Arc::new(ExifMetadataPolicy::new()),
            ws_broadcaster,
        )
        .await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<InMemoryJobStore> {
        &self.store
    }

    pub fn previews(&self) -> &Arc<InMemoryPreviewRegistry> {
        &self.previews
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
