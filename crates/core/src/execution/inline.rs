//! Inline execution unit.

use async_trait::async_trait;

use super::unit::{AbortSignal, ExecutionUnit, UnitMode};
use crate::pipeline::{PipelineOutput, PipelineRequest, ProcessingError, ProcessingPipeline};

/// Runs the pipeline directly on the caller's runtime.
pub struct InlineUnit {
    pipeline: ProcessingPipeline,
    abort: AbortSignal,
}

impl InlineUnit {
    pub fn new(pipeline: ProcessingPipeline) -> Self {
        Self {
            pipeline,
            abort: AbortSignal::new(),
        }
    }
}

#[async_trait]
impl ExecutionUnit for InlineUnit {
    fn mode(&self) -> UnitMode {
        UnitMode::Inline
    }

    fn is_alive(&self) -> bool {
        !self.abort.is_triggered()
    }

    async fn run(&self, request: PipelineRequest) -> Result<PipelineOutput, ProcessingError> {
        if self.abort.is_triggered() {
            return Err(ProcessingError::Aborted("inline unit terminated".to_string()));
        }
        tokio::select! {
            biased;
            _ = self.abort.triggered() => {
                Err(ProcessingError::Aborted("inline unit terminated".to_string()))
            }
            result = self.pipeline.run(request) => result,
        }
    }

    fn terminate(&self) {
        self.abort.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DeliveryId, PickupId, PresetId};
    use crate::metadata::MetadataPolicyMode;
    use crate::testing::{fixtures, MockCodec, MockMetadataPolicy};
    use std::sync::Arc;
    use std::time::Duration;

    fn request() -> PipelineRequest {
        PipelineRequest {
            source: fixtures::opaque_source("a.png", 1000),
            jpeg_quality: 0.85,
            pickup: PickupId::Photos,
            delivery: DeliveryId::Photos,
            preset: PresetId::PhotosRecommended,
            mode: MetadataPolicyMode::Strict,
        }
    }

    #[tokio::test]
    async fn test_runs_pipeline() {
        let pipeline = ProcessingPipeline::new(
            Arc::new(MockCodec::new()),
            Arc::new(MockMetadataPolicy::new()),
        );
        let unit = InlineUnit::new(pipeline);
        let output = unit.run(request()).await.unwrap();
        assert_eq!(output.size_before, 1000);
        assert_eq!(unit.mode(), UnitMode::Inline);
    }

    #[tokio::test]
    async fn test_terminate_aborts_in_flight_call() {
        let codec = Arc::new(MockCodec::new());
        codec.set_gated(true).await;
        let unit = Arc::new(InlineUnit::new(ProcessingPipeline::new(
            codec.clone(),
            Arc::new(MockMetadataPolicy::new()),
        )));

        let call = {
            let unit = unit.clone();
            tokio::spawn(async move { unit.run(request()).await })
        };
        codec.wait_for_started(1).await;
        unit.terminate();

        let err = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(err.is_aborted());
        assert!(!unit.is_alive());

        // Later calls fail fast.
        assert!(unit.run(request()).await.unwrap_err().is_aborted());
    }
}
