//! The processing pipeline: load, convert, derive, apply.

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::error::ProcessingError;
use super::types::{reduction_ratio, PipelineOutput, PipelineRequest};
use crate::codec::{output_name, ImageCodec, ImageFile};
use crate::metadata::{JobMetadataInfo, MetadataPolicy, MetadataStatus};
use crate::metrics;

/// Stateless conversion of one source file.
///
/// Conversion and timestamp derivation run concurrently; whichever fails
/// first aborts the call.
#[derive(Clone)]
pub struct ProcessingPipeline {
    codec: Arc<dyn ImageCodec>,
    metadata: Arc<dyn MetadataPolicy>,
}

impl ProcessingPipeline {
    pub fn new(codec: Arc<dyn ImageCodec>, metadata: Arc<dyn MetadataPolicy>) -> Self {
        Self { codec, metadata }
    }

    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineOutput, ProcessingError> {
        let started = Instant::now();
        let result = self.execute(request).await;

        let label = match &result {
            Ok(_) => "success",
            Err(err) => err.code().as_str(),
        };
        metrics::PIPELINE_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    async fn convert(&self, source: &ImageFile, quality: f32) -> Result<ImageFile, ProcessingError> {
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(ProcessingError::ConvertFailed {
                message: format!("JPEG quality must be in (0, 1], got {}", quality),
                source: None,
            });
        }
        let decoded = self
            .codec
            .load_image(source)
            .await
            .map_err(ProcessingError::load_source)?;
        let encoded = self
            .codec
            .encode_jpeg(decoded, quality)
            .await
            .map_err(ProcessingError::convert)?;
        Ok(ImageFile {
            name: output_name(&source.name),
            mime: encoded.mime,
            data: encoded.data,
            last_modified_ms: None,
        })
    }

    async fn execute(&self, request: PipelineRequest) -> Result<PipelineOutput, ProcessingError> {
        let PipelineRequest {
            source,
            jpeg_quality,
            pickup,
            delivery,
            preset,
            mode,
        } = request;

        let (converted, derived) = tokio::try_join!(
            self.convert(&source, jpeg_quality),
            async {
                self.metadata
                    .derive_timestamp(&source)
                    .await
                    .map_err(ProcessingError::metadata_derive)
            }
        )?;

        let applied = self
            .metadata
            .apply_timestamp(converted, &derived, delivery, mode)
            .await
            .map_err(ProcessingError::metadata_apply)?;

        let size_before = source.size();
        let size_after = applied.file.size();
        let warning_reason = match applied.status {
            MetadataStatus::Warning => applied.warning_reason.clone(),
            _ => None,
        };

        debug!(
            name = %source.name,
            size_before,
            size_after,
            status = ?applied.status,
            "Pipeline finished"
        );

        Ok(PipelineOutput {
            file: applied.file,
            size_before,
            size_after,
            reduction_ratio: reduction_ratio(size_before, size_after),
            metadata: JobMetadataInfo {
                pickup,
                delivery,
                preset,
                mode,
                derived,
                status: applied.status,
                reason: applied.warning_reason,
            },
            warning_reason,
        })
    }
}
