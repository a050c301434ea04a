//! Creation of execution units.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::UnitError;
use super::inline::InlineUnit;
use super::isolated::IsolatedUnit;
use super::unit::ExecutionUnit;
use crate::pipeline::ProcessingPipeline;

/// Builds the units an `ExecutorPool` runs on.
#[async_trait]
pub trait UnitFactory: Send + Sync {
    /// An inline unit. Cannot fail.
    fn inline_unit(&self) -> Arc<dyn ExecutionUnit>;

    /// An isolated unit that has passed its capability probe.
    async fn isolated_unit(&self) -> Result<Arc<dyn ExecutionUnit>, UnitError>;
}

/// Default factory: every unit runs the same pipeline.
pub struct PipelineUnitFactory {
    pipeline: ProcessingPipeline,
    probe_timeout: Duration,
    spawned: AtomicUsize,
}

impl PipelineUnitFactory {
    pub fn new(pipeline: ProcessingPipeline, probe_timeout: Duration) -> Self {
        Self {
            pipeline,
            probe_timeout,
            spawned: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UnitFactory for PipelineUnitFactory {
    fn inline_unit(&self) -> Arc<dyn ExecutionUnit> {
        Arc::new(InlineUnit::new(self.pipeline.clone()))
    }

    async fn isolated_unit(&self) -> Result<Arc<dyn ExecutionUnit>, UnitError> {
        let index = self.spawned.fetch_add(1, Ordering::SeqCst);
        let unit = IsolatedUnit::spawn(
            format!("jpegstamp-worker-{}", index),
            self.pipeline.clone(),
            self.probe_timeout,
        )
        .await?;
        Ok(Arc::new(unit))
    }
}
