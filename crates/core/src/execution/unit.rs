//! The execution unit abstraction.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use crate::pipeline::{PipelineOutput, PipelineRequest, ProcessingError};

/// Where a unit runs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitMode {
    /// On the caller's runtime.
    Inline,
    /// On a dedicated worker thread with its own runtime.
    Isolated,
}

/// Runs one pipeline invocation at a time on behalf of the pool.
///
/// Units carry no job state between calls. `terminate` is idempotent and
/// makes any in-flight `run` return `ProcessingError::Aborted`.
#[async_trait]
pub trait ExecutionUnit: Send + Sync {
    fn mode(&self) -> UnitMode;

    /// False once the unit was terminated or its worker went away.
    fn is_alive(&self) -> bool;

    async fn run(&self, request: PipelineRequest) -> Result<PipelineOutput, ProcessingError>;

    fn terminate(&self);
}

/// One-shot abort flag that in-flight calls can await.
#[derive(Debug)]
pub(crate) struct AbortSignal {
    tx: watch::Sender<bool>,
}

impl AbortSignal {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Raises the flag; returns false if it was already raised.
    pub(crate) fn trigger(&self) -> bool {
        self.tx.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        })
    }

    pub(crate) fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is raised.
    pub(crate) async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|raised| *raised).await;
    }
}
