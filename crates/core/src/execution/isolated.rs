//! Isolated execution unit: a dedicated OS thread with its own runtime.
//!
//! The caller and the worker share nothing but two channels. Each call is
//! tagged with a fresh id and parked in `pending` until a matching response
//! arrives. When the worker's response channel closes, every parked call
//! fails with `WorkerUnavailable` and the unit is dead.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::error::UnitError;
use super::messages::{WorkerRequest, WorkerResponse};
use super::unit::{AbortSignal, ExecutionUnit, UnitMode};
use crate::pipeline::{PipelineOutput, PipelineRequest, ProcessingError, ProcessingPipeline};

type Reply = oneshot::Sender<Result<PipelineOutput, ProcessingError>>;
type PendingCalls = Arc<Mutex<HashMap<String, Reply>>>;

pub struct IsolatedUnit {
    name: String,
    requests: Mutex<Option<mpsc::UnboundedSender<WorkerRequest>>>,
    pending: PendingCalls,
    alive: Arc<AtomicBool>,
    seq: AtomicU64,
    abort: AbortSignal,
}

impl IsolatedUnit {
    /// Starts the worker thread and waits for it to answer the probe.
    pub async fn spawn(
        name: impl Into<String>,
        pipeline: ProcessingPipeline,
        probe_timeout: Duration,
    ) -> Result<Self, UnitError> {
        let name = name.into();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel();

        let thread_name = name.clone();
        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_main(thread_name, pipeline, request_rx, response_tx))
            .map_err(|e| UnitError::SpawnFailed(e.to_string()))?;

        request_tx
            .send(WorkerRequest::Probe)
            .map_err(|_| UnitError::ProbeFailed("worker exited before the probe".to_string()))?;

        match tokio::time::timeout(probe_timeout, response_rx.recv()).await {
            Ok(Some(WorkerResponse::Ready)) => {}
            Ok(Some(other)) => {
                return Err(UnitError::ProbeFailed(format!(
                    "unexpected probe response: {:?}",
                    other
                )))
            }
            Ok(None) => {
                return Err(UnitError::ProbeFailed(
                    "worker exited during the probe".to_string(),
                ))
            }
            Err(_) => {
                return Err(UnitError::ProbeFailed(format!(
                    "no answer within {}ms",
                    probe_timeout.as_millis()
                )))
            }
        }

        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        tokio::spawn(route_responses(
            name.clone(),
            response_rx,
            pending.clone(),
            alive.clone(),
        ));

        debug!(unit = %name, "Isolated unit ready");
        Ok(Self {
            name,
            requests: Mutex::new(Some(request_tx)),
            pending,
            alive,
            seq: AtomicU64::new(0),
            abort: AbortSignal::new(),
        })
    }

    fn forget(&self, job_id: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(job_id);
        }
    }

    fn send(&self, request: WorkerRequest) -> bool {
        match self.requests.lock() {
            Ok(requests) => requests
                .as_ref()
                .map(|tx| tx.send(request).is_ok())
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ExecutionUnit for IsolatedUnit {
    fn mode(&self) -> UnitMode {
        UnitMode::Isolated
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.abort.is_triggered()
    }

    async fn run(&self, request: PipelineRequest) -> Result<PipelineOutput, ProcessingError> {
        if self.abort.is_triggered() {
            return Err(ProcessingError::Aborted(format!("{} terminated", self.name)));
        }
        if !self.alive.load(Ordering::SeqCst) {
            return Err(ProcessingError::WorkerUnavailable(format!(
                "{} is not running",
                self.name
            )));
        }

        let job_id = format!("{}-call-{}", self.name, self.seq.fetch_add(1, Ordering::SeqCst));
        let (reply_tx, reply_rx) = oneshot::channel();
        match self.pending.lock() {
            Ok(mut pending) => {
                pending.insert(job_id.clone(), reply_tx);
            }
            Err(_) => {
                return Err(ProcessingError::WorkerUnavailable(format!(
                    "{} call table is poisoned",
                    self.name
                )))
            }
        }

        let sent = self.send(WorkerRequest::Process {
            job_id: job_id.clone(),
            payload: Box::new(request),
        });
        if !sent {
            self.forget(&job_id);
            self.alive.store(false, Ordering::SeqCst);
            return Err(ProcessingError::WorkerUnavailable(format!(
                "{} stopped accepting work",
                self.name
            )));
        }

        tokio::select! {
            biased;
            _ = self.abort.triggered() => {
                self.forget(&job_id);
                Err(ProcessingError::Aborted(format!("{} terminated", self.name)))
            }
            reply = reply_rx => match reply {
                Ok(result) => result,
                Err(_) => Err(ProcessingError::WorkerUnavailable(format!(
                    "{} dropped the call",
                    self.name
                ))),
            },
        }
    }

    fn terminate(&self) {
        if !self.abort.trigger() {
            return;
        }
        self.alive.store(false, Ordering::SeqCst);
        // Closing the request channel stops the worker loop.
        if let Ok(mut requests) = self.requests.lock() {
            requests.take();
        }
        debug!(unit = %self.name, "Isolated unit terminated");
    }
}

impl Drop for IsolatedUnit {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Caller-side task: resolves parked calls from worker responses.
async fn route_responses(
    name: String,
    mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
    pending: PendingCalls,
    alive: Arc<AtomicBool>,
) {
    while let Some(response) = responses.recv().await {
        let (job_id, result) = match response {
            WorkerResponse::Success { job_id, result } => (job_id, Ok(*result)),
            WorkerResponse::Error {
                job_id,
                reason,
                error_code,
            } => (job_id, Err(ProcessingError::from_code(error_code, reason))),
            WorkerResponse::Ready => continue,
        };
        let reply = pending.lock().ok().and_then(|mut p| p.remove(&job_id));
        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => debug!(unit = %name, job_id = %job_id, "Dropping response for abandoned call"),
        }
    }

    alive.store(false, Ordering::SeqCst);
    let orphaned: Vec<Reply> = match pending.lock() {
        Ok(mut pending) => pending.drain().map(|(_, reply)| reply).collect(),
        Err(_) => Vec::new(),
    };
    if !orphaned.is_empty() {
        warn!(unit = %name, calls = orphaned.len(), "Worker exited with calls in flight");
    }
    for reply in orphaned {
        let _ = reply.send(Err(ProcessingError::WorkerUnavailable(format!(
            "{} exited",
            name
        ))));
    }
}

fn worker_main(
    name: String,
    pipeline: ProcessingPipeline,
    requests: mpsc::UnboundedReceiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(unit = %name, error = %e, "Failed to build worker runtime");
            return;
        }
    };
    runtime.block_on(serve(name, pipeline, requests, responses));
}

/// Worker-side loop. A panicking call takes the whole worker down.
async fn serve(
    name: String,
    pipeline: ProcessingPipeline,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) {
    let mut calls = JoinSet::new();
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(WorkerRequest::Probe) => {
                    let _ = responses.send(WorkerResponse::Ready);
                }
                Some(WorkerRequest::Process { job_id, payload }) => {
                    let pipeline = pipeline.clone();
                    calls.spawn(async move {
                        let result = pipeline.run(*payload).await;
                        (job_id, result)
                    });
                }
                None => break,
            },
            Some(joined) = calls.join_next() => match joined {
                Ok((job_id, Ok(output))) => {
                    let _ = responses.send(WorkerResponse::Success {
                        job_id,
                        result: Box::new(output),
                    });
                }
                Ok((job_id, Err(err))) => {
                    let _ = responses.send(WorkerResponse::Error {
                        job_id,
                        reason: err.message(),
                        error_code: Some(err.code()),
                    });
                }
                Err(e) => {
                    error!(unit = %name, error = %e, "Worker call crashed; shutting worker down");
                    break;
                }
            },
        }
    }
    calls.abort_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DeliveryId, PickupId, PresetId};
    use crate::metadata::MetadataPolicyMode;
    use crate::pipeline::ProcessingErrorCode;
    use crate::testing::{fixtures, MockCodec, MockMetadataPolicy};
    use crate::codec::CodecError;

    fn request(name: &str) -> PipelineRequest {
        PipelineRequest {
            source: fixtures::opaque_source(name, 1000),
            jpeg_quality: 0.85,
            pickup: PickupId::Photos,
            delivery: DeliveryId::Photos,
            preset: PresetId::PhotosRecommended,
            mode: MetadataPolicyMode::Strict,
        }
    }

    async fn unit_with(codec: Arc<MockCodec>) -> IsolatedUnit {
        let pipeline = ProcessingPipeline::new(codec, Arc::new(MockMetadataPolicy::new()));
        IsolatedUnit::spawn("test-worker", pipeline, Duration::from_secs(2))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_through_worker() {
        let codec = Arc::new(MockCodec::new());
        codec.set_output_size(250).await;
        let unit = unit_with(codec).await;

        let output = unit.run(request("a.png")).await.unwrap();
        assert_eq!(output.size_after, 250);
        assert_eq!(output.file.name, "a.jpg");
        assert!(unit.is_alive());
        assert_eq!(unit.mode(), UnitMode::Isolated);
    }

    #[tokio::test]
    async fn test_errors_cross_the_boundary_with_their_code() {
        let codec = Arc::new(MockCodec::new());
        codec.set_next_load_error(CodecError::decode("bad bytes")).await;
        let unit = unit_with(codec).await;

        let err = unit.run(request("a.png")).await.unwrap_err();
        assert_eq!(err.code(), ProcessingErrorCode::LoadSourceFailed);
        assert!(err.message().contains("bad bytes"));
        assert!(unit.is_alive());
    }

    #[tokio::test]
    async fn test_crash_rejects_call_with_worker_unavailable() {
        let codec = Arc::new(MockCodec::new());
        codec.panic_on("boom.png").await;
        let unit = unit_with(codec).await;

        let err = unit.run(request("boom.png")).await.unwrap_err();
        assert_eq!(err.code(), ProcessingErrorCode::WorkerUnavailable);
        assert!(!unit.is_alive());

        let err = unit.run(request("a.png")).await.unwrap_err();
        assert_eq!(err.code(), ProcessingErrorCode::WorkerUnavailable);
    }

    #[tokio::test]
    async fn test_terminate_aborts_in_flight_call() {
        let codec = Arc::new(MockCodec::new());
        codec.set_gated(true).await;
        let unit = Arc::new(unit_with(codec.clone()).await);

        let call = {
            let unit = unit.clone();
            tokio::spawn(async move { unit.run(request("a.png")).await })
        };
        codec.wait_for_started(1).await;
        unit.terminate();
        unit.terminate();

        let err = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(err.is_aborted());
        assert!(!unit.is_alive());
    }
}
