//! Queue manager implementation.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::types::{QueueStatus, RunEntry};
use crate::execution::{ExecutorPool, UnitMode};
use crate::jobs::{
    CaptureSnapshot, Job, JobAction, JobErrorInfo, JobOutput, JobStatus, JobStore,
    PreviewRegistry, StoreError,
};
use crate::metrics;
use crate::pipeline::{PipelineOutput, PipelineRequest, ProcessingError};

#[derive(Default)]
struct ManagerState {
    running: HashMap<String, RunEntry>,
    /// Jobs seen canceled while running; sticky until their run settles.
    canceled: HashSet<String>,
    next_ticket: u64,
    disposed: bool,
}

struct ManagerInner {
    store: Arc<dyn JobStore>,
    pool: ExecutorPool,
    previews: Arc<dyn PreviewRegistry>,
    state: Mutex<ManagerState>,
}

/// Schedules queued jobs onto an executor pool.
///
/// One manager serves one session. `sync` must be called whenever jobs may
/// have become queued (added, retried); the manager calls it itself after
/// every settled run. Each admission captures the live generation, and a
/// result is committed only if that generation is still live.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<ManagerInner>,
}

impl QueueManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        pool: ExecutorPool,
        previews: Arc<dyn PreviewRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                pool,
                previews,
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    pub fn status(&self) -> QueueStatus {
        let (running, disposed) = {
            let state = self.inner.state();
            (state.running.len(), state.disposed)
        };
        QueueStatus {
            capacity: self.inner.pool.capacity(),
            running,
            pending: self.inner.pool.pending_count(),
            busy: self.inner.pool.busy_count(),
            disposed,
        }
    }

    /// Kind of each execution unit currently serving the pool.
    pub fn unit_modes(&self) -> Vec<UnitMode> {
        self.inner.pool.unit_modes()
    }

    /// Admits queued jobs, in list order, into free slots.
    ///
    /// Idempotent: a job already running is never admitted twice, and a full
    /// pool makes this a no-op.
    pub fn sync(&self) {
        let snapshot = self.inner.store.snapshot();
        let admitted: Vec<(Job, RunEntry)> = {
            let mut state = self.inner.state();
            if state.disposed {
                return;
            }
            let available = self
                .inner
                .pool
                .capacity()
                .saturating_sub(state.running.len());
            if available == 0 {
                return;
            }

            let queued: Vec<Job> = snapshot
                .jobs
                .iter()
                .filter(|j| j.status == JobStatus::Queued && !state.running.contains_key(&j.id))
                .take(available)
                .cloned()
                .collect();

            queued
                .into_iter()
                .map(|job| {
                    state.next_ticket += 1;
                    let entry = RunEntry {
                        ticket: state.next_ticket,
                        capture: CaptureSnapshot {
                            generation: snapshot.generation,
                            settings: snapshot.settings,
                            pickup: snapshot.pickup,
                            delivery: snapshot.delivery,
                            started_at: Utc::now(),
                        },
                    };
                    state.running.insert(job.id.clone(), entry.clone());
                    (job, entry)
                })
                .collect()
        };

        let mut rejected = false;
        for (job, entry) in admitted {
            if let Err(e) = self.inner.store.dispatch(JobAction::StartJob {
                id: job.id.clone(),
                snapshot: entry.capture.clone(),
            }) {
                debug!(job_id = %job.id, error = %e, "Job left the queue before admission");
                self.inner.release(&job.id, entry.ticket);
                rejected = true;
                continue;
            }
            self.admit(job, entry);
        }

        if rejected {
            self.sync();
        }
    }

    fn admit(&self, job: Job, entry: RunEntry) {
        let wait = (entry.capture.started_at - job.queued_at)
            .to_std()
            .unwrap_or_default();
        metrics::JOBS_ADMITTED.inc();
        metrics::QUEUE_WAIT.observe(wait.as_secs_f64());
        info!(
            job_id = %job.id,
            run_id = entry.capture.generation.run_id,
            settings_rev = entry.capture.generation.settings_rev,
            wait_ms = wait.as_millis() as u64,
            pending = self.inner.pool.pending_count(),
            "Admitted job"
        );

        let settings = entry.capture.settings;
        let request = PipelineRequest {
            source: job.source.file,
            jpeg_quality: settings.jpeg_quality,
            pickup: entry.capture.pickup,
            delivery: entry.capture.delivery,
            preset: settings.preset,
            mode: settings.metadata_policy_mode,
        };

        let manager = self.clone();
        let id = job.id;
        tokio::spawn(async move {
            let result = manager.inner.pool.run(request).await;
            match result {
                Ok(output) => manager.inner.on_success(&id, &entry, output),
                Err(e) => manager.inner.on_failure(&id, &entry, e),
            }
            manager.inner.release(&id, entry.ticket);
            manager.sync();
        });
    }

    /// Cancels every running job and tears down all in-flight work.
    ///
    /// Slots are freed immediately; the pool rebuilds its units before the
    /// next admission.
    pub async fn cancel_all_active(&self, reason: &str) {
        let ids: Vec<String> = {
            let mut state = self.inner.state();
            if state.disposed {
                return;
            }
            let ids: Vec<String> = state.running.keys().cloned().collect();
            state.canceled.extend(ids.iter().cloned());
            state.running.clear();
            ids
        };

        info!(count = ids.len(), reason, "Cancelling all active jobs");
        for id in &ids {
            if let Err(e) = self
                .inner
                .store
                .dispatch(JobAction::CancelJob { id: id.clone() })
            {
                debug!(job_id = %id, error = %e, "Cancel skipped");
            }
        }

        self.inner.pool.cancel_all(reason).await;
        self.sync();
    }

    /// Stops scheduling and terminates the pool. Idempotent.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.running.clear();
            state.canceled.clear();
        }
        self.inner.pool.terminate();
        info!("Queue manager disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state().disposed
    }
}

impl ManagerInner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Frees the slot held by this admission, if it still holds one.
    fn release(&self, id: &str, ticket: u64) {
        let mut state = self.state();
        if state.running.get(id).map(|e| e.ticket) == Some(ticket) {
            state.running.remove(id);
        }
    }

    fn is_canceled(&self, id: &str) -> bool {
        if self.state().canceled.contains(id) {
            return true;
        }
        let canceled = self
            .store
            .job(id)
            .is_some_and(|job| job.status == JobStatus::Canceled);
        if canceled {
            self.state().canceled.insert(id.to_string());
        }
        canceled
    }

    fn is_current(&self, entry: &RunEntry) -> bool {
        self.store.generation() == entry.generation()
    }

    fn forget_cancel(&self, id: &str) {
        self.state().canceled.remove(id);
    }

    fn end(&self, id: &str, why: &'static str) {
        match self.store.dispatch(JobAction::EndJob { id: id.to_string() }) {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => warn!(job_id = %id, error = %e, "Failed to end job"),
        }
        self.forget_cancel(id);
        metrics::JOB_OUTCOMES.with_label_values(&["ended"]).inc();
        debug!(job_id = %id, why, "Ended job without commit");
    }

    /// Result no longer belongs to the live generation (or the commit was
    /// refused): requeue unless the user canceled meanwhile.
    fn discard(&self, id: &str, cause: &'static str) {
        let Some(job) = self.store.job(id) else {
            debug!(job_id = %id, "Job removed before its result arrived");
            self.forget_cancel(id);
            return;
        };
        if job.status != JobStatus::Processing {
            self.end(id, cause);
            return;
        }
        match self.store.dispatch(JobAction::RequeueJob { id: id.to_string() }) {
            Ok(()) => {
                metrics::REQUEUES.with_label_values(&[cause]).inc();
                metrics::JOB_OUTCOMES.with_label_values(&["requeued"]).inc();
                info!(job_id = %id, cause, "Requeued job");
            }
            Err(e) => {
                debug!(job_id = %id, error = %e, "Requeue refused");
                self.end(id, cause);
            }
        }
    }

    fn on_success(&self, id: &str, entry: &RunEntry, output: PipelineOutput) {
        if self.is_canceled(id) {
            self.end(id, "canceled");
            return;
        }
        if !self.is_current(entry) {
            self.discard(id, "generation");
            return;
        }

        let preview = self.previews.create(&output.file);

        if self.is_canceled(id) {
            self.previews.revoke(&preview);
            self.end(id, "canceled");
            return;
        }
        if !self.is_current(entry) {
            self.previews.revoke(&preview);
            self.discard(id, "generation");
            return;
        }

        let status = if output.warning_reason.is_some() {
            "warning"
        } else {
            "done"
        };
        let size_before = output.size_before;
        let size_after = output.size_after;
        let action = JobAction::FinishJob {
            id: id.to_string(),
            expected: entry.generation(),
            warning_reason: output.warning_reason,
            output: JobOutput {
                file: output.file,
                preview: preview.clone(),
                size_before,
                size_after,
                reduction_ratio: output.reduction_ratio,
                metadata: output.metadata,
            },
        };

        match self.store.dispatch(action) {
            Ok(()) => {
                self.forget_cancel(id);
                metrics::JOB_OUTCOMES.with_label_values(&[status]).inc();
                info!(job_id = %id, status, size_before, size_after, "Job finished");
            }
            Err(e) => {
                self.previews.revoke(&preview);
                debug!(job_id = %id, error = %e, "Commit refused");
                self.settle_refused(id);
            }
        }
    }

    fn on_failure(&self, id: &str, entry: &RunEntry, error: ProcessingError) {
        if error.is_aborted() {
            let disposed = self.state().disposed;
            if disposed || self.is_canceled(id) {
                self.end(id, "aborted");
            } else {
                self.discard(id, "aborted");
            }
            return;
        }
        if self.is_canceled(id) {
            self.end(id, "canceled");
            return;
        }
        if !self.is_current(entry) {
            self.discard(id, "generation");
            return;
        }

        let info = JobErrorInfo::from(&error);
        warn!(job_id = %id, code = info.code.as_str(), error = %info.message, "Job failed");
        let action = JobAction::FailJob {
            id: id.to_string(),
            expected: entry.generation(),
            error: info,
        };
        match self.store.dispatch(action) {
            Ok(()) => {
                self.forget_cancel(id);
                metrics::JOB_OUTCOMES.with_label_values(&["error"]).inc();
            }
            Err(e) => {
                debug!(job_id = %id, error = %e, "Commit refused");
                self.settle_refused(id);
            }
        }
    }

    fn settle_refused(&self, id: &str) {
        if self.is_canceled(id) {
            self.end(id, "canceled");
        } else {
            self.discard(id, "commit_rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionPreference, QueueConfig};
    use crate::execution::PipelineUnitFactory;
    use crate::codec::ImageFile;
    use crate::jobs::{InMemoryJobStore, InMemoryPreviewRegistry, JobEvent, PreviewHandle};
    use crate::pipeline::ProcessingPipeline;
    use crate::testing::{fixtures, MockCodec, MockMetadataPolicy};
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryJobStore>,
        previews: Arc<InMemoryPreviewRegistry>,
        codec: Arc<MockCodec>,
        manager: QueueManager,
    }

    async fn harness(capacity: usize) -> Harness {
        let previews = Arc::new(InMemoryPreviewRegistry::new());
        let store = Arc::new(InMemoryJobStore::new(previews.clone()));
        let output_previews: Arc<dyn PreviewRegistry> = previews.clone();
        build(capacity, previews, store, output_previews).await
    }

    async fn build(
        capacity: usize,
        previews: Arc<InMemoryPreviewRegistry>,
        store: Arc<InMemoryJobStore>,
        output_previews: Arc<dyn PreviewRegistry>,
    ) -> Harness {
        let codec = Arc::new(MockCodec::new());
        let factory = Arc::new(PipelineUnitFactory::new(
            ProcessingPipeline::new(codec.clone(), Arc::new(MockMetadataPolicy::new())),
            Duration::from_secs(2),
        ));
        let pool = ExecutorPool::new(
            factory,
            &QueueConfig {
                max_concurrency: capacity,
                execution: if capacity > 1 {
                    ExecutionPreference::Isolated
                } else {
                    ExecutionPreference::Inline
                },
                ..Default::default()
            },
        )
        .await;
        let manager = QueueManager::new(store.clone(), pool, output_previews);
        Harness {
            store,
            previews,
            codec,
            manager,
        }
    }

    /// Output registry that applies one store action while the manager is
    /// registering a converted file.
    struct ActingRegistry {
        inner: Arc<InMemoryPreviewRegistry>,
        store: Arc<InMemoryJobStore>,
        pending: Mutex<Option<JobAction>>,
        created: Mutex<Vec<PreviewHandle>>,
    }

    impl ActingRegistry {
        fn new(inner: Arc<InMemoryPreviewRegistry>, store: Arc<InMemoryJobStore>) -> Self {
            Self {
                inner,
                store,
                pending: Mutex::new(None),
                created: Mutex::new(Vec::new()),
            }
        }

        fn arm(&self, action: JobAction) {
            *self.pending.lock().unwrap() = Some(action);
        }

        fn created(&self) -> Vec<PreviewHandle> {
            self.created.lock().unwrap().clone()
        }
    }

    impl PreviewRegistry for ActingRegistry {
        fn create(&self, file: &ImageFile) -> PreviewHandle {
            let handle = self.inner.create(file);
            self.created.lock().unwrap().push(handle.clone());
            if let Some(action) = self.pending.lock().unwrap().take() {
                self.store.dispatch(action).unwrap();
            }
            handle
        }

        fn revoke(&self, handle: &PreviewHandle) -> bool {
            self.inner.revoke(handle)
        }

        fn resolve(&self, handle: &PreviewHandle) -> Option<ImageFile> {
            self.inner.resolve(handle)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    async fn acting_harness() -> (Harness, Arc<ActingRegistry>) {
        let previews = Arc::new(InMemoryPreviewRegistry::new());
        let store = Arc::new(InMemoryJobStore::new(previews.clone()));
        let registry = Arc::new(ActingRegistry::new(previews.clone(), store.clone()));
        let h = build(1, previews, store, registry.clone()).await;
        (h, registry)
    }

    async fn wait_until(store: &InMemoryJobStore, done: impl Fn(&InMemoryJobStore) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(store) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let h = harness(1).await;
        h.codec.set_gated(true).await;
        h.store
            .add_files(vec![
                fixtures::opaque_source("a.png", 1000),
                fixtures::opaque_source("b.png", 1000),
            ])
            .unwrap();

        h.manager.sync();
        h.manager.sync();
        h.manager.sync();
        h.codec.wait_for_started(1).await;

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.count(JobStatus::Processing), 1);
        assert_eq!(h.manager.status().running, 1);
        assert_eq!(h.codec.started_count(), 1);

        h.codec.release(2);
        wait_until(&h.store, |s| s.snapshot().count(JobStatus::Done) == 2).await;
        h.manager.dispose();
    }

    #[tokio::test]
    async fn test_success_commits_output_with_preview() {
        let h = harness(1).await;
        let ids = h
            .store
            .add_files(vec![fixtures::opaque_source("a.png", 1000)])
            .unwrap();
        h.manager.sync();
        wait_until(&h.store, |s| s.snapshot().count(JobStatus::Done) == 1).await;

        let job = h.store.job(&ids[0]).unwrap();
        let output = job.output.unwrap();
        assert_eq!(output.size_before, 1000);
        assert_eq!(output.size_after, 400);
        assert!((output.reduction_ratio - 0.6).abs() < 1e-9);
        assert!(h.previews.resolve(&output.preview).is_some());
        assert_eq!(h.previews.len(), 2);
        assert!(h.store.snapshot().active_ids.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_committed_with_code() {
        let h = harness(1).await;
        h.codec.fail_loads_for("bad.png").await;
        let ids = h
            .store
            .add_files(vec![fixtures::opaque_source("bad.png", 1000)])
            .unwrap();
        h.manager.sync();
        wait_until(&h.store, |s| s.snapshot().count(JobStatus::Error) == 1).await;

        let error = h.store.job(&ids[0]).unwrap().error.unwrap();
        assert_eq!(error.code.as_str(), "load_source_failed");
    }

    #[tokio::test]
    async fn test_cancel_during_run_leaks_no_preview() {
        let h = harness(1).await;
        h.codec.set_gated(true).await;
        let ids = h
            .store
            .add_files(vec![fixtures::opaque_source("a.png", 1000)])
            .unwrap();
        h.manager.sync();
        h.codec.wait_for_started(1).await;

        h.store
            .dispatch(JobAction::CancelJob { id: ids[0].clone() })
            .unwrap();
        // The slot stays taken until the run settles.
        assert_eq!(h.manager.status().running, 1);

        h.codec.release(1);
        wait_until(&h.store, |s| s.snapshot().active_ids.is_empty()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let job = h.store.job(&ids[0]).unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
        assert!(job.output.is_none());
        assert_eq!(h.previews.len(), 1);
        assert_eq!(h.manager.status().running, 0);
    }

    #[tokio::test]
    async fn test_settings_change_requeues_and_reruns() {
        let h = harness(1).await;
        h.codec.set_gated(true).await;
        let ids = h
            .store
            .add_files(vec![fixtures::opaque_source("a.png", 1000)])
            .unwrap();
        h.manager.sync();
        h.codec.wait_for_started(1).await;
        let started_under = h.store.generation();

        h.store
            .dispatch(JobAction::SetPreset(crate::catalog::PresetId::ShareBeta))
            .unwrap();
        let live = h.store.generation();
        h.codec.release(2);

        wait_until(&h.store, |s| s.snapshot().count(JobStatus::Done) == 1).await;
        let job = h.store.job(&ids[0]).unwrap();
        let captured = job.captured.unwrap();
        assert_ne!(captured.generation, started_under);
        assert_eq!(captured.generation, live);
        assert_eq!(h.codec.load_count().await, 2);
        assert_eq!(h.previews.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_all_active_frees_slots() {
        let h = harness(1).await;
        h.codec.set_gated(true).await;
        let ids = h
            .store
            .add_files(vec![
                fixtures::opaque_source("a.png", 1000),
                fixtures::opaque_source("b.png", 1000),
            ])
            .unwrap();
        h.manager.sync();
        h.codec.wait_for_started(1).await;

        h.codec.set_gated(false).await;
        h.manager.cancel_all_active("user").await;

        wait_until(&h.store, |s| s.snapshot().count(JobStatus::Done) == 1).await;
        assert_eq!(h.store.job(&ids[0]).unwrap().status, JobStatus::Canceled);
        assert_eq!(h.store.job(&ids[1]).unwrap().status, JobStatus::Done);
        wait_until(&h.store, |s| s.snapshot().active_ids.is_empty()).await;
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_stops_admission() {
        let h = harness(1).await;
        h.manager.dispose();
        h.manager.dispose();
        assert!(h.manager.is_disposed());

        h.store
            .add_files(vec![fixtures::opaque_source("a.png", 1000)])
            .unwrap();
        h.manager.sync();
        assert_eq!(h.store.snapshot().count(JobStatus::Queued), 1);
        assert!(h.manager.status().disposed);
    }

    #[tokio::test]
    async fn test_settings_change_while_registering_output_requeues() {
        let (h, registry) = acting_harness().await;
        let ids = h
            .store
            .add_files(vec![fixtures::opaque_source("a.png", 1000)])
            .unwrap();
        let mut events = h.store.subscribe();
        registry.arm(JobAction::SetPreset(crate::catalog::PresetId::ShareBeta));
        let started_under = h.store.generation();

        h.manager.sync();
        wait_until(&h.store, |s| s.snapshot().count(JobStatus::Done) == 1).await;

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let JobEvent::JobUpdated { id, status } = event {
                if id == ids[0] {
                    statuses.push(status);
                }
            }
        }
        assert_eq!(
            statuses,
            vec![
                JobStatus::Processing,
                JobStatus::Queued,
                JobStatus::Processing,
                JobStatus::Done
            ]
        );

        // The output registered under the stale settings was revoked.
        let created = registry.created();
        assert_eq!(created.len(), 2);
        assert!(h.previews.resolve(&created[0]).is_none());

        let job = h.store.job(&ids[0]).unwrap();
        assert_eq!(job.output.unwrap().preview, created[1]);
        assert_ne!(job.captured.unwrap().generation, started_under);
        assert_eq!(h.codec.load_count().await, 2);
        assert_eq!(h.previews.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_while_registering_output_leaks_no_preview() {
        let (h, registry) = acting_harness().await;
        let ids = h
            .store
            .add_files(vec![fixtures::opaque_source("a.png", 1000)])
            .unwrap();
        registry.arm(JobAction::CancelJob { id: ids[0].clone() });

        h.manager.sync();
        wait_until(&h.store, |s| {
            s.snapshot().count(JobStatus::Canceled) == 1 && s.snapshot().active_ids.is_empty()
        })
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let created = registry.created();
        assert_eq!(created.len(), 1);
        assert!(h.previews.resolve(&created[0]).is_none());

        let job = h.store.job(&ids[0]).unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
        assert!(job.output.is_none());
        assert_eq!(h.previews.len(), 1);
        assert_eq!(h.manager.status().running, 0);
        assert_eq!(h.codec.load_count().await, 1);
    }
}
