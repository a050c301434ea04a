//! In-memory job store.

use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

use super::preview::PreviewRegistry;
use super::store::{JobAction, JobStore, StoreError};
use super::types::{
    ConvertSettings, Generation, Job, JobStatus, PreviewHandle, SettingsPatch, StoreSnapshot,
};
use crate::catalog::{DeliveryId, PickupId, PresetId};
use crate::codec::ImageFile;
use crate::config::SessionConfig;

const EVENT_CAPACITY: usize = 256;

/// Change notifications published after each applied action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobsAdded { ids: Vec<String> },
    JobUpdated { id: String, status: JobStatus },
    SessionCleared { run_id: u64 },
    SettingsChanged { generation: Generation },
}

struct StoreState {
    jobs: Vec<Job>,
    generation: Generation,
    settings: ConvertSettings,
    preset: PresetId,
    pickup: PickupId,
    delivery: DeliveryId,
    active_ids: Vec<String>,
    last_added_ids: Vec<String>,
}

impl StoreState {
    fn new(settings: ConvertSettings) -> Self {
        let def = settings.preset.definition();
        Self {
            jobs: Vec::new(),
            generation: Generation {
                run_id: 1,
                settings_rev: 1,
            },
            settings,
            preset: settings.preset,
            pickup: def.pickup,
            delivery: def.delivery,
            active_ids: Vec::new(),
            last_added_ids: Vec::new(),
        }
    }

    fn job_mut(&mut self, id: &str) -> Result<&mut Job, StoreError> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn deactivate(&mut self, id: &str) {
        self.active_ids.retain(|active| active != id);
    }

    fn bump_settings(&mut self, effects: &mut Effects) {
        self.generation.settings_rev += 1;
        effects.events.push(JobEvent::SettingsChanged {
            generation: self.generation,
        });
    }
}

/// Side effects of one action, run after the state lock is released.
#[derive(Default)]
struct Effects {
    revoke: Vec<PreviewHandle>,
    events: Vec<JobEvent>,
}

fn invalid(job: &Job, action: &'static str) -> StoreError {
    StoreError::InvalidTransition {
        id: job.id.clone(),
        status: job.status,
        action,
    }
}

fn check_commit(state: &StoreState, id: &str, expected: Generation) -> Result<(), StoreError> {
    let job = state
        .jobs
        .iter()
        .find(|j| j.id == id)
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    if job.status != JobStatus::Processing {
        return Err(invalid(job, "commit"));
    }
    let captured = job.captured.as_ref().map(|c| c.generation);
    if captured != Some(expected) || state.generation != expected {
        return Err(StoreError::StaleGeneration {
            id: id.to_string(),
            expected,
            live: state.generation,
        });
    }
    Ok(())
}

fn reduce(state: &mut StoreState, action: JobAction) -> Result<Effects, StoreError> {
    let mut effects = Effects::default();

    match action {
        JobAction::AddJobs { jobs } => {
            let ids: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();
            state.jobs.extend(jobs);
            state.last_added_ids = ids.clone();
            effects.events.push(JobEvent::JobsAdded { ids });
        }

        JobAction::StartJob { id, snapshot } => {
            let job = state.job_mut(&id)?;
            if job.status != JobStatus::Queued {
                return Err(invalid(job, "start"));
            }
            job.status = JobStatus::Processing;
            job.is_new = false;
            job.error = None;
            job.warning_reason = None;
            job.captured = Some(snapshot);
            if !state.active_ids.contains(&id) {
                state.active_ids.push(id.clone());
            }
            effects.events.push(JobEvent::JobUpdated {
                id,
                status: JobStatus::Processing,
            });
        }

        JobAction::FinishJob {
            id,
            expected,
            output,
            warning_reason,
        } => {
            check_commit(state, &id, expected)?;
            let job = state.job_mut(&id)?;
            let status = if warning_reason.is_some() {
                JobStatus::Warning
            } else {
                JobStatus::Done
            };
            if let Some(previous) = job.output.replace(output) {
                effects.revoke.push(previous.preview);
            }
            job.status = status;
            job.error = None;
            job.warning_reason = warning_reason;
            state.deactivate(&id);
            effects.events.push(JobEvent::JobUpdated { id, status });
        }

        JobAction::FailJob {
            id,
            expected,
            error,
        } => {
            check_commit(state, &id, expected)?;
            let job = state.job_mut(&id)?;
            job.status = JobStatus::Error;
            job.error = Some(error);
            state.deactivate(&id);
            effects.events.push(JobEvent::JobUpdated {
                id,
                status: JobStatus::Error,
            });
        }

        JobAction::RequeueJob { id } => {
            let job = state.job_mut(&id)?;
            if job.status != JobStatus::Processing {
                return Err(invalid(job, "requeue"));
            }
            reset_to_queued(job, &mut effects);
            state.deactivate(&id);
            effects.events.push(JobEvent::JobUpdated {
                id,
                status: JobStatus::Queued,
            });
        }

        JobAction::EndJob { id } => {
            state.job_mut(&id)?;
            state.deactivate(&id);
        }

        JobAction::CancelJob { id } => {
            let job = state.job_mut(&id)?;
            if !matches!(job.status, JobStatus::Queued | JobStatus::Processing) {
                return Err(invalid(job, "cancel"));
            }
            if let Some(output) = job.output.take() {
                effects.revoke.push(output.preview);
            }
            job.status = JobStatus::Canceled;
            job.is_new = false;
            job.error = None;
            job.warning_reason = None;
            effects.events.push(JobEvent::JobUpdated {
                id,
                status: JobStatus::Canceled,
            });
        }

        JobAction::RetryJob { id } => {
            let job = state.job_mut(&id)?;
            if !matches!(job.status, JobStatus::Error | JobStatus::Warning) {
                return Err(invalid(job, "retry"));
            }
            reset_to_queued(job, &mut effects);
            effects.events.push(JobEvent::JobUpdated {
                id,
                status: JobStatus::Queued,
            });
        }

        JobAction::ClearSession => {
            for job in state.jobs.drain(..) {
                effects.revoke.push(job.source.preview);
                if let Some(output) = job.output {
                    effects.revoke.push(output.preview);
                }
            }
            state.active_ids.clear();
            state.last_added_ids.clear();
            state.generation.run_id += 1;
            effects.events.push(JobEvent::SessionCleared {
                run_id: state.generation.run_id,
            });
        }

        JobAction::SetSettings(SettingsPatch {
            jpeg_quality,
            metadata_policy_mode,
        }) => {
            if let Some(quality) = jpeg_quality {
                if !(quality > 0.0 && quality <= 1.0) {
                    return Err(StoreError::InvalidSettings(format!(
                        "jpeg_quality must be in (0, 1], got {}",
                        quality
                    )));
                }
                state.settings.jpeg_quality = quality;
            }
            if let Some(mode) = metadata_policy_mode {
                state.settings.metadata_policy_mode = mode;
            }
            state.bump_settings(&mut effects);
        }

        JobAction::SetPreset(preset) => {
            let def = preset.definition();
            state.settings = ConvertSettings::from_preset(preset);
            state.preset = preset;
            state.pickup = def.pickup;
            state.delivery = def.delivery;
            state.bump_settings(&mut effects);
        }

        JobAction::SetDelivery(delivery) => {
            state.delivery = delivery;
            state.bump_settings(&mut effects);
        }

        JobAction::SetPickup(pickup) => {
            state.pickup = pickup;
            state.bump_settings(&mut effects);
        }
    }

    Ok(effects)
}

fn reset_to_queued(job: &mut Job, effects: &mut Effects) {
    if let Some(output) = job.output.take() {
        effects.revoke.push(output.preview);
    }
    job.status = JobStatus::Queued;
    job.queued_at = Utc::now();
    job.is_new = false;
    job.error = None;
    job.warning_reason = None;
}

/// Single-session store guarded by one mutex.
///
/// Preview handles released by an action are revoked after the lock is
/// dropped; events go to every `subscribe`r.
pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
    previews: Arc<dyn PreviewRegistry>,
    events: broadcast::Sender<JobEvent>,
}

impl InMemoryJobStore {
    pub fn new(previews: Arc<dyn PreviewRegistry>) -> Self {
        Self::with_settings(previews, ConvertSettings::default())
    }

    /// Starts from the configured default preset and quality override.
    pub fn from_config(previews: Arc<dyn PreviewRegistry>, config: &SessionConfig) -> Self {
        let mut settings = ConvertSettings::from_preset(config.default_preset);
        if let Some(quality) = config.jpeg_quality {
            settings.jpeg_quality = quality;
        }
        Self::with_settings(previews, settings)
    }

    fn with_settings(previews: Arc<dyn PreviewRegistry>, settings: ConvertSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(StoreState::new(settings)),
            previews,
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn previews(&self) -> &Arc<dyn PreviewRegistry> {
        &self.previews
    }

    /// Creates one queued job per file, each with a source preview.
    pub fn add_files(&self, files: Vec<ImageFile>) -> Result<Vec<String>, StoreError> {
        let jobs: Vec<Job> = files
            .into_iter()
            .map(|file| {
                let preview = self.previews.create(&file);
                Job::new(file, preview)
            })
            .collect();
        let ids = jobs.iter().map(|j| j.id.clone()).collect();
        self.dispatch(JobAction::AddJobs { jobs })?;
        Ok(ids)
    }
}

impl JobStore for InMemoryJobStore {
    fn snapshot(&self) -> StoreSnapshot {
        let state = self.state();
        StoreSnapshot {
            jobs: state.jobs.clone(),
            generation: state.generation,
            settings: state.settings,
            preset: state.preset,
            pickup: state.pickup,
            delivery: state.delivery,
            active_ids: state.active_ids.clone(),
            last_added_ids: state.last_added_ids.clone(),
        }
    }

    fn generation(&self) -> Generation {
        self.state().generation
    }

    fn job(&self, id: &str) -> Option<Job> {
        self.state().jobs.iter().find(|j| j.id == id).cloned()
    }

    fn dispatch(&self, action: JobAction) -> Result<(), StoreError> {
        let name = action.name();
        let effects = {
            let mut state = self.state();
            reduce(&mut state, action)?
        };
        debug!(
            action = name,
            revoked = effects.revoke.len(),
            "Applied job action"
        );

        for handle in &effects.revoke {
            self.previews.revoke(handle);
        }
        for event in effects.events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        Ok(())
    }
}
