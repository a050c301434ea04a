//! Pool of execution units with a FIFO submission queue.

use futures::FutureExt;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::factory::UnitFactory;
use super::unit::{ExecutionUnit, UnitMode};
use crate::config::{ExecutionPreference, QueueConfig};
use crate::metrics;
use crate::pipeline::{PipelineOutput, PipelineRequest, ProcessingError};

type CallResult = Result<PipelineOutput, ProcessingError>;

struct PoolTask {
    request: PipelineRequest,
    reply: oneshot::Sender<CallResult>,
    submitted_at: Instant,
}

/// A unit and the id its slot is tracked by. Ids survive replacements,
/// so a completion never frees some other unit's slot.
struct Slot {
    id: u64,
    unit: Arc<dyn ExecutionUnit>,
}

struct PoolState {
    slots: Vec<Slot>,
    busy: HashSet<u64>,
    next_slot_id: u64,
    queue: VecDeque<PoolTask>,
    /// Bumped by `cancel_all`; completions from an older epoch leave the
    /// slot table alone.
    epoch: u64,
    terminated: bool,
}

impl PoolState {
    fn install(&mut self, units: Vec<Arc<dyn ExecutionUnit>>) {
        self.slots.clear();
        for unit in units {
            self.push(unit);
        }
    }

    fn push(&mut self, unit: Arc<dyn ExecutionUnit>) {
        self.next_slot_id += 1;
        self.slots.push(Slot {
            id: self.next_slot_id,
            unit,
        });
    }

    fn has_inline(&self) -> bool {
        self.slots.iter().any(|s| s.unit.mode() == UnitMode::Inline)
    }
}

struct PoolInner {
    factory: Arc<dyn UnitFactory>,
    preference: ExecutionPreference,
    desired: usize,
    call_timeout: Option<Duration>,
    state: Mutex<PoolState>,
}

/// Runs pipeline calls on a small set of units.
///
/// Inline units all share the caller's runtime, so the pool never holds
/// more than one: with no isolated unit available, capacity is exactly 1.
/// Capacity is the live unit count. It can shrink when an isolated unit
/// dies (the dead unit is dropped and an inline unit is added only if none
/// exists yet) and is recomputed when `cancel_all` rebuilds the units.
#[derive(Clone)]
pub struct ExecutorPool {
    inner: Arc<PoolInner>,
}

/// Default unit count from the host's logical core count.
pub fn infer_default_concurrency() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    if cores >= 6 {
        3
    } else if cores >= 4 {
        2
    } else {
        1
    }
}

impl ExecutorPool {
    pub async fn new(factory: Arc<dyn UnitFactory>, config: &QueueConfig) -> Self {
        let desired = if config.max_concurrency > 0 {
            config.max_concurrency
        } else {
            infer_default_concurrency()
        };
        let units = build_units(factory.as_ref(), config.execution, desired).await;

        info!(
            capacity = units.len(),
            execution = ?config.execution,
            isolated = units.iter().filter(|u| u.mode() == UnitMode::Isolated).count(),
            "Executor pool ready"
        );

        let mut state = PoolState {
            slots: Vec::new(),
            busy: HashSet::new(),
            next_slot_id: 0,
            queue: VecDeque::new(),
            epoch: 0,
            terminated: false,
        };
        state.install(units);

        Self {
            inner: Arc::new(PoolInner {
                factory,
                preference: config.execution,
                desired,
                call_timeout: config.call_timeout_secs.map(Duration::from_secs),
                state: Mutex::new(state),
            }),
        }
    }

    /// Number of calls that can run at once right now.
    pub fn capacity(&self) -> usize {
        self.inner.state().slots.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state().queue.len()
    }

    pub fn busy_count(&self) -> usize {
        self.inner.state().busy.len()
    }

    /// Modes of the current units, in slot order.
    pub fn unit_modes(&self) -> Vec<UnitMode> {
        self.inner
            .state()
            .slots
            .iter()
            .map(|s| s.unit.mode())
            .collect()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.state().terminated
    }

    /// Queues a call and waits for its result.
    pub async fn run(&self, request: PipelineRequest) -> CallResult {
        let (reply, rx) = oneshot::channel();
        {
            let mut state = self.inner.state();
            if state.terminated {
                return Err(ProcessingError::Aborted(
                    "executor pool is terminated".to_string(),
                ));
            }
            state.queue.push_back(PoolTask {
                request,
                reply,
                submitted_at: Instant::now(),
            });
        }
        self.inner.drain();

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ProcessingError::Aborted(
                "executor pool dropped the call".to_string(),
            )),
        }
    }

    /// Rejects every queued call with `Aborted`, tears down all units and
    /// builds fresh ones. In-flight calls resolve with `Aborted`.
    pub async fn cancel_all(&self, reason: &str) {
        let (epoch, queued, old_slots) = {
            let mut state = self.inner.state();
            if state.terminated {
                return;
            }
            state.epoch += 1;
            state.busy.clear();
            let queued: Vec<PoolTask> = state.queue.drain(..).collect();
            let old_slots = std::mem::take(&mut state.slots);
            (state.epoch, queued, old_slots)
        };

        metrics::POOL_CANCELLATIONS.inc();
        info!(
            reason,
            queued = queued.len(),
            units = old_slots.len(),
            "Cancelling all pool work"
        );

        for task in queued {
            let _ = task
                .reply
                .send(Err(ProcessingError::Aborted(reason.to_string())));
        }
        for slot in &old_slots {
            slot.unit.terminate();
        }

        let fresh = build_units(
            self.inner.factory.as_ref(),
            self.inner.preference,
            self.inner.desired,
        )
        .await;

        let superseded = {
            let mut state = self.inner.state();
            if state.epoch == epoch && !state.terminated {
                state.install(fresh);
                None
            } else {
                Some(fresh)
            }
        };
        if let Some(units) = superseded {
            for unit in units {
                unit.terminate();
            }
        }
        self.inner.drain();
    }

    /// Permanently shuts the pool down. Idempotent.
    pub fn terminate(&self) {
        let (queued, slots) = {
            let mut state = self.inner.state();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.epoch += 1;
            state.busy.clear();
            let queued: Vec<PoolTask> = state.queue.drain(..).collect();
            (queued, std::mem::take(&mut state.slots))
        };
        for task in queued {
            let _ = task.reply.send(Err(ProcessingError::Aborted(
                "executor pool is terminated".to_string(),
            )));
        }
        for slot in slots {
            slot.unit.terminate();
        }
        debug!("Executor pool terminated");
    }
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hands queued calls to idle units, first idle slot first.
    fn drain(self: &Arc<Self>) {
        let mut state = self.state();
        if state.terminated {
            return;
        }
        while !state.queue.is_empty() {
            let Some((id, unit)) = state
                .slots
                .iter()
                .find(|s| !state.busy.contains(&s.id))
                .map(|s| (s.id, Arc::clone(&s.unit)))
            else {
                break;
            };
            let Some(task) = state.queue.pop_front() else {
                break;
            };
            state.busy.insert(id);
            let epoch = state.epoch;
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.execute(id, epoch, unit, task).await });
        }
    }

    async fn execute(
        self: Arc<Self>,
        slot: u64,
        epoch: u64,
        unit: Arc<dyn ExecutionUnit>,
        task: PoolTask,
    ) {
        let PoolTask {
            request,
            reply,
            submitted_at,
        } = task;
        debug!(
            slot,
            waited_ms = submitted_at.elapsed().as_millis() as u64,
            "Dispatching call"
        );

        let call = AssertUnwindSafe(unit.run(request)).catch_unwind();
        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(ProcessingError::Unknown(
                    "execution timed out".to_string(),
                ))),
            },
            None => call.await,
        };
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(slot, "Execution unit panicked");
                Err(ProcessingError::Unknown("execution unit panicked".to_string()))
            }
        };

        self.release(slot, epoch, &unit);
        let _ = reply.send(result);
        self.drain();
    }

    /// Frees a slot. A unit the call left dead is dropped; an inline unit
    /// takes over only if the pool has none yet.
    fn release(&self, slot: u64, epoch: u64, unit: &Arc<dyn ExecutionUnit>) {
        let mut state = self.state();
        if state.epoch != epoch || state.terminated {
            return;
        }
        state.busy.remove(&slot);
        if unit.is_alive() {
            return;
        }

        warn!(slot, mode = ?unit.mode(), "Execution unit died");
        metrics::EXECUTOR_FALLBACKS
            .with_label_values(&["unit_dead"])
            .inc();
        state.slots.retain(|s| s.id != slot);
        if !state.has_inline() {
            let inline = self.factory.inline_unit();
            state.push(inline);
        }
        info!(capacity = state.slots.len(), "Executor pool resized after unit loss");
        unit.terminate();
    }
}

fn fallback(factory: &dyn UnitFactory, reason: &'static str) -> Arc<dyn ExecutionUnit> {
    metrics::EXECUTOR_FALLBACKS.with_label_values(&[reason]).inc();
    factory.inline_unit()
}

/// Builds the units for a preference.
///
/// `Inline` is a single inline unit. `Auto` only grows past one unit while
/// isolated units keep succeeding. `Isolated` tries `desired` isolated units
/// and, if any of them failed, adds one inline unit in their place. Either
/// way a pool with no isolated unit ends up with exactly one inline unit.
async fn build_units(
    factory: &dyn UnitFactory,
    preference: ExecutionPreference,
    desired: usize,
) -> Vec<Arc<dyn ExecutionUnit>> {
    let desired = desired.max(1);
    let mut units = Vec::with_capacity(desired);
    match preference {
        ExecutionPreference::Inline => return vec![factory.inline_unit()],
        ExecutionPreference::Auto => {
            while units.len() < desired {
                match factory.isolated_unit().await {
                    Ok(unit) => units.push(unit),
                    Err(e) if units.is_empty() => {
                        warn!(error = %e, "Isolated execution unavailable; running inline");
                        return vec![fallback(factory, "create_failed")];
                    }
                    Err(e) => {
                        warn!(error = %e, built = units.len(), "Stopping pool growth");
                        break;
                    }
                }
            }
        }
        ExecutionPreference::Isolated => {
            let mut failed = false;
            for _ in 0..desired {
                match factory.isolated_unit().await {
                    Ok(unit) => units.push(unit),
                    Err(e) => {
                        warn!(error = %e, "Isolated unit unavailable");
                        failed = true;
                    }
                }
            }
            if failed {
                units.push(fallback(factory, "create_failed"));
            }
        }
    }
    units
}
