//! Fans trials out over worker threads and folds their partial aggregates
//! back together in checkpoint order.
//!
//! Each checkpoint delta from [`crate::schedule`] is split into contiguous
//! slices, one per worker. Workers report a partial [`CompareAggregate`]
//! per slice; the orchestrator emits one progress event per checkpoint once
//! every slice of it (and of all earlier checkpoints) has arrived, then a
//! single result and a single completion.
//!
//! Workers that die or go silent are detected by polling with a timeout.
//! Their undelivered slices can be resubmitted under a fresh seed when the
//! configuration allows retries. A trial that fails is never retried.
//! Abandoned workers, and every worker once the run returns, are told to
//! stop and drop whatever trials they still hold.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compare::{CompareAggregate, Comparison, TrialSummary};
use crate::params::ParamsConfigError;
use crate::race::TrialFailure;
use crate::rng::derive_stream_seed;
use crate::schedule::schedule;

const HEARTBEAT_TRIALS: u64 = 25;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pool sizing and liveness limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "OrchestratorConfig::default_workers")]
    pub workers: usize,
    #[serde(default = "OrchestratorConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retries: u32,
}

impl OrchestratorConfig {
    const fn default_workers() -> usize {
        2
    }

    const fn default_timeout_secs() -> u64 {
        60
    }

    /// # Errors
    ///
    /// Returns an error when the pool has no workers or a zero timeout.
    pub fn validate(&self) -> Result<(), ParamsConfigError> {
        if self.workers == 0 {
            return Err(ParamsConfigError::MinViolation {
                field: "workers",
                min: 1.0,
                value: 0.0,
            });
        }
        if self.timeout_secs == 0 {
            return Err(ParamsConfigError::MinViolation {
                field: "timeout_secs",
                min: 1.0,
                value: 0.0,
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            timeout_secs: Self::default_timeout_secs(),
            retries: 0,
        }
    }
}

/// Runs single trials. Implemented by [`Comparison`]; tests substitute their own.
pub trait TrialExecutor: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns the failure of the trial at `index`.
    fn run_trial(&self, run_seed: u64, index: u64) -> Result<TrialSummary, TrialFailure>;
}

impl TrialExecutor for Comparison {
    fn run_trial(&self, run_seed: u64, index: u64) -> Result<TrialSummary, TrialFailure> {
        Self::run_trial(self, run_seed, index)
    }
}

/// Compares a runner against itself plus one skill.
pub trait SkillExecutor: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns the first failed trial.
    fn run_skill(
        &self,
        skill_id: &str,
        run_seed: u64,
        samples: u64,
    ) -> Result<CompareAggregate, TrialFailure>;
}

/// One skill's comparison within an activation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSample {
    pub skill_id: String,
    pub aggregate: CompareAggregate,
}

/// What workers send back over the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Heartbeat with the number of trials finished in the current slice.
    Progress { worker: usize, completed: u64 },
    Result {
        worker: usize,
        item: usize,
        checkpoint: usize,
        aggregate: CompareAggregate,
    },
    Complete { worker: usize },
    ActivationBatch {
        worker: usize,
        item: usize,
        batch: usize,
        results: Vec<SkillSample>,
    },
    BatchDone { worker: usize },
    Failed { worker: usize, failure: TrialFailure },
}

impl WorkerMessage {
    #[must_use]
    pub const fn worker(&self) -> usize {
        match self {
            Self::Progress { worker, .. }
            | Self::Result { worker, .. }
            | Self::Complete { worker }
            | Self::ActivationBatch { worker, .. }
            | Self::BatchDone { worker }
            | Self::Failed { worker, .. } => *worker,
        }
    }
}

/// Events surfaced to the caller of [`run_comparison`].
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Progress {
        samples_completed: u64,
        samples_total: u64,
    },
    Result {
        aggregate: CompareAggregate,
    },
    Complete,
}

#[derive(Debug, Error, PartialEq)]
pub enum OrchestratorError {
    #[error("worker {worker} stopped before finishing samples {range:?}")]
    WorkerLost { worker: usize, range: Range<u64> },
    #[error("worker {worker} sent nothing for {}s", .after.as_secs())]
    Timeout { worker: usize, after: Duration },
    #[error(transparent)]
    Trial(#[from] TrialFailure),
    #[error("invalid orchestrator input: {0}")]
    Config(#[from] ParamsConfigError),
    #[error("gave up after {retries} resubmissions: {last}")]
    RetriesExhausted {
        retries: u32,
        last: Box<OrchestratorError>,
    },
    #[error("could not start worker thread: {0}")]
    Spawn(String),
    #[cfg(feature = "async")]
    #[error("orchestrator task panicked")]
    Join,
}

/// Fires exactly once, when every expected worker has arrived.
#[derive(Debug, Clone, Default)]
pub struct CompletionBarrier {
    expected: BTreeSet<usize>,
    arrived: BTreeSet<usize>,
    fired: bool,
}

impl CompletionBarrier {
    #[must_use]
    pub fn new(workers: impl IntoIterator<Item = usize>) -> Self {
        Self {
            expected: workers.into_iter().collect(),
            arrived: BTreeSet::new(),
            fired: false,
        }
    }

    /// Stops waiting on `lost` and waits on `replacement` instead.
    pub fn replace(&mut self, lost: usize, replacement: usize) {
        self.expected.remove(&lost);
        self.arrived.remove(&lost);
        self.expected.insert(replacement);
    }

    /// Records an arrival. Returns `true` only for the arrival that completes
    /// the barrier; duplicates and unknown workers are ignored.
    pub fn arrive(&mut self, worker: usize) -> bool {
        if self.fired || !self.expected.contains(&worker) {
            return false;
        }
        self.arrived.insert(worker);
        if self.expected.is_subset(&self.arrived) {
            self.fired = true;
            return true;
        }
        false
    }

    #[must_use]
    pub fn has_arrived(&self, worker: usize) -> bool {
        self.arrived.contains(&worker)
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.fired
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Task {
    Trials {
        checkpoint: usize,
        range: Range<u64>,
    },
    Skills {
        batch: usize,
        skills: Vec<String>,
        samples: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkItem {
    id: usize,
    seed: u64,
    task: Task,
}

impl WorkItem {
    fn span(&self) -> Range<u64> {
        match &self.task {
            Task::Trials { range, .. } => range.clone(),
            Task::Skills { batch, .. } => {
                let batch = *batch as u64;
                batch..batch + 1
            }
        }
    }
}

type Job = Arc<dyn Fn(&WorkerLink, &WorkItem) -> Result<(), TrialFailure> + Send + Sync>;

/// A worker's side of the pool: its channel and the flag that stops it.
struct WorkerLink {
    worker: usize,
    tx: Sender<WorkerMessage>,
    stop: Arc<AtomicBool>,
}

impl WorkerLink {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Sends `message`. A closed channel stops the worker.
    fn send(&self, message: WorkerMessage) -> bool {
        if self.tx.send(message).is_err() {
            self.stop.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Complete,
    BatchDone,
}

#[derive(Debug, Clone, Copy)]
enum Loss {
    Exited,
    Silent,
}

struct Unit {
    items: Vec<WorkItem>,
    delivered: BTreeSet<usize>,
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    last_seen: Instant,
}

struct Pool {
    job: Job,
    terminal: Terminal,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    timeout: Duration,
    retries: u32,
    retries_used: u32,
    run_seed: u64,
    units: BTreeMap<usize, Unit>,
    next_worker: usize,
    barrier: CompletionBarrier,
}

impl Pool {
    fn start(
        job: Job,
        terminal: Terminal,
        assignments: Vec<Vec<WorkItem>>,
        config: &OrchestratorConfig,
        run_seed: u64,
    ) -> Result<Self, OrchestratorError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut pool = Self {
            job,
            terminal,
            tx,
            rx,
            timeout: config.timeout(),
            retries: config.retries,
            retries_used: 0,
            run_seed,
            units: BTreeMap::new(),
            next_worker: 0,
            barrier: CompletionBarrier::default(),
        };
        let mut workers = Vec::with_capacity(assignments.len());
        for items in assignments {
            workers.push(pool.spawn(items)?);
        }
        pool.barrier = CompletionBarrier::new(workers);
        Ok(pool)
    }

    fn spawn(&mut self, items: Vec<WorkItem>) -> Result<usize, OrchestratorError> {
        let worker = self.next_worker;
        self.next_worker += 1;
        let job = Arc::clone(&self.job);
        let terminal = self.terminal;
        let owned = items.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let link = WorkerLink {
            worker,
            tx: self.tx.clone(),
            stop: Arc::clone(&stop),
        };
        let handle = thread::Builder::new()
            .name(format!("racesim-worker-{worker}"))
            .spawn(move || worker_loop(&link, &owned, job.as_ref(), terminal))
            .map_err(|err| OrchestratorError::Spawn(err.to_string()))?;
        log::debug!("worker {worker} started with {} work items", items.len());
        self.units.insert(
            worker,
            Unit {
                items,
                delivered: BTreeSet::new(),
                handle,
                stop,
                last_seen: Instant::now(),
            },
        );
        Ok(worker)
    }

    fn run(
        mut self,
        mut handle: impl FnMut(WorkerMessage) -> Result<(), OrchestratorError>,
    ) -> Result<(), OrchestratorError> {
        let poll = POLL_INTERVAL.min(self.timeout);
        while !self.barrier.is_done() {
            match self.rx.recv_timeout(poll) {
                Ok(message) => {
                    if self.dispatch(message, &mut handle)? {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if self.check_liveness(&mut handle)? {
                break;
            }
        }
        self.stop_all();
        for (_, unit) in std::mem::take(&mut self.units) {
            if unit.handle.is_finished() {
                let _ = unit.handle.join();
            }
        }
        Ok(())
    }

    fn stop_all(&self) {
        for unit in self.units.values() {
            unit.stop.store(true, Ordering::Relaxed);
        }
    }

    /// Returns `true` once the barrier fires.
    fn dispatch(
        &mut self,
        message: WorkerMessage,
        handle: &mut impl FnMut(WorkerMessage) -> Result<(), OrchestratorError>,
    ) -> Result<bool, OrchestratorError> {
        let worker = message.worker();
        let Some(unit) = self.units.get_mut(&worker) else {
            log::trace!("dropping message from abandoned worker {worker}");
            return Ok(false);
        };
        unit.last_seen = Instant::now();
        match message {
            WorkerMessage::Failed { failure, .. } => Err(OrchestratorError::Trial(failure)),
            WorkerMessage::Complete { .. } | WorkerMessage::BatchDone { .. } => {
                log::debug!("worker {worker} finished");
                Ok(self.barrier.arrive(worker))
            }
            WorkerMessage::Result { item, .. } | WorkerMessage::ActivationBatch { item, .. } => {
                unit.delivered.insert(item);
                handle(message)?;
                Ok(false)
            }
            WorkerMessage::Progress { .. } => {
                handle(message)?;
                Ok(false)
            }
        }
    }

    /// Returns `true` when draining queued messages completed the barrier.
    fn check_liveness(
        &mut self,
        handle: &mut impl FnMut(WorkerMessage) -> Result<(), OrchestratorError>,
    ) -> Result<bool, OrchestratorError> {
        let now = Instant::now();
        let mut lost = None;
        for (&worker, unit) in &self.units {
            if self.barrier.has_arrived(worker) {
                continue;
            }
            if unit.handle.is_finished() {
                lost = Some((worker, Loss::Exited));
                break;
            }
            if now.duration_since(unit.last_seen) > self.timeout {
                lost = Some((worker, Loss::Silent));
                break;
            }
        }
        let Some((worker, loss)) = lost else {
            return Ok(false);
        };
        if matches!(loss, Loss::Exited) {
            // A thread that exited cleanly has already queued its last messages.
            while let Ok(message) = self.rx.try_recv() {
                if self.dispatch(message, handle)? {
                    return Ok(true);
                }
            }
            if self.barrier.has_arrived(worker) {
                return Ok(false);
            }
        }
        self.resubmit(worker, loss)?;
        Ok(false)
    }

    fn resubmit(&mut self, worker: usize, loss: Loss) -> Result<(), OrchestratorError> {
        let Some(unit) = self.units.remove(&worker) else {
            return Ok(());
        };
        let Unit {
            items,
            delivered,
            stop,
            ..
        } = unit;
        stop.store(true, Ordering::Relaxed);
        let pending: Vec<WorkItem> = items
            .into_iter()
            .filter(|item| !delivered.contains(&item.id))
            .collect();
        let error = match loss {
            Loss::Exited => OrchestratorError::WorkerLost {
                worker,
                range: covering_span(&pending),
            },
            Loss::Silent => OrchestratorError::Timeout {
                worker,
                after: self.timeout,
            },
        };
        if self.retries == 0 {
            return Err(error);
        }
        if self.retries_used >= self.retries {
            return Err(OrchestratorError::RetriesExhausted {
                retries: self.retries,
                last: Box::new(error),
            });
        }
        self.retries_used += 1;
        let tag = format!("resubmit:{}", self.retries_used);
        let seed = derive_stream_seed(self.run_seed, tag.as_bytes());
        log::warn!("{error}; resubmitting {} work items under seed {seed}", pending.len());
        let items = pending
            .into_iter()
            .map(|item| WorkItem { seed, ..item })
            .collect();
        let replacement = self.spawn(items)?;
        self.barrier.replace(worker, replacement);
        Ok(())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn covering_span(items: &[WorkItem]) -> Range<u64> {
    let start = items.iter().map(|item| item.span().start).min().unwrap_or(0);
    let end = items.iter().map(|item| item.span().end).max().unwrap_or(start);
    start..end
}

fn worker_loop(
    link: &WorkerLink,
    items: &[WorkItem],
    job: &(dyn Fn(&WorkerLink, &WorkItem) -> Result<(), TrialFailure> + Send + Sync),
    terminal: Terminal,
) {
    let worker = link.worker;
    for item in items {
        if link.stopped() {
            log::debug!("worker {worker} stopped with work items left");
            return;
        }
        if let Err(failure) = job(link, item) {
            link.send(WorkerMessage::Failed { worker, failure });
            return;
        }
    }
    if link.stopped() {
        return;
    }
    let done = match terminal {
        Terminal::Complete => WorkerMessage::Complete { worker },
        Terminal::BatchDone => WorkerMessage::BatchDone { worker },
    };
    link.send(done);
}

fn run_trials<E: TrialExecutor + ?Sized>(
    executor: &E,
    link: &WorkerLink,
    item: &WorkItem,
) -> Result<(), TrialFailure> {
    let Task::Trials { checkpoint, range } = &item.task else {
        return Ok(());
    };
    let worker = link.worker;
    let mut aggregate = CompareAggregate::default();
    let mut completed = 0u64;
    for index in range.clone() {
        if link.stopped() {
            return Ok(());
        }
        aggregate.push(executor.run_trial(item.seed, index)?);
        completed += 1;
        if completed % HEARTBEAT_TRIALS == 0
            && !link.send(WorkerMessage::Progress { worker, completed })
        {
            return Ok(());
        }
    }
    link.send(WorkerMessage::Result {
        worker,
        item: item.id,
        checkpoint: *checkpoint,
        aggregate,
    });
    Ok(())
}

fn run_skills<E: SkillExecutor + ?Sized>(
    executor: &E,
    link: &WorkerLink,
    item: &WorkItem,
) -> Result<(), TrialFailure> {
    let Task::Skills {
        batch,
        skills,
        samples,
    } = &item.task
    else {
        return Ok(());
    };
    let mut results = Vec::with_capacity(skills.len());
    for skill_id in skills {
        if link.stopped() {
            return Ok(());
        }
        results.push(SkillSample {
            skill_id: skill_id.clone(),
            aggregate: executor.run_skill(skill_id, item.seed, *samples)?,
        });
    }
    link.send(WorkerMessage::ActivationBatch {
        worker: link.worker,
        item: item.id,
        batch: *batch,
        results,
    });
    Ok(())
}

/// Splits `range` into `parts` contiguous slices whose lengths differ by at
/// most one. Earlier slices take the remainder.
#[must_use]
pub fn split_range(range: Range<u64>, parts: usize) -> Vec<Range<u64>> {
    let parts = parts.max(1) as u64;
    let len = range.end.saturating_sub(range.start);
    let base = len / parts;
    let extra = len % parts;
    let mut start = range.start;
    (0..parts)
        .map(|part| {
            let size = base + u64::from(part < extra);
            let slice = start..start + size;
            start += size;
            slice
        })
        .collect()
}

/// Runs `samples` trials across the pool, reporting each checkpoint.
///
/// # Errors
///
/// Returns the first trial failure, a lost or silent worker once retries are
/// spent, or a configuration error.
pub fn run_comparison<E: TrialExecutor>(
    executor: Arc<E>,
    samples: u64,
    run_seed: u64,
    config: &OrchestratorConfig,
    mut on_event: impl FnMut(OrchestratorEvent),
) -> Result<CompareAggregate, OrchestratorError> {
    config.validate()?;
    let checkpoints = schedule(samples);
    let mut assignments = vec![Vec::new(); config.workers];
    let mut next_id = 0;
    let mut previous = 0;
    for (checkpoint, &end) in checkpoints.iter().enumerate() {
        for (worker, range) in split_range(previous..end, config.workers)
            .into_iter()
            .enumerate()
        {
            assignments[worker].push(WorkItem {
                id: next_id,
                seed: run_seed,
                task: Task::Trials { checkpoint, range },
            });
            next_id += 1;
        }
        previous = end;
    }
    log::info!(
        "running {samples} trials over {} workers in {} checkpoints",
        config.workers,
        checkpoints.len()
    );

    let job: Job = Arc::new(move |link: &WorkerLink, item: &WorkItem| {
        run_trials(executor.as_ref(), link, item)
    });
    let mut outstanding = vec![config.workers; checkpoints.len()];
    let mut partials = vec![CompareAggregate::default(); checkpoints.len()];
    let mut total = CompareAggregate::default();
    let mut next_emit = 0;

    let pool = Pool::start(job, Terminal::Complete, assignments, config, run_seed)?;
    pool.run(|message| {
        if let WorkerMessage::Result {
            checkpoint,
            aggregate,
            ..
        } = message
        {
            partials[checkpoint].merge(aggregate);
            outstanding[checkpoint] -= 1;
            while next_emit < checkpoints.len() && outstanding[next_emit] == 0 {
                total.merge(std::mem::take(&mut partials[next_emit]));
                log::debug!("checkpoint {} reached", checkpoints[next_emit]);
                on_event(OrchestratorEvent::Progress {
                    samples_completed: checkpoints[next_emit],
                    samples_total: samples,
                });
                next_emit += 1;
            }
        }
        Ok(())
    })?;

    on_event(OrchestratorEvent::Result {
        aggregate: total.clone(),
    });
    on_event(OrchestratorEvent::Complete);
    Ok(total)
}

/// Runs each batch of skills through the pool. `on_batch` sees every batch as
/// it lands; the returned samples follow batch order.
///
/// # Errors
///
/// Same failure modes as [`run_comparison`].
pub fn run_skill_batches<E: SkillExecutor>(
    executor: Arc<E>,
    batches: Vec<Vec<String>>,
    samples: u64,
    run_seed: u64,
    config: &OrchestratorConfig,
    mut on_batch: impl FnMut(usize, &[SkillSample]),
) -> Result<Vec<SkillSample>, OrchestratorError> {
    config.validate()?;
    let batch_count = batches.len();
    let mut assignments = vec![Vec::new(); config.workers];
    for (batch, skills) in batches.into_iter().enumerate() {
        assignments[batch % config.workers].push(WorkItem {
            id: batch,
            seed: run_seed,
            task: Task::Skills {
                batch,
                skills,
                samples,
            },
        });
    }

    let job: Job = Arc::new(move |link: &WorkerLink, item: &WorkItem| {
        run_skills(executor.as_ref(), link, item)
    });
    let mut landed: Vec<Option<Vec<SkillSample>>> = vec![None; batch_count];
    let pool = Pool::start(job, Terminal::BatchDone, assignments, config, run_seed)?;
    pool.run(|message| {
        if let WorkerMessage::ActivationBatch { batch, results, .. } = message {
            on_batch(batch, &results);
            landed[batch] = Some(results);
        }
        Ok(())
    })?;
    Ok(landed.into_iter().flatten().flatten().collect())
}

/// Async wrapper around [`run_comparison`] for callers already on a runtime.
///
/// # Errors
///
/// Same failure modes as [`run_comparison`], plus [`OrchestratorError::Join`]
/// if the blocking task panics.
#[cfg(feature = "async")]
pub async fn run_comparison_async<E: TrialExecutor>(
    executor: Arc<E>,
    samples: u64,
    run_seed: u64,
    config: OrchestratorConfig,
    events: Option<tokio::sync::mpsc::UnboundedSender<OrchestratorEvent>>,
) -> Result<CompareAggregate, OrchestratorError> {
    tokio::task::spawn_blocking(move || {
        run_comparison(executor, samples, run_seed, &config, |event| {
            if let Some(tx) = &events {
                let _ = tx.send(event);
            }
        })
    })
    .await
    .map_err(|_| OrchestratorError::Join)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_range_is_contiguous_and_even() {
        let slices = split_range(20..31, 3);
        assert_eq!(slices, vec![20..24, 24..28, 28..31]);
        let slices = split_range(0..2, 4);
        assert_eq!(slices, vec![0..1, 1..2, 2..2, 2..2]);
    }

    #[test]
    fn barrier_fires_once() {
        let mut barrier = CompletionBarrier::new([0, 1, 2]);
        assert!(!barrier.arrive(0));
        assert!(!barrier.arrive(0));
        assert!(!barrier.arrive(9));
        assert!(!barrier.arrive(1));
        assert!(barrier.arrive(2));
        assert!(!barrier.arrive(2));
        assert!(barrier.is_done());
    }

    #[test]
    fn barrier_waits_on_replacement() {
        let mut barrier = CompletionBarrier::new([0, 1]);
        assert!(!barrier.arrive(0));
        barrier.replace(1, 5);
        assert!(!barrier.arrive(1));
        assert!(barrier.arrive(5));
    }

    #[test]
    fn config_rejects_empty_pool() {
        let config = OrchestratorConfig {
            workers: 0,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ParamsConfigError::MinViolation {
                field: "workers",
                ..
            })
        ));
        let parsed: OrchestratorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, OrchestratorConfig::default());
    }

    #[test]
    fn closed_channel_stops_the_worker() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let link = WorkerLink {
            worker: 0,
            tx,
            stop: Arc::new(AtomicBool::new(false)),
        };
        assert!(link.send(WorkerMessage::Complete { worker: 0 }));
        assert!(!link.stopped());
        drop(rx);
        assert!(!link.send(WorkerMessage::Complete { worker: 0 }));
        assert!(link.stopped());
    }

    #[test]
    fn stopped_worker_sends_nothing_more() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(true));
        let link = WorkerLink {
            worker: 3,
            tx,
            stop,
        };
        let items = vec![WorkItem {
            id: 0,
            seed: 0,
            task: Task::Trials {
                checkpoint: 0,
                range: 0..10,
            },
        }];
        let job = |_: &WorkerLink, _: &WorkItem| -> Result<(), TrialFailure> {
            panic!("stopped worker ran a work item")
        };
        worker_loop(&link, &items, &job, Terminal::Complete);
        drop(link);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn covering_span_spans_pending_items() {
        let items = vec![
            WorkItem {
                id: 3,
                seed: 0,
                task: Task::Trials {
                    checkpoint: 1,
                    range: 40..60,
                },
            },
            WorkItem {
                id: 1,
                seed: 0,
                task: Task::Trials {
                    checkpoint: 0,
                    range: 10..20,
                },
            },
        ];
        assert_eq!(covering_span(&items), 10..60);
        assert_eq!(covering_span(&[]), 0..0);
    }
}
