// src/miner/coordinator.rs
//! Mining coordinator
//!
//! Owns the state machine of one mining attempt at a time:
//!
//! ```text
//! idle ──start──▶ mining ──pause──▶ paused ──resume──▶ mining
//!                   │                  │
//!                   ├──▶ succeeded     ├──▶ succeeded (late result)
//!                   ├──▶ failed        └──cancel──▶ cancelled
//!                   └──cancel──▶ cancelled
//! ```
//!
//! The coordinator is single-threaded. Workers report over a channel and
//! the caller drives processing with [`MiningCoordinator::pump`],
//! [`MiningCoordinator::drain`] or [`MiningCoordinator::wait`]; every
//! state change happens inside those calls. Each message passes the
//! [`SessionGate`] before it touches any state.

use crate::miner::algorithm::nip13::Nip13;
use crate::miner::algorithm::score_hex;
use crate::miner::message::{WorkerEnvelope, WorkerMessage, WorkerTask};
use crate::miner::partition::{NonceSpacePartitioner, RedistributionPolicy, WorkerAssignment};
use crate::miner::session::{RunSession, RunToken, SessionGate};
use crate::miner::tracker::BestResultTracker;
use crate::miner::worker::{HashWorker, ThreadWorker, WorkerHandle};
use crate::snapshot::{MiningSnapshot, unix_now};
use crate::stats::aggregator::{DEFAULT_REFRESH, DEFAULT_WINDOW, HashRateAggregator};
use crate::stats::reporter::{MiningStats, Telemetry};
use crate::types::{BestCandidate, MinedResult, MiningRequest, MiningState, UnsignedNote};
use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Longest single blocking receive inside [`MiningCoordinator::wait`]
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Telemetry updates buffered per subscriber; newer updates are skipped
/// while a subscriber's buffer is full
const SUBSCRIBER_BUFFER: usize = 256;

/// Per-instance coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Tags prepended to every request's tags
    pub default_tags: Vec<Vec<String>>,
    /// How often workers report rate and cursors
    pub progress_interval: Duration,
    /// Delay between consecutive worker launches
    pub spawn_stagger: Duration,
    /// What to do with saved cursors when the worker count changes
    pub redistribution: RedistributionPolicy,
    /// Rate samples kept per worker
    pub hash_rate_window: usize,
    /// Minimum time between total-rate recomputations
    pub hash_rate_refresh: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings {
            default_tags: vec![vec!["miner".into(), "nostr-pow".into()]],
            progress_interval: Duration::from_millis(250),
            spawn_stagger: Duration::ZERO,
            redistribution: RedistributionPolicy::default(),
            hash_rate_window: DEFAULT_WINDOW,
            hash_rate_refresh: DEFAULT_REFRESH,
        }
    }
}

/// Completion of a mining attempt
///
/// Resolves with the result on success and with an error on failure,
/// cancellation or supersession. It only makes progress while the owning
/// coordinator is being pumped.
#[derive(Debug)]
pub struct MiningFuture {
    rx: oneshot::Receiver<Result<MinedResult, MinerError>>,
}

impl MiningFuture {
    /// Takes the outcome if it is already known
    ///
    /// Returns `None` while the attempt is still running. The outcome is
    /// handed out once.
    pub fn try_result(&mut self) -> Option<Result<MinedResult, MinerError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(MinerError::Cancelled)),
        }
    }
}

impl Future for MiningFuture {
    type Output = Result<MinedResult, MinerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(MinerError::Cancelled)))
    }
}

/// How the last attempt ended
#[derive(Debug, Clone)]
enum Outcome {
    Succeeded(MinedResult),
    Failed { worker: Option<usize>, detail: String },
    SpawnFailed(String),
    Cancelled,
}

impl Outcome {
    fn to_result(&self) -> Result<MinedResult, MinerError> {
        match self {
            Outcome::Succeeded(result) => Ok(result.clone()),
            Outcome::Failed { worker, detail } => Err(MinerError::WorkerRuntimeError {
                worker: *worker,
                detail: detail.clone(),
            }),
            Outcome::SpawnFailed(detail) => Err(MinerError::WorkerSpawnFailure(detail.clone())),
            Outcome::Cancelled => Err(MinerError::Cancelled),
        }
    }
}

#[derive(Debug, Clone)]
struct Lane {
    start: u64,
    cursor: u64,
    /// Seeded from saved progress, or moved since launch
    meaningful: bool,
}

#[derive(Debug, Clone)]
struct WorkerProgress {
    lanes: Vec<Lane>,
}

impl WorkerProgress {
    fn assigned(assignment: &WorkerAssignment) -> Self {
        let lanes = assignment
            .lanes()
            .into_iter()
            .enumerate()
            .map(|(i, start)| Lane {
                start,
                cursor: start,
                meaningful: i > 0 || assignment.resumed,
            })
            .collect();
        WorkerProgress { lanes }
    }

    fn continued(&self) -> Self {
        let lanes = self
            .lanes
            .iter()
            .map(|lane| Lane {
                start: lane.cursor,
                cursor: lane.cursor,
                meaningful: lane.meaningful,
            })
            .collect();
        WorkerProgress { lanes }
    }

    fn update(&mut self, cursors: &[u64]) {
        for (lane, &cursor) in self.lanes.iter_mut().zip(cursors) {
            if cursor != lane.start {
                lane.meaningful = true;
            }
            lane.cursor = cursor;
        }
    }

    fn cursors(&self) -> Vec<u64> {
        self.lanes.iter().map(|lane| lane.cursor).collect()
    }
}

struct ActiveRun {
    session: RunSession,
    launch: u32,
    note: Arc<UnsignedNote>,
    difficulty: u32,
    assignments: Vec<WorkerAssignment>,
    progress: Vec<WorkerProgress>,
    worker_best: BTreeMap<usize, BestCandidate>,
    handles: Vec<WorkerHandle>,
    started: Instant,
}

impl ActiveRun {
    fn worker_count(&self) -> usize {
        self.assignments.len()
    }

    fn has_progress(&self) -> bool {
        self.progress
            .iter()
            .any(|p| p.lanes.iter().any(|lane| lane.meaningful))
    }

    fn flattened_cursors(&self) -> Vec<u64> {
        self.progress.iter().flat_map(WorkerProgress::cursors).collect()
    }

    fn assign(&mut self, assignments: Vec<WorkerAssignment>, progress: Vec<WorkerProgress>) {
        self.assignments = assignments;
        self.progress = progress;
    }

    fn terminate(&mut self) {
        for handle in &mut self.handles {
            handle.terminate();
        }
        self.handles.clear();
    }
}

/// Coordinates a pool of workers searching for a proof-of-work nonce
pub struct MiningCoordinator {
    settings: CoordinatorSettings,
    launcher: Box<dyn HashWorker>,
    partitioner: NonceSpacePartitioner,
    gate: SessionGate,
    state: MiningState,
    run: Option<ActiveRun>,
    tracker: BestResultTracker,
    aggregator: HashRateAggregator,
    inbox: Receiver<WorkerEnvelope>,
    outbox: Sender<WorkerEnvelope>,
    waiters: Vec<oneshot::Sender<Result<MinedResult, MinerError>>>,
    outcome: Option<Outcome>,
    subscribers: Vec<Sender<Telemetry>>,
    stats: MiningStats,
    worker_override: Option<usize>,
}

impl MiningCoordinator {
    /// Creates an idle coordinator launching workers through `launcher`
    pub fn new(settings: CoordinatorSettings, launcher: Box<dyn HashWorker>) -> Self {
        let (outbox, inbox) = crossbeam_channel::unbounded();
        MiningCoordinator {
            partitioner: NonceSpacePartitioner::new(settings.redistribution),
            aggregator: HashRateAggregator::new(
                settings.hash_rate_window,
                settings.hash_rate_refresh,
            ),
            settings,
            launcher,
            gate: SessionGate::new(),
            state: MiningState::Idle,
            run: None,
            tracker: BestResultTracker::new(),
            inbox,
            outbox,
            waiters: Vec::new(),
            outcome: None,
            subscribers: Vec::new(),
            stats: MiningStats::default(),
            worker_override: None,
        }
    }

    /// Creates a coordinator running NIP-13 workers on OS threads
    pub fn with_threads(settings: CoordinatorSettings) -> Self {
        Self::new(settings, Box::new(ThreadWorker::new(Arc::new(Nip13))))
    }

    /// Current state
    pub fn state(&self) -> MiningState {
        self.state
    }

    /// Best candidate of the current attempt
    pub fn best(&self) -> Option<&BestCandidate> {
        self.tracker.current()
    }

    /// Token of the live session, if any
    pub fn live_token(&self) -> Option<RunToken> {
        self.gate.live()
    }

    /// Result of the last successful attempt
    pub fn result(&self) -> Option<&MinedResult> {
        match &self.outcome {
            Some(Outcome::Succeeded(result)) => Some(result),
            _ => None,
        }
    }

    /// Number of workers of the current attempt
    pub fn worker_count(&self) -> Option<usize> {
        self.run.as_ref().map(ActiveRun::worker_count)
    }

    /// Message counters and current rates
    pub fn stats(&mut self) -> MiningStats {
        let mut stats = self.stats.clone();
        stats.total_hash_rate = self.aggregator.total_rate();
        stats.max_worker_rates = self.aggregator.max_rates().clone();
        stats
    }

    /// Registers a telemetry subscriber
    ///
    /// Dropping the receiver unsubscribes. A subscriber that falls behind
    /// misses updates until it catches up.
    pub fn subscribe(&mut self) -> Receiver<Telemetry> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_BUFFER);
        self.subscribers.push(tx);
        rx
    }

    /// Starts mining `request`
    ///
    /// Valid from idle or any terminal state.
    pub fn start(&mut self, request: MiningRequest) -> Result<MiningFuture, MinerError> {
        if !(self.state == MiningState::Idle || self.state.is_terminal()) {
            return Err(self.invalid("start"));
        }
        request.validate()?;

        let note = UnsignedNote {
            pubkey: request.pubkey,
            created_at: request.created_at.unwrap_or_else(unix_now),
            kind: request.kind,
            tags: merge_tags(&self.settings.default_tags, request.tags),
            content: request.content,
        };
        let workers = request.worker_count.max(1);
        let assignments = self.partitioner.partition(workers);

        self.worker_override = None;
        self.tracker = BestResultTracker::new();
        let future = self.register_waiter();
        log::info!(
            "Starting to mine at difficulty {} with {} workers",
            request.difficulty,
            workers
        );
        self.begin_run(note, request.difficulty, assignments, BTreeMap::new())?;
        Ok(future)
    }

    /// Stops the workers and returns a snapshot of the attempt
    ///
    /// The session stays live, so a later [`resume`](Self::resume)
    /// without a snapshot continues the same attempt.
    pub fn pause(&mut self) -> Result<MiningSnapshot, MinerError> {
        if self.state != MiningState::Mining {
            return Err(self.invalid("pause"));
        }
        if let Some(run) = self.run.as_mut() {
            run.terminate();
        }
        self.state = MiningState::Paused;
        let snapshot = self.snapshot()?;
        log::info!(
            "Mining paused ({} cursors saved, best {:?} bits)",
            snapshot.worker_nonces.len(),
            snapshot.best.as_ref().map(|b| b.score)
        );
        self.publish();
        Ok(snapshot)
    }

    /// Resumes mining
    ///
    /// Without a snapshot the paused attempt continues in place under the
    /// same session. With a snapshot a new session starts from the saved
    /// cursors and best candidate; any paused attempt is superseded and its
    /// futures resolve with [`MinerError::Cancelled`].
    pub fn resume(&mut self, snapshot: Option<MiningSnapshot>) -> Result<MiningFuture, MinerError> {
        match snapshot {
            None => self.resume_in_place(),
            Some(snapshot) => self.resume_from(snapshot),
        }
    }

    fn resume_in_place(&mut self) -> Result<MiningFuture, MinerError> {
        if self.state != MiningState::Paused {
            return Err(self.invalid("resume"));
        }
        let workers = match (self.worker_override.take(), self.run.as_ref()) {
            (Some(workers), _) => workers,
            (None, Some(run)) => run.worker_count(),
            (None, None) => return Err(self.invalid("resume")),
        };

        let future = self.register_waiter();
        log::info!("Resuming paused attempt with {} workers", workers);
        if let Some(run) = self.run.as_mut() {
            run.started = Instant::now();
        }
        self.relaunch(workers)?;
        self.state = MiningState::Mining;
        self.publish();
        Ok(future)
    }

    fn resume_from(&mut self, snapshot: MiningSnapshot) -> Result<MiningFuture, MinerError> {
        if self.state == MiningState::Mining {
            return Err(self.invalid("resume"));
        }
        snapshot.request().validate()?;
        if let Some(best) = &snapshot.best {
            check_score(best)
                .map_err(|detail| MinerError::InvalidRequest(format!("snapshot {}", detail)))?;
        }

        if self.state == MiningState::Paused {
            log::info!("Snapshot resume supersedes the paused attempt");
            if let Some(run) = self.run.as_mut() {
                run.terminate();
            }
            self.settle_waiters(&Outcome::Cancelled);
        }

        let workers = self
            .worker_override
            .take()
            .unwrap_or(snapshot.worker_count)
            .max(1);
        let assignments = self.partitioner.resume(workers, &snapshot.worker_nonces);

        self.tracker = BestResultTracker::seeded(snapshot.best.clone());
        let future = self.register_waiter();
        log::info!(
            "Resuming from snapshot: {} saved cursors onto {} workers ({:?})",
            snapshot.worker_nonces.len(),
            workers,
            self.partitioner.policy()
        );
        let note = snapshot.note();
        let mut worker_best = snapshot.worker_best;
        worker_best.retain(|_, candidate| check_score(candidate).is_ok());
        self.begin_run(note, snapshot.difficulty, assignments, worker_best)?;
        Ok(future)
    }

    /// Stops mining for good
    ///
    /// Idempotent; does nothing unless mining or paused.
    pub fn cancel(&mut self) {
        if !matches!(self.state, MiningState::Mining | MiningState::Paused) {
            return;
        }
        log::info!("Mining cancelled");
        self.finish(MiningState::Cancelled, Outcome::Cancelled);
    }

    /// Changes the worker count
    ///
    /// While mining the workers are relaunched in place; while paused the
    /// next in-place resume uses `workers`; otherwise it applies to the
    /// next snapshot resume.
    pub fn set_worker_count(&mut self, workers: usize) -> Result<(), MinerError> {
        let workers = workers.max(1);
        match self.state {
            MiningState::Mining => {
                if self.worker_count() == Some(workers) {
                    return Ok(());
                }
                log::info!("Rescaling to {} workers", workers);
                self.relaunch(workers)
            }
            _ => {
                self.worker_override = Some(workers);
                Ok(())
            }
        }
    }

    /// Captures the current attempt's progress
    ///
    /// `worker_nonces` is left empty until some lane holds real progress.
    pub fn snapshot(&self) -> Result<MiningSnapshot, MinerError> {
        let run = self.run.as_ref().ok_or_else(|| self.invalid("snapshot"))?;
        let worker_nonces = if run.has_progress() {
            run.flattened_cursors()
        } else {
            Vec::new()
        };
        Ok(MiningSnapshot {
            pubkey: run.note.pubkey.clone(),
            content: run.note.content.clone(),
            kind: run.note.kind,
            tags: run.note.tags.clone(),
            created_at: run.note.created_at,
            difficulty: run.difficulty,
            worker_count: run.worker_count(),
            worker_nonces,
            best: self.tracker.current().cloned(),
            worker_best: run.worker_best.clone(),
            saved_at: unix_now(),
        })
    }

    /// Processes messages, blocking up to `timeout` for the first one
    ///
    /// Returns the number of messages taken off the channel.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        match self.inbox.recv_timeout(timeout) {
            Ok(envelope) => {
                self.ingest(envelope);
                1 + self.drain()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Processes every message already queued
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(envelope) = self.inbox.try_recv() {
            self.ingest(envelope);
            processed += 1;
        }
        processed
    }

    /// Pumps until the attempt ends or `deadline` passes
    ///
    /// Returns `Ok(None)` at the deadline, or right away when nothing is
    /// mining.
    pub fn wait(&mut self, deadline: Instant) -> Result<Option<MinedResult>, MinerError> {
        loop {
            if let Some(outcome) = self.outcome.as_ref().filter(|_| self.state.is_terminal()) {
                return outcome.to_result().map(Some);
            }
            if self.state != MiningState::Mining {
                return Ok(None);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.pump((deadline - now).min(WAIT_SLICE));
        }
    }

    /// Applies one worker message
    ///
    /// Returns `false` when the gate dropped it.
    pub fn ingest(&mut self, envelope: WorkerEnvelope) -> bool {
        if !self.gate.is_live(envelope.token.as_ref()) {
            self.drop_stale(&envelope);
            return false;
        }
        let Some(run) = self.run.as_ref() else {
            self.drop_stale(&envelope);
            return false;
        };
        let current = envelope.launch == run.launch;
        let worker = envelope.worker;
        if current && worker >= run.worker_count() {
            self.fail(Some(worker), format!("message from unknown worker {}", worker));
            return true;
        }

        match envelope.message {
            WorkerMessage::Initialized => {
                if !current {
                    self.drop_stale_launch(worker, "initialized");
                    return false;
                }
                log::debug!("Worker {} initialized", worker);
            }
            WorkerMessage::Progress { cursors, rate, best } => {
                // The envelope's worker index wins over the candidate's own.
                if let Some(candidate) = best.map(|c| BestCandidate { worker, ..c }) {
                    match check_score(&candidate) {
                        Ok(()) => self.observe(candidate),
                        Err(detail) if current => {
                            self.stats.messages_applied += 1;
                            self.fail(Some(worker), detail);
                            return true;
                        }
                        Err(detail) => {
                            log::warn!("Ignoring best from replaced worker {}: {}", worker, detail);
                        }
                    }
                }
                if !current {
                    self.drop_stale_launch(worker, "progress");
                    return false;
                }
                if let Some(run) = self.run.as_mut() {
                    run.progress[worker].update(&cursors);
                }
                self.aggregator.record_sample(worker, rate);
                self.publish();
            }
            WorkerMessage::Result { nonce, hash } => {
                self.stats.messages_applied += 1;
                self.complete(worker, nonce, hash);
                return true;
            }
            WorkerMessage::Error { detail } => {
                if !current {
                    log::warn!("Ignoring error from replaced worker {}: {}", worker, detail);
                    self.drop_stale_launch(worker, "error");
                    return false;
                }
                self.stats.messages_applied += 1;
                self.fail(Some(worker), detail);
                return true;
            }
        }
        self.stats.messages_applied += 1;
        true
    }

    /// Applies one worker message in its JSON form
    ///
    /// The token is checked before the body is parsed: a malformed message
    /// or unknown kind carrying the live token fails the attempt, anything
    /// else unrecognizable is dropped as stale.
    pub fn ingest_json(&mut self, text: &str) -> Result<bool, MinerError> {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            log::debug!("Dropping unparseable worker message");
            self.stats.stale_dropped += 1;
            return Ok(false);
        };
        let token = value
            .get("token")
            .cloned()
            .and_then(|t| serde_json::from_value::<RunToken>(t).ok());
        if !self.gate.is_live(token.as_ref()) {
            log::debug!("Dropping worker message without a live token");
            self.stats.stale_dropped += 1;
            return Ok(false);
        }

        let worker = value
            .get("worker")
            .and_then(serde_json::Value::as_u64)
            .map(|w| w as usize);
        match serde_json::from_value::<WorkerEnvelope>(value) {
            Ok(envelope) => Ok(self.ingest(envelope)),
            Err(e) => {
                let detail = format!("malformed worker message: {}", e);
                self.fail(worker, detail.clone());
                Err(MinerError::worker(worker, detail))
            }
        }
    }

    fn invalid(&self, operation: &'static str) -> MinerError {
        MinerError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn register_waiter(&mut self) -> MiningFuture {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        MiningFuture { rx }
    }

    fn settle_waiters(&mut self, outcome: &Outcome) {
        for waiter in self.waiters.drain(..) {
            // A dropped future just means nobody is listening.
            let _ = waiter.send(outcome.to_result());
        }
    }

    fn begin_run(
        &mut self,
        note: UnsignedNote,
        difficulty: u32,
        assignments: Vec<WorkerAssignment>,
        mut worker_best: BTreeMap<usize, BestCandidate>,
    ) -> Result<(), MinerError> {
        let session = self.gate.start_session();
        self.stats.sessions_started += 1;
        self.aggregator.reset();
        self.outcome = None;

        let workers = assignments.len();
        worker_best.retain(|&w, _| w < workers);
        let progress = assignments.iter().map(WorkerProgress::assigned).collect();
        log::debug!("Session {} covers {} workers", session.token, workers);

        self.run = Some(ActiveRun {
            session,
            launch: 0,
            note: Arc::new(note),
            difficulty,
            assignments,
            progress,
            worker_best,
            handles: Vec::new(),
            started: Instant::now(),
        });
        self.state = MiningState::Mining;

        // A seeded best that already qualifies needs no workers.
        if let Some(best) = self.tracker.current().filter(|b| b.score >= difficulty).cloned() {
            log::info!("Saved best candidate already meets difficulty {}", difficulty);
            self.complete(best.worker, best.nonce, best.hash);
            return Ok(());
        }

        self.spawn_workers()?;
        self.publish();
        Ok(())
    }

    fn relaunch(&mut self, workers: usize) -> Result<(), MinerError> {
        let Some(run) = self.run.as_mut() else {
            return Err(MinerError::InvalidState {
                operation: "relaunch",
                state: self.state.to_string(),
            });
        };
        run.terminate();

        let (assignments, progress) = next_launch(&self.partitioner, run, workers);

        run.launch += 1;
        run.assign(assignments, progress);
        run.worker_best.retain(|&w, _| w < workers);
        self.aggregator.retain_workers(workers);
        log::debug!("Launch {} of session {}", run.launch, run.session.token);

        self.spawn_workers()
    }

    fn spawn_workers(&mut self) -> Result<(), MinerError> {
        if let Err(e) = self.launch_all() {
            log::error!("Failed to launch workers: {}", e);
            let detail = match &e {
                MinerError::WorkerSpawnFailure(detail) => detail.clone(),
                other => other.to_string(),
            };
            self.finish(MiningState::Failed, Outcome::SpawnFailed(detail.clone()));
            return Err(MinerError::WorkerSpawnFailure(detail));
        }
        self.stats.launches += 1;
        Ok(())
    }

    fn launch_all(&mut self) -> Result<(), MinerError> {
        let Some(run) = self.run.as_mut() else {
            return Ok(());
        };
        for (i, assignment) in run.assignments.iter().enumerate() {
            if i > 0 && !self.settings.spawn_stagger.is_zero() {
                std::thread::sleep(self.settings.spawn_stagger);
            }
            let task = WorkerTask {
                token: run.session.token,
                launch: run.launch,
                assignment: assignment.clone(),
                difficulty: run.difficulty,
                note: Arc::clone(&run.note),
                progress_interval: self.settings.progress_interval,
            };
            let handle = self.launcher.launch(task, self.outbox.clone())?;
            run.handles.push(handle);
        }
        Ok(())
    }

    fn observe(&mut self, candidate: BestCandidate) {
        if let Some(run) = self.run.as_mut() {
            let better = run
                .worker_best
                .get(&candidate.worker)
                .is_none_or(|best| candidate.score > best.score);
            if better {
                run.worker_best.insert(candidate.worker, candidate.clone());
            }
        }
        if self.tracker.observe(candidate) {
            if let Some(best) = self.tracker.current() {
                log::debug!(
                    "New best: {} bits at nonce {} (worker {})",
                    best.score,
                    best.nonce,
                    best.worker
                );
            }
        }
    }

    fn complete(&mut self, worker: usize, nonce: u64, hash: String) {
        let Some(difficulty) = self.run.as_ref().map(|run| run.difficulty) else {
            return;
        };
        let score = match score_hex(&hash) {
            Ok(score) => score,
            Err(e) => {
                self.fail(Some(worker), format!("unreadable result hash: {}", e));
                return;
            }
        };
        if score < difficulty {
            self.fail(
                Some(worker),
                format!(
                    "result at nonce {} has {} bits, below difficulty {}",
                    nonce, score, difficulty
                ),
            );
            return;
        }

        self.observe(BestCandidate {
            score,
            nonce,
            hash: hash.clone(),
            worker,
        });
        let hash_rate = self.aggregator.total_rate();
        let Some(run) = self.run.as_ref() else {
            return;
        };
        let result = MinedResult {
            note: run.note.stamp(nonce, difficulty, hash.clone()),
            nonce,
            hash,
            score,
            worker,
            elapsed_secs: run.started.elapsed().as_secs_f64(),
            hash_rate,
        };
        log::info!(
            "Worker {} found nonce {} with {} bits in {:.2}s",
            worker,
            nonce,
            score,
            result.elapsed_secs
        );
        self.finish(MiningState::Succeeded, Outcome::Succeeded(result));
    }

    fn fail(&mut self, worker: Option<usize>, detail: String) {
        log::error!("Mining failed (worker {:?}): {}", worker, detail);
        self.finish(MiningState::Failed, Outcome::Failed { worker, detail });
    }

    /// Enters a terminal state
    ///
    /// The token is invalidated before any worker is told to stop.
    fn finish(&mut self, state: MiningState, outcome: Outcome) {
        self.gate.invalidate();
        if let Some(run) = self.run.as_mut() {
            run.terminate();
        }
        self.state = state;
        self.settle_waiters(&outcome);
        self.outcome = Some(outcome);
        self.publish();
    }

    fn drop_stale(&mut self, envelope: &WorkerEnvelope) {
        log::debug!(
            "Dropping stale {} from worker {}",
            envelope.message.kind(),
            envelope.worker
        );
        self.stats.stale_dropped += 1;
    }

    fn drop_stale_launch(&mut self, worker: usize, kind: &str) {
        log::debug!("Dropping {} from a replaced launch of worker {}", kind, worker);
        self.stats.stale_dropped += 1;
    }

    fn publish(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let telemetry = Telemetry {
            state: self.state,
            total_hash_rate: self.aggregator.total_rate(),
            worker_best: self
                .run
                .as_ref()
                .map(|run| run.worker_best.clone())
                .unwrap_or_default(),
            overall_best: self.tracker.current().cloned(),
        };
        self.subscribers
            .retain(|subscriber| match subscriber.try_send(telemetry.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}

impl Drop for MiningCoordinator {
    fn drop(&mut self) {
        self.gate.invalidate();
        if let Some(run) = self.run.as_mut() {
            run.terminate();
        }
    }
}

/// Assignments continuing `run` on `workers` workers
///
/// An unchanged count keeps every lane and its progress flags; a changed
/// count redistributes the cursors, or starts fresh if none moved.
fn next_launch(
    partitioner: &NonceSpacePartitioner,
    run: &ActiveRun,
    workers: usize,
) -> (Vec<WorkerAssignment>, Vec<WorkerProgress>) {
    if workers == run.worker_count() {
        let assignments = run
            .assignments
            .iter()
            .zip(&run.progress)
            .map(|(a, p)| a.continued(&p.cursors()))
            .collect();
        let progress = run.progress.iter().map(WorkerProgress::continued).collect();
        return (assignments, progress);
    }

    let assignments = if run.has_progress() {
        partitioner.resume(workers, &run.flattened_cursors())
    } else {
        partitioner.partition(workers)
    };
    let progress = assignments.iter().map(WorkerProgress::assigned).collect();
    (assignments, progress)
}

/// Checks that a reported candidate's score is the one its hash carries
fn check_score(candidate: &BestCandidate) -> Result<(), String> {
    let score = score_hex(&candidate.hash)
        .map_err(|e| format!("best candidate hash is unreadable: {}", e))?;
    if score != candidate.score {
        return Err(format!(
            "best candidate at nonce {} claims {} bits but its hash has {}",
            candidate.nonce, candidate.score, score
        ));
    }
    Ok(())
}

/// Default tags followed by the caller's, without exact duplicates
fn merge_tags(defaults: &[Vec<String>], tags: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut merged: Vec<Vec<String>> = Vec::with_capacity(defaults.len() + tags.len());
    for tag in defaults.iter().cloned().chain(tags) {
        if !merged.contains(&tag) {
            merged.push(tag);
        }
    }
    merged
}
