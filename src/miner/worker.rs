// src/miner/worker.rs
//! Worker implementations
//!
//! A worker searches the lanes of its [`WorkerAssignment`] and talks to the
//! coordinator only through messages: it reports on the outbox it was
//! given and listens on a private control channel for the stop signal.
//! Nothing mutable is shared with the coordinator.
//!
//! [`WorkerAssignment`]: crate::miner::partition::WorkerAssignment

use crate::miner::algorithm::{Algorithm, leading_zero_bits};
use crate::miner::message::{WorkerEnvelope, WorkerMessage, WorkerTask};
use crate::types::BestCandidate;
use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Hashes between control-channel polls and rate reports
const CONTROL_CHECK_EVERY: u64 = 1024;

/// Something that can run a [`WorkerTask`]
///
/// The coordinator depends only on this trait; how and where the hashing
/// happens is up to the implementation.
pub trait HashWorker: Send {
    /// Starts a worker for `task`, reporting on `outbox`
    fn launch(
        &self,
        task: WorkerTask,
        outbox: Sender<WorkerEnvelope>,
    ) -> Result<WorkerHandle, MinerError>;
}

/// The coordinator's handle on one live worker
#[derive(Debug)]
pub struct WorkerHandle {
    index: usize,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Wraps a stop channel and, for thread-backed workers, the thread
    pub fn new(index: usize, stop: Sender<()>, thread: Option<JoinHandle<()>>) -> Self {
        WorkerHandle {
            index,
            stop: Some(stop),
            thread,
        }
    }

    /// Worker index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Signals the worker to stop; does not wait for it
    pub fn terminate(&mut self) {
        if let Some(stop) = self.stop.take() {
            // Full or disconnected both mean the worker will stop or has.
            let _ = stop.try_send(());
        }
    }

    /// Whether [`terminate`](Self::terminate) was called
    pub fn is_terminated(&self) -> bool {
        self.stop.is_none()
    }

    /// Stops the worker and waits for its thread to exit
    pub fn join(mut self) {
        self.terminate();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Worker {} thread panicked while stopping", self.index);
            }
        }
    }
}

/// Runs each worker on its own OS thread
pub struct ThreadWorker {
    algorithm: Arc<dyn Algorithm>,
}

impl ThreadWorker {
    /// Creates a launcher hashing with `algorithm`
    pub fn new(algorithm: Arc<dyn Algorithm>) -> Self {
        ThreadWorker { algorithm }
    }
}

impl HashWorker for ThreadWorker {
    fn launch(
        &self,
        task: WorkerTask,
        outbox: Sender<WorkerEnvelope>,
    ) -> Result<WorkerHandle, MinerError> {
        let index = task.assignment.worker_index;
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let algorithm = Arc::clone(&self.algorithm);

        let thread = std::thread::Builder::new()
            .name(format!("pow-worker-{}", index))
            .spawn(move || run(algorithm, task, outbox, stop_rx))
            .map_err(|e| {
                MinerError::WorkerSpawnFailure(format!("worker {}: {}", index, e))
            })?;

        Ok(WorkerHandle::new(index, stop_tx, Some(thread)))
    }
}

fn run(
    algorithm: Arc<dyn Algorithm>,
    task: WorkerTask,
    outbox: Sender<WorkerEnvelope>,
    control: Receiver<()>,
) {
    let worker = task.assignment.worker_index;
    log::debug!(
        "Worker {} starting at {:?} (stride {}, {})",
        worker,
        task.assignment.lanes(),
        task.assignment.stride,
        algorithm.name()
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        search(algorithm.as_ref(), &task, &outbox, &control)
    }));

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(MinerError::ChannelError(_))) => {
            log::debug!("Worker {}: coordinator went away", worker);
            None
        }
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(panic_detail(payload.as_ref())),
    };

    if let Some(detail) = failure {
        log::error!("Worker {} failed: {}", worker, detail);
        let _ = outbox.send(task.envelope(WorkerMessage::Error { detail }));
    }
    log::debug!("Worker {} stopped", worker);
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}

fn search(
    algorithm: &dyn Algorithm,
    task: &WorkerTask,
    outbox: &Sender<WorkerEnvelope>,
    control: &Receiver<()>,
) -> Result<(), MinerError> {
    let worker = task.assignment.worker_index;
    outbox.send(task.envelope(WorkerMessage::Initialized))?;

    let mut cursors = task.assignment.lanes();
    let mut hashers = cursors
        .iter()
        .map(|_| algorithm.prepare(&task.note, task.difficulty))
        .collect::<Result<Vec<_>, _>>()?;

    // Announce the starting cursors so they can be persisted right away.
    outbox.send(task.envelope(WorkerMessage::Progress {
        cursors: cursors.clone(),
        rate: None,
        best: None,
    }))?;

    let stride = task.assignment.stride.max(1);
    let mut best: Option<u32> = None;
    let mut lane = 0;
    let mut hashes: u64 = 0;
    let mut since_report: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        let nonce = cursors[lane];
        let digest = hashers[lane].hash(nonce)?;
        let score = leading_zero_bits(&digest);
        cursors[lane] = nonce.wrapping_add(stride);
        lane = (lane + 1) % cursors.len();
        hashes += 1;
        since_report += 1;

        if score >= task.difficulty {
            log::debug!("Worker {} found nonce {} ({} bits)", worker, nonce, score);
            outbox.send(task.envelope(WorkerMessage::Result {
                nonce,
                hash: hex::encode(digest),
            }))?;
            return Ok(());
        }

        if best.is_none_or(|b| score > b) {
            best = Some(score);
            outbox.send(task.envelope(WorkerMessage::Progress {
                cursors: cursors.clone(),
                rate: None,
                best: Some(BestCandidate {
                    score,
                    nonce,
                    hash: hex::encode(digest),
                    worker,
                }),
            }))?;
        }

        if hashes % CONTROL_CHECK_EVERY == 0 {
            match control.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Disconnected) => return Ok(()),
            }

            let elapsed = last_report.elapsed();
            if elapsed >= task.progress_interval {
                let rate = since_report as f64 / elapsed.as_secs_f64();
                outbox.send(task.envelope(WorkerMessage::Progress {
                    cursors: cursors.clone(),
                    rate: Some(rate),
                    best: None,
                }))?;
                since_report = 0;
                last_report = Instant::now();
            }
        }
    }
}

/// A task handed to an external executor by [`ChannelWorker`]
#[derive(Debug)]
pub struct DispatchedTask {
    /// What to search
    pub task: WorkerTask,
    /// Where to report
    pub outbox: Sender<WorkerEnvelope>,
    /// Receives the stop signal, or disconnects, when the coordinator
    /// terminates the worker
    pub stop: Receiver<()>,
}

impl DispatchedTask {
    /// Sends `message` in this task's envelope
    pub fn report(&self, message: WorkerMessage) -> Result<(), MinerError> {
        self.outbox.send(self.task.envelope(message))?;
        Ok(())
    }

    /// Whether the coordinator asked this worker to stop
    pub fn is_stopped(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }
}

/// Hands tasks to an external executor over a channel instead of hashing
///
/// Useful when the hashing happens elsewhere (another process, a GPU
/// driver) and results come back through the outbox or
/// `MiningCoordinator::ingest_json`.
pub struct ChannelWorker {
    tasks: Sender<DispatchedTask>,
}

impl ChannelWorker {
    /// Creates the launcher and the receiving end for the executor
    pub fn new() -> (Self, Receiver<DispatchedTask>) {
        let (tasks, rx) = crossbeam_channel::unbounded();
        (ChannelWorker { tasks }, rx)
    }
}

impl HashWorker for ChannelWorker {
    fn launch(
        &self,
        task: WorkerTask,
        outbox: Sender<WorkerEnvelope>,
    ) -> Result<WorkerHandle, MinerError> {
        let index = task.assignment.worker_index;
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        self.tasks
            .send(DispatchedTask {
                task,
                outbox,
                stop: stop_rx,
            })
            .map_err(|_| {
                MinerError::WorkerSpawnFailure(format!("worker {}: executor is gone", index))
            })?;
        Ok(WorkerHandle::new(index, stop_tx, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::NonceHasher;
    use crate::miner::algorithm::nip13::Nip13;
    use crate::miner::partition::NonceSpacePartitioner;
    use crate::miner::session::SessionGate;
    use crate::types::UnsignedNote;
    use std::time::Duration;

    fn task(difficulty: u32, workers: usize, index: usize) -> WorkerTask {
        let assignment = NonceSpacePartitioner::default().partition(workers)[index].clone();
        WorkerTask {
            token: SessionGate::new().start_session().token,
            launch: 0,
            assignment,
            difficulty,
            note: Arc::new(UnsignedNote {
                pubkey: "ab".into(),
                created_at: 1_700_000_000,
                kind: 1,
                tags: vec![],
                content: "worker test".into(),
            }),
            progress_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn difficulty_zero_succeeds_on_first_nonce() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = ThreadWorker::new(Arc::new(Nip13)).launch(task(0, 3, 2), tx).unwrap();
        handle.join();

        let messages: Vec<_> = rx.try_iter().map(|e| e.message).collect();
        assert_eq!(messages[0], WorkerMessage::Initialized);
        match messages.last().unwrap() {
            WorkerMessage::Result { nonce, .. } => assert_eq!(*nonce, 2),
            other => panic!("expected result, got {:?}", other),
        }
    }

    #[test]
    fn stop_signal_ends_search() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut handle = ThreadWorker::new(Arc::new(Nip13)).launch(task(256, 1, 0), tx).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        handle.terminate();
        handle.join();

        let cursors: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e.message {
                WorkerMessage::Progress { cursors, .. } => Some(cursors[0]),
                _ => None,
            })
            .collect();
        assert_eq!(cursors[0], 0);
        assert!(cursors.windows(2).all(|w| w[0] <= w[1]));
    }

    struct Exploding;

    impl NonceHasher for Exploding {
        fn hash(&mut self, _nonce: u64) -> Result<[u8; 32], MinerError> {
            Err(MinerError::worker(None, "hardware fault"))
        }
    }

    impl Algorithm for Exploding {
        fn prepare(&self, _: &UnsignedNote, _: u32) -> Result<Box<dyn NonceHasher>, MinerError> {
            Ok(Box::new(Exploding))
        }

        fn name(&self) -> &'static str {
            "exploding"
        }
    }

    #[test]
    fn hashing_errors_are_reported() {
        let (tx, rx) = crossbeam_channel::unbounded();
        ThreadWorker::new(Arc::new(Exploding))
            .launch(task(10, 1, 0), tx)
            .unwrap()
            .join();
        let last = rx.try_iter().last().unwrap();
        assert!(matches!(last.message, WorkerMessage::Error { ref detail } if detail.contains("hardware fault")));
    }

    #[test]
    fn channel_worker_dispatches_and_signals_stop() {
        let (launcher, tasks) = ChannelWorker::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut handle = launcher.launch(task(5, 2, 1), tx).unwrap();

        let dispatched = tasks.try_recv().unwrap();
        assert_eq!(dispatched.task.assignment.start_nonce, 1);
        assert!(!dispatched.is_stopped());

        dispatched.report(WorkerMessage::Initialized).unwrap();
        assert_eq!(rx.try_recv().unwrap().worker, 1);

        handle.terminate();
        assert!(dispatched.is_stopped());
    }
}
