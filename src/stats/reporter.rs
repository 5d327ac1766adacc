// src/stats/reporter.rs
use crate::types::{BestCandidate, MiningState};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::BTreeMap;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Counters describing a coordinator's message traffic
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MiningStats {
    /// Worker messages applied to the aggregate state
    pub messages_applied: u64,
    /// Messages discarded because their run token (or launch) was stale
    pub stale_dropped: u64,
    /// Run sessions created
    pub sessions_started: u64,
    /// Worker launches across all sessions (start, resume, re-scale)
    pub launches: u64,
    /// Aggregated hashes per second
    pub total_hash_rate: f64,
    /// Highest rate each worker ever reported
    pub max_worker_rates: BTreeMap<usize, f64>,
}

/// Live progress published to subscribers after every applied change
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    /// Coordinator state at publication time
    pub state: MiningState,
    /// Aggregated hashes per second
    pub total_hash_rate: f64,
    /// Best candidate reported by each worker
    pub worker_best: BTreeMap<usize, BestCandidate>,
    /// Best candidate across all workers
    pub overall_best: Option<BestCandidate>,
}

/// Logs telemetry at a fixed interval on a background thread
pub struct TelemetryReporter {
    /// Interval at which progress is logged
    report_interval: Duration,
}

impl TelemetryReporter {
    /// Creates a reporter logging every `report_interval`
    pub fn new(report_interval: Duration) -> Self {
        TelemetryReporter { report_interval }
    }

    /// Consumes `updates` until the coordinator goes away or reaches a
    /// terminal state
    ///
    /// Only the latest update of each interval is logged.
    pub fn spawn(self, updates: Receiver<Telemetry>) -> JoinHandle<()> {
        std::thread::spawn(move || {
            let mut latest: Option<Telemetry> = None;
            let mut last_log = Instant::now();

            loop {
                match updates.recv_timeout(self.report_interval) {
                    Ok(update) => {
                        let terminal = update.state.is_terminal();
                        latest = Some(update);
                        if terminal {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if last_log.elapsed() >= self.report_interval {
                    if let Some(update) = &latest {
                        log::info!("{}", format_line(update));
                    }
                    last_log = Instant::now();
                }
            }

            if let Some(update) = &latest {
                log::info!("{}", format_line(update));
            }
        })
    }
}

/// One human-readable progress line
pub fn format_line(update: &Telemetry) -> String {
    let best = match &update.overall_best {
        Some(best) => format!(
            "{} bits (nonce {}, worker {})",
            best.score, best.nonce, best.worker
        ),
        None => "-".to_string(),
    };
    format!(
        "Hashrate: {:.2} kH/s | Best: {} | Workers reporting: {} | State: {}",
        update.total_hash_rate / 1000.0,
        best,
        update.worker_best.len(),
        update.state
    )
}
