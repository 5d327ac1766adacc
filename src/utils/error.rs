// src/utils/error.rs
use crate::miner::message::WorkerEnvelope;
use serde_json;
use std::io;
use thiserror::Error;

/// Main error type for the mining coordinator
///
/// Covers request validation, worker lifecycle failures, illegal
/// state-machine transitions and the I/O around configuration and
/// snapshot persistence.
#[derive(Error, Debug)]
pub enum MinerError {
    /// The mining request is missing a required field
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The environment could not create a worker
    #[error("Worker spawn failure: {0}")]
    WorkerSpawnFailure(String),

    /// A worker crashed, the hashing capability failed, or a worker
    /// violated the message contract
    #[error("Worker runtime error (worker {worker:?}): {detail}")]
    WorkerRuntimeError {
        /// Index of the reporting worker, when known
        worker: Option<usize>,
        /// Human-readable failure detail
        detail: String,
    },

    /// The attempt was cancelled (or superseded) before it produced a result
    #[error("Mining cancelled")]
    Cancelled,

    /// The operation is not valid in the coordinator's current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the coordinator was in
        state: String,
    },

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),
}

impl MinerError {
    /// Shorthand for a runtime error attributed to a worker
    pub fn worker(worker: impl Into<Option<usize>>, detail: impl Into<String>) -> Self {
        MinerError::WorkerRuntimeError {
            worker: worker.into(),
            detail: detail.into(),
        }
    }
}

/// Converts crossbeam channel send errors for worker messages into MinerError
///
/// A failed send means the coordinator side of the channel is gone.
impl From<crossbeam_channel::SendError<WorkerEnvelope>> for MinerError {
    fn from(e: crossbeam_channel::SendError<WorkerEnvelope>) -> Self {
        MinerError::ChannelError(format!("Worker message send failed: {}", e))
    }
}

/// Converts hex decoding errors into MinerError
///
/// Hashes travel between workers and the coordinator as hex strings; a
/// hash that does not decode is a broken worker message.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::worker(None, format!("Hex conversion failed: {}", e))
    }
}

impl From<toml::de::Error> for MinerError {
    fn from(e: toml::de::Error) -> Self {
        MinerError::ConfigError(format!("Invalid config format: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_error_display_includes_index() {
        let err = MinerError::worker(3, "hasher exploded");
        assert_eq!(
            err.to_string(),
            "Worker runtime error (worker Some(3)): hasher exploded"
        );
    }

    #[test]
    fn invalid_state_reads_naturally() {
        let err = MinerError::InvalidState {
            operation: "pause",
            state: "idle".into(),
        };
        assert_eq!(err.to_string(), "Cannot pause while idle");
    }
}
