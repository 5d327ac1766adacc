// src/miner/message.rs
//! Worker ↔ coordinator message contract
//!
//! Outbound, a worker receives a [`WorkerTask`]. Inbound, every message is
//! a [`WorkerEnvelope`]: the run token and launch generation it was
//! produced under, the worker index, and a [`WorkerMessage`] body. The JSON
//! shape is flat, e.g.
//! `{"token":"…","launch":0,"worker":1,"kind":"progress","cursors":[7],"rate":1200.0}`.

use crate::miner::partition::WorkerAssignment;
use crate::miner::session::RunToken;
use crate::types::{BestCandidate, UnsignedNote};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Everything a worker needs to search its subspace
#[derive(Debug, Clone)]
pub struct WorkerTask {
    /// Session the worker belongs to
    pub token: RunToken,
    /// Launch generation within the session
    pub launch: u32,
    /// The worker's slice of the nonce space
    pub assignment: WorkerAssignment,
    /// Required leading zero bits
    pub difficulty: u32,
    /// Canonical message to stamp
    pub note: Arc<UnsignedNote>,
    /// How often to report hash rate and cursors
    pub progress_interval: Duration,
}

impl WorkerTask {
    /// Wraps a message body in this task's envelope
    pub fn envelope(&self, message: WorkerMessage) -> WorkerEnvelope {
        WorkerEnvelope {
            token: Some(self.token),
            launch: self.launch,
            worker: self.assignment.worker_index,
            message,
        }
    }
}

/// A message from a worker, as received by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEnvelope {
    /// Run token; messages without one are dropped
    #[serde(default)]
    pub token: Option<RunToken>,
    /// Launch generation within the session
    #[serde(default)]
    pub launch: u32,
    /// Reporting worker
    pub worker: usize,
    /// Message body
    #[serde(flatten)]
    pub message: WorkerMessage,
}

/// Body of a worker message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The worker is up
    Initialized,
    /// Periodic or best-candidate progress
    Progress {
        /// Next nonce to evaluate, one per lane, primary lane first
        cursors: Vec<u64>,
        /// Hashes per second since the previous report
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rate: Option<f64>,
        /// The worker's best candidate so far
        #[serde(default, skip_serializing_if = "Option::is_none")]
        best: Option<BestCandidate>,
    },
    /// A nonce meeting the difficulty
    Result {
        /// Winning nonce
        nonce: u64,
        /// Hex digest of the stamped note
        hash: String,
    },
    /// The worker failed and stopped
    Error {
        /// Failure detail
        detail: String,
    },
}

impl WorkerMessage {
    /// Short name of the message kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::Initialized => "initialized",
            WorkerMessage::Progress { .. } => "progress",
            WorkerMessage::Result { .. } => "result",
            WorkerMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_uses_flat_tagged_shape() {
        let json = r#"{"token":"0000000000000000000000000000002a","worker":1,"kind":"progress","cursors":[7,11],"rate":1200.5}"#;
        let env: WorkerEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.worker, 1);
        assert_eq!(env.launch, 0);
        assert_eq!(env.token.unwrap().to_string(), "0000000000000000000000000000002a");
        assert_eq!(
            env.message,
            WorkerMessage::Progress {
                cursors: vec![7, 11],
                rate: Some(1200.5),
                best: None
            }
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = r#"{"worker":0,"kind":"teleport"}"#;
        assert!(serde_json::from_str::<WorkerEnvelope>(json).is_err());
    }

    #[test]
    fn error_without_token_parses() {
        let json = r#"{"worker":2,"kind":"error","detail":"boom"}"#;
        let env: WorkerEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.token.is_none());
        assert_eq!(env.message.kind(), "error");
    }
}
