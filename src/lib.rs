//! Nostr PoW Miner - NIP-13 proof-of-work stamping in Rust
//!
//! This crate coordinates a pool of worker threads searching for a nonce
//! that gives a note an id with at least D leading zero bits:
//! - Complete, non-overlapping partitioning of the nonce space
//! - Run sessions that keep messages from cancelled attempts out
//! - Pause/resume, including across restarts via persisted snapshots,
//!   with any change of worker count
//! - Live hash-rate and best-candidate telemetry

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core implementation: hashing, partitioning, workers and the
/// coordinator
pub mod miner;

/// Snapshot capture and persistence for pause/resume
pub mod snapshot;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{CoordinatorSettings, HashWorker, MiningCoordinator, MiningFuture, ThreadWorker};
pub use snapshot::{MiningSnapshot, SnapshotStore};
pub use stats::{HashRateAggregator, MiningStats, Telemetry, TelemetryReporter};
pub use types::{BestCandidate, MinedResult, MiningRequest, MiningState};
pub use utils::{MinerError, init_logging};
