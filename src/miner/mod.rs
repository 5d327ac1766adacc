// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the mining process:
//! - Hashing (NIP-13 note ids scored by leading zero bits)
//! - Nonce space partitioning and resume redistribution
//! - Run sessions that gate stale worker messages
//! - Worker threads and the coordinator state machine

/// Proof-of-work hash functions
pub mod algorithm;

/// The coordinator state machine
///
/// Spawns workers, gates and applies their messages, and resolves the
/// caller's futures when an attempt ends.
pub mod coordinator;

/// Worker ↔ coordinator message contract
pub mod message;

/// Splitting the nonce space among workers
pub mod partition;

/// Run tokens and the message gate
pub mod session;

/// Monotonic best-candidate tracking
pub mod tracker;

/// Worker implementations
///
/// Contains the worker thread logic that performs actual hash computations.
pub mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::{Algorithm, NonceHasher};
pub use self::coordinator::{CoordinatorSettings, MiningCoordinator, MiningFuture};
pub use self::message::{WorkerEnvelope, WorkerMessage, WorkerTask};
pub use self::partition::{NonceSpacePartitioner, RedistributionPolicy, WorkerAssignment};
pub use self::session::{RunSession, RunToken, SessionGate};
pub use self::tracker::BestResultTracker;
pub use self::worker::{ChannelWorker, DispatchedTask, HashWorker, ThreadWorker, WorkerHandle};
