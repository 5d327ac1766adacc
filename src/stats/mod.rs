//! Statistics collection and reporting module
//!
//! This module provides:
//! - [`HashRateAggregator`]: per-worker sliding windows folded into a
//!   rate-limited total
//! - [`MiningStats`] counters and the [`Telemetry`] stream published by
//!   the coordinator
//! - [`TelemetryReporter`], which logs telemetry periodically
//!

/// Sliding-window hash-rate aggregation
pub mod aggregator;

/// Counters, telemetry and the periodic log reporter
pub mod reporter;

// Re-export main components
pub use aggregator::HashRateAggregator;
pub use reporter::{MiningStats, Telemetry, TelemetryReporter};
