// src/miner/tracker.rs
//! Best result tracking
//!
//! Keeps the highest-scoring candidate across all workers. A candidate
//! replaces the current one only with a strictly greater score, so the
//! tracked score never decreases and the first candidate found at a given
//! score wins, whatever order the workers' messages arrive in.

use crate::types::BestCandidate;

/// Monotonic maximum over observed candidates
#[derive(Debug, Clone, Default)]
pub struct BestResultTracker {
    current: Option<BestCandidate>,
}

impl BestResultTracker {
    /// Creates an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker seeded with a previously persisted candidate
    pub fn seeded(best: Option<BestCandidate>) -> Self {
        BestResultTracker { current: best }
    }

    /// Offers a candidate; returns `true` if it became the new best
    pub fn observe(&mut self, candidate: BestCandidate) -> bool {
        let better = self
            .current
            .as_ref()
            .is_none_or(|current| candidate.score > current.score);
        if better {
            self.current = Some(candidate);
        }
        better
    }

    /// The best candidate so far
    pub fn current(&self) -> Option<&BestCandidate> {
        self.current.as_ref()
    }

    /// Whether the best candidate reaches `difficulty`
    pub fn meets(&self, difficulty: u32) -> bool {
        self.current.as_ref().is_some_and(|c| c.score >= difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(score: u32, nonce: u64) -> BestCandidate {
        BestCandidate {
            score,
            nonce,
            hash: format!("{nonce:064x}"),
            worker: 0,
        }
    }

    #[test]
    fn strictly_greater_replaces() {
        let mut tracker = BestResultTracker::new();
        assert!(tracker.observe(candidate(5, 1)));
        assert!(tracker.observe(candidate(9, 2)));
        assert!(!tracker.observe(candidate(3, 3)));
        assert_eq!(tracker.current().unwrap().nonce, 2);
    }

    #[test]
    fn ties_keep_first_found() {
        let mut tracker = BestResultTracker::new();
        tracker.observe(candidate(12, 100));
        assert!(!tracker.observe(candidate(12, 200)));
        assert_eq!(tracker.current().unwrap().nonce, 100);
    }

    #[test]
    fn seeded_tracker_keeps_prior_best() {
        let mut tracker = BestResultTracker::seeded(Some(candidate(18, 7)));
        assert!(!tracker.observe(candidate(17, 8)));
        assert!(tracker.meets(18));
        assert!(!tracker.meets(19));
    }
}
