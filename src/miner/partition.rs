// src/miner/partition.rs
//! Nonce space partitioning
//!
//! A fresh partition of W workers gives worker i the residue class
//! `i (mod W)`: start at `i`, step by `W`. Every nonce is reached by exactly
//! one worker. Resuming from saved cursors keeps that shape when the
//! worker count is unchanged and otherwise redistributes the saved cursors
//! according to a [`RedistributionPolicy`].

use serde::{Deserialize, Serialize};

/// One worker's slice of the nonce space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    /// Worker index, `0..W`
    pub worker_index: usize,
    /// First nonce of the primary lane
    pub start_nonce: u64,
    /// Step between consecutive nonces of every lane
    pub stride: u64,
    /// Saved cursors folded onto this worker when there were more saved
    /// cursors than workers; searched round-robin with the primary lane
    #[serde(default)]
    pub extra_lanes: Vec<u64>,
    /// Whether `start_nonce` continues saved progress rather than being a
    /// fresh offset
    #[serde(default)]
    pub resumed: bool,
}

impl WorkerAssignment {
    /// Starting nonce of every lane, primary first
    pub fn lanes(&self) -> Vec<u64> {
        let mut lanes = Vec::with_capacity(1 + self.extra_lanes.len());
        lanes.push(self.start_nonce);
        lanes.extend_from_slice(&self.extra_lanes);
        lanes
    }

    /// Number of lanes this worker searches
    pub fn lane_count(&self) -> usize {
        1 + self.extra_lanes.len()
    }

    /// The same assignment continued from newer cursors
    ///
    /// `cursors` must hold one entry per lane.
    pub fn continued(&self, cursors: &[u64]) -> WorkerAssignment {
        WorkerAssignment {
            worker_index: self.worker_index,
            start_nonce: cursors.first().copied().unwrap_or(self.start_nonce),
            stride: self.stride,
            extra_lanes: cursors.iter().skip(1).copied().collect(),
            resumed: true,
        }
    }
}

/// What to do with saved cursors when the worker count changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedistributionPolicy {
    /// Keep every saved cursor as a starting point; no duplicate starts,
    /// but no gap-free guarantee over the whole space
    #[default]
    PreserveCursors,
    /// Restart a complete residue partition at the lowest saved cursor
    Repartition,
}

/// Computes worker assignments
#[derive(Debug, Clone, Copy, Default)]
pub struct NonceSpacePartitioner {
    policy: RedistributionPolicy,
}

impl NonceSpacePartitioner {
    /// Creates a partitioner using `policy` for worker-count changes
    pub fn new(policy: RedistributionPolicy) -> Self {
        NonceSpacePartitioner { policy }
    }

    /// Redistribution policy in use
    pub fn policy(&self) -> RedistributionPolicy {
        self.policy
    }

    /// Fresh partition: worker i starts at `i` with stride `W`
    pub fn partition(&self, worker_count: usize) -> Vec<WorkerAssignment> {
        let workers = worker_count.max(1);
        (0..workers)
            .map(|i| WorkerAssignment {
                worker_index: i,
                start_nonce: i as u64,
                stride: workers as u64,
                extra_lanes: Vec::new(),
                resumed: false,
            })
            .collect()
    }

    /// Partition continuing from `saved` cursors
    ///
    /// With as many distinct saved cursors as workers every worker
    /// continues exactly where it stopped. Otherwise the policy decides, so
    /// repeated cursors never turn into workers searching in lockstep.
    pub fn resume(&self, worker_count: usize, saved: &[u64]) -> Vec<WorkerAssignment> {
        let workers = worker_count.max(1);
        if saved.is_empty() {
            return self.partition(workers);
        }

        if saved.len() == workers && pairwise_distinct(saved) {
            return saved
                .iter()
                .enumerate()
                .map(|(i, &cursor)| WorkerAssignment {
                    worker_index: i,
                    start_nonce: cursor,
                    stride: workers as u64,
                    extra_lanes: Vec::new(),
                    resumed: true,
                })
                .collect();
        }

        match self.policy {
            RedistributionPolicy::PreserveCursors => redistribute(workers, saved),
            RedistributionPolicy::Repartition => repartition_from_lowest(workers, saved),
        }
    }
}

fn pairwise_distinct(saved: &[u64]) -> bool {
    saved
        .iter()
        .enumerate()
        .all(|(i, cursor)| !saved[..i].contains(cursor))
}

fn redistribute(workers: usize, saved: &[u64]) -> Vec<WorkerAssignment> {
    let mut pool: Vec<u64> = Vec::with_capacity(saved.len());
    for &cursor in saved {
        if !pool.contains(&cursor) {
            pool.push(cursor);
        }
    }
    let fresh_base = pool.iter().max().map_or(0, |max| max.saturating_add(1));
    let stride = workers as u64;

    (0..workers)
        .map(|i| match pool.get(i) {
            Some(&cursor) => WorkerAssignment {
                worker_index: i,
                start_nonce: cursor,
                stride,
                extra_lanes: pool.iter().skip(i + workers).step_by(workers).copied().collect(),
                resumed: true,
            },
            None => WorkerAssignment {
                worker_index: i,
                start_nonce: fresh_base.saturating_add((i - pool.len()) as u64),
                stride,
                extra_lanes: Vec::new(),
                resumed: false,
            },
        })
        .collect()
}

fn repartition_from_lowest(workers: usize, saved: &[u64]) -> Vec<WorkerAssignment> {
    let base = saved.iter().copied().min().unwrap_or(0);
    (0..workers)
        .map(|i| WorkerAssignment {
            worker_index: i,
            start_nonce: base.saturating_add(i as u64),
            stride: workers as u64,
            extra_lanes: Vec::new(),
            resumed: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn starts(assignments: &[WorkerAssignment]) -> Vec<u64> {
        assignments.iter().flat_map(|a| a.lanes()).collect()
    }

    #[test]
    fn fresh_partition_is_residue_system() {
        let p = NonceSpacePartitioner::default().partition(3);
        let pairs: Vec<_> = p.iter().map(|a| (a.start_nonce, a.stride)).collect();
        assert_eq!(pairs, vec![(0, 3), (1, 3), (2, 3)]);

        // 7 = 1 + 2*3: only worker 1 reaches it.
        let reaching: Vec<_> = p
            .iter()
            .filter(|a| 7 >= a.start_nonce && (7 - a.start_nonce) % a.stride == 0)
            .map(|a| a.worker_index)
            .collect();
        assert_eq!(reaching, vec![1]);
    }

    #[test]
    fn zero_workers_is_clamped_to_one() {
        let p = NonceSpacePartitioner::default().partition(0);
        assert_eq!(p.len(), 1);
        assert_eq!((p[0].start_nonce, p[0].stride), (0, 1));
    }

    #[test]
    fn same_worker_count_resumes_exactly() {
        let p = NonceSpacePartitioner::default().resume(2, &[123_456, 789_012]);
        assert_eq!(starts(&p), vec![123_456, 789_012]);
        assert!(p.iter().all(|a| a.stride == 2 && a.resumed));
    }

    #[test]
    fn shrinking_keeps_every_cursor_without_duplicates() {
        let saved = [100_000, 200_000, 300_000, 400_000];
        let p = NonceSpacePartitioner::default().resume(2, &saved);
        assert_eq!(p.len(), 2);
        assert_eq!(p[0].lanes(), vec![100_000, 300_000]);
        assert_eq!(p[1].lanes(), vec![200_000, 400_000]);

        let all = starts(&p);
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
        assert!(saved.iter().all(|c| all.contains(c)));
        assert_ne!(p[0].start_nonce, p[1].start_nonce);
    }

    #[test]
    fn growing_adds_fresh_offsets_beyond_saved_maximum() {
        let p = NonceSpacePartitioner::default().resume(4, &[100_000, 200_000]);
        assert_eq!(starts(&p), vec![100_000, 200_000, 200_001, 200_002]);
        assert!(p[0].resumed && p[1].resumed);
        assert!(!p[2].resumed && !p[3].resumed);
        assert!(p.iter().all(|a| a.stride == 4));
    }

    #[test]
    fn duplicate_saved_cursors_collapse() {
        let p = NonceSpacePartitioner::default().resume(3, &[50, 50]);
        assert_eq!(starts(&p), vec![50, 51, 52]);
    }

    #[test]
    fn duplicate_cursors_at_same_worker_count_are_redistributed() {
        let p = NonceSpacePartitioner::default().resume(2, &[50, 50]);
        assert_eq!(starts(&p), vec![50, 51]);
        assert!(p[0].resumed);
        assert!(!p[1].resumed);

        let repartitioned = NonceSpacePartitioner::new(RedistributionPolicy::Repartition)
            .resume(3, &[7, 0, 7]);
        assert_eq!(starts(&repartitioned), vec![0, 1, 2]);
    }

    #[test]
    fn repartition_restarts_from_lowest_cursor() {
        let partitioner = NonceSpacePartitioner::new(RedistributionPolicy::Repartition);
        let p = partitioner.resume(2, &[400, 101, 202]);
        let pairs: Vec<_> = p.iter().map(|a| (a.start_nonce, a.stride)).collect();
        assert_eq!(pairs, vec![(101, 2), (102, 2)]);
    }

    #[test]
    fn continued_keeps_lane_shape() {
        let a = WorkerAssignment {
            worker_index: 1,
            start_nonce: 1,
            stride: 2,
            extra_lanes: vec![9],
            resumed: false,
        };
        let c = a.continued(&[41, 49]);
        assert_eq!(c.lanes(), vec![41, 49]);
        assert_eq!(c.stride, 2);
        assert!(c.resumed);
    }
}
