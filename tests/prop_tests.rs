use proptest::prelude::*;
use std::collections::HashSet;
use std::time::Duration;

use nostr_pow_rs::miner::algorithm::leading_zero_bits;
use nostr_pow_rs::miner::{BestResultTracker, NonceSpacePartitioner, RedistributionPolicy};
use nostr_pow_rs::types::BestCandidate;
use nostr_pow_rs::HashRateAggregator;

proptest! {
    /// The tracked score never decreases and ties never replace.
    #[test]
    fn best_score_is_monotonic(scores in prop::collection::vec(0u32..64, 1..200)) {
        let mut tracker = BestResultTracker::new();
        let mut previous: Option<BestCandidate> = None;
        for (nonce, score) in scores.into_iter().enumerate() {
            tracker.observe(BestCandidate {
                score,
                nonce: nonce as u64,
                hash: String::new(),
                worker: nonce % 4,
            });
            let current = tracker.current().cloned().unwrap();
            if let Some(prev) = &previous {
                prop_assert!(current.score >= prev.score);
                if current.score == prev.score {
                    prop_assert_eq!(current.nonce, prev.nonce, "ties must keep the first candidate");
                }
            }
            previous = Some(current);
        }
    }

    /// Every nonce is reached by exactly one worker of a fresh partition.
    #[test]
    fn fresh_partition_covers_each_nonce_once(
        workers in 1usize..32,
        nonce in any::<u64>(),
    ) {
        let assignments = NonceSpacePartitioner::default().partition(workers);
        prop_assert_eq!(assignments.len(), workers);
        let reaching = assignments
            .iter()
            .filter(|a| nonce >= a.start_nonce && (nonce - a.start_nonce) % a.stride == 0)
            .count();
        prop_assert_eq!(reaching, 1);
    }

    /// Redistribution keeps every saved cursor and never duplicates a start,
    /// including when the saved list repeats a cursor.
    #[test]
    fn redistribution_preserves_cursors(
        saved in prop::collection::vec(prop_oneof![0u64..8, 0u64..1_000_000_000], 1..24),
        workers in 1usize..12,
    ) {
        let assignments = NonceSpacePartitioner::new(RedistributionPolicy::PreserveCursors)
            .resume(workers, &saved);
        prop_assert_eq!(assignments.len(), workers);

        let starts: Vec<u64> = assignments.iter().flat_map(|a| a.lanes()).collect();
        let unique: HashSet<u64> = starts.iter().copied().collect();
        prop_assert_eq!(unique.len(), starts.len(), "duplicate starting point");
        for cursor in &saved {
            prop_assert!(unique.contains(cursor), "saved cursor {} lost", cursor);
        }
        prop_assert!(assignments.iter().all(|a| a.stride == workers as u64));
    }

    /// Repartition is a complete residue system from the lowest cursor
    /// whenever the cursors cannot be continued one-to-one.
    #[test]
    fn repartition_is_gap_free_above_lowest_cursor(
        saved in prop::collection::vec(0u64..1_000_000, 1..10),
        workers in 1usize..10,
        offset in 0u64..10_000,
    ) {
        prop_assume!(saved.len() != workers);
        let assignments = NonceSpacePartitioner::new(RedistributionPolicy::Repartition)
            .resume(workers, &saved);
        let nonce = saved.iter().min().unwrap() + offset;
        let reaching = assignments
            .iter()
            .filter(|a| nonce >= a.start_nonce && (nonce - a.start_nonce) % a.stride == 0)
            .count();
        prop_assert_eq!(reaching, 1);
    }

    /// The total stays finite, non-negative and within the sum of peaks.
    #[test]
    fn aggregate_rate_is_bounded(
        samples in prop::collection::vec((0usize..6, prop::option::of(-1e6f64..1e9)), 0..300),
    ) {
        let mut agg = HashRateAggregator::new(11, Duration::ZERO);
        for (worker, rate) in samples {
            agg.record_sample(worker, rate);
        }
        let total = agg.total_rate();
        let peaks: f64 = agg.max_rates().values().sum();
        prop_assert!(total.is_finite());
        prop_assert!(total >= 0.0);
        prop_assert!(total <= peaks * (1.0 + 1e-9) + 1e-9);
    }

    /// Leading zero bits agree with the integer interpretation of the hash.
    #[test]
    fn zero_bits_match_leading_zeros(hash in prop::array::uniform32(0u8..)) {
        let high = u128::from_be_bytes(hash[..16].try_into().unwrap());
        let low = u128::from_be_bytes(hash[16..].try_into().unwrap());
        let expected = if high == 0 { 128 + low.leading_zeros() } else { high.leading_zeros() };
        prop_assert_eq!(leading_zero_bits(&hash), expected);
    }
}
