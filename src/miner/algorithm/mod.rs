// src/miner/algorithm/mod.rs
//! Proof-of-work hashing
//!
//! The coordinator never hashes anything itself; workers obtain a
//! [`NonceHasher`] from an [`Algorithm`] and score digests by their
//! leading zero bits.

/// NIP-13 note hashing (SHA-256 over the canonical JSON encoding)
pub mod nip13;

use crate::types::UnsignedNote;
use crate::utils::error::MinerError;

/// Common interface for proof-of-work hash functions
pub trait Algorithm: Send + Sync {
    /// Prepares a hasher for one note at one difficulty
    ///
    /// Implementations may precompute whatever they like here; the
    /// returned hasher is owned by a single worker lane.
    fn prepare(
        &self,
        note: &UnsignedNote,
        difficulty: u32,
    ) -> Result<Box<dyn NonceHasher>, MinerError>;

    /// Short algorithm name for logs
    fn name(&self) -> &'static str;
}

/// Hashes one note for successive nonces
pub trait NonceHasher: Send {
    /// Digest of the note stamped with `nonce`
    fn hash(&mut self, nonce: u64) -> Result<[u8; 32], MinerError>;
}

/// Number of leading zero bits in `hash`
pub fn leading_zero_bits(hash: &[u8]) -> u32 {
    let mut count = 0;
    for &byte in hash {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// Leading zero bits of a hex digest
pub fn score_hex(hash: &str) -> Result<u32, MinerError> {
    Ok(leading_zero_bits(&hex::decode(hash)?))
}
