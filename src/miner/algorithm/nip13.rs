// src/miner/algorithm/nip13.rs
//! NIP-13 note hashing
//!
//! A note's id is the SHA-256 of the compact JSON array
//! `[0, pubkey, created_at, kind, tags, content]`; the proof-of-work nonce
//! is the second element of the `nonce` tag. Instead of re-serializing the
//! note for every nonce, [`EventTemplate`] serializes it once per decimal
//! digit length and overwrites the digits in place.

use crate::miner::algorithm::{Algorithm, NonceHasher};
use crate::types::UnsignedNote;
use crate::utils::error::MinerError;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Start of the nonce tag in the compact serialization
const NONCE_TAG_PREFIX: &[u8] = b"[\"nonce\",\"";

#[derive(Serialize)]
struct HashableNote<'a>(u32, &'a str, u64, u32, &'a [Vec<String>], &'a str);

fn serialize(note: &UnsignedNote, tags: &[Vec<String>]) -> Result<Vec<u8>, MinerError> {
    let hashable = HashableNote(
        0,
        &note.pubkey,
        note.created_at,
        note.kind,
        tags,
        &note.content,
    );
    Ok(serde_json::to_vec(&hashable)?)
}

/// Canonical id of `note` exactly as given (no nonce tag added)
pub fn note_id(note: &UnsignedNote) -> Result<[u8; 32], MinerError> {
    Ok(Sha256::digest(serialize(note, &note.tags)?).into())
}

/// Canonical id of `note` stamped with `nonce`
pub fn stamped_id(note: &UnsignedNote, nonce: u64, difficulty: u32) -> Result<[u8; 32], MinerError> {
    let tags = note.tags_with_nonce(&nonce.to_string(), difficulty);
    Ok(Sha256::digest(serialize(note, &tags)?).into())
}

/// SHA-256 NIP-13 algorithm
#[derive(Debug, Clone, Copy, Default)]
pub struct Nip13;

impl Algorithm for Nip13 {
    fn prepare(
        &self,
        note: &UnsignedNote,
        difficulty: u32,
    ) -> Result<Box<dyn NonceHasher>, MinerError> {
        Ok(Box::new(EventTemplate::new(note.clone(), difficulty)?))
    }

    fn name(&self) -> &'static str {
        "nip13-sha256"
    }
}

/// Serialized note with a fixed-width nonce region
///
/// Valid for every nonce whose decimal representation has `digits`
/// characters; rebuilt when a nonce falls outside `[lower, upper)`.
pub struct EventTemplate {
    note: UnsignedNote,
    difficulty: u32,
    bytes: Vec<u8>,
    offset: usize,
    digits: usize,
    lower: u64,
    upper: Option<u64>,
}

impl EventTemplate {
    /// Builds the template for single-digit nonces
    pub fn new(note: UnsignedNote, difficulty: u32) -> Result<Self, MinerError> {
        let mut template = EventTemplate {
            note,
            difficulty,
            bytes: Vec::new(),
            offset: 0,
            digits: 0,
            lower: 0,
            upper: Some(0),
        };
        template.rebuild(1)?;
        Ok(template)
    }

    fn rebuild(&mut self, digits: usize) -> Result<(), MinerError> {
        let placeholder = "0".repeat(digits);
        let tags = self.note.tags_with_nonce(&placeholder, self.difficulty);
        let bytes = serialize(&self.note, &tags)?;

        let pos = bytes
            .windows(NONCE_TAG_PREFIX.len())
            .position(|w| w == NONCE_TAG_PREFIX)
            .ok_or_else(|| MinerError::worker(None, "nonce tag missing from serialized note"))?;
        let offset = pos + NONCE_TAG_PREFIX.len();
        if offset + digits >= bytes.len() {
            return Err(MinerError::worker(None, "nonce region exceeds serialized note"));
        }

        self.bytes = bytes;
        self.offset = offset;
        self.digits = digits;
        self.lower = if digits == 1 { 0 } else { 10u64.pow(digits as u32 - 1) };
        self.upper = 10u64.checked_pow(digits as u32);
        Ok(())
    }

    fn covers(&self, nonce: u64) -> bool {
        nonce >= self.lower && self.upper.is_none_or(|upper| nonce < upper)
    }
}

fn decimal_digits(mut n: u64) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

impl NonceHasher for EventTemplate {
    fn hash(&mut self, nonce: u64) -> Result<[u8; 32], MinerError> {
        if !self.covers(nonce) {
            self.rebuild(decimal_digits(nonce))?;
        }

        let mut rest = nonce;
        for i in (0..self.digits).rev() {
            self.bytes[self.offset + i] = b'0' + (rest % 10) as u8;
            rest /= 10;
        }

        Ok(Sha256::digest(&self.bytes).into())
    }
}
