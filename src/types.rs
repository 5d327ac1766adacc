// src/types.rs
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the tag that carries the proof-of-work nonce
pub const NONCE_TAG: &str = "nonce";

/// A note before it is stamped: the canonical message the workers hash
///
/// The canonical encoding is the compact JSON array
/// `[0, pubkey, created_at, kind, tags, content]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedNote {
    /// Author public key (hex)
    pub pubkey: String,
    /// Creation time in unix seconds; fixed for the whole attempt so
    /// re-hashing after a resume is stable
    pub created_at: u64,
    /// Event kind
    pub kind: u32,
    /// Tags, without the nonce tag unless the caller supplied one
    pub tags: Vec<Vec<String>>,
    /// Message content
    pub content: String,
}

impl UnsignedNote {
    /// Returns the tag list with the nonce tag set to `nonce`
    ///
    /// An existing nonce tag is overwritten in place, otherwise one is
    /// appended.
    pub fn tags_with_nonce(&self, nonce: &str, difficulty: u32) -> Vec<Vec<String>> {
        let mut tags = self.tags.clone();
        let nonce_tag = vec![NONCE_TAG.to_string(), nonce.to_string(), difficulty.to_string()];
        match tags
            .iter_mut()
            .find(|tag| tag.first().map(String::as_str) == Some(NONCE_TAG))
        {
            Some(tag) => *tag = nonce_tag,
            None => tags.push(nonce_tag),
        }
        tags
    }

    /// Builds the stamped note for a winning nonce
    pub fn stamp(&self, nonce: u64, difficulty: u32, id: String) -> StampedNote {
        StampedNote {
            id,
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags_with_nonce(&nonce.to_string(), difficulty),
            content: self.content.clone(),
        }
    }
}

/// A note carrying its proof-of-work nonce and id, ready for signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedNote {
    /// Hex SHA-256 of the canonical encoding
    pub id: String,
    /// Author public key (hex)
    pub pubkey: String,
    /// Creation time in unix seconds
    pub created_at: u64,
    /// Event kind
    pub kind: u32,
    /// Tags including the nonce tag
    pub tags: Vec<Vec<String>>,
    /// Message content
    pub content: String,
}

/// What the caller wants mined
///
/// Immutable for the lifetime of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningRequest {
    /// Author public key; required
    pub pubkey: String,
    /// Message content; required
    pub content: String,
    /// Event kind
    pub kind: u32,
    /// Caller tags, merged after the coordinator's default tags
    pub tags: Vec<Vec<String>>,
    /// Creation time; `None` means "now" at session start
    pub created_at: Option<u64>,
    /// Required number of leading zero bits
    pub difficulty: u32,
    /// Requested worker count (clamped to at least 1)
    pub worker_count: usize,
}

impl MiningRequest {
    /// Creates a kind-1 request with no extra tags and one worker
    pub fn new(pubkey: impl Into<String>, content: impl Into<String>, difficulty: u32) -> Self {
        MiningRequest {
            pubkey: pubkey.into(),
            content: content.into(),
            kind: 1,
            tags: Vec::new(),
            created_at: None,
            difficulty,
            worker_count: 1,
        }
    }

    /// Sets the requested worker count
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Adds a caller tag
    pub fn with_tag(mut self, tag: Vec<String>) -> Self {
        self.tags.push(tag);
        self
    }

    /// Pins the creation time
    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Checks the required fields
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.pubkey.trim().is_empty() {
            return Err(MinerError::InvalidRequest("public key is not set".into()));
        }
        if self.content.is_empty() {
            return Err(MinerError::InvalidRequest("content is not set".into()));
        }
        Ok(())
    }
}

/// The best (nonce, hash) pair seen, scored by leading zero bits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestCandidate {
    /// Leading zero bits of `hash`
    pub score: u32,
    /// Nonce that produced `hash`
    pub nonce: u64,
    /// Hex digest
    pub hash: String,
    /// Index of the worker that found it
    ///
    /// Optional in worker messages: the coordinator always records the
    /// index of the envelope that carried the candidate.
    #[serde(default)]
    pub worker: usize,
}

/// Final outcome of a successful attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinedResult {
    /// The stamped note
    pub note: StampedNote,
    /// Winning nonce
    pub nonce: u64,
    /// Hex digest of the winning encoding (equals `note.id`)
    pub hash: String,
    /// Leading zero bits achieved
    pub score: u32,
    /// Worker that found the nonce
    pub worker: usize,
    /// Wall time since the attempt (or its latest resume) began
    pub elapsed_secs: f64,
    /// Aggregated hash rate at completion, hashes per second
    pub hash_rate: f64,
}

/// Lifecycle of a mining attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningState {
    /// Nothing has been started
    Idle,
    /// Workers are searching
    Mining,
    /// Workers stopped; progress retained for resume
    Paused,
    /// Stopped by the caller; terminal
    Cancelled,
    /// A qualifying nonce was found; terminal
    Succeeded,
    /// A worker failed; terminal
    Failed,
}

impl MiningState {
    /// `true` for cancelled, succeeded and failed
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MiningState::Cancelled | MiningState::Succeeded | MiningState::Failed
        )
    }
}

impl fmt::Display for MiningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiningState::Idle => write!(f, "idle"),
            MiningState::Mining => write!(f, "mining"),
            MiningState::Paused => write!(f, "paused"),
            MiningState::Cancelled => write!(f, "cancelled"),
            MiningState::Succeeded => write!(f, "succeeded"),
            MiningState::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(tags: Vec<Vec<String>>) -> UnsignedNote {
        UnsignedNote {
            pubkey: "ab".into(),
            created_at: 1,
            kind: 1,
            tags,
            content: "hi".into(),
        }
    }

    #[test]
    fn nonce_tag_is_appended_when_missing() {
        let tags = note(vec![vec!["t".into(), "pow".into()]]).tags_with_nonce("42", 20);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[1], vec!["nonce", "42", "20"]);
    }

    #[test]
    fn existing_nonce_tag_is_overwritten_in_place() {
        let tags = note(vec![
            vec!["nonce".into(), "0".into(), "1".into()],
            vec!["t".into(), "pow".into()],
        ])
        .tags_with_nonce("7", 16);
        assert_eq!(tags[0], vec!["nonce", "7", "16"]);
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn validate_rejects_missing_fields() {
        assert!(matches!(
            MiningRequest::new("", "content", 1).validate(),
            Err(MinerError::InvalidRequest(_))
        ));
        assert!(matches!(
            MiningRequest::new("pk", "", 1).validate(),
            Err(MinerError::InvalidRequest(_))
        ));
        assert!(MiningRequest::new("pk", "content", 1).validate().is_ok());
    }
}
