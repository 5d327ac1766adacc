// src/miner/session.rs
//! Run sessions and message gating
//!
//! Every mining attempt gets a fresh [`RunToken`]. Workers stamp each
//! message with the token they were launched under, and the coordinator
//! applies a message only if that token is the live one. Invalidating the
//! token before any worker is told to stop is what keeps late messages
//! from a cancelled or superseded attempt out of the aggregate state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Opaque generation identifier for one mining attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RunToken(u128);

impl RunToken {
    fn random() -> Self {
        RunToken(rand::random())
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl From<RunToken> for String {
    fn from(token: RunToken) -> Self {
        token.to_string()
    }
}

impl TryFrom<String> for RunToken {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        u128::from_str_radix(&s, 16)
            .map(RunToken)
            .map_err(|e| format!("invalid run token '{}': {}", s, e))
    }
}

/// One mining attempt
#[derive(Debug, Clone)]
pub struct RunSession {
    /// Token carried by every message of this attempt
    pub token: RunToken,
    /// When the session was created
    pub created_at: SystemTime,
}

/// Holds the single live token of a coordinator
#[derive(Debug, Default)]
pub struct SessionGate {
    live: Option<RunToken>,
}

impl SessionGate {
    /// Creates a gate with no live session
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the live session with a fresh one
    ///
    /// The previous token stops being live before the new one is handed
    /// out.
    pub fn start_session(&mut self) -> RunSession {
        let previous = self.live.take();
        let mut token = RunToken::random();
        while Some(token) == previous {
            token = RunToken::random();
        }
        self.live = Some(token);
        RunSession {
            token,
            created_at: SystemTime::now(),
        }
    }

    /// Makes every token non-live
    pub fn invalidate(&mut self) {
        self.live = None;
    }

    /// Whether a message carrying `token` may be applied
    ///
    /// Messages without a token are never live.
    pub fn is_live(&self, token: Option<&RunToken>) -> bool {
        matches!((self.live.as_ref(), token), (Some(live), Some(t)) if live == t)
    }

    /// The live token, if any
    pub fn live(&self) -> Option<RunToken> {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn new_session_supersedes_old_token() {
        let mut gate = SessionGate::new();
        let first = gate.start_session().token;
        assert!(gate.is_live(Some(&first)));

        let second = gate.start_session().token;
        assert_ne!(first, second);
        assert!(!gate.is_live(Some(&first)));
        assert!(gate.is_live(Some(&second)));
    }

    #[test]
    fn invalidate_rejects_everything() {
        let mut gate = SessionGate::new();
        let token = gate.start_session().token;
        gate.invalidate();
        assert!(!gate.is_live(Some(&token)));
        assert!(!gate.is_live(None));
        assert_eq!(gate.live(), None);
    }

    #[test]
    fn missing_token_is_never_live() {
        let mut gate = SessionGate::new();
        gate.start_session();
        assert!(!gate.is_live(None));
    }

    #[test]
    fn tokens_are_unique_and_round_trip_as_hex() {
        let mut gate = SessionGate::new();
        let tokens: HashSet<_> = (0..64).map(|_| gate.start_session().token).collect();
        assert_eq!(tokens.len(), 64);

        let token = gate.live().unwrap();
        let text = serde_json::to_string(&token).unwrap();
        assert_eq!(text.len(), 34);
        let back: RunToken = serde_json::from_str(&text).unwrap();
        assert_eq!(back, token);
    }
}
