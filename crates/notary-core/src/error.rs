use serde::Serialize;
use thiserror::Error;

use crate::Block;

/// A located integrity failure found while walking the chain.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("hash mismatch at height {height}")]
    HashMismatch { height: u64 },

    #[error("broken link at height {height}")]
    BrokenLink { height: u64 },

    #[error("block at index {index} claims height {height}")]
    OutOfSequence { index: u64, height: u64 },
}

impl Violation {
    pub fn height(&self) -> u64 {
        match self {
            Violation::HashMismatch { height } | Violation::BrokenLink { height } => *height,
            Violation::OutOfSequence { index, .. } => *index,
        }
    }
}

/// Why a submission was not admitted.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("malformed challenge: {0}")]
    MalformedChallenge(String),

    #[error("challenge expired: {elapsed}s elapsed, window is {window}s")]
    ChallengeExpired { elapsed: u64, window: u64 },

    #[error("signature does not prove ownership of the address")]
    SignatureInvalid,

    #[error("chain failed validation after appending block {}: {} violation(s)", .block.height, .violations.len())]
    PostAppendValidationFailed {
        block: Box<Block>,
        violations: Vec<Violation>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_display_example() {
        assert_eq!(
            Violation::HashMismatch { height: 3 }.to_string(),
            "hash mismatch at height 3"
        );
        assert_eq!(
            Violation::BrokenLink { height: 4 }.to_string(),
            "broken link at height 4"
        );
    }

    #[test]
    fn violation_serialization_example() {
        let json = serde_json::to_string(&Violation::BrokenLink { height: 4 }).unwrap();
        assert_eq!(json, r#"{"kind":"broken_link","height":4}"#);
    }

    #[test]
    fn expired_display_example() {
        let err = SubmitError::ChallengeExpired {
            elapsed: 301,
            window: 300,
        };
        assert_eq!(
            err.to_string(),
            "challenge expired: 301s elapsed, window is 300s"
        );
    }
}
