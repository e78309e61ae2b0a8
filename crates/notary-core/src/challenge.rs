//! Ownership challenges: `<address>:<unix-seconds>:<tag>`.

use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;
use crate::constants::CHALLENGE_TAG;
use crate::error::SubmitError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub address: String,
    pub issued_at: u64,
    pub tag: String,
}

impl Challenge {
    /// Split a challenge message into its three fields. Only the shape is
    /// checked here; address and tag are compared by the caller.
    pub fn parse(message: &str) -> Result<Self, SubmitError> {
        let mut parts = message.split(':');
        let (Some(address), Some(issued_at), Some(tag), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SubmitError::MalformedChallenge(format!(
                "expected <address>:<timestamp>:<tag>, got {message:?}"
            )));
        };
        let issued_at = issued_at.parse::<u64>().map_err(|_| {
            SubmitError::MalformedChallenge(format!("timestamp {issued_at:?} is not a number"))
        })?;
        Ok(Self {
            address: address.to_string(),
            issued_at,
            tag: tag.to_string(),
        })
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.address, self.issued_at, self.tag)
    }
}

/// Formats challenges from the injected clock. Holds no state about what it issued.
#[derive(Clone)]
pub struct ChallengeIssuer {
    clock: Arc<dyn Clock>,
    tag: String,
}

impl ChallengeIssuer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_tag(clock, CHALLENGE_TAG)
    }

    pub fn with_tag(clock: Arc<dyn Clock>, tag: impl Into<String>) -> Self {
        Self {
            clock,
            tag: tag.into(),
        }
    }

    /// Fails for an address that could not be read back out of the message:
    /// empty, or containing the `:` separator.
    pub fn issue(&self, address: &str) -> Result<Challenge, SubmitError> {
        if address.is_empty() || address.contains(':') {
            return Err(SubmitError::MalformedChallenge(format!(
                "address {address:?} must be non-empty and contain no ':'"
            )));
        }
        Ok(Challenge {
            address: address.to_string(),
            issued_at: self.clock.now(),
            tag: self.tag.clone(),
        })
    }

    pub fn issue_challenge(&self, address: &str) -> Result<String, SubmitError> {
        self.issue(address).map(|c| c.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn issue_challenge_example() {
        let issuer = ChallengeIssuer::new(Arc::new(ManualClock::new(1_600_000_000)));
        assert_eq!(
            issuer.issue_challenge("0xabc").unwrap(),
            "0xabc:1600000000:starRegistry"
        );
    }

    #[test]
    fn parse_round_trips_issued_message() {
        let issuer = ChallengeIssuer::new(Arc::new(ManualClock::new(1_600_000_000)));
        let issued = issuer.issue("0xabc").unwrap();
        assert_eq!(Challenge::parse(&issued.to_string()).unwrap(), issued);
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        for message in ["", "0xabc", "0xabc:1600000000", "a:1:b:c"] {
            assert!(matches!(
                Challenge::parse(message),
                Err(SubmitError::MalformedChallenge(_))
            ));
        }
    }

    #[test]
    fn parse_rejects_non_numeric_timestamp() {
        assert!(matches!(
            Challenge::parse("0xabc:yesterday:starRegistry"),
            Err(SubmitError::MalformedChallenge(_))
        ));
        assert!(matches!(
            Challenge::parse("0xabc:-5:starRegistry"),
            Err(SubmitError::MalformedChallenge(_))
        ));
    }

    #[test]
    fn issue_rejects_unparseable_addresses() {
        let issuer = ChallengeIssuer::new(Arc::new(ManualClock::new(1_600_000_000)));
        for address in ["", "0x:abc", "a:b:c"] {
            assert!(matches!(
                issuer.issue_challenge(address),
                Err(SubmitError::MalformedChallenge(_))
            ));
        }
    }
}
