//! Admission of new blocks.
//!
//! A submission moves through `Received → TimeChecked → SignatureChecked →
//! Appended → Validated`, and can be rejected at every checkpoint. The time
//! window is checked before the signature, so a stale submission is rejected
//! as expired whatever its signature says. Rejections are final; the caller
//! has to fetch a fresh challenge and try again.
//!
//! A block that was appended stays in the chain even when the validation that
//! follows it fails. The failure is reported with the block and every
//! violation found.
//!
//! `submit` runs both halves in one call. Async callers that must not block
//! their executor can await [`Coordinator::authorize`] and run
//! [`Coordinator::commit`] on a blocking thread: it takes the append lock,
//! writes to the store and rehashes the whole chain.

use std::sync::Arc;

use tracing::{info, warn};

use crate::chain::{Chain, ChainStore};
use crate::challenge::{Challenge, ChallengeIssuer};
use crate::constants::{CHALLENGE_TAG, VALIDATION_WINDOW_SECS};
use crate::error::SubmitError;
use crate::payload::Payload;
use crate::signature::SignatureVerifier;
use crate::Block;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitConfig {
    /// Seconds a challenge stays valid after it was issued.
    pub validation_window_secs: u64,
    pub challenge_tag: String,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            validation_window_secs: VALIDATION_WINDOW_SECS,
            challenge_tag: CHALLENGE_TAG.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub address: String,
    pub message: String,
    pub signature: String,
    pub data: Vec<u8>,
}

pub struct Coordinator<S: ChainStore, V: SignatureVerifier> {
    chain: Chain<S>,
    verifier: Arc<V>,
    config: SubmitConfig,
}

impl<S: ChainStore, V: SignatureVerifier> Clone for Coordinator<S, V> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            verifier: Arc::clone(&self.verifier),
            config: self.config.clone(),
        }
    }
}

impl<S: ChainStore, V: SignatureVerifier> Coordinator<S, V> {
    pub fn new(chain: Chain<S>, verifier: Arc<V>) -> Self {
        Self::with_config(chain, verifier, SubmitConfig::default())
    }

    pub fn with_config(chain: Chain<S>, verifier: Arc<V>, config: SubmitConfig) -> Self {
        Self {
            chain,
            verifier,
            config,
        }
    }

    pub fn chain(&self) -> &Chain<S> {
        &self.chain
    }

    pub fn config(&self) -> &SubmitConfig {
        &self.config
    }

    /// An issuer sharing this coordinator's clock and tag.
    pub fn issuer(&self) -> ChallengeIssuer {
        ChallengeIssuer::with_tag(self.chain.clock().clone(), self.config.challenge_tag.clone())
    }

    pub async fn submit(&self, submission: Submission) -> Result<Block, SubmitError> {
        let payload = self.authorize(submission).await?;
        self.commit(payload)
    }

    /// Time and signature checks. Nothing is written.
    pub async fn authorize(&self, submission: Submission) -> Result<Payload, SubmitError> {
        logged(self.check(submission).await)
    }

    /// Append an authorized payload and validate the chain. Blocks on the
    /// append lock and on storage.
    pub fn commit(&self, payload: Payload) -> Result<Block, SubmitError> {
        logged(self.append_validated(payload))
    }

    async fn check(&self, submission: Submission) -> Result<Payload, SubmitError> {
        let Submission {
            address,
            message,
            signature,
            data,
        } = submission;

        self.check_time(&address, &message)?;

        let verified = match self.verifier.verify(&message, &address, &signature).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!(error = %e, "signature verifier failed");
                false
            }
        };
        if !verified {
            return Err(SubmitError::SignatureInvalid);
        }

        Ok(Payload {
            owner: canonical_address(&address),
            challenge: message,
            signature,
            data,
        })
    }

    fn append_validated(&self, payload: Payload) -> Result<Block, SubmitError> {
        let body = self.chain.codec().encode(&payload)?;
        let block = self.chain.append(body)?;

        if let Err(violations) = self.chain.validate()? {
            return Err(SubmitError::PostAppendValidationFailed {
                block: Box::new(block),
                violations,
            });
        }

        info!(height = block.height, owner = %payload.owner, "submission admitted");
        Ok(block)
    }

    fn check_time(&self, address: &str, message: &str) -> Result<(), SubmitError> {
        let challenge = Challenge::parse(message)?;
        if !challenge.address.eq_ignore_ascii_case(address) {
            return Err(SubmitError::MalformedChallenge(format!(
                "challenge was issued for {}, not {address}",
                challenge.address
            )));
        }
        if challenge.tag != self.config.challenge_tag {
            return Err(SubmitError::MalformedChallenge(format!(
                "unknown challenge tag {:?}",
                challenge.tag
            )));
        }

        let now = self.chain.clock().now();
        let Some(elapsed) = now.checked_sub(challenge.issued_at) else {
            return Err(SubmitError::MalformedChallenge(format!(
                "challenge is dated {}s in the future",
                challenge.issued_at - now
            )));
        };
        if elapsed > self.config.validation_window_secs {
            return Err(SubmitError::ChallengeExpired {
                elapsed,
                window: self.config.validation_window_secs,
            });
        }
        Ok(())
    }
}

/// Addresses are hex, so owners are stored lowercased.
fn canonical_address(address: &str) -> String {
    address.to_ascii_lowercase()
}

fn logged<T>(result: Result<T, SubmitError>) -> Result<T, SubmitError> {
    if let Err(e) = &result {
        warn!(error = %e, "submission rejected");
    }
    result
}
