use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod chain;
pub mod challenge;
pub mod clock;
pub mod constants;
pub mod error;
pub mod payload;
pub mod signature;
pub mod submit;
pub mod validate;

pub use chain::{Chain, ChainStore, MemoryStore};
pub use challenge::{Challenge, ChallengeIssuer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SubmitError, Violation};
pub use payload::{DecodedBody, JsonCodec, Payload, PayloadCodec};
pub use signature::{EthereumVerifier, SignatureVerifier};
pub use submit::{Coordinator, Submission, SubmitConfig};
pub use validate::validate;

pub type Hash = [u8; 32];

/// One record of the chain. `hash` is sealed at append time and covers every
/// other field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp: u64,
    pub previous_hash: Option<Hash>,
    pub body: Vec<u8>,
    pub hash: Hash,
}

impl Block {
    pub fn new(height: u64, timestamp: u64, previous_hash: Option<Hash>, body: Vec<u8>) -> Self {
        let mut block = Self {
            height,
            timestamp,
            previous_hash,
            body,
            hash: [0u8; 32],
        };
        block.hash = block.compute_hash();
        block
    }

    /// Canonical byte form fed to the digest. The cached `hash` is never part of it.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 1 + 32 + 8 + 8 + self.body.len());
        bytes.extend_from_slice(&self.height.to_le_bytes());
        match &self.previous_hash {
            Some(prev) => {
                bytes.push(1);
                bytes.extend_from_slice(prev);
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&(self.body.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&self.body);
        bytes
    }

    pub fn compute_hash(&self) -> Hash {
        sha256(&self.hash_bytes())
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

pub fn sha256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Parse a 64 char hex string into a block hash.
pub fn parse_hash(s: &str) -> Option<Hash> {
    if s.len() != constants::HASH_HEX_SIZE {
        return None;
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out).ok()?;
    Some(out)
}
