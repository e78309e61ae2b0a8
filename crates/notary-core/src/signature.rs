//! Wallet signature verification.
//!
//! The coordinator only needs a yes/no answer to "was `message` signed by the
//! key behind `address`". [`EthereumVerifier`] answers it for EIP-191
//! personal messages signed with secp256k1 keys; other schemes plug in through
//! [`SignatureVerifier`].

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use tracing::debug;

use crate::Hash;

#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// `Ok(false)` for any signature that does not prove ownership, including
    /// malformed input. `Err` is reserved for the verifier itself failing.
    async fn verify(&self, message: &str, address: &str, signature: &str) -> Result<bool>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EthereumVerifier;

#[async_trait]
impl SignatureVerifier for EthereumVerifier {
    async fn verify(&self, message: &str, address: &str, signature: &str) -> Result<bool> {
        match recover_address(message, signature) {
            Ok(recovered) => Ok(recovered.eq_ignore_ascii_case(address.trim())),
            Err(e) => {
                debug!(error = %e, "signature could not be recovered");
                Ok(false)
            }
        }
    }
}

pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Digest of an EIP-191 personal message.
pub fn personal_message_hash(message: &str) -> Hash {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message.as_bytes());
    keccak256(&data)
}

/// `0x`-prefixed lowercase hex address: last 20 bytes of keccak256(uncompressed pubkey).
pub fn address_of(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Recover the signer address of a 65 byte `r || s || v` hex signature.
pub fn recover_address(message: &str, signature: &str) -> Result<String> {
    let bytes = hex::decode(strip_0x(signature.trim())).context("signature is not hex")?;
    if bytes.len() != 65 {
        bail!("signature must be 65 bytes, got {}", bytes.len());
    }
    let v = match bytes[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        v => bail!("invalid recovery id {v}"),
    };
    let recovery_id = RecoveryId::from_byte(v).ok_or_else(|| anyhow!("invalid recovery id {v}"))?;
    let sig = Signature::from_slice(&bytes[..64]).context("invalid r/s")?;
    let key = VerifyingKey::recover_from_prehash(&personal_message_hash(message), &sig, recovery_id)
        .context("public key recovery failed")?;
    Ok(address_of(&key))
}

/// Sign `message` as an EIP-191 personal message, returning hex `r || s || v` with `v` in {27, 28}.
pub fn sign_message(key: &SigningKey, message: &str) -> Result<String> {
    let (sig, recovery_id) = key
        .sign_prehash_recoverable(&personal_message_hash(message))
        .context("signing failed")?;
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte() + 27);
    Ok(format!("0x{}", hex::encode(bytes)))
}

pub fn generate_key() -> SigningKey {
    SigningKey::random(&mut rand::thread_rng())
}

pub fn parse_key(hex_key: &str) -> Result<SigningKey> {
    let bytes = hex::decode(strip_0x(hex_key.trim())).context("private key is not hex")?;
    SigningKey::from_slice(&bytes).context("invalid secp256k1 private key")
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}
