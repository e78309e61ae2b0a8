//! Encoding of the user payload carried in a block body.
//!
//! Hashing never looks through this layer: it works on the stored bytes. The
//! codec is only consulted to find out who owns a block.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What an admitted submission stores in the block body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub owner: String,
    pub challenge: String,
    pub signature: String,
    #[serde(with = "hex")]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedBody {
    pub owner: Option<String>,
    pub raw: Vec<u8>,
}

pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>>;
    fn decode(&self, body: &[u8]) -> Result<DecodedBody>;

    /// Owner of a body, `None` when the body does not decode.
    fn owner_of(&self, body: &[u8]) -> Option<String> {
        self.decode(body).ok().and_then(|decoded| decoded.owner)
    }
}

/// JSON bodies with the raw data hex-encoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn decode_payload(&self, body: &[u8]) -> Result<Payload> {
        serde_json::from_slice(body).context("block body is not a JSON payload")
    }
}

impl PayloadCodec for JsonCodec {
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(payload)?)
    }

    fn decode(&self, body: &[u8]) -> Result<DecodedBody> {
        let payload = self.decode_payload(body)?;
        Ok(DecodedBody {
            owner: Some(payload.owner),
            raw: payload.data,
        })
    }
}
