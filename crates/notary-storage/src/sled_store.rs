use anyhow::{anyhow, Context, Result};
use notary_core::chain::check_next_height;
use notary_core::{Block, ChainStore, Hash};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, IVec, Transactional, Tree};
use std::path::Path;
use tracing::{debug, info, warn};

const TREE_BLOCKS: &str = "blocks";
const TREE_HASHES: &str = "hashes";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
  hashes: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let db = sled::open(path).context("open sled database")?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    let hashes = db.open_tree(TREE_HASHES)?;
    let store = Self { db, blocks, hashes };
    let dropped = store.drop_past_tip()?;
    if dropped > 0 {
      warn!(dropped, "dropped block records past the tip");
    }
    info!(blocks = store.blocks.len(), "sled store opened");
    Ok(store)
  }

  /// Remove block records above the tip marker, with their hash index
  /// entries. Only an interrupted write from an older version leaves these.
  fn drop_past_tip(&self) -> Result<usize> {
    let start = match self.tip_height()? {
      Some(tip) => tip.saturating_add(1),
      None => 0,
    };
    let stale = self
      .blocks
      .range(start.to_be_bytes()..)
      .collect::<sled::Result<Vec<_>>>()?;
    for (key, value) in &stale {
      if let Ok(block) = decode_block(value) {
        self.hashes.remove(block.hash)?;
      }
      self.blocks.remove(key)?;
    }
    if !stale.is_empty() {
      self.db.flush()?;
    }
    Ok(stale.len())
  }

  /// Drop every block and the tip markers.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.hashes.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.remove(KEY_TIP_HASH)?;
    self.db.flush()?;
    Ok(())
  }
}

fn decode_block(bytes: &IVec) -> Result<Block> {
  bincode::deserialize(bytes).context("corrupt block record")
}

fn decode_height(bytes: &IVec) -> Result<u64> {
  let arr: [u8; 8] = bytes[..]
    .try_into()
    .map_err(|_| anyhow!("corrupt height record"))?;
  Ok(u64::from_be_bytes(arr))
}

impl ChainStore for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    let key = block.height.to_be_bytes();
    let bytes = bincode::serialize(block)?;

    // Block record, hash index and tip markers land together or not at all.
    (&self.blocks, &self.hashes, &*self.db)
      .transaction(|(blocks, hashes, meta)| {
        let tip = meta
          .get(KEY_TIP_HEIGHT)?
          .map(|v| decode_height(&v))
          .transpose()
          .map_err(ConflictableTransactionError::Abort)?;
        check_next_height(tip, block).map_err(ConflictableTransactionError::Abort)?;

        blocks.insert(&key[..], bytes.as_slice())?;
        hashes.insert(&block.hash[..], &key[..])?;
        meta.insert(KEY_TIP_HEIGHT, &key[..])?;
        meta.insert(KEY_TIP_HASH, &block.hash[..])?;
        Ok(())
      })
      .map_err(|e: TransactionError<anyhow::Error>| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => anyhow::Error::from(e).context("block transaction failed"),
      })?;

    self.db.flush()?;
    debug!(height = block.height, "block persisted");
    Ok(())
  }

  fn get_block(&self, height: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(height.to_be_bytes())?
      .map(|ivec| decode_block(&ivec))
      .transpose()
  }

  fn tip_height(&self) -> Result<Option<u64>> {
    self
      .db
      .get(KEY_TIP_HEIGHT)?
      .map(|v| decode_height(&v))
      .transpose()
  }

  fn tip_hash(&self) -> Result<Option<Hash>> {
    self
      .db
      .get(KEY_TIP_HASH)?
      .map(|v| {
        v[..]
          .try_into()
          .map_err(|_| anyhow!("corrupt tip hash record"))
      })
      .transpose()
  }

  fn blocks(&self) -> Result<Vec<Block>> {
    // Keys are big-endian heights, so iteration order is chain order.
    self
      .blocks
      .iter()
      .values()
      .map(|v| decode_block(&v?))
      .collect()
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }

  fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
    let Some(height) = self.hashes.get(hash)? else {
      return Ok(None);
    };
    let height = decode_height(&height)?;
    match self.get_block(height)? {
      Some(block) if &block.hash == hash => Ok(Some(block)),
      _ => {
        warn!(height, hash = %hex::encode(hash), "stale hash index entry");
        Ok(None)
      }
    }
  }
}
