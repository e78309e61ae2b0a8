use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, bail, Result};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::constants::GENESIS_BODY;
use crate::error::Violation;
use crate::payload::{JsonCodec, PayloadCodec};
use crate::validate::validate;
use crate::{Block, Hash};

/// Trait the storage backends implement for the chain to operate.
/// This lives in `notary-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    /// Store `block` as the new tip. Backends refuse anything but `tip + 1`.
    fn put_block(&self, block: &Block) -> Result<()>;
    fn get_block(&self, height: u64) -> Result<Option<Block>>;
    /// `None` while the store is empty.
    fn tip_height(&self) -> Result<Option<u64>>;
    fn tip_hash(&self) -> Result<Option<Hash>>;
    /// Every block in ascending height order.
    fn blocks(&self) -> Result<Vec<Block>>;
    fn close(&self) -> Result<()>;

    fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
        Ok(self.blocks()?.into_iter().find(|b| &b.hash == hash))
    }
}

/// Fail unless `block` is the next height after `tip`.
pub fn check_next_height(tip: Option<u64>, block: &Block) -> Result<()> {
    let expected = tip.map_or(0, |h| h + 1);
    if block.height != expected {
        bail!(
            "refusing block at height {}, next height is {}",
            block.height,
            expected
        );
    }
    Ok(())
}

/// In-memory store. All data is lost when the store is dropped.
#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("memory store lock poisoned")
}

impl ChainStore for MemoryStore {
    fn put_block(&self, block: &Block) -> Result<()> {
        let mut blocks = self.blocks.write().map_err(poisoned)?;
        let tip = blocks.last().map(|b| b.height);
        check_next_height(tip, block)?;
        blocks.push(block.clone());
        Ok(())
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>> {
        let blocks = self.blocks.read().map_err(poisoned)?;
        Ok(usize::try_from(height)
            .ok()
            .and_then(|i| blocks.get(i))
            .cloned())
    }

    fn tip_height(&self) -> Result<Option<u64>> {
        Ok(self.blocks.read().map_err(poisoned)?.last().map(|b| b.height))
    }

    fn tip_hash(&self) -> Result<Option<Hash>> {
        Ok(self.blocks.read().map_err(poisoned)?.last().map(|b| b.hash))
    }

    fn blocks(&self) -> Result<Vec<Block>> {
        Ok(self.blocks.read().map_err(poisoned)?.clone())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Chain façade: owns the append critical section and delegates persistence
/// to a `ChainStore`.
pub struct Chain<S: ChainStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    codec: Arc<dyn PayloadCodec>,
    append_lock: Arc<Mutex<()>>,
}

impl<S: ChainStore> Clone for Chain<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            codec: Arc::clone(&self.codec),
            append_lock: Arc::clone(&self.append_lock),
        }
    }
}

impl<S: ChainStore> Chain<S> {
    /// Open a chain on `store`, creating the genesis block if the store is empty.
    pub fn new(store: Arc<S>) -> Result<Self> {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_parts(store, clock, Arc::new(JsonCodec))
    }

    pub fn with_parts(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        codec: Arc<dyn PayloadCodec>,
    ) -> Result<Self> {
        let chain = Self {
            store,
            clock,
            codec,
            append_lock: Arc::new(Mutex::new(())),
        };
        chain.ensure_genesis()?;
        Ok(chain)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn codec(&self) -> &Arc<dyn PayloadCodec> {
        &self.codec
    }

    /// Ensure a genesis block exists. Idempotent.
    pub fn ensure_genesis(&self) -> Result<()> {
        let _guard = self.append_lock.lock().map_err(poisoned)?;
        if self.store.tip_height()?.is_none() {
            let genesis = genesis_block(self.clock.now());
            self.store.put_block(&genesis)?;
            info!(hash = %genesis.hash_hex(), "genesis block created");
        }
        Ok(())
    }

    pub fn height(&self) -> Result<u64> {
        self.store
            .tip_height()?
            .ok_or_else(|| anyhow!("chain has no genesis block"))
    }

    /// Return (height, tip_hash).
    pub fn tip(&self) -> Result<(u64, Hash)> {
        let height = self.height()?;
        let hash = self
            .store
            .tip_hash()?
            .ok_or_else(|| anyhow!("chain has no tip hash"))?;
        Ok((height, hash))
    }

    /// Link `body` onto the tip. Reading the tip and storing the new block
    /// happen under one lock, so concurrent appenders never share a height.
    pub fn append(&self, body: Vec<u8>) -> Result<Block> {
        let _guard = self.append_lock.lock().map_err(poisoned)?;
        let tip = self
            .store
            .tip_height()?
            .ok_or_else(|| anyhow!("chain has no genesis block"))?;
        let previous_hash = self.store.tip_hash()?;
        let block = Block::new(tip + 1, self.clock.now(), previous_hash, body);
        self.store.put_block(&block)?;
        info!(height = block.height, hash = %block.hash_hex(), "block appended");
        Ok(block)
    }

    pub fn get_by_height(&self, height: u64) -> Result<Option<Block>> {
        debug!(height, "lookup by height");
        self.store.get_block(height)
    }

    pub fn get_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
        debug!(hash = %hex::encode(hash), "lookup by hash");
        self.store.get_block_by_hash(hash)
    }

    /// Non-genesis blocks whose body decodes to `address` as owner, in chain
    /// order. Hex addresses compare case-insensitively.
    pub fn all_blocks_by_address(&self, address: &str) -> Result<Vec<Block>> {
        let blocks = self
            .store
            .blocks()?
            .into_iter()
            .filter(|b| !b.is_genesis())
            .filter(|b| {
                self.codec
                    .owner_of(&b.body)
                    .is_some_and(|owner| owner.eq_ignore_ascii_case(address))
            })
            .collect::<Vec<_>>();
        debug!(address, count = blocks.len(), "lookup by owner");
        Ok(blocks)
    }

    pub fn blocks(&self) -> Result<Vec<Block>> {
        self.store.blocks()
    }

    /// Walk the whole chain. The outer error is a storage failure, the inner
    /// one the list of integrity violations.
    pub fn validate(&self) -> Result<std::result::Result<(), Vec<Violation>>> {
        Ok(validate(&self.store.blocks()?))
    }
}

pub fn genesis_block(timestamp: u64) -> Block {
    Block::new(0, timestamp, None, GENESIS_BODY.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::payload::Payload;

    fn manual_chain() -> (Arc<ManualClock>, Chain<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(1_600_000_000));
        let chain = Chain::with_clock(Arc::new(MemoryStore::new()), clock.clone()).unwrap();
        (clock, chain)
    }

    fn owned_body(owner: &str, data: &str) -> Vec<u8> {
        JsonCodec
            .encode(&Payload {
                owner: owner.to_string(),
                challenge: format!("{owner}:1600000000:starRegistry"),
                signature: "00".to_string(),
                data: data.as_bytes().to_vec(),
            })
            .unwrap()
    }

    #[test]
    fn genesis_block_example() {
        let genesis = genesis_block(1_600_000_000);
        assert_eq!(genesis.height, 0);
        assert_eq!(genesis.previous_hash, None);
        assert_eq!(genesis.body, GENESIS_BODY.to_vec());
        assert_eq!(genesis.hash, genesis.compute_hash());
    }

    #[test]
    fn new_chain_has_genesis() {
        let (_, chain) = manual_chain();
        assert_eq!(chain.height().unwrap(), 0);
        let genesis = chain.get_by_height(0).unwrap().unwrap();
        assert_eq!(genesis.previous_hash, None);
        assert_eq!(genesis.timestamp, 1_600_000_000);
        assert_eq!(chain.tip().unwrap(), (0, genesis.hash));
    }

    #[test]
    fn ensure_genesis_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let chain = Chain::new(store.clone()).unwrap();
        chain.ensure_genesis().unwrap();
        let reopened = Chain::new(store).unwrap();
        assert_eq!(reopened.height().unwrap(), 0);
        assert_eq!(reopened.blocks().unwrap().len(), 1);
    }

    #[test]
    fn append_links_to_tip() {
        let (clock, chain) = manual_chain();
        clock.advance(10);
        let genesis = chain.get_by_height(0).unwrap().unwrap();
        let block = chain.append(b"first".to_vec()).unwrap();
        assert_eq!(block.height, 1);
        assert_eq!(block.timestamp, 1_600_000_010);
        assert_eq!(block.previous_hash, Some(genesis.hash));
        assert_eq!(block.hash, block.compute_hash());
        assert_eq!(chain.height().unwrap(), 1);
    }

    #[test]
    fn chain_validates_after_every_append() {
        let (clock, chain) = manual_chain();
        for i in 0..20 {
            clock.advance(1);
            chain.append(format!("block {i}").into_bytes()).unwrap();
            assert_eq!(chain.validate().unwrap(), Ok(()));
        }
        assert_eq!(chain.height().unwrap(), 20);
    }

    #[test]
    fn only_genesis_lacks_previous_hash() {
        let (_, chain) = manual_chain();
        for i in 0..5 {
            chain.append(vec![i]).unwrap();
        }
        let without_prev: Vec<u64> = chain
            .blocks()
            .unwrap()
            .iter()
            .filter(|b| b.previous_hash.is_none())
            .map(|b| b.height)
            .collect();
        assert_eq!(without_prev, vec![0]);
    }

    #[test]
    fn lookups_by_hash_and_height() {
        let (_, chain) = manual_chain();
        let block = chain.append(b"find me".to_vec()).unwrap();
        assert_eq!(chain.get_by_hash(&block.hash).unwrap(), Some(block.clone()));
        assert_eq!(chain.get_by_height(1).unwrap(), Some(block));
        assert_eq!(chain.get_by_hash(&[0xee; 32]).unwrap(), None);
        assert_eq!(chain.get_by_height(2).unwrap(), None);
        assert_eq!(chain.get_by_height(u64::MAX).unwrap(), None);
    }

    #[test]
    fn blocks_by_address_in_chain_order() {
        let (_, chain) = manual_chain();
        chain.append(owned_body("0xaaa", "one")).unwrap();
        chain.append(owned_body("0xbbb", "two")).unwrap();
        chain.append(b"not json".to_vec()).unwrap();
        chain.append(owned_body("0xaaa", "three")).unwrap();

        let owned = chain.all_blocks_by_address("0xaaa").unwrap();
        let heights: Vec<u64> = owned.iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![1, 4]);
        assert!(chain.all_blocks_by_address("0xccc").unwrap().is_empty());
    }

    #[test]
    fn blocks_by_address_never_returns_genesis() {
        struct EveryoneOwnsEverything;
        impl PayloadCodec for EveryoneOwnsEverything {
            fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
                Ok(payload.data.clone())
            }
            fn decode(&self, body: &[u8]) -> Result<crate::DecodedBody> {
                Ok(crate::DecodedBody {
                    owner: Some("0xaaa".to_string()),
                    raw: body.to_vec(),
                })
            }
        }
        let chain = Chain::with_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1)),
            Arc::new(EveryoneOwnsEverything),
        )
        .unwrap();
        chain.append(b"x".to_vec()).unwrap();
        let heights: Vec<u64> = chain
            .all_blocks_by_address("0xaaa")
            .unwrap()
            .iter()
            .map(|b| b.height)
            .collect();
        assert_eq!(heights, vec![1]);
    }

    #[test]
    fn memory_store_refuses_gaps() {
        let store = MemoryStore::new();
        let stray = Block::new(3, 1, Some([0u8; 32]), vec![]);
        assert!(store.put_block(&stray).is_err());
        store.put_block(&genesis_block(1)).unwrap();
        assert!(store.put_block(&genesis_block(2)).is_err());
        assert_eq!(store.tip_height().unwrap(), Some(0));
    }

    #[test]
    fn concurrent_appends_are_gap_free() {
        let (_, chain) = manual_chain();
        let handles: Vec<_> = (0..50)
            .map(|i| {
                let chain = chain.clone();
                std::thread::spawn(move || chain.append(vec![i as u8]).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let blocks = chain.blocks().unwrap();
        assert_eq!(blocks.len(), 51);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.height, i as u64);
        }
        assert_eq!(chain.validate().unwrap(), Ok(()));
    }
}
