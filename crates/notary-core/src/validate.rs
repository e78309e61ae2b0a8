//! Full-chain integrity check.
//!
//! Every hash is re-derived and every link is checked against the re-derived
//! hash of the block before it, so a block whose contents were altered breaks
//! both its own hash and its successor's link. Validation is not fail-fast:
//! the complete, ordered list of violations is returned.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{error::Violation, Block, Hash};

pub fn validate(blocks: &[Block]) -> Result<(), Vec<Violation>> {
    let recomputed: Vec<Hash> = blocks.par_iter().map(Block::compute_hash).collect();

    let mut violations = Vec::new();
    let mut expected_previous: Option<Hash> = None;

    for (index, (block, actual)) in blocks.iter().zip(recomputed.iter()).enumerate() {
        let index = index as u64;

        if block.height != index {
            violations.push(Violation::OutOfSequence {
                index,
                height: block.height,
            });
        }

        if block.hash != *actual {
            violations.push(Violation::HashMismatch { height: index });
        }

        // Genesis has no predecessor; it must not claim one.
        if block.previous_hash != expected_previous {
            violations.push(Violation::BrokenLink { height: index });
        }

        expected_previous = Some(*actual);
    }

    if violations.is_empty() {
        debug!(blocks = blocks.len(), "chain valid");
        Ok(())
    } else {
        warn!(count = violations.len(), "chain validation found violations");
        Err(violations)
    }
}
