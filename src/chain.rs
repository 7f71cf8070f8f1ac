use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::block::Block;
use crate::crypto::Hash;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
pub enum Error {
    #[error("epoch {epoch} block does not extend a longest notarized chain (parent {})", hex::encode(.parent))]
    Extension { epoch: u64, parent: Hash },
    #[error("epoch {epoch} block is not notarized")]
    NotNotarized { epoch: u64 },
    #[error("epoch {epoch} block does not link to the tip (parent {})", hex::encode(.parent))]
    Link { epoch: u64, parent: Hash },
}

/// Append-only sequence of notarized blocks starting at genesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chain {
    blocks: Vec<Block>
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(Block::default())
    }
}

impl Chain {
    pub fn new(mut genesis: Block) -> Self {
        genesis.notarize();
        Self { blocks: Vec::from([genesis]) }
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain always holds genesis")
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn contains(&self, block: &Block) -> bool {
        self.blocks.iter().any(|b| b == block)
    }

    /// Fork choice. A candidate has to build directly on `reference_tip`, which
    /// must itself be notarized and on this chain, and come from a later epoch.
    pub fn check_extension(&self, candidate: &Block, reference_tip: &Block) -> Result<(), Error> {
        let fault = Error::Extension { epoch: candidate.epoch, parent: candidate.parent_hash };
        if !reference_tip.notarized || !self.contains(reference_tip) {
            return Err(fault);
        }
        if !candidate.extends(reference_tip) || candidate.epoch <= reference_tip.epoch {
            return Err(fault);
        }
        Ok(())
    }

    pub fn append(&mut self, block: Block) -> Result<(), Error> {
        if !block.notarized {
            return Err(Error::NotNotarized { epoch: block.epoch });
        }
        if !block.extends(self.tip()) {
            return Err(Error::Link { epoch: block.epoch, parent: block.parent_hash });
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Length of the finalized prefix. Three adjacent notarized blocks with
    /// consecutive epochs finalize the chain up to and including the middle one.
    pub fn finalized(&self) -> usize {
        let mut len = 1;
        for (i, w) in self.blocks.windows(3).enumerate() {
            if w[1].epoch == w[0].epoch + 1 && w[2].epoch == w[1].epoch + 1 {
                len = i + 2;
            }
        }
        len
    }

    pub fn is_linked(&self) -> bool {
        self.blocks.windows(2).all(|w| w[1].extends(&w[0]) && w[1].notarized)
    }

    pub fn is_prefix_of(&self, other: &Chain) -> bool {
        self.len() <= other.len()
            && self.blocks.iter().zip(other.blocks.iter()).all(|(a, b)| a == b)
    }
}
