use once_cell::sync::Lazy;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;
use digest::Digest;

use crate::crypto::Hash;
use crate::node::Id;
use crate::txn::Txn;
use crate::vote::Vote;

pub const GENESIS_TAG: &str = "streamlet";

pub static GENESIS: Lazy<Block> = Lazy::new(|| Block::genesis(GENESIS_TAG.as_bytes()));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub parent_hash: Hash,
    pub epoch: u64,
    pub txns: Vec<Txn>,
    pub votes: Vec<Vote>,
    pub notarized: bool,
}

impl Default for Block {
    fn default() -> Self {
        GENESIS.clone()
    }
}

impl Block {
    pub fn new(parent_hash: Hash, epoch: u64, txns: Vec<Txn>) -> Self {
        Self { parent_hash, epoch, txns, votes: Vec::default(), notarized: false }
    }

    /// Epoch 0 block every participant starts from. It counts as notarized.
    pub fn genesis(tag: &[u8]) -> Self {
        let mut block = Self::new(Sha256::digest(tag).into(), 0, Vec::default());
        block.notarized = true;
        block
    }

    // Identity: votes and the notarized flag are not hashed.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(&self.parent_hash);
        hasher.update(&self.epoch.to_be_bytes());
        hasher.update(&(self.txns.len() as u64).to_be_bytes());
        for txn in &self.txns {
            hasher.update(&(txn.as_bytes().len() as u64).to_be_bytes());
            hasher.update(txn.as_bytes());
        }
        hasher.finalize().into()
    }

    pub fn extends(&self, parent: &Block) -> bool {
        self.parent_hash == parent.hash()
    }

    pub fn has_vote(&self, voter: Id) -> bool {
        self.votes.iter().any(|v| v.voter == voter)
    }

    pub fn notarize(&mut self) {
        self.notarized = true;
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Block {}
