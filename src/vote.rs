use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;

use crate::block::Block;
use crate::crypto::{Hash, Provider, PublicKey, SecretKey, Signature};
use crate::node::Id;

/// A participant's signed endorsement of a block content hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vote {
    pub signature: Signature,
    pub block: Hash,
    pub voter: Id
}

impl Vote {
    pub fn new(provider: &dyn Provider, sk: &SecretKey, block: &Block, voter: Id) -> Self {
        let block = block.hash();
        Self { signature: provider.sign(sk, &block), block, voter }
    }

    pub fn verify(&self, provider: &dyn Provider, pk: &PublicKey) -> bool {
        provider.verify(pk, &self.block, &self.signature)
    }
}

/// floor(2n / 3). Notarization needs strictly more votes than this.
pub fn threshold(participants: usize) -> usize {
    2 * participants / 3
}

pub fn is_quorum(votes: usize, participants: usize) -> bool {
    votes > threshold(participants)
}

/// Distinct voters endorsing `block`.
pub fn tally(votes: &[Vote], block: &Hash) -> usize {
    votes.iter()
        .filter(|v| &v.block == block)
        .map(|v| v.voter)
        .collect::<BTreeSet<_>>()
        .len()
}
