use sha2::{Sha256, Digest};
use serde::{Serialize, Deserialize};

use crate::crypto::Hash;
use crate::node::Id;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Schedule {
    #[default]
    Hashed,
    RoundRobin
}

impl Schedule {
    pub fn leader(&self, seed: &Hash, epoch: u64, participants: usize) -> Id {
        match self {
            Schedule::Hashed => hashed(seed, epoch, participants),
            Schedule::RoundRobin => (epoch % participants as u64) as Id
        }
    }
}

fn idx_from_seed(seed: &[u8]) -> u64 {
    u64::from_be_bytes(
        Sha256::digest(seed)[..8]
            .try_into()
            .expect("sha256 output is less than 8 bytes")
    )
}

/// Proposer for `epoch`, drawn from the genesis seed so every participant
/// agrees without talking to anyone.
pub fn hashed(seed: &Hash, epoch: u64, participants: usize) -> Id {
    let mut input = seed.to_vec();
    input.extend_from_slice(&epoch.to_be_bytes());
    (idx_from_seed(&input) % participants as u64) as Id
}
