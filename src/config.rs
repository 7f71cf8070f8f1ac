use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::block;
use crate::leader::Schedule;
use crate::net::Behavior;
use crate::node::Id;

#[derive(Debug, Error)]
pub enum Error {
    #[error("can't read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("can't parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("need at least one participant")]
    NoParticipants,
    #[error("behavior given for participant {0} but there are only {1} participants")]
    UnknownParticipant(Id, usize),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub participants: usize,
    pub epochs: u64,
    pub txns_per_epoch: usize,
    // Drives delivery order; same seed, same run.
    pub seed: u64,
    pub genesis: String,
    pub schedule: Schedule,
    pub behaviors: BTreeMap<Id, Behavior>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            participants: 4,
            epochs: 10,
            txns_per_epoch: 2,
            seed: 0,
            genesis: String::from(block::GENESIS_TAG),
            schedule: Schedule::default(),
            behaviors: BTreeMap::default()
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.participants == 0 {
            return Err(Error::NoParticipants);
        }
        if let Some(&id) = self.behaviors.keys().find(|id| **id as usize >= self.participants) {
            return Err(Error::UnknownParticipant(id, self.participants));
        }
        Ok(())
    }

    pub fn behavior(&self, id: Id) -> Behavior {
        self.behaviors.get(&id).copied().unwrap_or_default()
    }

    pub fn genesis(&self) -> block::Block {
        block::Block::genesis(self.genesis.as_bytes())
    }
}
