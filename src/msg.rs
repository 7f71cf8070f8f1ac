use serde::{Serialize, Deserialize};

use crate::block::Block;
use crate::txn::Txn;
use crate::vote::Vote;

/// Everything participants exchange. Messages travel as JSON text so each
/// recipient decodes its own copy.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub enum Message {
    Txn(Txn),
    Proposal(Block),
    Vote(Vote)
}

impl Message {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("can't serialize value")
    }

    pub fn decode(wire: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(wire)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Txn(_) => "txn",
            Message::Proposal(_) => "proposal",
            Message::Vote(_) => "vote"
        }
    }
}
