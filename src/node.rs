use serde::{Serialize, Deserialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{block, chain, crypto, msg, txn, vote};
use crate::block::Block;
use crate::crypto::{Hash, PublicKey};
use crate::vote::Vote;

pub type Id = u32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
pub enum Error {
    /// `voter` is the id the message claims. The signature is not checked
    /// before this rejection, so it does not prove `voter` sent it.
    #[error("vote claiming participant {voter} repeats a recorded vote for {}", hex::encode(.block))]
    DuplicateVote { voter: Id, block: Hash },
    #[error("vote from participant {voter} has a bad signature")]
    BadSignature { voter: Id },
    #[error("vote from participant {voter} is for {} which is not the round block", hex::encode(.block))]
    MismatchedBlock { voter: Id, block: Hash },
    #[error("vote from unknown participant {voter}")]
    UnknownVoter { voter: Id },
    #[error("no proposal this epoch")]
    NoProposal,
    #[error("proposal for epoch {epoch} arrived with no epoch open")]
    NoRound { epoch: u64 },
    #[error("proposal for epoch {got} during epoch {expected}")]
    WrongEpoch { expected: u64, got: u64 },
    #[error("already voted for another block in epoch {epoch}")]
    AlreadyVoted { epoch: u64 },
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error(transparent)]
    Chain(#[from] chain::Error),
    #[error("notarized block {} commits {} txns missing from the pool", hex::encode(.block), .txns.len())]
    MissingTransaction { block: Hash, txns: Vec<txn::Txn> },
}

impl Error {
    /// Faults only a misbehaving remote participant can cause. The rest are
    /// honest-but-slow symptoms or local bookkeeping bugs.
    ///
    /// Epochs are clock driven and clocks are assumed in sync, so a proposal
    /// for another epoch counts against the proposer. A rejected extension
    /// does not: a receiver that missed a notarization rejects honest
    /// proposals the same way.
    pub fn is_byzantine(&self) -> bool {
        match self {
            Error::DuplicateVote { .. }
            | Error::BadSignature { .. }
            | Error::UnknownVoter { .. }
            | Error::Malformed(_)
            | Error::WrongEpoch { .. } => true,
            Error::MismatchedBlock { .. }
            | Error::NoProposal
            | Error::NoRound { .. }
            | Error::AlreadyVoted { .. }
            | Error::Chain(_)
            | Error::MissingTransaction { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingProposal,
    Validating,
    Voted,
    Notarizing,
}

/// State for a single epoch. Replaced wholesale when the next epoch begins.
#[derive(Debug, Clone)]
pub struct Round {
    pub epoch: u64,
    pub block: Option<Block>,
    pub phase: Phase,
    // Hash this participant signed this epoch, if any.
    pub voted: Option<Hash>,
}

impl Round {
    fn new(epoch: u64) -> Self {
        Self { epoch, block: None, phase: Phase::AwaitingProposal, voted: None }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Accepted {
    Counted { votes: usize },
    Notarized { height: usize },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Notarized,
    TimedOut,
    Idle,
}

#[derive(Debug)]
pub struct Node {
    pub id: Id,
    kp: crypto::Keypair,
    provider: Arc<dyn crypto::Provider>,
    // Indexed by participant id.
    directory: Vec<PublicKey>,
    chain: chain::Chain,
    pool: txn::Pool,
    round: Option<Round>,
}

impl Node {
    pub fn new(
        id: Id,
        kp: crypto::Keypair,
        provider: Arc<dyn crypto::Provider>,
        directory: Vec<PublicKey>,
        genesis: Block
    ) -> Self {
        Self {
            id,
            kp,
            provider,
            directory,
            chain: chain::Chain::new(genesis),
            pool: txn::Pool::default(),
            round: None
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.kp.public
    }

    pub fn participants(&self) -> usize {
        self.directory.len()
    }

    pub fn chain(&self) -> &chain::Chain {
        &self.chain
    }

    pub fn pending(&self) -> &[txn::Txn] {
        self.pool.txns()
    }

    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.round.as_ref().map_or(Phase::Idle, |r| r.phase)
    }

    pub fn receive_txn(&mut self, txn: txn::Txn) {
        self.pool.push(txn);
    }

    pub fn begin_epoch(&mut self, epoch: u64) {
        self.round = Some(Round::new(epoch));
    }

    /// Builds this epoch's proposal on the local tip with every pending txn.
    /// The returned block is the caller's to broadcast; nothing here keeps it.
    pub fn propose(&self, epoch: u64) -> Block {
        let block = Block::new(self.chain.tip().hash(), epoch, self.pool.txns().to_vec());
        info!(node = self.id, epoch, txns = block.txns.len(), "proposing block");
        block
    }

    /// Stores `block` as the round block of the open epoch. A later proposal
    /// for the same epoch replaces it; the identical one again is a no-op.
    /// Proposals for any other epoch are rejected.
    pub fn receive_proposal(&mut self, mut block: Block) -> Result<(), Error> {
        let round = self.round.as_mut().ok_or(Error::NoRound { epoch: block.epoch })?;
        if block.epoch != round.epoch {
            warn!(node = self.id, epoch = round.epoch, proposed = block.epoch, "proposal for another epoch");
            return Err(Error::WrongEpoch { expected: round.epoch, got: block.epoch });
        }
        debug!(node = self.id, epoch = block.epoch, "received proposal");
        if round.block.as_ref() == Some(&block) {
            return Ok(());
        }
        // Only votes checked here may count.
        block.votes.clear();
        block.notarized = false;
        round.block = Some(block);
        round.phase = Phase::Validating;
        Ok(())
    }

    pub fn vote(&mut self) -> Result<Vote, Error> {
        let round = self.round.as_mut().ok_or(Error::NoProposal)?;
        let block = round.block.as_ref().ok_or(Error::NoProposal)?;
        let hash = block.hash();
        if round.voted.is_some_and(|voted| voted != hash) {
            return Err(Error::AlreadyVoted { epoch: round.epoch });
        }
        // Already notarized: nothing to validate.
        if block != self.chain.tip() {
            if let Err(e) = self.chain.check_extension(block, self.chain.tip()) {
                warn!(node = self.id, epoch = block.epoch, "rejecting proposal: {}", e);
                return Err(e.into());
            }
        }
        let vote = Vote::new(self.provider.as_ref(), &self.kp.secret, block, self.id);
        round.voted = Some(hash);
        round.phase = Phase::Voted;
        debug!(node = self.id, epoch = block.epoch, "voted");
        Ok(vote)
    }

    pub fn receive_vote(&mut self, voter_pk: &PublicKey, vote: Vote) -> Result<Accepted, Error> {
        let participants = self.participants();
        let round = self.round.as_mut().ok_or(Error::NoProposal)?;
        let block = round.block.as_mut().ok_or(Error::NoProposal)?;
        let hash = block.hash();
        if vote.block == hash && block.has_vote(vote.voter) {
            return Err(Error::DuplicateVote { voter: vote.voter, block: vote.block });
        }
        if !vote.verify(self.provider.as_ref(), voter_pk) {
            return Err(Error::BadSignature { voter: vote.voter });
        }
        if vote.block != hash {
            return Err(Error::MismatchedBlock { voter: vote.voter, block: vote.block });
        }
        block.votes.push(vote);
        let votes = vote::tally(&block.votes, &hash);
        if *block == *self.chain.tip() || !vote::is_quorum(votes, participants) {
            return Ok(Accepted::Counted { votes });
        }
        let mut notarized = block.clone();
        notarized.notarize();
        let txns = notarized.txns.clone();
        self.chain.append(notarized)?;
        block.notarize();
        round.phase = Phase::Notarizing;
        let height = self.chain.len() - 1;
        info!(node = self.id, epoch = round.epoch, height, votes, "notarized block");
        self.pool.commit(&txns)
            .map_err(|txns| Error::MissingTransaction { block: hash, txns })?;
        Ok(Accepted::Notarized { height })
    }

    /// Closes the current epoch whether or not it notarized. The node is idle
    /// afterwards.
    pub fn end_epoch(&mut self) -> Outcome {
        match self.round.take() {
            None => Outcome::Idle,
            Some(Round { block: Some(block), .. }) if block.notarized => Outcome::Notarized,
            Some(round) => {
                debug!(node = self.id, epoch = round.epoch, phase = ?round.phase, "epoch timed out");
                Outcome::TimedOut
            }
        }
    }

    /// Applies a decoded broadcast. Votes are checked against the key this
    /// participant holds for the voter, never a key carried by the message.
    pub fn handle(&mut self, message: msg::Message) -> Result<Option<Accepted>, Error> {
        match message {
            msg::Message::Txn(txn) => {
                self.receive_txn(txn);
                Ok(None)
            },
            msg::Message::Proposal(block) => {
                self.receive_proposal(block)?;
                Ok(None)
            },
            msg::Message::Vote(vote) => {
                let pk = self.directory
                    .get(vote.voter as usize)
                    .cloned()
                    .ok_or(Error::UnknownVoter { voter: vote.voter })?;
                self.receive_vote(&pk, vote).map(Some)
            }
        }
    }
}

/// Keys for participants `0..n`, seeded by genesis tag and id.
pub fn keys(provider: &dyn crypto::Provider, genesis: &Block, n: usize) -> Vec<crypto::Keypair> {
    (0..n as Id)
        .map(|id| {
            let mut seed = genesis.hash().to_vec();
            seed.extend_from_slice(&id.to_be_bytes());
            crypto::Keypair::from_seed(provider, &seed)
        })
        .collect()
}

/// `n` participants sharing `genesis` and each other's public keys.
pub fn committee(provider: Arc<dyn crypto::Provider>, genesis: &Block, n: usize) -> Vec<Node> {
    let kps = keys(provider.as_ref(), genesis, n);
    let directory: Vec<PublicKey> = kps.iter().map(|kp| kp.public.clone()).collect();
    kps.into_iter()
        .enumerate()
        .map(|(id, kp)| Node::new(id as Id, kp, provider.clone(), directory.clone(), genesis.clone()))
        .collect()
}

pub fn default_committee(n: usize) -> Vec<Node> {
    committee(Arc::new(crypto::Ed25519), &block::GENESIS, n)
}
