use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::{chain, crypto, msg, node};
use crate::node::{Id, Node};
use crate::vote::Vote;

const INBOX_SIZE: usize = 1024;
const FUTURE_EPOCHS: u64 = 1_000_000;

/// How a participant acts on its own turn. Everything it receives is still
/// handled by the honest state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Behavior {
    #[default]
    Honest,
    // Never proposes or votes.
    Silent,
    // Broadcasts every vote twice.
    DoubleVote,
    // Signs votes with a key nobody knows.
    Forge,
    // Proposes a block already marked notarized and carrying unsigned votes
    // from everyone else.
    PrefillVotes,
    // Proposes for an epoch far ahead of the current one.
    FutureEpoch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fault {
    pub at: Id,
    pub error: node::Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Id,
    pub behavior: Behavior,
    pub chain: chain::Chain,
    pub finalized: usize,
    pub pending: usize,
}

pub type Reply<T> = oneshot::Sender<T>;

pub enum Command {
    Deliver { wire: String, reply: Reply<Result<Option<node::Accepted>, node::Error>> },
    BeginEpoch { epoch: u64, reply: Reply<()> },
    Propose { epoch: u64, reply: Reply<Option<String>> },
    Vote { reply: Reply<Result<Vec<String>, node::Error>> },
    EndEpoch { reply: Reply<node::Outcome> },
    Snapshot { reply: Reply<Snapshot> },
}

/// A node owned by its own task. Commands are handled one at a time, so
/// duplicate and quorum checks never interleave.
#[derive(Debug)]
pub struct Participant {
    node: Node,
    behavior: Behavior,
    provider: Arc<dyn crypto::Provider>,
    forger: crypto::Keypair,
}

impl Participant {
    pub fn new(node: Node, behavior: Behavior, provider: Arc<dyn crypto::Provider>) -> Self {
        let mut seed = b"forger".to_vec();
        seed.extend_from_slice(&node.id.to_be_bytes());
        let forger = crypto::Keypair::from_seed(provider.as_ref(), &seed);
        Self { node, behavior, provider, forger }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn deliver(&mut self, wire: &str) -> Result<Option<node::Accepted>, node::Error> {
        let message = msg::Message::decode(wire)
            .map_err(|e| node::Error::Malformed(e.to_string()))?;
        trace!(node = self.node.id, kind = message.kind(), "delivering");
        self.node.handle(message)
    }

    pub fn propose(&self, epoch: u64) -> Option<String> {
        let block = match self.behavior {
            Behavior::Silent => {
                debug!(node = self.node.id, epoch, "withholding proposal");
                return None;
            },
            Behavior::FutureEpoch => self.node.propose(epoch + FUTURE_EPOCHS),
            Behavior::PrefillVotes => {
                let mut block = self.node.propose(epoch);
                let hash = block.hash();
                block.votes = (0..self.node.participants() as Id)
                    .filter(|&voter| voter != self.node.id)
                    .map(|voter| Vote {
                        signature: self.provider.sign(&self.forger.secret, &hash),
                        block: hash,
                        voter
                    })
                    .collect();
                block.notarize();
                block
            },
            Behavior::Honest | Behavior::DoubleVote | Behavior::Forge => self.node.propose(epoch),
        };
        Some(msg::Message::Proposal(block).encode())
    }

    pub fn vote(&mut self) -> Result<Vec<String>, node::Error> {
        if self.behavior == Behavior::Silent {
            return Ok(Vec::default());
        }
        let mut vote = self.node.vote()?;
        if self.behavior == Behavior::Forge {
            vote.signature = self.provider.sign(&self.forger.secret, &vote.block);
        }
        let wire = msg::Message::Vote(vote).encode();
        if self.behavior == Behavior::DoubleVote {
            Ok(vec![wire.clone(), wire])
        } else {
            Ok(vec![wire])
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            id: self.node.id,
            behavior: self.behavior,
            chain: self.node.chain().clone(),
            finalized: self.node.chain().finalized(),
            pending: self.node.pending().len(),
        }
    }

    // Replies are dropped when the requester has gone away.
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>) {
        while let Some(command) = inbox.recv().await {
            match command {
                Command::Deliver { wire, reply } => {
                    let _ = reply.send(self.deliver(&wire));
                },
                Command::BeginEpoch { epoch, reply } => {
                    self.node.begin_epoch(epoch);
                    let _ = reply.send(());
                },
                Command::Propose { epoch, reply } => {
                    let _ = reply.send(self.propose(epoch));
                },
                Command::Vote { reply } => {
                    let _ = reply.send(self.vote());
                },
                Command::EndEpoch { reply } => {
                    let _ = reply.send(self.node.end_epoch());
                },
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                },
            }
        }
        debug!(node = self.node.id, "inbox closed");
    }

    pub fn spawn(self) -> (mpsc::Sender<Command>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(INBOX_SIZE);
        (tx, tokio::spawn(self.run(rx)))
    }
}

/// Fan-out to every participant inbox.
pub struct Broadcast {
    inboxes: Vec<mpsc::Sender<Command>>,
    rng: StdRng,
}

impl Broadcast {
    pub fn new(inboxes: Vec<mpsc::Sender<Command>>, seed: u64) -> Self {
        Self { inboxes, rng: StdRng::seed_from_u64(seed) }
    }

    /// Delivers the whole batch to every participant, each in its own order,
    /// and returns what the recipients rejected.
    pub async fn broadcast(&mut self, batch: &[String]) -> Vec<Fault> {
        let mut handles = Vec::with_capacity(self.inboxes.len());
        for (at, inbox) in self.inboxes.iter().enumerate() {
            let mut batch = batch.to_vec();
            batch.shuffle(&mut self.rng);
            let inbox = inbox.clone();
            handles.push(tokio::spawn(async move {
                let mut faults = Vec::default();
                for wire in batch {
                    let (reply, rx) = oneshot::channel();
                    if inbox.send(Command::Deliver { wire, reply }).await.is_err() {
                        break;
                    }
                    if let Ok(Err(error)) = rx.await {
                        faults.push(Fault { at: at as Id, error });
                    }
                }
                faults
            }));
        }
        let mut faults = Vec::default();
        for handle in handles {
            if let Ok(f) = handle.await {
                faults.extend(f);
            }
        }
        faults
    }

    pub async fn request<T>(&self, id: Id, command: impl FnOnce(Reply<T>) -> Command) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.inboxes.get(id as usize)?.send(command(reply)).await.ok()?;
        rx.await.ok()
    }

    /// Sends to everyone first, then collects, so participants work in parallel.
    pub async fn request_all<T>(&self, command: impl Fn(Reply<T>) -> Command) -> Vec<Option<T>> {
        let mut pending = Vec::with_capacity(self.inboxes.len());
        for inbox in &self.inboxes {
            let (reply, rx) = oneshot::channel();
            let sent = inbox.send(command(reply)).await.is_ok();
            pending.push(sent.then_some(rx));
        }
        let mut replies = Vec::with_capacity(pending.len());
        for rx in pending {
            replies.push(match rx {
                Some(rx) => rx.await.ok(),
                None => None
            });
        }
        replies
    }
}
