use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{config, crypto, msg, node};
use crate::block::Block;
use crate::config::Config;
use crate::net::{Broadcast, Command, Fault, Participant, Snapshot};
use crate::node::{Id, Outcome};
use crate::txn::Txn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("participant {0} holds a chain that is not linked and notarized")]
    Unlinked(Id),
    #[error("participants {0} and {1} hold different blocks at height {2}")]
    Conflict(Id, Id, usize),
}

#[derive(Debug, Clone, Serialize)]
pub struct Epoch {
    pub epoch: u64,
    pub leader: Id,
    pub proposed: bool,
    pub votes: usize,
    // Participants that notarized this epoch's block.
    pub notarized: usize,
    pub faults: Vec<Fault>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub config: Config,
    pub participants: Vec<Snapshot>,
    pub epochs: Vec<Epoch>,
}

impl Report {
    pub fn faults(&self) -> impl Iterator<Item = &Fault> {
        self.epochs.iter().flat_map(|e| e.faults.iter())
    }

    pub fn byzantine(&self) -> usize {
        self.faults().filter(|f| f.error.is_byzantine()).count()
    }

    /// Every chain linked and fully notarized, and no two chains disagree at
    /// any height they share.
    pub fn check_safety(&self) -> Result<(), Violation> {
        for p in &self.participants {
            if !p.chain.is_linked() {
                return Err(Violation::Unlinked(p.id));
            }
        }
        for (i, a) in self.participants.iter().enumerate() {
            for b in &self.participants[i + 1..] {
                let (short, long) = if a.chain.len() <= b.chain.len() { (a, b) } else { (b, a) };
                if !short.chain.is_prefix_of(&long.chain) {
                    let height = short.chain.blocks()
                        .iter()
                        .zip(long.chain.blocks())
                        .position(|(x, y)| x != y)
                        .unwrap_or(short.chain.len());
                    return Err(Violation::Conflict(a.id, b.id, height));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} participants, {} epochs", self.participants.len(), self.epochs.len())?;
        for e in &self.epochs {
            writeln!(
                f,
                "epoch {:>3}: leader {}, {}, {} votes, notarized by {}, {} faults",
                e.epoch,
                e.leader,
                if e.proposed { "proposed" } else { "no proposal" },
                e.votes,
                e.notarized,
                e.faults.len()
            )?;
        }
        for p in &self.participants {
            let tip = p.chain.tip();
            writeln!(
                f,
                "participant {} ({:?}): height {}, finalized {}, pending {}, tip epoch {} {}",
                p.id,
                p.behavior,
                p.chain.len() - 1,
                p.finalized - 1,
                p.pending,
                tip.epoch,
                &hex::encode(tip.hash())[..12]
            )?;
        }
        match self.check_safety() {
            Ok(()) => write!(f, "safety: ok, {} byzantine faults detected", self.byzantine()),
            Err(v) => write!(f, "safety: VIOLATED: {}", v)
        }
    }
}

/// Drives epochs over a set of participant tasks. Must be created inside a
/// tokio runtime.
pub struct Simulation {
    config: Config,
    genesis: Block,
    net: Broadcast,
    handles: Vec<JoinHandle<()>>,
}

impl Simulation {
    pub fn new(config: Config, provider: Arc<dyn crypto::Provider>) -> Result<Self, config::Error> {
        config.validate()?;
        let genesis = config.genesis();
        let mut inboxes = Vec::with_capacity(config.participants);
        let mut handles = Vec::with_capacity(config.participants);
        for node in node::committee(provider.clone(), &genesis, config.participants) {
            let behavior = config.behavior(node.id);
            let (inbox, handle) = Participant::new(node, behavior, provider.clone()).spawn();
            inboxes.push(inbox);
            handles.push(handle);
        }
        let net = Broadcast::new(inboxes, config.seed);
        Ok(Self { config, genesis, net, handles })
    }

    pub fn leader(&self, epoch: u64) -> Id {
        self.config.schedule.leader(&self.genesis.hash(), epoch, self.config.participants)
    }

    pub async fn run_epoch(&mut self, epoch: u64) -> Epoch {
        let mut faults = Vec::default();
        let txns: Vec<String> = (0..self.config.txns_per_epoch)
            .map(|i| msg::Message::Txn(Txn::from(format!("e{}-t{}", epoch, i))).encode())
            .collect();
        faults.extend(self.net.broadcast(&txns).await);

        self.net.request_all(|reply| Command::BeginEpoch { epoch, reply }).await;
        let leader = self.leader(epoch);
        let proposal = self.net
            .request(leader, |reply| Command::Propose { epoch, reply })
            .await
            .flatten();
        let proposed = proposal.is_some();
        match proposal {
            Some(wire) => faults.extend(self.net.broadcast(&[wire]).await),
            None => warn!(epoch, leader, "leader did not propose")
        }

        let mut votes = Vec::default();
        let replies = self.net.request_all(|reply| Command::Vote { reply }).await;
        for (at, reply) in replies.into_iter().enumerate() {
            match reply {
                Some(Ok(wires)) => votes.extend(wires),
                Some(Err(node::Error::NoProposal)) | None => {},
                Some(Err(error)) => faults.push(Fault { at: at as Id, error }),
            }
        }
        let cast = votes.len();
        faults.extend(self.net.broadcast(&votes).await);

        let notarized = self.net
            .request_all(|reply| Command::EndEpoch { reply })
            .await
            .into_iter()
            .filter(|o| *o == Some(Outcome::Notarized))
            .count();
        for fault in &faults {
            if fault.error.is_byzantine() {
                warn!(epoch, at = fault.at, "byzantine fault: {}", fault.error);
            } else {
                debug!(epoch, at = fault.at, "fault: {}", fault.error);
            }
        }
        info!(epoch, leader, votes = cast, notarized, faults = faults.len(), "epoch closed");
        Epoch { epoch, leader, proposed, votes: cast, notarized, faults }
    }

    pub async fn snapshots(&self) -> Vec<Snapshot> {
        self.net
            .request_all(|reply| Command::Snapshot { reply })
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    pub async fn run(mut self) -> Report {
        let mut epochs = Vec::with_capacity(self.config.epochs as usize);
        for epoch in 1..=self.config.epochs {
            epochs.push(self.run_epoch(epoch).await);
        }
        let participants = self.snapshots().await;
        let Simulation { config, net, handles, .. } = self;
        drop(net);
        for handle in handles {
            let _ = handle.await;
        }
        Report { config, participants, epochs }
    }
}

pub async fn run(config: Config) -> Result<Report, config::Error> {
    let provider: Arc<dyn crypto::Provider> = Arc::new(crypto::Ed25519);
    Ok(Simulation::new(config, provider)?.run().await)
}

#[cfg(test)]
pub mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::leader::Schedule;
    use crate::net::Behavior;

    fn config(participants: usize, epochs: u64, behaviors: &[(Id, Behavior)]) -> Config {
        Config {
            participants,
            epochs,
            txns_per_epoch: 1,
            schedule: Schedule::RoundRobin,
            behaviors: behaviors.iter().copied().collect::<BTreeMap<_, _>>(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn honest() {
        let report = run(config(4, 3, &[])).await.unwrap();
        assert_eq!(report.check_safety(), Ok(()));
        assert_eq!(report.faults().count(), 0);
        for p in &report.participants {
            assert_eq!(p.chain.len(), 4);
            assert_eq!(p.finalized, 3);
            assert_eq!(p.pending, 0);
            let txns: Vec<&Txn> = p.chain.blocks().iter().flat_map(|b| &b.txns).collect();
            assert_eq!(txns, vec![&Txn::from("e1-t0"), &Txn::from("e2-t0"), &Txn::from("e3-t0")]);
        }
        for e in &report.epochs {
            assert!(e.proposed);
            assert_eq!(e.votes, 4);
            assert_eq!(e.notarized, 4);
        }
    }

    #[tokio::test]
    async fn hashed_schedule() {
        let cfg = Config { participants: 5, epochs: 6, ..Config::default() };
        let report = run(cfg).await.unwrap();
        assert_eq!(report.check_safety(), Ok(()));
        for p in &report.participants {
            assert_eq!(p.chain.len(), 7);
            assert_eq!(p.finalized, 6);
            assert_eq!(p.pending, 0);
        }
    }

    #[tokio::test]
    async fn one_silent_of_four() {
        let report = run(config(4, 3, &[(0, Behavior::Silent)])).await.unwrap();
        assert_eq!(report.check_safety(), Ok(()));
        for e in &report.epochs {
            assert_eq!(e.votes, 3);
            assert_eq!(e.notarized, 4);
        }
        assert!(report.participants.iter().all(|p| p.chain.len() == 4));
    }

    #[tokio::test]
    async fn two_silent_of_four() {
        let report = run(config(4, 3, &[(0, Behavior::Silent), (1, Behavior::Silent)])).await.unwrap();
        assert_eq!(report.check_safety(), Ok(()));
        for p in &report.participants {
            assert_eq!(p.chain.len(), 1);
            assert_eq!(p.pending, 3);
        }
        assert!(report.epochs.iter().all(|e| e.notarized == 0));
    }

    #[tokio::test]
    async fn boundary_three() {
        let report = run(config(3, 2, &[(0, Behavior::Silent)])).await.unwrap();
        for p in &report.participants {
            assert_eq!(p.chain.len(), 1);
        }
    }

    #[tokio::test]
    async fn silent_leader() {
        let report = run(config(4, 2, &[(1, Behavior::Silent)])).await.unwrap();
        assert!(!report.epochs[0].proposed);
        assert_eq!(report.epochs[0].notarized, 0);
        assert_eq!(report.epochs[0].faults.len(), 0);
        assert_eq!(report.epochs[1].notarized, 4);
        for p in &report.participants {
            // Epoch 2 picked up both epochs' txns; 0 and 2 are not consecutive.
            assert_eq!(p.chain.len(), 2);
            assert_eq!(p.chain.tip().txns.len(), 2);
            assert_eq!(p.finalized, 1);
            assert_eq!(p.pending, 0);
        }
    }

    #[tokio::test]
    async fn double_voter() {
        let report = run(config(4, 3, &[(3, Behavior::DoubleVote)])).await.unwrap();
        assert_eq!(report.check_safety(), Ok(()));
        assert_eq!(report.byzantine(), 12);
        assert!(report.faults().all(|f| matches!(f.error, node::Error::DuplicateVote { voter: 3, .. })));
        assert!(report.participants.iter().all(|p| p.chain.len() == 4));
    }

    #[tokio::test]
    async fn forger() {
        let report = run(config(4, 2, &[(3, Behavior::Forge)])).await.unwrap();
        assert_eq!(report.check_safety(), Ok(()));
        assert_eq!(report.byzantine(), 8);
        assert!(report.faults().all(|f| f.error == node::Error::BadSignature { voter: 3 }));
        assert!(report.participants.iter().all(|p| p.chain.len() == 3));
    }

    #[tokio::test]
    async fn prefilling_leader() {
        let report = run(config(4, 3, &[(1, Behavior::PrefillVotes)])).await.unwrap();
        assert_eq!(report.check_safety(), Ok(()));
        assert_eq!(report.faults().count(), 0);
        let keys = node::keys(&crypto::Ed25519, &Config::default().genesis(), 4);
        for p in &report.participants {
            assert_eq!(p.chain.len(), 4);
            // Only votes that were checked on arrival ever reach the chain.
            for block in &p.chain.blocks()[1..] {
                assert!(crate::vote::is_quorum(crate::vote::tally(&block.votes, &block.hash()), 4));
                for vote in &block.votes {
                    assert!(vote.verify(&crypto::Ed25519, &keys[vote.voter as usize].public));
                }
            }
        }
    }

    #[tokio::test]
    async fn future_epoch_leader() {
        let report = run(config(4, 3, &[(1, Behavior::FutureEpoch)])).await.unwrap();
        assert_eq!(report.check_safety(), Ok(()));
        let first = &report.epochs[0];
        assert!(first.proposed);
        assert_eq!(first.votes, 0);
        assert_eq!(first.notarized, 0);
        assert_eq!(first.faults.len(), 4);
        assert!(first.faults.iter().all(|f| matches!(f.error, node::Error::WrongEpoch { expected: 1, .. })));
        assert_eq!(report.byzantine(), 4);
        // Later leaders are not locked out.
        assert!(report.epochs[1..].iter().all(|e| e.notarized == 4));
        for p in &report.participants {
            assert_eq!(p.chain.len(), 3);
            assert_eq!(p.chain.tip().epoch, 3);
            assert_eq!(p.pending, 0);
        }
    }

    #[tokio::test]
    async fn same_seed_same_run() {
        let a = run(config(4, 3, &[(2, Behavior::DoubleVote)])).await.unwrap();
        let b = run(config(4, 3, &[(2, Behavior::DoubleVote)])).await.unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[tokio::test]
    async fn invalid_config() {
        let provider: Arc<dyn crypto::Provider> = Arc::new(crypto::Ed25519);
        assert!(Simulation::new(config(0, 1, &[]), provider).is_err());
    }

    #[tokio::test]
    async fn display() {
        let report = run(config(4, 1, &[])).await.unwrap();
        let text = report.to_string();
        assert!(text.contains("participant 0 (Honest): height 1"));
        assert!(text.contains("safety: ok"));
    }

    #[test]
    fn conflict_detected() {
        let mut a = crate::chain::Chain::default();
        let mut b = crate::chain::Chain::default();
        let genesis = a.tip().hash();
        let mut x = Block::new(genesis, 1, vec![Txn::from("x")]);
        let mut y = Block::new(genesis, 1, vec![Txn::from("y")]);
        x.notarize();
        y.notarize();
        a.append(x).unwrap();
        b.append(y).unwrap();
        let snapshot = |id, chain: crate::chain::Chain| Snapshot {
            id,
            behavior: Behavior::Honest,
            finalized: chain.finalized(),
            chain,
            pending: 0,
        };
        let report = Report {
            config: Config::default(),
            participants: vec![snapshot(0, a), snapshot(1, b)],
            epochs: Vec::default(),
        };
        assert_eq!(report.check_safety(), Err(Violation::Conflict(0, 1, 1)));
        assert!(report.to_string().contains("VIOLATED"));
    }
}
