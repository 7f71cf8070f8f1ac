use streamlet::*;
use criterion::Criterion;

fn epoch(n: usize) {
    let mut nodes = node::default_committee(n);
    for node in nodes.iter_mut() {
        node.receive_txn(txn::Txn::from("t1"));
        node.begin_epoch(1);
    }
    let block = nodes[0].propose(1);
    for node in nodes.iter_mut() {
        assert!(node.receive_proposal(block.clone()).is_ok());
    }
    let votes: Vec<Vote> = nodes.iter_mut().map(|n| n.vote().unwrap()).collect();
    let keys: Vec<_> = nodes.iter().map(|n| n.public_key().clone()).collect();
    for node in nodes.iter_mut() {
        for (vote, pk) in votes.iter().zip(&keys) {
            assert!(node.receive_vote(pk, vote.clone()).is_ok());
        }
        assert_eq!(node.chain().len(), 2);
    }
}

pub fn notarize(crit: &mut Criterion) {
    crit.bench_function("epoch 4 participants", |b| b.iter(|| epoch(4)));
    crit.bench_function("epoch 16 participants", |b| b.iter(|| epoch(16)));
}
