use streamlet::crypto::{Ed25519, Keypair, Provider};
use criterion::Criterion;

pub fn sigs(crit: &mut Criterion) {
    let alice = Keypair::from_seed(&Ed25519, b"alice");
    let digest = [7u8; 32];
    let sig = Ed25519.sign(&alice.secret, &digest);
    crit.bench_function("eddsa sign", |b| b.iter(|| {
        let _ = Ed25519.sign(&alice.secret, &digest);
    }));
    crit.bench_function("eddsa verify", |b| b.iter(|| {
        assert!(Ed25519.verify(&alice.public, &digest, &sig));
    }));
}
