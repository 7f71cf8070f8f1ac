use criterion::{criterion_group, criterion_main};

mod crypto;
mod epoch;

criterion_group!(benches, crypto::sigs, epoch::notarize);
criterion_main!(benches);
