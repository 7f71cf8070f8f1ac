use ed25519_dalek::{self, Signer, Verifier};
use sha2::{Sha256, Digest};
use serde::{Serialize, Deserialize};
use std::fmt::Debug;

pub type Hash = [u8; 32];
// Keys and signatures stay opaque so providers can be swapped.
pub type SecretKey = Vec<u8>;
pub type PublicKey = Vec<u8>;
pub type Signature = Vec<u8>;

/// Key generation, signing and verification over 32 byte digests.
pub trait Provider: Debug + Send + Sync {
    fn generate_keypair(&self, seed: &[u8]) -> Keypair;
    fn sign(&self, sk: &SecretKey, digest: &Hash) -> Signature;
    fn verify(&self, pk: &PublicKey, digest: &Hash, sig: &Signature) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keypair {
    pub secret: SecretKey,
    pub public: PublicKey
}

impl Keypair {
    pub fn from_seed(provider: &dyn Provider, seed: &[u8]) -> Self {
        provider.generate_keypair(seed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519;

impl Ed25519 {
    fn keypair(sk: &[u8]) -> Option<ed25519_dalek::Keypair> {
        let secret = ed25519_dalek::SecretKey::from_bytes(sk).ok()?;
        let public = ed25519_dalek::PublicKey::from(&secret);
        Some(ed25519_dalek::Keypair { secret, public })
    }
}

impl Provider for Ed25519 {
    // Same seed, same keys: replays are deterministic.
    fn generate_keypair(&self, seed: &[u8]) -> Keypair {
        let secret = ed25519_dalek::SecretKey::from_bytes(&Sha256::digest(seed))
            .expect("sha256 output is 32 bytes");
        let public = ed25519_dalek::PublicKey::from(&secret);
        Keypair {
            secret: secret.to_bytes().to_vec(),
            public: public.to_bytes().to_vec()
        }
    }

    /// An unusable secret key yields an empty signature, which never verifies.
    fn sign(&self, sk: &SecretKey, digest: &Hash) -> Signature {
        match Self::keypair(sk) {
            Some(kp) => kp.sign(digest).to_bytes().to_vec(),
            None => Signature::default()
        }
    }

    fn verify(&self, pk: &PublicKey, digest: &Hash, sig: &Signature) -> bool {
        let Ok(pk) = ed25519_dalek::PublicKey::from_bytes(pk) else {
            return false;
        };
        let Ok(sig) = ed25519_dalek::Signature::try_from(sig.as_slice()) else {
            return false;
        };
        pk.verify(digest, &sig).is_ok()
    }
}
