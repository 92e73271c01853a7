//! Running digests for the per-hop relay-cell digest chain.
//!
//! Each hop keeps one running hash per direction. Every relay cell
//! routed through that hop (with its digest field zeroed) is folded
//! into the hash; the first four bytes of the hash's *current* output
//! become that cell's digest, but the hash state itself is never reset
//! — later cells continue hashing from where the previous one left
//! off. Verification does the same thing against a scratch copy of the
//! peer's digest state and only commits the copy back if the digest
//! matched.

use sha1::Sha1;
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::{Digest, Sha3_256, Shake256};

/// A running digest seeded with a per-hop key, producing a 4-byte
/// prefix on demand without consuming its own state.
pub trait RunningDigest: Clone {
    /// Seed a fresh running digest with the expanded per-hop key.
    fn new_seeded(key: &[u8]) -> Self;
    /// Fold `data` into the running hash.
    fn update(&mut self, data: &[u8]);
    /// Return the first four bytes of `finalize()` applied to a *clone*
    /// of the current state, leaving this digest's state untouched.
    fn peek_prefix4(&self) -> [u8; 4];
    /// Return the full `finalize()` output of a *clone* of the current
    /// state, used as the v1 tag of an outbound SENDME.
    fn peek_full(&self) -> Vec<u8>;
}

/// SHA-1 running digest, used for ordinary circuit hops.
#[derive(Clone)]
pub struct Sha1RunningDigest(Sha1);

impl RunningDigest for Sha1RunningDigest {
    fn new_seeded(key: &[u8]) -> Self {
        let mut h = Sha1::new();
        Digest::update(&mut h, key);
        Sha1RunningDigest(h)
    }
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }
    fn peek_prefix4(&self) -> [u8; 4] {
        let out = self.0.clone().finalize();
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&out[..4]);
        prefix
    }
    fn peek_full(&self) -> Vec<u8> {
        self.0.clone().finalize().to_vec()
    }
}

/// SHA3-256 running digest, used for the hidden-service rendezvous hop.
#[derive(Clone)]
pub struct Sha3RunningDigest(Sha3_256);

impl RunningDigest for Sha3RunningDigest {
    fn new_seeded(key: &[u8]) -> Self {
        let mut h = Sha3_256::new();
        Digest::update(&mut h, key);
        Sha3RunningDigest(h)
    }
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }
    fn peek_prefix4(&self) -> [u8; 4] {
        let out = self.0.clone().finalize();
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&out[..4]);
        prefix
    }
    fn peek_full(&self) -> Vec<u8> {
        self.0.clone().finalize().to_vec()
    }
}

/// One-shot SHA3-256, used throughout the HSDir index and blinding math.
pub fn sha3_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha3_256::new();
    for p in parts {
        Digest::update(&mut h, p);
    }
    h.finalize().into()
}

/// One-shot SHAKE256 with a caller-chosen output length, used for the
/// HS descriptor encryption layers and the HS ntor key expansion.
pub fn shake256(parts: &[&[u8]], out_len: usize) -> Vec<u8> {
    let mut h = Shake256::default();
    for p in parts {
        Update::update(&mut h, p);
    }
    let mut reader = h.finalize_xof();
    let mut out = vec![0u8; out_len];
    reader.read(&mut out);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn running_digest_is_append_only() {
        let mut d = Sha1RunningDigest::new_seeded(b"key");
        d.update(b"first");
        let p1 = d.peek_prefix4();
        d.update(b"second");
        let p2 = d.peek_prefix4();
        // Two sequential updates must produce different prefixes (with
        // overwhelming probability) and peeking must not mutate state.
        assert_ne!(p1, p2);
        let p2_again = d.peek_prefix4();
        assert_eq!(p2, p2_again);
    }
}
