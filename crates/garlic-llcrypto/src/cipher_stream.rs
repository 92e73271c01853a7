//! AES-CTR keystreams used for per-hop relay-cell encryption and for
//! the HS-descriptor encryption layers.
//!
//! Ordinary circuit hops use 128-bit keys with the IV fixed at zero
//!; the HS rendezvous hop and the descriptor-layer
//! decryption use 256-bit keys, also with a zero IV, except where the
//! descriptor format specifies an explicit salt-derived IV.

use aes::{Aes128, Aes256};
use cipher::{KeyIvInit, StreamCipher as _};
use ctr::Ctr128BE;

/// A keyed AES-128-CTR keystream, started at IV = 0.
pub struct Aes128CtrKeystream(Ctr128BE<Aes128>);

impl Aes128CtrKeystream {
    /// Key a fresh keystream with a 16-byte key, IV zero.
    pub fn new(key: &[u8; 16]) -> Self {
        Aes128CtrKeystream(Ctr128BE::<Aes128>::new(key.into(), &[0u8; 16].into()))
    }

    /// XOR `buf` in place with the next `buf.len()` keystream bytes.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.0.apply_keystream(buf);
    }
}

/// A keyed AES-256-CTR keystream.
pub struct Aes256CtrKeystream(Ctr128BE<Aes256>);

impl Aes256CtrKeystream {
    /// Key a fresh keystream with a 32-byte key, IV zero.
    pub fn new(key: &[u8; 32]) -> Self {
        Aes256CtrKeystream(Ctr128BE::<Aes256>::new(key.into(), &[0u8; 16].into()))
    }

    /// Key a fresh keystream with a 32-byte key and an explicit 16-byte
    /// IV, as used when decrypting HS-descriptor layers (the IV there
    /// is derived from the layer's salt, not zero).
    pub fn new_with_iv(key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Aes256CtrKeystream(Ctr128BE::<Aes256>::new(key.into(), iv.into()))
    }

    /// XOR `buf` in place with the next `buf.len()` keystream bytes.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.0.apply_keystream(buf);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_with_fresh_keystream_is_identity() {
        let key = [7u8; 16];
        let mut enc = Aes128CtrKeystream::new(&key);
        let mut buf = b"relay cell payload bytes go here".to_vec();
        let orig = buf.clone();
        enc.apply(&mut buf);
        assert_ne!(buf, orig);
        let mut dec = Aes128CtrKeystream::new(&key);
        dec.apply(&mut buf);
        assert_eq!(buf, orig);
    }
}
