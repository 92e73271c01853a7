//! A growable byte buffer that zeroizes its contents on drop.

use std::ops::Deref;
use zeroize::{Zeroize, Zeroizing};

/// A `Vec<u8>`-like buffer for key material, wiped when dropped.
///
/// Handshake code accumulates `secret_input`/KDF seeds into one of
/// these rather than a bare `Vec<u8>` so that the intermediate secrets
/// don't linger in memory after the handshake completes.
#[derive(Default)]
pub struct SecretBuf(Zeroizing<Vec<u8>>);

impl SecretBuf {
    /// Construct an empty buffer.
    pub fn new() -> Self {
        SecretBuf(Zeroizing::new(Vec::new()))
    }

    /// Append raw bytes.
    pub fn write(&mut self, bytes: impl AsRef<[u8]>) {
        self.0.extend_from_slice(bytes.as_ref());
    }

    /// Append a big-endian `u64`.
    pub fn write_u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    /// Append one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.0.push(v);
    }
}

impl Deref for SecretBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for SecretBuf {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
