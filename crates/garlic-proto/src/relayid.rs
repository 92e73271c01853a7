//! The minimal identity a relay needs to be extended to: enough for
//! CREATE2/EXTEND2 and a TCP dial, nothing else. Kept independent of
//! `garlic-netdir`'s richer `Router` type so this crate has no
//! dependency on the network-status registry — callers (the racer,
//! the network-status registry's own HSDir-fetch path) convert from
//! whatever router representation they hold.

use garlic_llcrypto::ntor::NtorPublicKey;
use std::net::SocketAddr;

/// Enough information about a relay to dial it and extend a circuit to it.
#[derive(Clone)]
pub struct RelayIdentity {
    /// The relay's 20-byte RSA fingerprint.
    pub id: [u8; 20],
    /// The relay's Curve25519 ntor onion key.
    pub ntor_key: x25519_dalek::PublicKey,
    /// Where to reach the relay: its OR port for the first hop, unused
    /// for later hops (EXTEND2 carries its own link specifiers, built
    /// from this same data by the caller).
    pub addr: SocketAddr,
}

impl RelayIdentity {
    /// Borrow this relay's identity as the pair [`garlic_llcrypto::ntor`]
    /// expects for the client side of a handshake.
    pub fn as_ntor_public_key(&self) -> NtorPublicKey {
        NtorPublicKey { id: self.id, b: self.ntor_key }
    }

    /// Encode this relay's EXTEND2 link specifiers: an IPv4 specifier
    /// (LSTYPE 0) followed by a legacy-identity specifier (LSTYPE 2)
    /// carrying the RSA fingerprint. Every relay this client extends to
    /// was itself reached over IPv4 (see [`crate::tls::connect`]), so
    /// there's no IPv6 case to encode here.
    pub fn link_specifiers(&self) -> Vec<u8> {
        let mut specs = Vec::new();
        let mut n: u8 = 0;
        if let SocketAddr::V4(v4) = self.addr {
            specs.push(0u8);
            specs.push(6u8);
            specs.extend_from_slice(&v4.ip().octets());
            specs.extend_from_slice(&v4.port().to_be_bytes());
            n += 1;
        }
        specs.push(2u8);
        specs.push(self.id.len() as u8);
        specs.extend_from_slice(&self.id);
        n += 1;

        let mut out = Vec::with_capacity(1 + specs.len());
        out.push(n);
        out.extend_from_slice(&specs);
        out
    }
}
