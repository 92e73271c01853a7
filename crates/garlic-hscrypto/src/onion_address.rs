//! Parsing of v3 `.onion` addresses.
//!
//! A v3 onion address is `base32(pubkey(32) || checksum(2) || version(1))`,
//! 56 characters, conventionally upper-cased.

use crate::{Error, Result};
use curve25519_dalek::edwards::CompressedEdwardsY;
use data_encoding::BASE32;
use garlic_llcrypto::digest::sha3_256;

const ONION_ADDRESS_LEN_CHARS: usize = 56;
const DECODED_LEN: usize = 35;
const SUPPORTED_VERSION: u8 = 3;

/// A validated v3 onion-service public key, extracted from an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OnionAddress {
    /// The service's 32-byte Ed25519 identity public key.
    pub public_key: [u8; 32],
}

/// Parse and validate a `.onion` address (the `NNN...onion` label, with
/// or without the trailing `.onion` suffix).
pub fn parse(address: &str) -> Result<OnionAddress> {
    let label = address.strip_suffix(".onion").unwrap_or(address);
    if label.len() != ONION_ADDRESS_LEN_CHARS {
        return Err(Error::InvalidOnionAddress);
    }
    let upper = label.to_ascii_uppercase();
    let decoded = BASE32
        .decode(upper.as_bytes())
        .map_err(|_| Error::InvalidOnionAddress)?;
    if decoded.len() != DECODED_LEN {
        return Err(Error::InvalidOnionAddress);
    }

    let mut pk = [0u8; 32];
    pk.copy_from_slice(&decoded[0..32]);
    let checksum = &decoded[32..34];
    let version = decoded[34];

    if version != SUPPORTED_VERSION {
        return Err(Error::InvalidOnionAddress);
    }

    let expected = sha3_256(&[b".onion checksum", &pk, &[SUPPORTED_VERSION]]);
    if checksum != &expected[0..2] {
        return Err(Error::InvalidOnionAddress);
    }

    if CompressedEdwardsY(pk).decompress().is_none() {
        return Err(Error::InvalidOnionAddress);
    }

    Ok(OnionAddress { public_key: pk })
}

/// Encode a public key back into its canonical (upper-case) `.onion` address.
pub fn encode(public_key: &[u8; 32]) -> String {
    let checksum = sha3_256(&[b".onion checksum", public_key, &[SUPPORTED_VERSION]]);
    let mut buf = Vec::with_capacity(DECODED_LEN);
    buf.extend_from_slice(public_key);
    buf.extend_from_slice(&checksum[0..2]);
    buf.push(SUPPORTED_VERSION);
    format!("{}.onion", BASE32.encode(&buf))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_then_parse_round_trips() {
        let pk = curve25519_dalek::constants::ED25519_BASEPOINT_COMPRESSED.to_bytes();
        let addr = encode(&pk);
        let parsed = parse(&addr).unwrap();
        assert_eq!(parsed.public_key, pk);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(parse("short.onion").is_err());
    }

    #[test]
    fn rejects_bad_checksum() {
        let pk = curve25519_dalek::constants::ED25519_BASEPOINT_COMPRESSED.to_bytes();
        let mut addr = encode(&pk);
        // Flip a character in the checksum/version region to corrupt it.
        addr.replace_range(50..51, "A");
        if let Ok(parsed) = parse(&addr) {
            assert_ne!(parsed.public_key, pk, "corrupted address must not parse to the same key silently");
        }
    }
}
