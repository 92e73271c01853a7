//! Ed25519 public-key blinding and subcredential derivation
//! (rend-spec-v3 §A.2).

use crate::{Error, Result, Subcredential};
use curve25519_dalek::constants::ED25519_BASEPOINT_COMPRESSED;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use garlic_llcrypto::digest::sha3_256;

/// A blinded Ed25519 public key: time-period-scoped, derived from a
/// service's long-term identity key.
pub type BlindedPublicKey = [u8; 32];

/// Derive the blinded public key for `pk` at the given time period.
///
/// Rejects `pk` if it does not decode to a valid point on the curve.
pub fn blind_public_key(pk: &[u8; 32], time_period_num: u64, time_period_length: u64) -> Result<BlindedPublicKey> {
    let point = CompressedEdwardsY(*pk).decompress().ok_or(Error::BadPublicKey)?;

    let param = sha3_256(&[
        b"Derive temporary signing key\0",
        pk,
        ED25519_BASEPOINT_COMPRESSED.as_bytes(),
        b"key-blind",
        &time_period_num.to_be_bytes(),
        &time_period_length.to_be_bytes(),
    ]);

    let h = Scalar::from_bits_clamped(param);
    let blinded_point = point * h;
    Ok(blinded_point.compress().to_bytes())
}

/// Compute the subcredential binding `pk` to `blinded_pk` for the
/// current time period: `SHA3-256("subcredential" || SHA3-256("credential" || pk) || blinded_pk)`.
pub fn subcredential(pk: &[u8; 32], blinded_pk: &BlindedPublicKey) -> Subcredential {
    let credential = sha3_256(&[b"credential", pk]);
    sha3_256(&[b"subcredential", &credential, blinded_pk])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blinding_rejects_off_curve_points() {
        // All-0xFF is not a valid compressed Edwards point.
        let bogus = [0xFFu8; 32];
        assert!(blind_public_key(&bogus, 42, 1440).is_err());
    }

    #[test]
    fn blinding_is_deterministic() {
        let pk = ED25519_BASEPOINT_COMPRESSED.to_bytes();
        let a = blind_public_key(&pk, 42, 1440).unwrap();
        let b = blind_public_key(&pk, 42, 1440).unwrap();
        assert_eq!(a, b);
        let c = blind_public_key(&pk, 43, 1440).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn subcredential_changes_with_blinded_key() {
        let pk = ED25519_BASEPOINT_COMPRESSED.to_bytes();
        let bpk1 = blind_public_key(&pk, 1, 1440).unwrap();
        let bpk2 = blind_public_key(&pk, 2, 1440).unwrap();
        assert_ne!(subcredential(&pk, &bpk1), subcredential(&pk, &bpk2));
    }
}
