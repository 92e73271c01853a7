//! The client side of Tor's link-level ntor handshake.
//!
//! This client never answers a CREATE2/EXTEND2 itself — it only ever
//! plays the client role, extending circuits outward — so only
//! `client1`/`client2` are provided; there is no `ServerHandshake`
//! counterpart to maintain.

use crate::{Error, Result};
use garlic_bytes::SecretBuf;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::{CryptoRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

const PROTOID: &[u8] = b"ntor-curve25519-sha256-1";

fn protoid_tag(suffix: &str) -> Vec<u8> {
    let mut v = PROTOID.to_vec();
    v.extend_from_slice(suffix.as_bytes());
    v
}

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// The relay-facing identity needed to extend to it: its 20-byte
/// fingerprint and its 32-byte ntor onion key.
#[derive(Clone)]
pub struct NtorPublicKey {
    /// The relay's 20-byte RSA fingerprint (`ID` in the handshake algebra).
    pub id: [u8; 20],
    /// The relay's Curve25519 ntor onion key (`B`).
    pub b: PublicKey,
}

/// Client-held state between sending CREATE2/EXTEND2 and receiving the reply.
pub struct ClientState {
    x: StaticSecret,
    x_pub: PublicKey,
    b: PublicKey,
    id: [u8; 20],
}

/// The four session keys produced by a successful handshake, split out
/// of the handshake's final key-derivation expansion.
pub struct NtorKeys {
    /// 20-byte key seeding the forward (client→relay) digest chain.
    pub forward_digest_key: [u8; 20],
    /// 20-byte key seeding the backward (relay→client) digest chain.
    pub backward_digest_key: [u8; 20],
    /// 16-byte AES-128 key for the forward cipher.
    pub forward_cipher_key: [u8; 16],
    /// 16-byte AES-128 key for the backward cipher.
    pub backward_cipher_key: [u8; 16],
}

/// Begin a handshake: generate an ephemeral keypair and return the
/// state to complete it, along with the 32-byte `X` to send as part of
/// the CREATE2/EXTEND2 payload (`ID || B || X`).
pub fn client1<R: RngCore + CryptoRng>(rng: &mut R, relay: &NtorPublicKey) -> (ClientState, [u8; 32]) {
    let x = StaticSecret::random_from_rng(rng);
    let x_pub = PublicKey::from(&x);
    let state = ClientState { x, x_pub, b: relay.b, id: relay.id };
    (state, x_pub.to_bytes())
}

/// Complete a handshake given the relay's `Y` and the 32-byte auth tag
/// it returned in CREATED2/EXTENDED2.
pub fn client2(state: ClientState, y_bytes: [u8; 32], auth_received: [u8; 32]) -> Result<NtorKeys> {
    let y = PublicKey::from(y_bytes);

    let exp_yx = state.x.diffie_hellman(&y);
    let exp_bx = state.x.diffie_hellman(&state.b);

    let mut secret_input = SecretBuf::new();
    secret_input.write(exp_yx.as_bytes());
    secret_input.write(exp_bx.as_bytes());
    secret_input.write(state.id);
    secret_input.write(state.b.as_bytes());
    secret_input.write(state.x_pub.as_bytes());
    secret_input.write(y.as_bytes());
    secret_input.write(PROTOID);

    let key_seed = hmac_sha256(&protoid_tag(":key_extract"), &secret_input);
    let verify = hmac_sha256(&protoid_tag(":verify"), &secret_input);

    let mut auth_input = Vec::new();
    auth_input.extend_from_slice(&verify);
    auth_input.extend_from_slice(&state.id);
    auth_input.extend_from_slice(state.b.as_bytes());
    auth_input.extend_from_slice(y.as_bytes());
    auth_input.extend_from_slice(state.x_pub.as_bytes());
    auth_input.extend_from_slice(PROTOID);
    auth_input.extend_from_slice(b"Server");

    let expected_auth = hmac_sha256(&protoid_tag(":mac"), &auth_input);
    if expected_auth.ct_eq(&auth_received).unwrap_u8() != 1 {
        return Err(Error::NtorAuthMismatch);
    }

    let hkdf = Hkdf::<Sha256>::from_prk(&key_seed).map_err(|_| Error::NtorAuthMismatch)?;
    let mut okm = [0u8; 72];
    hkdf.expand(&protoid_tag(":key_expand"), &mut okm)
        .map_err(|_| Error::NtorAuthMismatch)?;

    let mut forward_digest_key = [0u8; 20];
    let mut backward_digest_key = [0u8; 20];
    let mut forward_cipher_key = [0u8; 16];
    let mut backward_cipher_key = [0u8; 16];
    forward_digest_key.copy_from_slice(&okm[0..20]);
    backward_digest_key.copy_from_slice(&okm[20..40]);
    forward_cipher_key.copy_from_slice(&okm[40..56]);
    backward_cipher_key.copy_from_slice(&okm[56..72]);
    okm.zeroize();

    Ok(NtorKeys { forward_digest_key, backward_digest_key, forward_cipher_key, backward_cipher_key })
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn handshake_succeeds_between_matching_client_and_relay() {
        let mut rng = OsRng;
        let relay_x = StaticSecret::random_from_rng(&mut rng);
        let relay_pub = PublicKey::from(&relay_x);
        let relay_id = [9u8; 20];
        let relay = NtorPublicKey { id: relay_id, b: relay_pub };

        let (state, x_bytes) = client1(&mut rng, &relay);
        let x_pub = PublicKey::from(x_bytes);

        // Emulate the relay side algebraically (no ServerHandshake type
        // exists in this client-only crate).
        let y_secret = StaticSecret::random_from_rng(&mut rng);
        let y_pub = PublicKey::from(&y_secret);
        let exp_yx = y_secret.diffie_hellman(&x_pub);
        let exp_bx = relay_x.diffie_hellman(&x_pub);

        let mut secret_input = SecretBuf::new();
        secret_input.write(exp_yx.as_bytes());
        secret_input.write(exp_bx.as_bytes());
        secret_input.write(relay_id);
        secret_input.write(relay_pub.as_bytes());
        secret_input.write(x_pub.as_bytes());
        secret_input.write(y_pub.as_bytes());
        secret_input.write(PROTOID);
        let verify = hmac_sha256(&protoid_tag(":verify"), &secret_input);
        let mut auth_input = Vec::new();
        auth_input.extend_from_slice(&verify);
        auth_input.extend_from_slice(&relay_id);
        auth_input.extend_from_slice(relay_pub.as_bytes());
        auth_input.extend_from_slice(y_pub.as_bytes());
        auth_input.extend_from_slice(x_pub.as_bytes());
        auth_input.extend_from_slice(PROTOID);
        auth_input.extend_from_slice(b"Server");
        let auth = hmac_sha256(&protoid_tag(":mac"), &auth_input);

        let keys = client2(state, y_pub.to_bytes(), auth).unwrap();
        assert_ne!(keys.forward_cipher_key, keys.backward_cipher_key);
    }

    #[test]
    fn handshake_rejects_bad_auth_tag() {
        let mut rng = OsRng;
        let relay_x = StaticSecret::random_from_rng(&mut rng);
        let relay = NtorPublicKey { id: [1u8; 20], b: PublicKey::from(&relay_x) };
        let (state, _x_bytes) = client1(&mut rng, &relay);
        let y_pub = PublicKey::from(&StaticSecret::random_from_rng(&mut rng));
        let result = client2(state, y_pub.to_bytes(), [0u8; 32]);
        assert!(result.is_err());
    }
}
