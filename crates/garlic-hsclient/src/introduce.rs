//! INTRODUCE1 payload construction.
//!
//! The cell has a cleartext header addressed to the introduction point
//! (which relay key identifies the service) and an HS-ntor-encrypted
//! extension meant only for the service, carrying the rendezvous
//! cookie and where to find the rendezvous point.

use garlic_bytes::Writer;
use garlic_hscrypto::hs_ntor::ClientState;

/// `AUTH_KEY_TYPE` for an Ed25519 session-id key (the only kind v3
/// services use).
const AUTH_KEY_TYPE_ED25519: u8 = 2;
/// `ONION_KEY_TYPE` for a Curve25519 ntor key (the only kind this
/// client offers the service to extend to).
const ONION_KEY_TYPE_NTOR: u8 = 1;
/// Length of a rendezvous cookie (rend-spec-v3 §3.2).
pub const COOKIE_LEN: usize = 20;

/// Build the full INTRODUCE1 relay-cell body: the cleartext header
/// (`LEGACY_KEY_ID || AUTH_KEY_TYPE || AUTH_KEY_LEN || AUTH_KEY ||
/// N_EXTENSIONS=0`) followed by the HS-ntor-encrypted extension
/// (`CLIENT_PK || encrypted_payload || MAC`), where the encrypted
/// payload is `cookie || N_EXTENSIONS=0 || ONION_KEY_TYPE=1 ||
/// ONION_KEY_LEN=32 || ONION_KEY || link_specifiers(RP)`.
pub fn build_introduce1_body(
    client_state: &ClientState,
    auth_key: &[u8; 32],
    cookie: &[u8; COOKIE_LEN],
    rp_ntor_key: [u8; 32],
    rp_link_specifiers: Vec<u8>,
) -> Vec<u8> {
    let mut header = Writer::new();
    header.write([0u8; 20]); // LEGACY_KEY_ID, meaningless for a v3 service
    header.write_u8(AUTH_KEY_TYPE_ED25519);
    header.write_u16(auth_key.len() as u16);
    header.write(auth_key);
    header.write_u8(0); // N_EXTENSIONS
    let header = header.into_vec();

    let mut plaintext = Writer::new();
    plaintext.write(cookie);
    plaintext.write_u8(0); // N_EXTENSIONS
    plaintext.write_u8(ONION_KEY_TYPE_NTOR);
    plaintext.write_u16(rp_ntor_key.len() as u16);
    plaintext.write(rp_ntor_key);
    plaintext.write(rp_link_specifiers);

    let mut body = header.clone();
    body.extend_from_slice(&client_state.encrypt_intro(&header, &plaintext.into_vec()));
    body
}

#[cfg(test)]
mod test {
    use super::*;
    use garlic_hscrypto::hs_ntor::ServiceInfo;
    use rand::rngs::OsRng;

    #[test]
    fn introduce1_body_starts_with_the_cleartext_header() {
        let service = ServiceInfo {
            intro_ntor_key: x25519_dalek::PublicKey::from([7u8; 32]),
            auth_key: [9u8; 32],
            subcredential: [1u8; 32],
        };
        let state = ClientState::new(&mut OsRng, service);
        let cookie = [3u8; COOKIE_LEN];
        let body = build_introduce1_body(&state, &[9u8; 32], &cookie, [8u8; 32], vec![0u8]);

        assert_eq!(&body[0..20], &[0u8; 20], "LEGACY_KEY_ID is zeroed");
        assert_eq!(body[20], AUTH_KEY_TYPE_ED25519);
        assert_eq!(u16::from_be_bytes([body[21], body[22]]), 32);
        assert_eq!(&body[23..55], &[9u8; 32], "AUTH_KEY echoes the intro point's session id");
        assert_eq!(body[55], 0, "header ends with N_EXTENSIONS=0");
        // 56B header + 32B CLIENT_PK + ciphertext + 32B MAC.
        assert!(body.len() > 56 + 32 + 32);
    }

    #[test]
    fn introduce1_body_length_grows_with_link_specifiers() {
        let service = ServiceInfo {
            intro_ntor_key: x25519_dalek::PublicKey::from([2u8; 32]),
            auth_key: [4u8; 32],
            subcredential: [6u8; 32],
        };
        let state = ClientState::new(&mut OsRng, service);
        let cookie = [5u8; COOKIE_LEN];
        let short = build_introduce1_body(&state, &[4u8; 32], &cookie, [1u8; 32], vec![0u8]);
        let long = build_introduce1_body(&state, &[4u8; 32], &cookie, [1u8; 32], vec![1, 0, 6, 1, 2, 3, 4, 5, 6]);
        assert!(long.len() > short.len());
    }
}
