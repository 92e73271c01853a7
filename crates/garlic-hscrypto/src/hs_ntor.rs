//! Client side of the HS ntor handshake.
//!
//! This differs from the link ntor handshake in [`garlic_llcrypto::ntor`]
//! in two ways: it lets the client attach opportunistically-encrypted
//! data to its first message (the plaintext carried inside INTRODUCE1),
//! and it uses SHA3-256/SHAKE256 throughout instead of SHA-256/HKDF.
//! Only the client role is implemented; a client never needs to answer
//! an HS ntor handshake.

use crate::{Error, Result, Subcredential};
use garlic_llcrypto::digest::{sha3_256, shake256};
use x25519_dalek::{PublicKey, StaticSecret};

const PROTOID: &[u8] = b"tor-hs-ntor-curve25519-sha3-256-1";
const T_HSENC: &[u8] = b"tor-hs-ntor-curve25519-sha3-256-1:hs_key_extract";
const T_HSVERIFY: &[u8] = b"tor-hs-ntor-curve25519-sha3-256-1:hs_verify";
const T_HSMAC: &[u8] = b"tor-hs-ntor-curve25519-sha3-256-1:hs_mac";
const T_HSEXPAND: &[u8] = b"tor-hs-ntor-curve25519-sha3-256-1:hs_key_expand";
const SERVER_STR: &[u8] = b"Server";

/// `MAC(key, msg) = SHA3-256(htonll(len(key)) || key || msg)` (rend-spec-v3 §0.3).
fn hs_mac(key: &[u8], msg: &[u8]) -> [u8; 32] {
    sha3_256(&[&(key.len() as u64).to_be_bytes(), key, msg])
}

/// Everything a client needs to know about an introduction point to run
/// the handshake, taken from the service's descriptor.
#[derive(Clone)]
pub struct ServiceInfo {
    /// The intro point's ntor onion key, `B` / `KP_hss_ntor`.
    pub intro_ntor_key: PublicKey,
    /// The intro point's session-id (authentication) key, `AUTH_KEY`.
    pub auth_key: [u8; 32],
    /// The service's current subcredential.
    pub subcredential: Subcredential,
}

/// Client state for one in-flight HS ntor handshake, held between
/// sending INTRODUCE1 and receiving the matching RENDEZVOUS2.
pub struct ClientState {
    service: ServiceInfo,
    x: StaticSecret,
    big_x: PublicKey,
    bx: [u8; 32],
}

/// Derived key material from a completed handshake, ready for
/// [`garlic_llcrypto::digest::shake256`]-based key expansion.
pub struct KeySeed(Vec<u8>);

impl KeySeed {
    /// Expand the seed into `len` bytes of keystream via SHAKE256.
    pub fn expand(&self, len: usize) -> Vec<u8> {
        shake256(&[&self.0], len)
    }
}

impl ClientState {
    /// Begin a handshake against the given introduction point, drawing
    /// a fresh ephemeral Curve25519 secret from `rng`.
    pub fn new(rng: &mut (impl rand_core::RngCore + rand_core::CryptoRng), service: ServiceInfo) -> Self {
        Self::new_from_secret(service, StaticSecret::random_from_rng(rng))
    }

    fn new_from_secret(service: ServiceInfo, x: StaticSecret) -> Self {
        let big_x = PublicKey::from(&x);
        let bx = x.diffie_hellman(&service.intro_ntor_key);
        ClientState {
            service,
            x,
            big_x,
            bx: *bx.as_bytes(),
        }
    }

    /// Encrypt `plaintext` (the INTRODUCE1 extension body) and produce
    /// the `CLIENT_PK || ENCRYPTED_DATA || MAC` block to append after
    /// `intro_header` in the outgoing cell. `intro_header` is included
    /// in the MAC but not encrypted or returned.
    pub fn encrypt_intro(&self, intro_header: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let (enc_key, mac_key) = introduce_key_material(
            &self.bx,
            &self.service.auth_key,
            self.big_x.as_bytes(),
            self.service.intro_ntor_key.as_bytes(),
            &self.service.subcredential,
        );

        let mut ciphertext = plaintext.to_vec();
        garlic_llcrypto::cipher_stream::Aes256CtrKeystream::new(&enc_key).apply(&mut ciphertext);

        let mut mac_body = Vec::with_capacity(intro_header.len() + 32 + ciphertext.len());
        mac_body.extend_from_slice(intro_header);
        mac_body.extend_from_slice(self.big_x.as_bytes());
        mac_body.extend_from_slice(&ciphertext);
        let mac_tag = hs_mac(&mac_key, &mac_body);

        let mut out = Vec::with_capacity(32 + ciphertext.len() + 32);
        out.extend_from_slice(self.big_x.as_bytes());
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&mac_tag);
        out
    }

    /// Consume the body of a RENDEZVOUS2 cell (`SERVER_PK || AUTH`) and,
    /// on success, return the key seed for expanding circuit keys.
    pub fn receive_rendezvous(&self, msg: &[u8]) -> Result<KeySeed> {
        if msg.len() != 32 + 32 {
            return Err(Error::HsHandshakeMacMismatch);
        }
        let mut y_bytes = [0u8; 32];
        y_bytes.copy_from_slice(&msg[0..32]);
        let mut mac_tag = [0u8; 32];
        mac_tag.copy_from_slice(&msg[32..64]);
        let big_y = PublicKey::from(y_bytes);

        let xy = self.x.diffie_hellman(&big_y);
        let xb = self.x.diffie_hellman(&self.service.intro_ntor_key);

        let (seed, expected_mac) = rendezvous_key_material(
            xy.as_bytes(),
            xb.as_bytes(),
            &self.service.auth_key,
            self.service.intro_ntor_key.as_bytes(),
            self.big_x.as_bytes(),
            &y_bytes,
        );

        use subtle::ConstantTimeEq;
        if expected_mac.ct_eq(&mac_tag).unwrap_u8() != 1 {
            return Err(Error::HsHandshakeMacMismatch);
        }

        Ok(seed)
    }
}

/// `(ENC_KEY, MAC_KEY)` for the INTRODUCE1/2 encryption layer.
fn introduce_key_material(bx: &[u8; 32], auth_key: &[u8; 32], big_x: &[u8; 32], b: &[u8; 32], subcredential: &Subcredential) -> ([u8; 32], [u8; 32]) {
    let mut secret_input = Vec::with_capacity(32 * 4 + PROTOID.len());
    secret_input.extend_from_slice(bx);
    secret_input.extend_from_slice(auth_key);
    secret_input.extend_from_slice(big_x);
    secret_input.extend_from_slice(b);
    secret_input.extend_from_slice(PROTOID);
    secret_input.extend_from_slice(T_HSENC);
    secret_input.extend_from_slice(T_HSEXPAND);
    secret_input.extend_from_slice(subcredential);

    let hs_keys = shake256(&[&secret_input], 64);
    let mut enc_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    enc_key.copy_from_slice(&hs_keys[0..32]);
    mac_key.copy_from_slice(&hs_keys[32..64]);
    (enc_key, mac_key)
}

/// `(key seed, AUTH_INPUT_MAC)` for verifying RENDEZVOUS2 and seeding
/// the circuit's layered-encryption keys.
fn rendezvous_key_material(xy: &[u8; 32], xb: &[u8; 32], auth_key: &[u8; 32], b: &[u8; 32], big_x: &[u8; 32], big_y: &[u8; 32]) -> (KeySeed, [u8; 32]) {
    let mut secret_input = Vec::with_capacity(32 * 5 + PROTOID.len());
    secret_input.extend_from_slice(xy);
    secret_input.extend_from_slice(xb);
    secret_input.extend_from_slice(auth_key);
    secret_input.extend_from_slice(b);
    secret_input.extend_from_slice(big_x);
    secret_input.extend_from_slice(big_y);
    secret_input.extend_from_slice(PROTOID);

    let ntor_key_seed = hs_mac(&secret_input, T_HSENC);
    let verify = hs_mac(&secret_input, T_HSVERIFY);

    let mut auth_input = Vec::with_capacity(32 + 32 * 4 + PROTOID.len() + SERVER_STR.len());
    auth_input.extend_from_slice(&verify);
    auth_input.extend_from_slice(auth_key);
    auth_input.extend_from_slice(b);
    auth_input.extend_from_slice(big_y);
    auth_input.extend_from_slice(big_x);
    auth_input.extend_from_slice(PROTOID);
    auth_input.extend_from_slice(SERVER_STR);
    let auth_input_mac = hs_mac(&auth_input, T_HSMAC);

    let mut kdf_seed = Vec::with_capacity(32 + T_HSEXPAND.len());
    kdf_seed.extend_from_slice(&ntor_key_seed);
    kdf_seed.extend_from_slice(T_HSEXPAND);

    (KeySeed(kdf_seed), auth_input_mac)
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    fn secret_from(bytes: [u8; 32]) -> StaticSecret {
        StaticSecret::from(bytes)
    }

    /// C-tor/chutney-generated test vector, covering the full client
    /// round trip against a fixed service keypair.
    #[test]
    fn testvec() {
        let kp_hs_ipt_sid = hex!("34E171E4358E501BFF21ED907E96AC6BFEF697C779D040BBAF49ACC30FC5D21F");
        let subcredential: Subcredential = hex!("0085D26A9DEBA252263BF0231AEAC59B17CA11BAD8A218238AD6487CBAD68B57");
        let kp_hss_ntor = hex!("8E5127A40E83AABF6493E41F142B6EE3604B85A3961CD7E38D247239AFF71979");
        let key_x = hex!("60B4D6BF5234DCF87A4E9D7487BDF3F4A69B6729835E825CA29089CFDDA1E341");

        let service = ServiceInfo {
            intro_ntor_key: PublicKey::from(kp_hss_ntor),
            auth_key: kp_hs_ipt_sid,
            subcredential,
        };

        let state = ClientState::new_from_secret(service, secret_from(key_x));

        let intro_header = hex!(
            "000000000000000000000000000000000000000002002034E171E4358E501BFF
             21ED907E96AC6BFEF697C779D040BBAF49ACC30FC5D21F00"
        );
        let intro_body = hex!(
            "6BD364C12638DD5C3BE23D76ACA05B04E6CE932C0101000100200DE6130E4FCA
             C4EDDA24E21220CC3EADAE403EF6B7D11C8273AC71908DE565450300067F0000
             0113890214F823C4F8CC085C792E0AEE0283FE00AD7520B37D0320728D5DF39B
             7B7077A0118A900FF4456C382F0041300ACF9C58E51C392795EF870000000000
             0000000000000000000000000000000000000000000000000000000000000000
             000000000000000000000000000000000000000000000000000000000000"
        );

        let encrypted = state.encrypt_intro(&intro_header, &intro_body);
        let mut cell_out = intro_header.to_vec();
        cell_out.extend_from_slice(&encrypted);

        let expected = hex!(
            "000000000000000000000000000000000000000002002034E171E4358E501BFF
             21ED907E96AC6BFEF697C779D040BBAF49ACC30FC5D21F00BF04348B46D09AED
             726F1D66C618FDEA1DE58E8CB8B89738D7356A0C59111D5DADBECCCB38E37830
             4DCC179D3D9E437B452AF5702CED2CCFEC085BC02C4C175FA446525C1B9D5530
             563C362FDFFB802DAB8CD9EBC7A5EE17DA62E37DEEB0EB187FBB48C63298B0E8
             3F391B7566F42ADC97C46BA7588278273A44CE96BC68FFDAE31EF5F0913B9A9C
             7E0F173DBC0BDDCD4ACB4C4600980A7DDD9EAEC6E7F3FA3FC37CD95E5B8BFB3E
             35717012B78B4930569F895CB349A07538E42309C993223AEA77EF8AEA64F25D
             DEE97DA623F1AEC0A47F150002150455845C385E5606E41A9A199E7111D54EF2
             D1A51B7554D8B3692D85AC587FB9E69DF990EFB776D8"
        );
        assert_eq!(cell_out, expected.to_vec());

        let service_reply = hex!(
            "8fbe0db4d4a9c7ff46701e3e0ee7fd05cd28be4f302460addeec9e93354ee70
             04A92E8437B8424D5E5EC279245D5C72B25A0327ACF6DAF902079FCB643D8B208"
        );
        let seed = state.receive_rendezvous(&service_reply).unwrap();
        let got = seed.expand(128);

        let mut expected_seed = hex!("4D0C72FE8AFF35559D95ECC18EB5A36883402B28CDFD48C8A530A5A3D7D578DB").to_vec();
        expected_seed.extend_from_slice(T_HSEXPAND);
        let expected_bytes = shake256(&[&expected_seed], 128);
        assert_eq!(got, expected_bytes);
    }

    #[test]
    fn rejects_bad_mac() {
        let service = ServiceInfo {
            intro_ntor_key: PublicKey::from([7u8; 32]),
            auth_key: [9u8; 32],
            subcredential: [1u8; 32],
        };
        let state = ClientState::new_from_secret(service, secret_from([3u8; 32]));
        let bogus_reply = [0u8; 64];
        assert!(state.receive_rendezvous(&bogus_reply).is_err());
    }
}
