//! Hidden-service descriptor fetch and decryption: open a 2-hop
//! circuit to an HSDir candidate, `GET /tor/hs/3/<bpk>`, then peel the
//! descriptor's superencrypted and encrypted layers.

use crate::dirclient::{decompress, encode_request, parse_headers};
use crate::hsdir::HsDirRing;
use crate::router::Router;
use crate::status::NetworkStatus;
use crate::{Error, Result};
use garlic_hscrypto::blinding::{blind_public_key, subcredential, BlindedPublicKey};
use garlic_hscrypto::onion_address::OnionAddress;
use garlic_hscrypto::Subcredential;
use garlic_llcrypto::cipher_stream::Aes256CtrKeystream;
use garlic_llcrypto::digest::{sha3_256, shake256};
use garlic_proto::circuit::TlsCircuit;
use garlic_proto::stream::StreamEvent;
use rand::seq::SliceRandom;
use rand_core::{CryptoRng, RngCore};

const SUPERENCRYPTED_CONST: &[u8] = b"hsdir-superencrypted-data";
const ENCRYPTED_CONST: &[u8] = b"hsdir-encrypted-data";

/// One introduction point, decoded from a fetched descriptor.
#[derive(Debug, Clone)]
pub struct IntroductionPoint {
    /// The intro point relay's identity, built from its link specifiers
    /// and own ntor onion key (the two coincide with the fields
    /// `garlic_proto::relayid::RelayIdentity` needs, so no separate
    /// consensus lookup is required to dial it).
    pub relay: garlic_proto::relayid::RelayIdentity,
    /// 32-byte Curve25519 encryption key used in the HS ntor handshake.
    pub enc_key_ntor: [u8; 32],
    /// 32-byte Ed25519 authentication key (the intro point's session id).
    pub auth_key: [u8; 32],
    /// The service's subcredential for the time period this descriptor
    /// was fetched under.
    pub subcredential: Subcredential,
}

/// Decode an intro point's raw link-specifiers blob into a dialable
/// relay identity, pairing it with the record's own ntor onion key.
fn decode_link_specifiers(blob: &[u8], ntor_key: [u8; 32]) -> Option<garlic_proto::relayid::RelayIdentity> {
    if blob.is_empty() {
        return None;
    }
    let n_spec = blob[0] as usize;
    let mut pos = 1;
    let mut addr = None;
    let mut fingerprint = None;
    for _ in 0..n_spec {
        if pos + 2 > blob.len() {
            return None;
        }
        let ls_type = blob[pos];
        let ls_len = blob[pos + 1] as usize;
        pos += 2;
        if pos + ls_len > blob.len() {
            return None;
        }
        let spec = &blob[pos..pos + ls_len];
        match ls_type {
            0 if ls_len == 6 => {
                let ip = std::net::Ipv4Addr::new(spec[0], spec[1], spec[2], spec[3]);
                let port = u16::from_be_bytes([spec[4], spec[5]]);
                addr = Some(std::net::SocketAddr::new(ip.into(), port));
            }
            2 if ls_len == 20 => {
                let mut fp = [0u8; 20];
                fp.copy_from_slice(spec);
                fingerprint = Some(fp);
            }
            _ => {}
        }
        pos += ls_len;
    }
    Some(garlic_proto::relayid::RelayIdentity {
        id: fingerprint?,
        ntor_key: x25519_dalek::PublicKey::from(ntor_key),
        addr: addr?,
    })
}

fn decrypt_layer(secret_input: &[u8], blob: &[u8], constant: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < 16 + 32 {
        return Err(Error::BadResponse("descriptor layer too short to contain salt and MAC"));
    }
    let salt = &blob[0..16];
    let ciphertext = &blob[16..blob.len() - 32];
    let mac_tag = &blob[blob.len() - 32..];

    let keys = shake256(&[secret_input, salt, constant], 32 + 16 + 32);
    let (enc_key, rest) = keys.split_at(32);
    let (iv, mac_key) = rest.split_at(16);

    let computed_mac = sha3_256(&[&(mac_key.len() as u64).to_be_bytes(), mac_key, &(salt.len() as u64).to_be_bytes(), salt, ciphertext]);
    use subtle::ConstantTimeEq;
    if computed_mac.ct_eq(mac_tag).unwrap_u8() != 1 {
        return Err(Error::BadResponse("descriptor layer MAC did not match"));
    }

    let mut plaintext = ciphertext.to_vec();
    let key: [u8; 32] = enc_key.try_into().expect("enc_key is exactly 32 bytes");
    let iv: [u8; 16] = iv.try_into().expect("iv is exactly 16 bytes");
    Aes256CtrKeystream::new_with_iv(&key, &iv).apply(&mut plaintext);
    Ok(plaintext)
}

fn decode_descriptor(raw: &str, blinded_pk: &BlindedPublicKey, subcred: &Subcredential) -> Result<Vec<IntroductionPoint>> {
    let outer = garlic_netdoc::hsdesc::parse_outer(raw)?;

    let mut secret_input = Vec::with_capacity(32 + 32 + 8);
    secret_input.extend_from_slice(blinded_pk);
    secret_input.extend_from_slice(subcred);
    secret_input.extend_from_slice(&outer.revision_counter.to_be_bytes());

    let superencrypted_plain = decrypt_layer(&secret_input, &outer.superencrypted, SUPERENCRYPTED_CONST)?;
    let superencrypted_text = String::from_utf8(superencrypted_plain).map_err(|_| Error::BadResponse("superencrypted layer was not valid UTF-8"))?;
    let encrypted_blob = garlic_netdoc::hsdesc::parse_superencrypted(&superencrypted_text)?;

    let encrypted_plain = decrypt_layer(&secret_input, &encrypted_blob, ENCRYPTED_CONST)?;
    let encrypted_text = String::from_utf8(encrypted_plain).map_err(|_| Error::BadResponse("encrypted layer was not valid UTF-8"))?;
    let parsed_points = garlic_netdoc::hsdesc::parse_encrypted(&encrypted_text)?;

    let points = parsed_points
        .into_iter()
        .filter_map(|p| {
            let relay = decode_link_specifiers(&p.link_specifiers, p.onion_key_ntor)?;
            Some(IntroductionPoint { relay, enc_key_ntor: p.enc_key_ntor, auth_key: p.auth_key, subcredential: *subcred })
        })
        .collect();
    Ok(points)
}

async fn get_over_dir_stream(circ: &mut TlsCircuit, path: &str) -> Result<Vec<u8>> {
    let req = http::Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", "hsdir")
        .header("Connection", "close")
        .body(())
        .map_err(|_| Error::BadResponse("could not build HS descriptor request"))?;
    let stream_id = circ.begin_dir().await?;
    circ.send_data(stream_id, encode_request(&req).as_bytes()).await?;

    let mut raw = Vec::new();
    let header = loop {
        match circ.recv_event(stream_id).await? {
            StreamEvent::Connected => continue,
            StreamEvent::Data(chunk) => {
                raw.extend_from_slice(&chunk);
                if let Some(h) = parse_headers(&raw)? {
                    break h;
                }
            }
            StreamEvent::Closed(_) => return Err(Error::BadResponse("HSDir closed the stream before headers completed")),
        }
    };
    if header.status != 200 {
        return Err(Error::BadResponse("HSDir returned a non-200 status"));
    }
    let mut body = raw.split_off(header.body_start);
    loop {
        match circ.recv_event(stream_id).await? {
            StreamEvent::Connected => continue,
            StreamEvent::Data(chunk) => body.extend_from_slice(&chunk),
            StreamEvent::Closed(_) => break,
        }
    }
    decompress(&body, header.encoding.as_deref())
}

/// Fetch and decode the descriptor for `address` as of time period
/// `tpn`, trying candidates from the HSDir ring in random order until
/// one succeeds.
pub async fn fetch<R: RngCore + CryptoRng>(ns: &NetworkStatus, address: &OnionAddress, tpn: u64, rng: &mut R) -> Result<Vec<IntroductionPoint>> {
    let tpl = ns.time_period_length_minutes;
    let blinded_pk = blind_public_key(&address.public_key, tpn, tpl)?;
    let subcred = subcredential(&address.public_key, &blinded_pk);

    let ring = HsDirRing::build(ns, tpn);
    let mut candidates = ring.candidates_for(&blinded_pk, tpl, tpn, ns.hsdir_n_replicas, ns.hsdir_spread_store);
    candidates.shuffle(rng);

    let path = format!("/tor/hs/3/{}", base64_no_pad(&blinded_pk));

    let fast_routers: Vec<Router> = ns.fast_routers().filter(|r| r.has_ntor_key()).cloned().collect();

    for hsdir_fp in candidates {
        let Some(hsdir) = ns.router_by_fingerprint(&hsdir_fp).filter(|r| r.has_ntor_key()) else {
            continue;
        };
        let Some(fast) = fast_routers.choose(rng) else {
            break;
        };
        let Some(fast_identity) = fast.as_relay_identity() else {
            continue;
        };
        let Some(hsdir_identity) = hsdir.as_relay_identity() else {
            continue;
        };

        let attempt: Result<Vec<IntroductionPoint>> = async {
            let mut circ = TlsCircuit::connect(fast_identity.addr, &fast_identity, rng).await?;
            circ.extend(&hsdir_identity, hsdir.link_specifiers(), rng).await?;
            let body = get_over_dir_stream(&mut circ, &path).await?;
            let text = String::from_utf8(body).map_err(|_| Error::BadResponse("descriptor response was not valid UTF-8"))?;
            decode_descriptor(&text, &blinded_pk, &subcred)
        }
        .await;

        match attempt {
            Ok(points) => return Ok(points),
            Err(e) => tracing::debug!(hsdir = %hex::encode(hsdir_fp), error = ?e, "HS descriptor fetch candidate failed"),
        }
    }
    Err(Error::IntroductionPointsUnavailable)
}

fn base64_no_pad(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_link_specifiers_extracts_ipv4_and_legacy_id() {
        let mut blob = vec![2u8];
        blob.push(0);
        blob.push(6);
        blob.extend_from_slice(&[127, 0, 0, 1]);
        blob.extend_from_slice(&9001u16.to_be_bytes());
        blob.push(2);
        blob.push(20);
        blob.extend_from_slice(&[9u8; 20]);

        let identity = decode_link_specifiers(&blob, [3u8; 32]).unwrap();
        assert_eq!(identity.id, [9u8; 20]);
        assert_eq!(identity.addr.port(), 9001);
    }

    #[test]
    fn decode_link_specifiers_rejects_truncated_blob() {
        let blob = vec![1u8, 0, 6, 1, 2, 3];
        assert!(decode_link_specifiers(&blob, [0u8; 32]).is_none());
    }

    #[test]
    fn decrypt_layer_rejects_bad_mac() {
        let secret_input = [1u8; 8];
        let mut blob = vec![0u8; 16 + 4 + 32];
        blob[16..20].copy_from_slice(b"abcd");
        assert!(decrypt_layer(&secret_input, &blob, b"const").is_err());
    }
}
