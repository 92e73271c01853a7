//! Grammar for the v3 hidden-service descriptor's three layers
//!: the outer plaintext
//! wrapper, the superencrypted layer (once decrypted), and the
//! encrypted layer (once decrypted), which lists introduction points.

use crate::tokenize::{decode_base64_unpadded, Reader};
use crate::{Error, Result};

/// The outer, always-plaintext part of a fetched HS descriptor.
#[derive(Debug, Clone)]
pub struct ParsedOuterDescriptor {
    /// `descriptor-lifetime`, in minutes.
    pub lifetime_minutes: u32,
    /// `revision-counter`.
    pub revision_counter: u64,
    /// The raw `16B salt || ciphertext || 32B MAC` superencrypted blob.
    pub superencrypted: Vec<u8>,
}

/// Parse the outer layer of an HS descriptor.
pub fn parse_outer(text: &str) -> Result<ParsedOuterDescriptor> {
    let mut reader = Reader::new(text);
    let mut lifetime_minutes = None;
    let mut revision_counter = None;
    let mut superencrypted = None;
    let mut saw_marker = false;

    while let Some(item) = reader.next() {
        match item.keyword {
            "hs-descriptor" => {
                if item.args().first() != Some(&"3") {
                    return Err(Error::MalformedField("hs-descriptor version"));
                }
                saw_marker = true;
            }
            "descriptor-lifetime" => {
                let v = item.args().first().ok_or(Error::MalformedField("descriptor-lifetime"))?;
                lifetime_minutes = Some(v.parse().map_err(|_| Error::BadInteger("descriptor-lifetime"))?);
            }
            "revision-counter" => {
                let v = item.args().first().ok_or(Error::MalformedField("revision-counter"))?;
                revision_counter = Some(v.parse().map_err(|_| Error::BadInteger("revision-counter"))?);
            }
            "superencrypted" => {
                superencrypted = Some(reader.take_object()?);
            }
            _ => {}
        }
    }
    if !saw_marker {
        return Err(Error::MissingField("hs-descriptor"));
    }
    Ok(ParsedOuterDescriptor {
        lifetime_minutes: lifetime_minutes.ok_or(Error::MissingField("descriptor-lifetime"))?,
        revision_counter: revision_counter.ok_or(Error::MissingField("revision-counter"))?,
        superencrypted: superencrypted.ok_or(Error::MissingField("superencrypted"))?,
    })
}

/// Parse the middle (superencrypted) layer's plaintext once decrypted,
/// returning the raw blob of its nested `encrypted` layer.
pub fn parse_superencrypted(plaintext: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::new(plaintext);
    while let Some(item) = reader.next() {
        if item.keyword == "encrypted" {
            return reader.take_object();
        }
        // auth-client lines and anything else: this client doesn't use
        // restricted-discovery client authorization, so they're skipped.
    }
    Err(Error::MissingField("encrypted"))
}

/// One introduction point as listed in the decrypted inner layer.
#[derive(Debug, Clone)]
pub struct ParsedIntroPoint {
    /// Raw `link-specifiers` blob (opaque to this crate; `garlic-netdir`
    /// decodes the specifiers it understands).
    pub link_specifiers: Vec<u8>,
    /// 32-byte Curve25519 ntor onion key.
    pub onion_key_ntor: [u8; 32],
    /// 32-byte Curve25519 encryption key.
    pub enc_key_ntor: [u8; 32],
    /// 32-byte Ed25519 authentication key, extracted from the
    /// `auth-key` certificate's certified-key field.
    pub auth_key: [u8; 32],
}

/// Tor certificates (cert-spec.txt §2) place the certified key at a
/// fixed offset: 1B version, 1B cert-type, 4B expiration, 1B key-type,
/// then the 32-byte certified key.
fn certified_key_from_cert(cert: &[u8]) -> Result<[u8; 32]> {
    const OFFSET: usize = 1 + 1 + 4 + 1;
    if cert.len() < OFFSET + 32 {
        return Err(Error::MalformedField("auth-key certificate too short"));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&cert[OFFSET..OFFSET + 32]);
    Ok(out)
}

/// Parse the decrypted inner layer's plaintext into its introduction
/// points, in document order.
pub fn parse_encrypted(plaintext: &str) -> Result<Vec<ParsedIntroPoint>> {
    let mut reader = Reader::new(plaintext);
    let mut points = Vec::new();
    let mut cur_specs: Option<Vec<u8>> = None;
    let mut cur_onion: Option<[u8; 32]> = None;
    let mut cur_enc: Option<[u8; 32]> = None;
    let mut cur_auth: Option<[u8; 32]> = None;

    macro_rules! flush {
        () => {
            if let (Some(specs), Some(onion), Some(enc), Some(auth)) =
                (cur_specs.take(), cur_onion.take(), cur_enc.take(), cur_auth.take())
            {
                points.push(ParsedIntroPoint {
                    link_specifiers: specs,
                    onion_key_ntor: onion,
                    enc_key_ntor: enc,
                    auth_key: auth,
                });
            }
        };
    }

    while let Some(item) = reader.next() {
        match item.keyword {
            "introduction-point" => {
                flush!();
                let v = item.args().first().ok_or(Error::MalformedField("introduction-point"))?;
                cur_specs = Some(decode_base64_unpadded(v)?);
            }
            "onion-key" => {
                if item.args().first() == Some(&"ntor") {
                    let v = item.args().get(1).ok_or(Error::MalformedField("onion-key ntor"))?;
                    let bytes = decode_base64_unpadded(v)?;
                    cur_onion = Some(bytes.try_into().map_err(|_| Error::MalformedField("onion-key ntor"))?);
                }
            }
            "enc-key" => {
                if item.args().first() == Some(&"ntor") {
                    let v = item.args().get(1).ok_or(Error::MalformedField("enc-key ntor"))?;
                    let bytes = decode_base64_unpadded(v)?;
                    cur_enc = Some(bytes.try_into().map_err(|_| Error::MalformedField("enc-key ntor"))?);
                }
            }
            "auth-key" => {
                let cert = reader.take_object()?;
                cur_auth = Some(certified_key_from_cert(&cert)?);
            }
            _ => {}
        }
    }
    flush!();
    Ok(points)
}

#[cfg(test)]
mod test {
    use super::*;
    use base64::Engine;

    fn b64(b: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(b)
    }

    #[test]
    fn parses_outer_descriptor() {
        let blob = b"\x00".repeat(16 + 8 + 32);
        let text = format!(
            "hs-descriptor 3\ndescriptor-lifetime 180\nrevision-counter 5\nsuperencrypted\n-----BEGIN MESSAGE-----\n{}\n-----END MESSAGE-----\n",
            b64(&blob)
        );
        let parsed = parse_outer(&text).unwrap();
        assert_eq!(parsed.lifetime_minutes, 180);
        assert_eq!(parsed.revision_counter, 5);
        assert_eq!(parsed.superencrypted.len(), blob.len());
    }

    #[test]
    fn parses_one_introduction_point() {
        let mut cert = vec![1u8, 2]; // version, cert-type
        cert.extend_from_slice(&[0u8; 4]); // expiration
        cert.push(1); // cert-key-type
        cert.extend_from_slice(&[7u8; 32]); // certified key
        cert.extend_from_slice(&[0u8; 64]); // fake signature

        let text = format!(
            "introduction-point {}\nonion-key ntor {}\nauth-key\n-----BEGIN ED25519 CERT-----\n{}\n-----END ED25519 CERT-----\nenc-key ntor {}\n",
            b64(b"link-specs"),
            b64(&[1u8; 32]),
            b64(&cert),
            b64(&[2u8; 32]),
        );
        let points = parse_encrypted(&text).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].onion_key_ntor, [1u8; 32]);
        assert_eq!(points[0].enc_key_ntor, [2u8; 32]);
        assert_eq!(points[0].auth_key, [7u8; 32]);
    }
}
