//! Grammar for the router-descriptor batch response: the fields consensus `r` lines don't carry,
//! keyed by the fingerprint of the descriptor they belong to.

use crate::tokenize::{decode_base64_unpadded, Reader};
use crate::{Error, Result};
use std::collections::HashMap;

/// The fields a descriptor adds beyond what the consensus already has.
#[derive(Debug, Clone, Default)]
pub struct ParsedDescriptorExtra {
    /// 32-byte Curve25519 ntor onion key (`ntor-onion-key`).
    pub ntor_onion_key: Option<[u8; 32]>,
    /// 32-byte Ed25519 master identity key (`master-key-ed25519`).
    pub master_key_ed25519: Option<[u8; 32]>,
}

/// Parse a batch of `GET /tor/server/fp/...` descriptors, keyed by the
/// 20-byte RSA fingerprint declared in each descriptor's own
/// `fingerprint` line.
///
/// Descriptors are separated by `router` lines, each of which starts a
/// fresh record; a document with no `router` lines at all is treated
/// as a single implicit record (some directory caches omit it when
/// only one descriptor was requested).
pub fn parse_batch(text: &str) -> Result<HashMap<[u8; 20], ParsedDescriptorExtra>> {
    let mut reader = Reader::new(text);
    let mut out = HashMap::new();
    let mut fingerprint: Option<[u8; 20]> = None;
    let mut extra = ParsedDescriptorExtra::default();

    macro_rules! flush {
        () => {
            if let Some(fp) = fingerprint.take() {
                out.insert(fp, std::mem::take(&mut extra));
            }
        };
    }

    while let Some(item) = reader.next() {
        match item.keyword {
            "router" => {
                flush!();
            }
            "fingerprint" => {
                let joined: String = item.args().concat();
                let bytes = hex::decode(&joined).map_err(|_| Error::BadHex)?;
                fingerprint = Some(bytes.try_into().map_err(|_| Error::MalformedField("fingerprint"))?);
            }
            "ntor-onion-key" => {
                let v = item.args().first().ok_or(Error::MalformedField("ntor-onion-key"))?;
                let bytes = decode_base64_unpadded(v)?;
                extra.ntor_onion_key = Some(bytes.try_into().map_err(|_| Error::MalformedField("ntor-onion-key"))?);
            }
            "identity-ed25519" => {
                // A certificate whose contents we don't verify; consume the
                // object so the reader doesn't misparse it as a stray line.
                let _ = reader.take_object();
            }
            "master-key-ed25519" => {
                let v = item.args().first().ok_or(Error::MalformedField("master-key-ed25519"))?;
                let bytes = decode_base64_unpadded(v)?;
                extra.master_key_ed25519 = Some(bytes.try_into().map_err(|_| Error::MalformedField("master-key-ed25519"))?);
            }
            _ => {}
        }
    }
    flush!();
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_one_descriptor() {
        let text = "\
router test 127.0.0.1 9001 0 9030
fingerprint 0000 0000 0000 0000 0000 0000 0000 0000 0000 0000
ntor-onion-key QUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUE=
";
        let batch = parse_batch(text).unwrap();
        assert_eq!(batch.len(), 1);
        let fp = [0u8; 20];
        assert!(batch.contains_key(&fp));
        assert!(batch[&fp].ntor_onion_key.is_some());
    }
}
