//! The [`Router`] domain type: a relay descriptor
//! merged from a consensus `r`/`s`/`w`/`id ed25519` entry and, once
//! fetched, the matching router descriptor's `ntor-onion-key` and
//! `master-key-ed25519` fields.

use garlic_netdoc::consensus::ParsedRouterStatus;
use garlic_netdoc::routerdesc::ParsedDescriptorExtra;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4};

bitflags::bitflags! {
    /// Router flags from a consensus `s` line (dir-spec.txt §3.3), as a
    /// bitset rather than the raw token list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RelayFlags: u32 {
        /// Usable for "fast" path selection.
        const FAST = 1 << 0;
        /// Eligible to hold hidden-service descriptors.
        const HSDIR = 1 << 1;
        /// Currently considered up by directory authorities.
        const RUNNING = 1 << 2;
        /// Usable in paths at all.
        const VALID = 1 << 3;
        /// Suitable for long-lived circuits.
        const STABLE = 1 << 4;
        /// Serves a v2 directory protocol (irrelevant here; tracked for
        /// completeness with the consensus grammar).
        const V2DIR = 1 << 5;
        /// Is a directory authority.
        const AUTHORITY = 1 << 6;
        /// Flagged as an exit relay (not used by this client, which
        /// never opens ordinary exit streams, but tracked since it's a
        /// cost-free bit to keep).
        const EXIT = 1 << 7;
        /// Flagged a guard by consensus voters. Not used for guard
        /// selection here, but a router's flag
        /// set is otherwise parsed faithfully.
        const GUARD = 1 << 8;
    }
}

impl RelayFlags {
    /// Parse flag tokens from a consensus `s` line into a bitset.
    pub fn from_tokens(tokens: &[String]) -> Self {
        let mut flags = RelayFlags::empty();
        for t in tokens {
            flags |= match t.as_str() {
                "Fast" => RelayFlags::FAST,
                "HSDir" => RelayFlags::HSDIR,
                "Running" => RelayFlags::RUNNING,
                "Valid" => RelayFlags::VALID,
                "Stable" => RelayFlags::STABLE,
                "V2Dir" => RelayFlags::V2DIR,
                "Authority" => RelayFlags::AUTHORITY,
                "Exit" => RelayFlags::EXIT,
                "Guard" => RelayFlags::GUARD,
                _ => RelayFlags::empty(),
            };
        }
        flags
    }
}

/// A relay descriptor.
///
/// `fingerprint` and `ed25519_id` are set once, at construction from the
/// consensus, and never change afterward; only the fields a router
/// descriptor adds (`ntor_onion_key`, `master_key_ed25519`) may be
/// filled in later by [`Router::merge_descriptor`].
#[derive(Debug, Clone)]
pub struct Router {
    /// The relay's nickname (informational only).
    pub nickname: String,
    /// The relay's IPv4 address.
    pub ipv4: Ipv4Addr,
    /// The relay's onion-routing port.
    pub or_port: u16,
    /// An IPv6 address, if the consensus/descriptor advertised one.
    pub ipv6: Option<(Ipv6Addr, u16)>,
    /// The relay's directory port (`None` if it doesn't serve one).
    pub dir_port: Option<u16>,
    /// 20-byte RSA identity fingerprint. Immutable after construction.
    pub fingerprint: [u8; 20],
    /// 32-byte Ed25519 identity, if the consensus carried an `id
    /// ed25519` line. Immutable after construction.
    pub ed25519_id: Option<[u8; 32]>,
    /// 32-byte Curve25519 ntor onion key, filled in once a router
    /// descriptor has been fetched.
    pub ntor_onion_key: Option<[u8; 32]>,
    /// 32-byte Ed25519 master identity key from the descriptor, which
    /// may differ in encoding from the consensus `id ed25519` value
    /// but identifies the same relay.
    pub master_key_ed25519: Option<[u8; 32]>,
    /// Flags from the consensus `s` line.
    pub flags: RelayFlags,
    /// Bandwidth key/value pairs from the consensus `w` line.
    pub bandwidth: HashMap<String, u64>,
}

impl Router {
    /// Build a router from its consensus entry, before any descriptor
    /// has been fetched.
    pub fn from_consensus(r: &ParsedRouterStatus) -> Self {
        Router {
            nickname: r.nickname.clone(),
            ipv4: r.ipv4,
            or_port: r.or_port,
            ipv6: None,
            dir_port: if r.dir_port == 0 { None } else { Some(r.dir_port) },
            fingerprint: r.fingerprint,
            ed25519_id: r.ed25519_id,
            ntor_onion_key: None,
            master_key_ed25519: None,
            flags: RelayFlags::from_tokens(&r.flags),
            bandwidth: r.bandwidth.clone(),
        }
    }

    /// Merge in the fields a router descriptor adds.
    pub fn merge_descriptor(&mut self, extra: &ParsedDescriptorExtra) {
        if let Some(k) = extra.ntor_onion_key {
            self.ntor_onion_key = Some(k);
        }
        if let Some(k) = extra.master_key_ed25519 {
            self.master_key_ed25519 = Some(k);
        }
    }

    /// This relay's OR-port address.
    pub fn or_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ipv4, self.or_port))
    }

    /// True if this router carries everything needed to extend a
    /// circuit to it (i.e. its descriptor has been fetched).
    pub fn has_ntor_key(&self) -> bool {
        self.ntor_onion_key.is_some()
    }

    /// True if this router is currently usable: `Running` and `Valid`.
    pub fn is_usable(&self) -> bool {
        self.flags.contains(RelayFlags::RUNNING) && self.flags.contains(RelayFlags::VALID)
    }

    /// The best available 32-byte identity for HSDir ring computation:
    /// prefer the descriptor's `master-key-ed25519`, falling back to
    /// the consensus `id ed25519` line.
    pub fn ed25519_identity(&self) -> Option<[u8; 32]> {
        self.master_key_ed25519.or(self.ed25519_id)
    }

    /// Convert this router into the minimal identity [`garlic_proto`]
    /// needs to dial and extend to it. `None` until a descriptor with
    /// an ntor onion key has been merged in.
    pub fn as_relay_identity(&self) -> Option<garlic_proto::relayid::RelayIdentity> {
        let key_bytes = self.ntor_onion_key?;
        Some(garlic_proto::relayid::RelayIdentity {
            id: self.fingerprint,
            ntor_key: x25519_dalek::PublicKey::from(key_bytes),
            addr: self.or_addr(),
        })
    }

    /// The /16 IPv4 subnet this router lives in, used for path-diversity
    /// selection.
    pub fn subnet16(&self) -> (u8, u8) {
        let o = self.ipv4.octets();
        (o[0], o[1])
    }

    /// Encode this router's EXTEND2 link specifiers (tor-spec §5.1.2):
    /// an IPv4 specifier (LSTYPE 0) and, when known, a legacy-identity
    /// specifier (LSTYPE 2) carrying the RSA fingerprint.
    pub fn link_specifiers(&self) -> Vec<u8> {
        let mut specs = Vec::new();
        let mut n: u8 = 0;

        let mut ipv4_spec = Vec::with_capacity(6);
        ipv4_spec.extend_from_slice(&self.ipv4.octets());
        ipv4_spec.extend_from_slice(&self.or_port.to_be_bytes());
        specs.push(0u8);
        specs.push(ipv4_spec.len() as u8);
        specs.extend_from_slice(&ipv4_spec);
        n += 1;

        specs.push(2u8);
        specs.push(self.fingerprint.len() as u8);
        specs.extend_from_slice(&self.fingerprint);
        n += 1;

        let mut out = Vec::with_capacity(1 + specs.len());
        out.push(n);
        out.extend_from_slice(&specs);
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_parse_known_tokens_and_ignore_unknown() {
        let tokens = vec!["Fast".to_string(), "HSDir".to_string(), "Flerp".to_string()];
        let flags = RelayFlags::from_tokens(&tokens);
        assert!(flags.contains(RelayFlags::FAST));
        assert!(flags.contains(RelayFlags::HSDIR));
        assert!(!flags.contains(RelayFlags::RUNNING));
    }

    fn sample_parsed() -> ParsedRouterStatus {
        ParsedRouterStatus {
            nickname: "test".into(),
            fingerprint: [1u8; 20],
            digest: [2u8; 20],
            ipv4: Ipv4Addr::new(127, 0, 0, 1),
            or_port: 9001,
            dir_port: 9030,
            flags: vec!["Fast".into(), "Running".into(), "Valid".into()],
            bandwidth: HashMap::new(),
            ed25519_id: Some([3u8; 32]),
        }
    }

    #[test]
    fn as_relay_identity_is_none_until_descriptor_merged() {
        let mut router = Router::from_consensus(&sample_parsed());
        assert!(router.as_relay_identity().is_none());
        router.merge_descriptor(&ParsedDescriptorExtra { ntor_onion_key: Some([9u8; 32]), master_key_ed25519: None });
        let id = router.as_relay_identity().unwrap();
        assert_eq!(id.id, [1u8; 20]);
    }

    #[test]
    fn usable_requires_running_and_valid() {
        let router = Router::from_consensus(&sample_parsed());
        assert!(router.is_usable());
    }

    #[test]
    fn link_specifiers_encode_ipv4_and_legacy_id() {
        let router = Router::from_consensus(&sample_parsed());
        let specs = router.link_specifiers();
        assert_eq!(specs[0], 2, "two link specifiers: IPv4 and legacy id");
        assert_eq!(specs[1], 0, "first specifier is LSTYPE 0 (IPv4)");
        assert_eq!(specs[2], 6, "IPv4 specifier is 4 address bytes + 2 port bytes");
        let legacy_id_offset = 3 + 6;
        assert_eq!(specs[legacy_id_offset], 2, "second specifier is LSTYPE 2 (legacy id)");
        assert_eq!(specs[legacy_id_offset + 1], 20);
        assert_eq!(&specs[legacy_id_offset + 2..legacy_id_offset + 22], &router.fingerprint);
    }
}
