//! HSDir responsibility computation: building the ring of HSDir relays ordered by
//! directory index, and picking the candidate relays responsible for
//! storing a given service's descriptor at a given replica.

use crate::router::Router;
use crate::status::NetworkStatus;
use garlic_hscrypto::hsdir_index::{build_directory_index, build_index, RingIndex};

/// One position on the (virtual) HSDir ring: a relay's directory index
/// paired with its 20-byte fingerprint.
#[derive(Debug, Clone)]
struct RingEntry {
    index: RingIndex,
    fingerprint: [u8; 20],
}

/// The HSDir ring for one time period: every `HSDir`-flagged, usable
/// relay in the consensus, ordered by its directory index.
#[derive(Debug, Clone)]
pub struct HsDirRing {
    entries: Vec<RingEntry>,
}

impl HsDirRing {
    /// Build the ring for time period `tpn`, using `ns`'s effective
    /// shared-random value.
    pub fn build(ns: &NetworkStatus, tpn: u64) -> Self {
        let srv = ns.effective_shared_random();
        let mut entries: Vec<RingEntry> = ns
            .hsdir_routers()
            .filter_map(|r: &Router| {
                let identity = r.ed25519_identity()?;
                let index = build_directory_index(&identity, &srv, ns.time_period_length_minutes, tpn);
                Some(RingEntry { index, fingerprint: r.fingerprint })
            })
            .collect();
        entries.sort_by(|a, b| a.index.cmp(&b.index));
        HsDirRing { entries }
    }

    /// Number of relays on this ring.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if this ring has no entries (e.g. no `HSDir` relays with a
    /// known Ed25519 identity were found).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `count` relays whose directory index is `>= idx`, wrapping
    /// around the ring if exhausted.
    fn candidates_at_or_after(&self, idx: &RingIndex, count: usize) -> Vec<[u8; 20]> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let start = self.entries.partition_point(|e| &e.index < idx);
        self.entries
            .iter()
            .cycle()
            .skip(start)
            .take(count.min(self.entries.len()))
            .map(|e| e.fingerprint)
            .collect()
    }

    /// The full set of HSDir candidates for a blinded public key,
    /// concatenated across every replica:
    /// `n_replicas` groups of `spread_store` relays each, in replica
    /// order, duplicates kept (a later replica's selection isn't
    /// deduplicated against an earlier one's by the reference protocol).
    pub fn candidates_for(&self, blinded_pk: &[u8; 32], tpl: u64, tpn: u64, n_replicas: u32, spread_store: u32) -> Vec<[u8; 20]> {
        let mut out = Vec::new();
        for replica in 1..=n_replicas {
            let idx = build_index(blinded_pk, replica as u8, tpl, tpn);
            out.extend(self.candidates_at_or_after(&idx, spread_store as usize));
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    fn hsdir_router(fingerprint: u8, identity: u8) -> Router {
        Router {
            nickname: "r".into(),
            ipv4: Ipv4Addr::new(127, 0, 0, fingerprint),
            or_port: 9001,
            ipv6: None,
            dir_port: None,
            fingerprint: [fingerprint; 20],
            ed25519_id: Some([identity; 32]),
            ntor_onion_key: None,
            master_key_ed25519: None,
            flags: crate::router::RelayFlags::HSDIR | crate::router::RelayFlags::RUNNING | crate::router::RelayFlags::VALID,
            bandwidth: HashMap::new(),
        }
    }

    const SAMPLE: &str = "\
valid-after 2020-01-01 00:00:00
fresh-until 2020-01-01 01:00:00
valid-until 2020-01-01 03:00:00
params hsdir_spread_store=4 hsdir_n_replicas=2
shared-rand-current-value 1 QUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUE=
";

    fn network_status_with_routers(routers: Vec<Router>) -> NetworkStatus {
        let mut ns = NetworkStatus::parse(SAMPLE).unwrap();
        for r in routers {
            ns.push_router_for_test(r);
        }
        ns
    }

    #[test]
    fn coverage_spans_replicas_times_spread_store_without_collisions() {
        let routers: Vec<Router> = (1..=20u8).map(|i| hsdir_router(i, i.wrapping_mul(7))).collect();
        let ns = network_status_with_routers(routers);
        let ring = HsDirRing::build(&ns, 42);
        assert_eq!(ring.len(), 20);
        let bpk = [0x11u8; 32];
        let candidates = ring.candidates_for(&bpk, ns.time_period_length_minutes, 42, 2, 4);
        assert_eq!(candidates.len(), 8, "n_replicas * spread_store distinct selection slots");
    }

    #[test]
    fn empty_ring_yields_no_candidates() {
        let ns = NetworkStatus::parse(SAMPLE).unwrap();
        let ring = HsDirRing::build(&ns, 42);
        assert!(ring.is_empty());
        assert!(ring.candidates_for(&[1u8; 32], 1440, 42, 2, 4).is_empty());
    }
}
