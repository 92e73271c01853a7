//! The introduction-point cache.

use crate::hsdesc_fetch::IntroductionPoint;
use std::collections::HashMap;

struct Entry {
    points: Vec<IntroductionPoint>,
    expires_at: u64,
}

/// A per-domain cache of fetched introduction points, keyed by the
/// service's 56-character onion label (without the `.onion` suffix).
#[derive(Default)]
pub struct IntroCache {
    entries: HashMap<String, Entry>,
}

impl IntroCache {
    /// An empty cache.
    pub fn new() -> Self {
        IntroCache { entries: HashMap::new() }
    }

    /// Look up a domain's cached introduction points, if present and
    /// not yet expired as of `now`.
    pub fn get(&self, domain: &str, now: u64) -> Option<&[IntroductionPoint]> {
        self.entries.get(domain).filter(|e| now < e.expires_at).map(|e| e.points.as_slice())
    }

    /// Insert freshly-fetched introduction points for `domain`,
    /// expiring at `expires_at` (the start of the next time period).
    pub fn insert(&mut self, domain: String, points: Vec<IntroductionPoint>, expires_at: u64) {
        self.entries.insert(domain, Entry { points, expires_at });
    }

    /// Evict a domain's cache entry.
    pub fn invalidate(&mut self, domain: &str) {
        self.entries.remove(domain);
    }

    /// Drop every entry that has expired as of `now`.
    pub fn evict_expired(&mut self, now: u64) {
        self.entries.retain(|_, e| now < e.expires_at);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use garlic_proto::relayid::RelayIdentity;

    fn dummy_point() -> IntroductionPoint {
        IntroductionPoint {
            relay: RelayIdentity {
                id: [1u8; 20],
                ntor_key: x25519_dalek::PublicKey::from([2u8; 32]),
                addr: "127.0.0.1:9001".parse().unwrap(),
            },
            enc_key_ntor: [3u8; 32],
            auth_key: [4u8; 32],
            subcredential: [5u8; 32],
        }
    }

    #[test]
    fn get_returns_none_once_expired() {
        let mut cache = IntroCache::new();
        cache.insert("abc".into(), vec![dummy_point()], 100);
        assert!(cache.get("abc", 50).is_some());
        assert!(cache.get("abc", 100).is_none());
    }

    #[test]
    fn invalidate_removes_the_entry_immediately() {
        let mut cache = IntroCache::new();
        cache.insert("abc".into(), vec![dummy_point()], 1000);
        cache.invalidate("abc");
        assert!(cache.get("abc", 0).is_none());
    }

    #[test]
    fn evict_expired_only_drops_stale_entries() {
        let mut cache = IntroCache::new();
        cache.insert("fresh".into(), vec![dummy_point()], 1000);
        cache.insert("stale".into(), vec![dummy_point()], 10);
        cache.evict_expired(500);
        assert!(cache.get("fresh", 500).is_some());
        assert!(!cache.entries.contains_key("stale"));
    }
}
