//! [`NetworkStatus`]: the parsed consensus plus the
//! directory-parameter and time-period bookkeeping derived from it.

use crate::router::Router;
use crate::timeperiod::{self, DEFAULT_TIME_PERIOD_LENGTH_MINUTES};
use crate::{Error, Result};
use garlic_netdoc::routerdesc::ParsedDescriptorExtra;
use std::collections::HashMap;

/// Default `hsdir_spread_store` consensus parameter.
pub const DEFAULT_HSDIR_SPREAD_STORE: u32 = 4;
/// Default `hsdir_n_replicas` consensus parameter.
pub const DEFAULT_HSDIR_N_REPLICAS: u32 = 2;

/// Bounds `hsdir_spread_store`/`hsdir_n_replicas` are clamped to before
/// use, guarding against a hostile or malformed consensus.
const SPREAD_STORE_RANGE: std::ops::RangeInclusive<u32> = 1..=128;
const N_REPLICAS_RANGE: std::ops::RangeInclusive<u32> = 1..=16;

/// The parsed consensus document and everything derived from it.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    /// The exact decompressed consensus text this was parsed from,
    /// retained so it can be persisted verbatim.
    raw_text: String,
    /// Unix time the consensus became valid.
    pub valid_after: u64,
    /// Unix time after which a fresher consensus should be preferred.
    pub fresh_until: u64,
    /// Unix time after which this consensus is expired.
    pub valid_until: u64,
    /// The previous period's shared-random value, if the consensus carried one.
    pub srv_previous: Option<[u8; 32]>,
    /// The current period's shared-random value, if the consensus carried one.
    pub srv_current: Option<[u8; 32]>,
    /// `hsdir_spread_store`, clamped to [`SPREAD_STORE_RANGE`].
    pub hsdir_spread_store: u32,
    /// `hsdir_n_replicas`, clamped to [`N_REPLICAS_RANGE`].
    pub hsdir_n_replicas: u32,
    /// The voting interval implied by this consensus's validity window.
    pub voting_interval_secs: u64,
    /// The effective time-period length in minutes (auto-reduced on
    /// low-voting-interval test networks).
    pub time_period_length_minutes: u64,
    routers: Vec<Router>,
}

impl NetworkStatus {
    /// Parse a freshly-downloaded (already decompressed) consensus document.
    pub fn parse(raw_text: &str) -> Result<Self> {
        let parsed = garlic_netdoc::consensus::parse(raw_text)?;
        let voting_interval_secs = timeperiod::voting_interval(parsed.valid_after, parsed.fresh_until);
        let time_period_length_minutes = if parsed.fresh_until > parsed.valid_after {
            timeperiod::time_period_length_minutes(voting_interval_secs)
        } else {
            DEFAULT_TIME_PERIOD_LENGTH_MINUTES
        };
        let hsdir_spread_store = clamp_param(parsed.params.get("hsdir_spread_store"), DEFAULT_HSDIR_SPREAD_STORE, SPREAD_STORE_RANGE);
        let hsdir_n_replicas = clamp_param(parsed.params.get("hsdir_n_replicas"), DEFAULT_HSDIR_N_REPLICAS, N_REPLICAS_RANGE);
        let routers = parsed.routers.iter().map(Router::from_consensus).collect();
        Ok(NetworkStatus {
            raw_text: raw_text.to_string(),
            valid_after: parsed.valid_after,
            fresh_until: parsed.fresh_until,
            valid_until: parsed.valid_until,
            srv_previous: parsed.srv_previous,
            srv_current: parsed.srv_current,
            hsdir_spread_store,
            hsdir_n_replicas,
            voting_interval_secs,
            time_period_length_minutes,
            routers,
        })
    }

    /// The raw consensus text, for verbatim persistence.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// All routers this consensus described, in document order.
    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    /// Mutable access to routers, used to merge in fetched descriptors.
    pub fn routers_mut(&mut self) -> &mut [Router] {
        &mut self.routers
    }

    /// Merge a batch of fetched router descriptors into the matching routers by fingerprint.
    pub fn merge_descriptor_batch(&mut self, batch: &HashMap<[u8; 20], ParsedDescriptorExtra>) {
        for router in self.routers.iter_mut() {
            if let Some(extra) = batch.get(&router.fingerprint) {
                router.merge_descriptor(extra);
            }
        }
    }

    /// Look up a router by its 20-byte fingerprint.
    pub fn router_by_fingerprint(&self, fp: &[u8; 20]) -> Option<&Router> {
        self.routers.iter().find(|r| &r.fingerprint == fp)
    }

    /// True if, as of `now`, this consensus is still fresh enough to
    /// reuse without a fresh download.
    pub fn is_fresh(&self, now: u64) -> bool {
        now < self.fresh_until
    }

    /// The current time-period number as of Unix time `t`.
    pub fn time_period_num(&self, t: u64) -> u64 {
        timeperiod::time_period_num(t, self.voting_interval_secs, self.time_period_length_minutes)
    }

    /// The shared-random value to use for HSDir computations as of
    /// this consensus's `valid_after`, falling back to the disaster
    /// value if the selected field is absent.
    pub fn effective_shared_random(&self) -> [u8; 32] {
        let use_previous = timeperiod::use_previous_srv(self.valid_after, self.voting_interval_secs, self.time_period_length_minutes);
        let chosen = if use_previous { self.srv_previous } else { self.srv_current };
        chosen.unwrap_or_else(|| {
            let tpn = self.time_period_num(self.valid_after);
            garlic_hscrypto::hsdir_index::disaster_shared_random(self.time_period_length_minutes, tpn)
        })
    }

    /// Return up to `n` routers flagged `Fast` and currently usable,
    /// in document order (no shuffling — callers that need randomness
    /// or diversity apply it themselves, see [`crate::fastselect`]).
    pub fn fast_routers(&self) -> impl Iterator<Item = &Router> {
        self.routers.iter().filter(|r| r.is_usable() && r.flags.contains(crate::router::RelayFlags::FAST))
    }

    /// Every router flagged `HSDir` and currently usable.
    pub fn hsdir_routers(&self) -> impl Iterator<Item = &Router> {
        self.routers.iter().filter(|r| r.is_usable() && r.flags.contains(crate::router::RelayFlags::HSDIR))
    }

    /// Append a router, bypassing consensus parsing. Only used by other
    /// modules' tests to build a [`NetworkStatus`] with synthetic routers.
    #[cfg(test)]
    pub(crate) fn push_router_for_test(&mut self, r: Router) {
        self.routers.push(r);
    }
}

fn clamp_param(v: Option<&i64>, default: u32, range: std::ops::RangeInclusive<u32>) -> u32 {
    match v {
        Some(&v) if v >= 0 && (v as u64) <= u32::MAX as u64 => (v as u32).clamp(*range.start(), *range.end()),
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = "\
valid-after 2020-01-01 00:00:00
fresh-until 2020-01-01 01:00:00
valid-until 2020-01-01 03:00:00
params hsdir_spread_store=4 hsdir_n_replicas=2
shared-rand-current-value 1 QUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUE=
r test AAAAAAAAAAAAAAAAAAAAAAAAAAA= 2020-01-01 00:00:00 127.0.0.1 9001 9030
s Fast HSDir Running Valid
w Bandwidth=100
id ed25519 QUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUE=
";

    #[test]
    fn parses_and_exposes_fast_and_hsdir_routers() {
        let ns = NetworkStatus::parse(SAMPLE).unwrap();
        assert_eq!(ns.routers().len(), 1);
        assert_eq!(ns.fast_routers().count(), 1);
        assert_eq!(ns.hsdir_routers().count(), 1);
        assert_eq!(ns.hsdir_spread_store, 4);
        assert_eq!(ns.hsdir_n_replicas, 2);
    }

    #[test]
    fn malformed_hsdir_params_fall_back_to_defaults() {
        let bad = SAMPLE.replace("hsdir_spread_store=4", "hsdir_spread_store=999999");
        let ns = NetworkStatus::parse(&bad).unwrap();
        assert_eq!(ns.hsdir_spread_store, 128, "clamped to the max of the allowed range");
    }

    #[test]
    fn is_fresh_respects_fresh_until() {
        let ns = NetworkStatus::parse(SAMPLE).unwrap();
        assert!(ns.is_fresh(ns.valid_after));
        assert!(!ns.is_fresh(ns.fresh_until));
    }
}
