//! Fast-router selection with subnet diversity: take `3 * count` `Fast`
//! routers, keep only the first router seen per distinct IPv4 /16, then
//! keep the first `count` of those.

use crate::router::Router;
use crate::status::NetworkStatus;
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// Select up to `count` usable `Fast` routers from `ns`, shuffled and
/// deduplicated by /16 subnet.
pub fn select<R: rand::Rng + ?Sized>(ns: &NetworkStatus, count: usize, rng: &mut R) -> Vec<Router> {
    let mut pool: Vec<&Router> = ns.fast_routers().collect();
    pool.shuffle(rng);
    pool.truncate(count.saturating_mul(3).max(count));

    let mut seen_subnets: HashSet<(u8, u8)> = HashSet::new();
    let mut out = Vec::with_capacity(count);
    for router in pool {
        if seen_subnets.insert(router.subnet16()) {
            out.push(router.clone());
            if out.len() == count {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::router::RelayFlags;
    use rand::rngs::mock::StepRng;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    fn fast_router(octet3: u8, octet4: u8) -> Router {
        Router {
            nickname: "r".into(),
            ipv4: Ipv4Addr::new(10, 0, octet3, octet4),
            or_port: 9001,
            ipv6: None,
            dir_port: None,
            fingerprint: [octet4; 20],
            ed25519_id: None,
            ntor_onion_key: None,
            master_key_ed25519: None,
            flags: RelayFlags::FAST | RelayFlags::RUNNING | RelayFlags::VALID,
            bandwidth: HashMap::new(),
        }
    }

    fn network_status_with(routers: Vec<Router>) -> NetworkStatus {
        const SAMPLE: &str = "\
valid-after 2020-01-01 00:00:00
fresh-until 2020-01-01 01:00:00
valid-until 2020-01-01 03:00:00
";
        let mut ns = NetworkStatus::parse(SAMPLE).unwrap();
        for r in routers {
            ns.push_router_for_test(r);
        }
        ns
    }

    #[test]
    fn select_deduplicates_by_slash_16_subnet() {
        let routers = vec![fast_router(1, 1), fast_router(1, 2), fast_router(2, 1), fast_router(3, 1)];
        let ns = network_status_with(routers);
        let mut rng = StepRng::new(0, 1);
        let chosen = super::select(&ns, 3, &mut rng);
        assert_eq!(chosen.len(), 3);
        let subnets: HashSet<(u8, u8)> = chosen.iter().map(|r| r.subnet16()).collect();
        assert_eq!(subnets.len(), 3, "at most one router per /16 subnet");
    }

    #[test]
    fn select_returns_fewer_than_count_if_the_network_is_small() {
        let ns = network_status_with(vec![fast_router(1, 1)]);
        let mut rng = StepRng::new(0, 1);
        assert_eq!(super::select(&ns, 5, &mut rng).len(), 1);
    }
}
