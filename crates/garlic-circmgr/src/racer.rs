//! The circuit racer: build several client/introduction
//! circuit pairs concurrently against a single onion domain and return
//! whichever completes a full rendezvous first.

use crate::{Error, Result};
use garlic_netdir::hsdesc_fetch::IntroductionPoint;
use garlic_netdir::registry::SharedNetDir;
use garlic_netdir::router::Router;
use garlic_proto::circuit::TlsCircuit;
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Tunables for one race.
#[derive(Debug, Clone)]
pub struct RaceOpts {
    /// Number of concurrent lanes to launch.
    pub count: usize,
    /// Number of client-side hops to the rendezvous point, including
    /// the RP itself. `1` means the client dials the RP directly.
    pub hops: usize,
    /// Per-lane deadline; the race fails once this elapses with no winner.
    pub timeout: Duration,
}

impl Default for RaceOpts {
    fn default() -> Self {
        RaceOpts { count: 4, hops: 1, timeout: Duration::from_secs(30) }
    }
}

/// Outcome statistics for a completed race.
#[derive(Debug, Clone, Copy)]
pub struct RaceStats {
    /// Index, among the lanes launched, of the winning lane.
    pub winner_index: usize,
    /// Wall-clock time from launch to the winner's completion.
    pub elapsed_ms: u64,
    /// Total number of lanes launched.
    pub lanes_attempted: usize,
    /// Number of lanes observed to fail before the winner was found.
    pub lanes_failed: usize,
}

/// Pair up `count` rendezvous points with `count` introduction points,
/// cycling whichever list is shorter.
pub fn build_race_paths<A: Clone, B: Clone>(rps: &[A], ips: &[B], count: usize) -> Vec<(A, B)> {
    if rps.is_empty() || ips.is_empty() {
        return Vec::new();
    }
    rps.iter().cycle().zip(ips.iter().cycle()).take(count).map(|(a, b)| (a.clone(), b.clone())).collect()
}

/// Run one race against `domain` and return the winning client circuit
///. `rng` is only used for the pre-race path selection;
/// each lane draws its own handshake randomness from [`OsRng`] since the
/// lanes run concurrently and a single `rng` can't be shared across them.
#[tracing::instrument(skip(netdir, rng), fields(domain))]
pub async fn race<R: RngCore + CryptoRng>(
    netdir: &SharedNetDir,
    domain: &str,
    opts: &RaceOpts,
    rng: &mut R,
) -> Result<(TlsCircuit, RaceStats)> {
    let intro_points = netdir.intro_points(domain, rng).await?;
    let rps = netdir.fast_routers(opts.count, rng).await;
    let pairs = build_race_paths(&rps, &intro_points, opts.count);
    if pairs.is_empty() {
        return Err(Error::AllLanesFailed);
    }

    let start = Instant::now();
    let mut lanes = JoinSet::new();
    for (idx, (rp, intro)) in pairs.into_iter().enumerate() {
        let netdir = netdir.clone();
        let hops = opts.hops;
        let domain = domain.to_string();
        lanes.spawn(async move { (idx, run_lane(netdir, domain, rp, intro, hops).await) });
    }
    let lanes_attempted = lanes.len();

    let mut lanes_failed = 0usize;
    let winner = tokio::time::timeout(opts.timeout, async {
        while let Some(joined) = lanes.join_next().await {
            match joined {
                Ok((idx, Ok(circuit))) => return Some((idx, circuit)),
                Ok((idx, Err(e))) => {
                    lanes_failed += 1;
                    tracing::debug!(lane = idx, error = ?e, "race lane failed");
                }
                Err(join_err) => {
                    lanes_failed += 1;
                    tracing::debug!(error = ?join_err, "race lane panicked");
                }
            }
        }
        None
    })
    .await;

    // Teardown is best-effort and must not block the return: dropping each remaining lane's future closes its socket.
    lanes.abort_all();

    match winner {
        Ok(Some((winner_index, circuit))) => Ok((
            circuit,
            RaceStats { winner_index, elapsed_ms: start.elapsed().as_millis() as u64, lanes_attempted, lanes_failed },
        )),
        Ok(None) | Err(_) => Err(Error::AllLanesFailed),
    }
}

/// Build a `hops`-hop path ending at `rp` (fast routers for any interior
/// hops), then run the rendezvous protocol against `intro`.
async fn run_lane(netdir: SharedNetDir, domain: String, rp: Router, intro: IntroductionPoint, hops: usize) -> crate::Result<TlsCircuit> {
    let mut rng = OsRng;
    let rp_identity = rp.as_relay_identity().ok_or_else(|| garlic_error::internal!("fast router has no ntor key"))?;

    let mut client_circ = if hops > 1 {
        let interior = netdir.fast_routers(hops - 1, &mut rng).await;
        let first = interior.first().ok_or_else(|| garlic_error::internal!("no interior fast router available"))?;
        let first_identity = first.as_relay_identity().ok_or_else(|| garlic_error::internal!("interior router has no ntor key"))?;
        let mut circ = TlsCircuit::connect(first_identity.addr, &first_identity, &mut rng).await?;
        for router in &interior[1..] {
            let identity = router.as_relay_identity().ok_or_else(|| garlic_error::internal!("interior router has no ntor key"))?;
            circ.extend(&identity, router.link_specifiers(), &mut rng).await?;
        }
        circ.extend(&rp_identity, rp.link_specifiers(), &mut rng).await?;
        circ
    } else {
        TlsCircuit::connect(rp_identity.addr, &rp_identity, &mut rng).await?
    };

    let fast_for_intro = netdir.fast_routers(1, &mut rng).await;
    let fast_router = fast_for_intro.first().ok_or_else(|| garlic_error::internal!("no fast router available for introduction circuit"))?;
    let fast_identity = fast_router.as_relay_identity().ok_or_else(|| garlic_error::internal!("fast router has no ntor key"))?;
    let mut intro_circ = TlsCircuit::connect(fast_identity.addr, &fast_identity, &mut rng).await?;
    intro_circ.extend(&intro.relay, intro.relay.link_specifiers(), &mut rng).await?;

    let rp_ntor_key = rp_identity.ntor_key.to_bytes();
    let rp_link_specifiers = rp.link_specifiers();
    if let Err(e) = garlic_hsclient::connect::connect(&mut client_circ, &mut intro_circ, &intro, rp_ntor_key, rp_link_specifiers, &mut rng).await {
        // A transport-level circuit failure says nothing about this
        // domain's introduction points; an actual HS-side rejection
        // does, so only those evict the cache entry.
        if !matches!(e, garlic_hsclient::Error::Circuit(_)) {
            netdir.invalidate_intro(&domain).await;
        }
        return Err(e.into());
    }
    // intro_circ is discarded here on success; dropping it closes its socket.
    Ok(client_circ)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_race_paths_cycles_the_shorter_list() {
        let rps = vec!["rp1", "rp2", "rp3", "rp4"];
        let ips = vec!["ip1"];
        let pairs = build_race_paths(&rps, &ips, 4);
        assert_eq!(pairs, vec![("rp1", "ip1"), ("rp2", "ip1"), ("rp3", "ip1"), ("rp4", "ip1")]);
    }

    #[test]
    fn build_race_paths_is_empty_with_no_intro_points() {
        let rps = vec!["rp1"];
        let ips: Vec<&str> = Vec::new();
        assert!(build_race_paths(&rps, &ips, 4).is_empty());
    }

    #[test]
    fn build_race_paths_caps_at_count_even_with_more_candidates() {
        let rps = vec!["rp1", "rp2", "rp3"];
        let ips = vec!["ip1", "ip2", "ip3"];
        assert_eq!(build_race_paths(&rps, &ips, 2).len(), 2);
    }
}
