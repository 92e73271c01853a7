//! The shared handle `garlic-circmgr` takes a dependency on: a [`NetworkStatus`] behind a read-mostly lock, paired
//! with the introduction-point cache it fronts.

use crate::hsdesc_fetch::{self, IntroductionPoint};
use crate::intro_cache::IntroCache;
use crate::router::Router;
use crate::status::NetworkStatus;
use crate::{Error, Result};
use garlic_hscrypto::onion_address;
use rand_core::{CryptoRng, RngCore};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

/// A [`NetworkStatus`] plus its introduction-point cache, shared between
/// the racer's concurrent lanes and a domain pool's workers. Reads of
/// the consensus are far more frequent than replacements, hence the
/// `RwLock`; the intro-point cache is a plain `Mutex` since every access
/// touches at most one domain's entry.
pub struct NetDir {
    status: RwLock<NetworkStatus>,
    intro_cache: Mutex<IntroCache>,
}

/// The handle type callers actually hold and clone.
pub type SharedNetDir = Arc<NetDir>;

impl NetDir {
    /// Wrap a freshly parsed or loaded consensus.
    pub fn new(status: NetworkStatus) -> SharedNetDir {
        Arc::new(NetDir { status: RwLock::new(status), intro_cache: Mutex::new(IntroCache::new()) })
    }

    /// Replace the held consensus with a newer one. Leaves the intro-point
    /// cache untouched: a consensus refresh doesn't itself invalidate a
    /// domain's cached introduction points, which expire by time period.
    pub async fn replace_status(&self, status: NetworkStatus) {
        *self.status.write().await = status;
    }

    /// Borrow the current consensus for inspection, e.g. to persist it.
    pub async fn with_status<T>(&self, f: impl FnOnce(&NetworkStatus) -> T) -> T {
        f(&self.status.read().await)
    }

    /// Merge a batch of fetched router descriptors into the held
    /// consensus, used by both the
    /// lazy per-hop fetch and the eager `prefetch_router_descriptors`
    /// boot step.
    pub async fn merge_descriptor_batch(&self, batch: &std::collections::HashMap<[u8; 20], garlic_netdoc::routerdesc::ParsedDescriptorExtra>) {
        self.status.write().await.merge_descriptor_batch(batch);
    }

    /// `count` fast, subnet-diverse routers.
    pub async fn fast_routers<R: rand::Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Router> {
        let ns = self.status.read().await;
        crate::fastselect::select(&ns, count, rng)
    }

    /// The introduction points for `domain`, served from cache when
    /// still fresh and fetched over the network otherwise.
    pub async fn intro_points<R: RngCore + CryptoRng>(&self, domain: &str, rng: &mut R) -> Result<Vec<IntroductionPoint>> {
        let now = unix_now();
        if let Some(points) = self.intro_cache.lock().await.get(domain, now) {
            return Ok(points.to_vec());
        }
        let address = onion_address::parse(domain)?;
        let (points, expires_at) = {
            let ns = self.status.read().await;
            let tpn = ns.time_period_num(now);
            let points = hsdesc_fetch::fetch(&ns, &address, tpn, rng).await?;
            let expires_at = crate::timeperiod::tp_start(tpn, ns.time_period_length_minutes, ns.voting_interval_secs);
            (points, expires_at)
        };
        self.intro_cache.lock().await.insert(domain.to_string(), points.clone(), expires_at);
        Ok(points)
    }

    /// Evict `domain`'s cached introduction points.
    pub async fn invalidate_intro(&self, domain: &str) {
        self.intro_cache.lock().await.invalidate(domain);
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
