//! The per-domain worker pool: a bounded set of ready
//! circuits per onion domain, health/age/latency/failure eviction, and
//! a global LRU limit across domains.

use crate::racer::{race, RaceOpts};
use crate::{Error, Result};
use garlic_netdir::registry::SharedNetDir;
use garlic_proto::circuit::TlsCircuit;
use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Tunables shared by every domain's pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker slots kept per domain.
    pub pool_size: usize,
    /// Maximum number of domains tracked at once; beyond this the
    /// least-recently-used domain's pool is evicted.
    pub max_domains: usize,
    /// A worker is unhealthy once its stream counter reaches this.
    pub max_stream_count: u32,
    /// A worker is unhealthy once it's this many milliseconds old.
    pub max_circuit_age_ms: u64,
    /// A worker is degraded once its mean of the last 10 latencies
    /// exceeds this many milliseconds.
    pub latency_threshold_ms: u64,
    /// A worker is unhealthy once its consecutive-failure count reaches this.
    pub max_consecutive_failures: u32,
    /// Options passed to the racer when a domain needs a new worker.
    pub race_opts: RaceOpts,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            pool_size: 2,
            max_domains: 25,
            max_stream_count: 100,
            max_circuit_age_ms: 600_000,
            latency_threshold_ms: 5_000,
            max_consecutive_failures: 3,
            race_opts: RaceOpts::default(),
        }
    }
}

/// Why a worker was removed from its pool, logged at eviction.
#[derive(Debug, Clone, Copy)]
enum EvictReason {
    NotConnected,
    Unhealthy,
    Degraded,
    TooManyFailures,
}

const LATENCY_HISTORY: usize = 10;

/// The bookkeeping kept alongside a worker's circuit. Held separately
/// from the [`TlsCircuit`] itself so a checked-out worker's history
/// survives while its circuit is on loan to a caller.
#[derive(Debug)]
struct WorkerMeta {
    created_at_ms: u64,
    stream_count: u32,
    latencies: VecDeque<u64>,
    failures: u32,
}

impl WorkerMeta {
    fn new(now_ms: u64) -> Self {
        WorkerMeta { created_at_ms: now_ms, stream_count: 0, latencies: VecDeque::with_capacity(LATENCY_HISTORY), failures: 0 }
    }

    fn is_degraded(&self, cfg: &PoolConfig) -> bool {
        if self.latencies.len() < 3 {
            return false;
        }
        let mean = self.latencies.iter().sum::<u64>() / self.latencies.len() as u64;
        mean > cfg.latency_threshold_ms
    }

    fn is_healthy(&self, cfg: &PoolConfig, now_ms: u64) -> bool {
        self.failures < cfg.max_consecutive_failures
            && self.stream_count < cfg.max_stream_count
            && now_ms.saturating_sub(self.created_at_ms) < cfg.max_circuit_age_ms
            && !self.is_degraded(cfg)
    }
}

/// One worker slot's state.
enum Slot {
    /// Holding a ready circuit, available for checkout.
    Ready(TlsCircuit, WorkerMeta),
    /// On loan to a caller; only its bookkeeping remains here.
    CheckedOut(WorkerMeta),
    /// Reserved for an in-flight build, or evicted; never handed out.
    Empty,
}

/// A domain's worker slots.
#[derive(Default)]
struct DomainPool {
    slots: Vec<Slot>,
}

impl DomainPool {
    fn evict_stale(&mut self, cfg: &PoolConfig, now_ms: u64) {
        for slot in self.slots.iter_mut() {
            if let Slot::Ready(_, meta) = slot {
                if !meta.is_healthy(cfg, now_ms) {
                    tracing::debug!(reason = ?EvictReason::Unhealthy, "evicting idle worker");
                    *slot = Slot::Empty;
                }
            }
        }
        self.slots.retain(|s| !matches!(s, Slot::Empty));
    }

    /// Hand out an already-ready circuit, if one exists.
    fn take_ready(&mut self, cfg: &PoolConfig, now_ms: u64) -> Option<(usize, TlsCircuit)> {
        self.evict_stale(cfg, now_ms);
        let pos = self.slots.iter().position(|s| matches!(s, Slot::Ready(..)))?;
        let Slot::Ready(circuit, mut meta) = std::mem::replace(&mut self.slots[pos], Slot::Empty) else {
            unreachable!("position matched Slot::Ready above")
        };
        meta.stream_count += 1;
        self.slots[pos] = Slot::CheckedOut(meta);
        Some((pos, circuit))
    }

    /// Reserve a new slot for an in-flight build, if there's room.
    fn reserve_slot(&mut self, cfg: &PoolConfig) -> Option<usize> {
        if self.slots.len() >= cfg.pool_size {
            return None;
        }
        let idx = self.slots.len();
        self.slots.push(Slot::Empty);
        Some(idx)
    }

    fn commit_built(&mut self, idx: usize, now_ms: u64) {
        if let Some(slot) = self.slots.get_mut(idx) {
            let mut meta = WorkerMeta::new(now_ms);
            meta.stream_count = 1;
            *slot = Slot::CheckedOut(meta);
        }
    }

    fn commit_failed(&mut self, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx) {
            tracing::debug!(reason = ?EvictReason::NotConnected, "race failed, discarding reserved slot");
            *slot = Slot::Empty;
        }
        self.slots.retain(|s| !matches!(s, Slot::Empty));
    }

    /// Return a borrowed circuit.
    fn release(&mut self, idx: usize, circuit: TlsCircuit, outcome: Outcome, cfg: &PoolConfig, now_ms: u64) {
        let Some(slot) = self.slots.get_mut(idx) else { return };
        let Slot::CheckedOut(mut meta) = std::mem::replace(slot, Slot::Empty) else { return };

        let reason = match outcome {
            Outcome::OkWithLatency(lat) => {
                meta.latencies.push_back(lat);
                if meta.latencies.len() > LATENCY_HISTORY {
                    meta.latencies.pop_front();
                }
                meta.failures = 0;
                (!meta.is_healthy(cfg, now_ms)).then_some(EvictReason::Degraded)
            }
            Outcome::Ok => (!meta.is_healthy(cfg, now_ms)).then_some(EvictReason::Degraded),
            Outcome::Err => {
                meta.failures += 1;
                (meta.failures >= cfg.max_consecutive_failures).then_some(EvictReason::TooManyFailures)
            }
        };

        match reason {
            Some(reason) => {
                tracing::debug!(?reason, "evicting returned worker");
                *self.slots.get_mut(idx).expect("idx was just valid") = Slot::Empty;
            }
            None => {
                *self.slots.get_mut(idx).expect("idx was just valid") = Slot::Ready(circuit, meta);
            }
        }
        self.slots.retain(|s| !matches!(s, Slot::Empty));
    }
}

/// How a borrowed circuit performed, reported back via
/// [`PoolManager::release`].
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// The operation succeeded and took `latency_ms` milliseconds.
    OkWithLatency(u64),
    /// The operation succeeded; no latency sample recorded.
    Ok,
    /// The operation failed.
    Err,
}

/// A circuit checked out of a [`PoolManager`], to be handed back via
/// [`PoolManager::release`] once the caller is done with it.
pub struct CircuitLease {
    domain: String,
    slot: usize,
    /// The borrowed circuit. Use it, then return it via
    /// [`PoolManager::release`].
    pub circuit: TlsCircuit,
}

/// LRU-bounded map from domain name to its worker pool. Kept as a standalone type so the eviction
/// bookkeeping is testable without a network.
struct LruDomains {
    pools: HashMap<String, DomainPool>,
    order: VecDeque<String>,
    max_domains: usize,
    evictions: u64,
}

impl LruDomains {
    fn new(max_domains: usize) -> Self {
        LruDomains { pools: HashMap::new(), order: VecDeque::new(), max_domains, evictions: 0 }
    }

    fn touch(&mut self, domain: &str) {
        self.order.retain(|d| d != domain);
        self.order.push_front(domain.to_string());
    }

    /// Get or create `domain`'s pool, evicting the least-recently-used
    /// domain first if this would exceed `max_domains`. Any access moves `domain` to the front of the LRU.
    fn ensure(&mut self, domain: &str) -> &mut DomainPool {
        if !self.pools.contains_key(domain) {
            while self.pools.len() >= self.max_domains {
                let Some(victim) = self.order.pop_back() else { break };
                self.pools.remove(&victim);
                self.evictions += 1;
                tracing::info!(domain = victim, "evicted least-recently-used domain pool");
            }
            self.pools.insert(domain.to_string(), DomainPool::default());
        }
        self.touch(domain);
        self.pools.get_mut(domain).expect("just inserted or already present")
    }
}

/// The manager coordinating every domain's worker pool. The
/// manager's own bookkeeping is serialized by an async mutex, which
/// realizes that single-writer contract; the slow part of building a
/// worker (running a circuit race) happens with the lock released so
/// one domain's build never blocks another domain's acquire.
pub struct PoolManager {
    netdir: SharedNetDir,
    cfg: PoolConfig,
    inner: Mutex<LruDomains>,
}

impl PoolManager {
    /// A fresh manager with no domains tracked yet.
    pub fn new(netdir: SharedNetDir, cfg: PoolConfig) -> Self {
        let max_domains = cfg.max_domains;
        PoolManager { netdir, cfg, inner: Mutex::new(LruDomains::new(max_domains)) }
    }

    /// Check out a circuit for `domain`, building one if none is ready
    ///. Transparently
    /// re-creates the domain's pool if it was evicted or had died.
    #[tracing::instrument(skip(self), fields(domain))]
    pub async fn acquire(&self, domain: &str) -> Result<CircuitLease> {
        let now = now_ms();
        let reserved = {
            let mut inner = self.inner.lock().await;
            let pool = inner.ensure(domain);
            if let Some((slot, circuit)) = pool.take_ready(&self.cfg, now) {
                return Ok(CircuitLease { domain: domain.to_string(), slot, circuit });
            }
            pool.reserve_slot(&self.cfg)
        };
        let Some(idx) = reserved else {
            return Err(Error::NotConnected);
        };

        let mut rng = rand::rngs::OsRng;
        match race(&self.netdir, domain, &self.cfg.race_opts, &mut rng).await {
            Ok((circuit, stats)) => {
                tracing::info!(
                    lane = stats.winner_index,
                    elapsed_ms = stats.elapsed_ms,
                    lanes_attempted = stats.lanes_attempted,
                    lanes_failed = stats.lanes_failed,
                    "race won, worker ready"
                );
                let mut inner = self.inner.lock().await;
                inner.ensure(domain).commit_built(idx, now_ms());
                Ok(CircuitLease { domain: domain.to_string(), slot: idx, circuit })
            }
            Err(e) => {
                let mut inner = self.inner.lock().await;
                inner.ensure(domain).commit_failed(idx);
                Err(e)
            }
        }
    }

    /// Return a circuit previously obtained from [`Self::acquire`].
    pub async fn release(&self, lease: CircuitLease, outcome: Outcome) {
        let mut inner = self.inner.lock().await;
        if let Some(pool) = inner.pools.get_mut(&lease.domain) {
            pool.release(lease.slot, lease.circuit, outcome, &self.cfg, now_ms());
        }
    }

    /// Sweep every tracked domain's idle workers, evicting any that
    /// have gone dead or unhealthy since they were last touched.
    pub async fn idle_ping(&self) {
        let now = now_ms();
        let mut inner = self.inner.lock().await;
        for pool in inner.pools.values_mut() {
            pool.evict_stale(&self.cfg, now);
        }
    }

    /// Number of domains currently tracked, and how many domain pools
    /// have been LRU-evicted over this manager's lifetime. Exposed for
    /// tests and diagnostics.
    pub async fn domain_stats(&self) -> (usize, u64) {
        let inner = self.inner.lock().await;
        (inner.pools.len(), inner.evictions)
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lru_evicts_the_least_recently_touched_domain() {
        let mut lru = LruDomains::new(2);
        lru.ensure("a");
        lru.ensure("b");
        lru.touch("a");
        lru.ensure("c");

        let mut domains: Vec<&String> = lru.pools.keys().collect();
        domains.sort();
        assert_eq!(domains, vec!["a", "c"]);
        assert_eq!(lru.evictions, 1);
        assert!(!lru.pools.contains_key("b"));
    }

    #[test]
    fn worker_meta_is_degraded_only_with_enough_samples_over_threshold() {
        let cfg = PoolConfig::default();
        let mut meta = WorkerMeta::new(0);
        meta.latencies.extend([6_000, 6_000]);
        assert!(!meta.is_degraded(&cfg), "fewer than 3 samples never counts as degraded");
        meta.latencies.push_back(6_000);
        assert!(meta.is_degraded(&cfg));
    }

    #[test]
    fn worker_meta_health_checks_every_dimension() {
        let cfg = PoolConfig::default();
        let mut meta = WorkerMeta::new(0);
        assert!(meta.is_healthy(&cfg, 0));
        meta.stream_count = cfg.max_stream_count;
        assert!(!meta.is_healthy(&cfg, 0));
        meta.stream_count = 0;
        assert!(!meta.is_healthy(&cfg, cfg.max_circuit_age_ms));
        assert!(meta.is_healthy(&cfg, cfg.max_circuit_age_ms - 1));
    }

    #[test]
    fn worker_meta_failure_threshold_matches_max_consecutive_failures() {
        let cfg = PoolConfig::default();
        let mut meta = WorkerMeta::new(0);
        meta.failures = cfg.max_consecutive_failures - 1;
        assert!(meta.is_healthy(&cfg, 0));
        meta.failures = cfg.max_consecutive_failures;
        assert!(!meta.is_healthy(&cfg, 0));
    }
}
