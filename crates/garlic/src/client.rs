//! The public entry point (ground: `arti_client::TorClient`): bootstrap
//! a network-status registry and a domain pool, then hand out streams
//! to onion-service virtual ports.

use crate::config::ClientConfig;
use crate::persist;
use crate::{Error, Result};
use garlic_circmgr::pool::{CircuitLease, Outcome, PoolManager};
use garlic_netdir::authorities::DirAuthority;
use garlic_netdir::registry::{NetDir, SharedNetDir};
use garlic_netdir::status::NetworkStatus;
use garlic_proto::stream::StreamEvent;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A bootstrapped client: a live network-status registry plus a pool
/// manager handing out raced, health-checked circuits per domain.
pub struct Client {
    netdir: SharedNetDir,
    pool: Arc<PoolManager>,
    snapshot_path: std::path::PathBuf,
}

impl Client {
    /// Bootstrap a client from `cfg`: reuse the cached network-status
    /// snapshot if it's still fresh, otherwise download and persist a
    /// new one, then stand up the domain pool.
    pub async fn bootstrap(cfg: ClientConfig) -> Result<Self> {
        if let Some(f) = cfg.address_map.clone() {
            garlic_proto::tls::set_address_map(Some(f));
        }

        let authorities = cfg.authority_list();
        let authorities_hash = authorities.as_deref().map(persist::hash_authorities);
        let snapshot_path = persist::snapshot_path(&cfg.cache_path, authorities_hash);

        let now = unix_now();
        let cached = persist::load(&snapshot_path).await?;
        let status = match cached {
            Some(status) if status.is_fresh(now) => {
                tracing::info!(path = %snapshot_path.display(), "reusing cached network-status snapshot");
                status
            }
            _ => {
                tracing::info!("fetching a fresh network-status consensus");
                let raw = fetch_consensus(authorities.as_deref()).await?;
                let status = NetworkStatus::parse(&raw)?;
                persist::save(&snapshot_path, &status).await?;
                status
            }
        };

        let netdir = NetDir::new(status);
        if cfg.prefetch_router_descriptors {
            spawn_prefetch(netdir.clone());
        }

        let pool = Arc::new(PoolManager::new(netdir.clone(), cfg.pool_config()));
        Ok(Client { netdir, pool, snapshot_path })
    }

    /// Open a stream to `target` (an onion-service virtual-port string,
    /// e.g. `"80"`) on `domain`'s rendezvous circuit, racing and
    /// pooling as needed.
    #[tracing::instrument(skip(self), fields(domain))]
    pub async fn connect(&self, domain: &str, target: &str) -> Result<GarlicStream> {
        let mut lease = self.pool.acquire(domain).await?;
        let started = Instant::now();
        match lease.circuit.begin(target).await {
            Ok(stream_id) => Ok(GarlicStream { lease: Some(lease), stream_id, pool: self.pool.clone(), started }),
            Err(e) => {
                self.pool.release(lease, Outcome::Err).await;
                Err(e.into())
            }
        }
    }

    /// Sweep every tracked domain's idle workers. Callers that want periodic maintenance should invoke
    /// this on their own timer; this client never schedules one itself.
    pub async fn idle_ping(&self) {
        self.pool.idle_ping().await;
    }

    /// Number of domains currently tracked, and how many have been
    /// LRU-evicted over this client's lifetime.
    pub async fn domain_stats(&self) -> (usize, u64) {
        self.pool.domain_stats().await
    }

    /// The network-status registry backing this client, for callers
    /// that need direct access to routers or introduction points.
    pub fn netdir(&self) -> &SharedNetDir {
        &self.netdir
    }

    /// The path this client's network-status snapshot is persisted to.
    pub fn snapshot_path(&self) -> &std::path::Path {
        &self.snapshot_path
    }
}

async fn fetch_consensus(authorities: Option<&[DirAuthority]>) -> Result<String> {
    match authorities {
        Some(list) => {
            let mut refs: Vec<&DirAuthority> = list.iter().collect();
            refs.shuffle(&mut rand::thread_rng());
            Ok(garlic_netdir::dirclient::fetch_consensus_from(&refs).await?)
        }
        None => Ok(garlic_netdir::dirclient::fetch_consensus().await?),
    }
}

/// Fetch descriptors for every fast router as a detached background
/// task; failures are logged
/// and otherwise ignored since descriptors are fetched lazily anyway.
fn spawn_prefetch(netdir: SharedNetDir) {
    tokio::spawn(async move {
        let fingerprints: Vec<[u8; 20]> = netdir.with_status(|ns| ns.fast_routers().map(|r| r.fingerprint).collect()).await;
        if fingerprints.is_empty() {
            return;
        }
        match garlic_netdir::dirclient::fetch_descriptor_batches(&fingerprints).await {
            Ok(batch) => {
                tracing::debug!(count = batch.len(), "prefetched router descriptors");
                netdir.merge_descriptor_batch(&batch).await;
            }
            Err(e) => tracing::warn!(error = ?e, "router descriptor prefetch failed"),
        }
    });
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// An open stream to an onion service's virtual port.
///
/// Doesn't implement `AsyncRead`/`AsyncWrite`: returning the underlying
/// circuit to the pool is an async operation (recording latency and
/// health), which can't happen from a synchronous `Drop`. Callers
/// finish explicitly with [`GarlicStream::finish`]; a stream dropped
/// without finishing still closes its socket, it just never reports
/// back to the pool (counted as neither a success nor a failure).
pub struct GarlicStream {
    lease: Option<CircuitLease>,
    stream_id: u16,
    pool: Arc<PoolManager>,
    started: Instant,
}

impl GarlicStream {
    /// Send application bytes on this stream.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let lease = self.lease.as_mut().expect("stream already finished");
        lease.circuit.send_data(self.stream_id, data).await.map_err(Error::from)
    }

    /// Receive the next stream event: connected, data, or closed.
    pub async fn recv(&mut self) -> Result<StreamEvent> {
        let lease = self.lease.as_mut().expect("stream already finished");
        lease.circuit.recv_event(self.stream_id).await.map_err(Error::from)
    }

    /// Hand the underlying circuit back to the pool, recording whether
    /// this stream's work succeeded and how long it took. Must be called to release the circuit
    /// promptly; omitting it just means the worker sits checked out
    /// until the process exits.
    pub async fn finish(mut self, succeeded: bool) {
        if let Some(lease) = self.lease.take() {
            let outcome = if succeeded { Outcome::OkWithLatency(self.started.elapsed().as_millis() as u64) } else { Outcome::Err };
            self.pool.release(lease, outcome).await;
        }
    }
}
