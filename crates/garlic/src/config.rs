//! Client configuration: the knobs that
//! flow straight through to [`garlic_circmgr::pool::PoolConfig`] and
//! [`garlic_circmgr::racer::RaceOpts`], plus the handful the facade
//! crate owns itself (authorities, persistence path, prefetch).
//!
//! The full `tor-config` builder-derive stack is out of proportion for
//! a config this small, so the builder below is hand-written: a plain
//! struct of optional overrides, `build()` filling in `§6` defaults for
//! anything left unset.

use garlic_circmgr::pool::PoolConfig;
use garlic_circmgr::racer::RaceOpts;
use garlic_netdir::authorities::DirAuthority;
use garlic_proto::tls::AddressMapFn;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Errors building or loading a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    /// The config could not be read from disk.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A directory authority entry as it appears in a config file. Distinct
/// from [`DirAuthority`] only because the latter's `nickname` is
/// `&'static str`, which a parsed config can't produce without leaking;
/// [`AuthorityConfig::leak`] does that leak once, at config-build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Human-readable name, for logging only.
    pub nickname: String,
    /// IPv4 address of the authority's OR/dir port.
    pub ipv4: Ipv4Addr,
    /// The authority's directory port.
    pub dir_port: u16,
}

impl AuthorityConfig {
    fn leak(self) -> DirAuthority {
        DirAuthority { nickname: Box::leak(self.nickname.into_boxed_str()), ipv4: self.ipv4, dir_port: self.dir_port }
    }
}

/// Race tunables as they appear in a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceOptsConfig {
    /// Number of concurrent lanes to launch.
    pub count: usize,
    /// Number of client-side hops to the rendezvous point.
    pub hops: usize,
    /// Per-race deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RaceOptsConfig {
    fn default() -> Self {
        let d = RaceOpts::default();
        RaceOptsConfig { count: d.count, hops: d.hops, timeout: d.timeout }
    }
}

impl From<RaceOptsConfig> for RaceOpts {
    fn from(c: RaceOptsConfig) -> Self {
        RaceOpts { count: c.count, hops: c.hops, timeout: c.timeout }
    }
}

/// A client's full configuration. Serializes to and from
/// TOML; the `address_map` hook is runtime-only and never round-trips
/// through a config file.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Worker slots kept per domain (default 2).
    pub pool_size: usize,
    /// Maximum number of domains tracked at once (default 25).
    pub max_domains: usize,
    /// Per-worker stream ceiling (default 100).
    pub max_stream_count: u32,
    /// Per-worker age ceiling (default 600s).
    #[serde(with = "humantime_serde")]
    pub max_circuit_age: Duration,
    /// Mean-latency degradation threshold (default 5s).
    #[serde(with = "humantime_serde")]
    pub latency_threshold: Duration,
    /// Consecutive-failure ceiling (default 3).
    pub max_consecutive_failures: u32,
    /// Circuit race tunables.
    pub race_opts: RaceOptsConfig,
    /// Directory authority override; `None` uses the embedded list.
    #[serde(default)]
    pub authorities: Option<Vec<AuthorityConfig>>,
    /// Development hook rewriting `(ip, port)` immediately before an OR
    /// dial. Never serialized; only settable through the builder.
    #[serde(skip)]
    pub address_map: Option<Arc<AddressMapFn>>,
    /// Directory holding the persisted network-status snapshot.
    pub cache_path: PathBuf,
    /// Eagerly fetch descriptors for every fast router after a fresh
    /// consensus load, instead of lazily on first use.
    pub prefetch_router_descriptors: bool,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("pool_size", &self.pool_size)
            .field("max_domains", &self.max_domains)
            .field("max_stream_count", &self.max_stream_count)
            .field("max_circuit_age", &self.max_circuit_age)
            .field("latency_threshold", &self.latency_threshold)
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .field("authorities", &self.authorities)
            .field("address_map", &self.address_map.as_ref().map(|_| "<fn>"))
            .field("cache_path", &self.cache_path)
            .field("prefetch_router_descriptors", &self.prefetch_router_descriptors)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            pool_size: 2,
            max_domains: 25,
            max_stream_count: 100,
            max_circuit_age: Duration::from_millis(600_000),
            latency_threshold: Duration::from_millis(5_000),
            max_consecutive_failures: 3,
            race_opts: RaceOptsConfig::default(),
            authorities: None,
            address_map: None,
            cache_path: crate::persist::default_cache_dir(),
            prefetch_router_descriptors: false,
        }
    }
}

impl ClientConfig {
    /// Start building a config from `§6` defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Parse a config from a TOML document (the `address_map` hook is
    /// never part of this and stays `None`; set it via the builder).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub(crate) fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            pool_size: self.pool_size,
            max_domains: self.max_domains,
            max_stream_count: self.max_stream_count,
            max_circuit_age_ms: self.max_circuit_age.as_millis() as u64,
            latency_threshold_ms: self.latency_threshold.as_millis() as u64,
            max_consecutive_failures: self.max_consecutive_failures,
            race_opts: self.race_opts.clone().into(),
        }
    }

    pub(crate) fn authority_list(&self) -> Option<Vec<DirAuthority>> {
        self.authorities.clone().map(|list| list.into_iter().map(AuthorityConfig::leak).collect())
    }
}

/// A hand-written builder over [`ClientConfig`]'s defaults (see this
/// module's doc comment for why it isn't derived).
#[derive(Default)]
pub struct ClientConfigBuilder {
    cfg: PartialConfig,
}

#[derive(Default)]
struct PartialConfig {
    pool_size: Option<usize>,
    max_domains: Option<usize>,
    max_stream_count: Option<u32>,
    max_circuit_age: Option<Duration>,
    latency_threshold: Option<Duration>,
    max_consecutive_failures: Option<u32>,
    race_opts: Option<RaceOptsConfig>,
    authorities: Option<Vec<AuthorityConfig>>,
    address_map: Option<Arc<AddressMapFn>>,
    cache_path: Option<PathBuf>,
    prefetch_router_descriptors: Option<bool>,
}

impl ClientConfigBuilder {
    /// Worker slots kept per domain.
    pub fn pool_size(mut self, v: usize) -> Self {
        self.cfg.pool_size = Some(v);
        self
    }

    /// Maximum number of domains tracked at once.
    pub fn max_domains(mut self, v: usize) -> Self {
        self.cfg.max_domains = Some(v);
        self
    }

    /// Per-worker stream ceiling.
    pub fn max_stream_count(mut self, v: u32) -> Self {
        self.cfg.max_stream_count = Some(v);
        self
    }

    /// Per-worker age ceiling.
    pub fn max_circuit_age(mut self, v: Duration) -> Self {
        self.cfg.max_circuit_age = Some(v);
        self
    }

    /// Mean-latency degradation threshold.
    pub fn latency_threshold(mut self, v: Duration) -> Self {
        self.cfg.latency_threshold = Some(v);
        self
    }

    /// Consecutive-failure ceiling.
    pub fn max_consecutive_failures(mut self, v: u32) -> Self {
        self.cfg.max_consecutive_failures = Some(v);
        self
    }

    /// Circuit race tunables.
    pub fn race_opts(mut self, v: RaceOptsConfig) -> Self {
        self.cfg.race_opts = Some(v);
        self
    }

    /// Override the embedded directory authority list.
    pub fn authorities(mut self, v: Vec<AuthorityConfig>) -> Self {
        self.cfg.authorities = Some(v);
        self
    }

    /// One authority entry built from its raw socket address, a
    /// convenience wrapper around [`Self::authorities`] for tests and
    /// local development networks.
    pub fn authority(mut self, nickname: impl Into<String>, addr: SocketAddr) -> Self {
        let entry = AuthorityConfig { nickname: nickname.into(), ipv4: match addr.ip() { std::net::IpAddr::V4(v4) => v4, std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED }, dir_port: addr.port() };
        self.cfg.authorities.get_or_insert_with(Vec::new).push(entry);
        self
    }

    /// Install a development hook rewriting `(ip, port)` immediately
    /// before every OR dial.
    pub fn address_map(mut self, f: impl Fn(SocketAddr) -> SocketAddr + Send + Sync + 'static) -> Self {
        self.cfg.address_map = Some(Arc::new(f));
        self
    }

    /// Directory holding the persisted network-status snapshot.
    pub fn cache_path(mut self, v: PathBuf) -> Self {
        self.cfg.cache_path = Some(v);
        self
    }

    /// Eagerly fetch descriptors for every fast router after a fresh
    /// consensus load.
    pub fn prefetch_router_descriptors(mut self, v: bool) -> Self {
        self.cfg.prefetch_router_descriptors = Some(v);
        self
    }

    /// Finish the config, filling in any unset field from `§6` defaults.
    pub fn build(self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            pool_size: self.cfg.pool_size.unwrap_or(defaults.pool_size),
            max_domains: self.cfg.max_domains.unwrap_or(defaults.max_domains),
            max_stream_count: self.cfg.max_stream_count.unwrap_or(defaults.max_stream_count),
            max_circuit_age: self.cfg.max_circuit_age.unwrap_or(defaults.max_circuit_age),
            latency_threshold: self.cfg.latency_threshold.unwrap_or(defaults.latency_threshold),
            max_consecutive_failures: self.cfg.max_consecutive_failures.unwrap_or(defaults.max_consecutive_failures),
            race_opts: self.cfg.race_opts.unwrap_or(defaults.race_opts),
            authorities: self.cfg.authorities.or(defaults.authorities),
            address_map: self.cfg.address_map.or(defaults.address_map),
            cache_path: self.cfg.cache_path.unwrap_or(defaults.cache_path),
            prefetch_router_descriptors: self.cfg.prefetch_router_descriptors.unwrap_or(defaults.prefetch_router_descriptors),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.pool_size, 2);
        assert_eq!(cfg.max_domains, 25);
        assert_eq!(cfg.max_stream_count, 100);
        assert_eq!(cfg.max_circuit_age, Duration::from_millis(600_000));
        assert_eq!(cfg.latency_threshold, Duration::from_millis(5_000));
        assert_eq!(cfg.max_consecutive_failures, 3);
        assert_eq!(cfg.race_opts.count, 4);
        assert_eq!(cfg.race_opts.hops, 1);
        assert_eq!(cfg.race_opts.timeout, Duration::from_millis(30_000));
        assert!(cfg.authorities.is_none());
        assert!(!cfg.prefetch_router_descriptors);
    }

    #[test]
    fn builder_overrides_only_the_fields_it_touches() {
        let cfg = ClientConfig::builder().pool_size(5).prefetch_router_descriptors(true).build();
        assert_eq!(cfg.pool_size, 5);
        assert!(cfg.prefetch_router_descriptors);
        assert_eq!(cfg.max_domains, 25, "untouched fields keep the default");
    }

    #[test]
    fn toml_round_trips_the_numeric_and_duration_fields() {
        let toml = r#"
            pool_size = 3
            max_domains = 25
            max_stream_count = 100
            max_circuit_age = "600s"
            latency_threshold = "5s"
            max_consecutive_failures = 3
            cache_path = "/tmp/garlic"
            prefetch_router_descriptors = false

            [race_opts]
            count = 4
            hops = 1
            timeout = "30s"
        "#;
        let cfg = ClientConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.pool_size, 3);
        assert_eq!(cfg.max_circuit_age, Duration::from_secs(600));
        assert_eq!(cfg.race_opts.timeout, Duration::from_secs(30));
    }

    #[test]
    fn authority_leak_preserves_fields() {
        let entry = AuthorityConfig { nickname: "testauth".to_string(), ipv4: Ipv4Addr::new(1, 2, 3, 4), dir_port: 9030 };
        let leaked = entry.leak();
        assert_eq!(leaked.nickname, "testauth");
        assert_eq!(leaked.dir_port, 9030);
    }
}
