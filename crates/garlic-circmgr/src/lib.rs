//! The circuit racer and per-domain worker pool.
//!
//! `racer::race` builds several candidate client/introduction circuit
//! pairs concurrently and returns the first one to complete a full
//! rendezvous; `pool::PoolManager` keeps a bounded, LRU-evicted set of
//! such circuits per onion domain and hands them out to callers that
//! want to open application streams.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pool;
pub mod racer;

use garlic_error::{ErrorKind, HasKind};

/// Errors from the circuit racer and domain pool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every lane of a circuit race failed before the per-lane timeout.
    #[error("every circuit race lane failed before the deadline")]
    AllLanesFailed,
    /// A pool worker slot was never successfully connected and the pool
    /// already holds as many workers as `pool_size` allows.
    #[error("no pool worker is available for this domain")]
    NotConnected,
    /// The circuit racer or hidden-service handshake failed.
    #[error(transparent)]
    Hsclient(#[from] garlic_hsclient::Error),
    /// The circuit engine failed while building a path.
    #[error(transparent)]
    Circuit(#[from] garlic_proto::Error),
    /// The network-status registry failed to supply path material.
    #[error(transparent)]
    Registry(#[from] garlic_netdir::Error),
    /// An internal invariant was violated.
    #[error(transparent)]
    Bug(#[from] garlic_error::Bug),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::AllLanesFailed => ErrorKind::AllLanesFailed,
            Error::NotConnected => ErrorKind::NotConnected,
            Error::Hsclient(e) => e.kind(),
            Error::Circuit(e) => e.kind(),
            Error::Registry(e) => e.kind(),
            Error::Bug(e) => e.kind(),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
