//! `garlic`: a racing onion-service v3 client core (ground:
//! `arti_client`, the facade crate of the Arti workspace).
//!
//! This crate ties together the network-status registry
//! ([`garlic_netdir`]), the circuit racer and domain pool
//! ([`garlic_circmgr`]), and the protocol engine ([`garlic_proto`])
//! behind a single [`Client`]: bootstrap a consensus, then open streams
//! to onion-service virtual ports by domain name.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod persist;

pub use client::{Client, GarlicStream};
pub use config::{AuthorityConfig, ClientConfig, ClientConfigBuilder, RaceOptsConfig};

use garlic_error::{ErrorKind, HasKind};

/// Errors from bootstrapping or using a [`Client`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network-status registry failed (consensus fetch, descriptor
    /// fetch, HS descriptor fetch/decrypt).
    #[error(transparent)]
    Netdir(#[from] garlic_netdir::Error),
    /// The circuit racer or domain pool failed.
    #[error(transparent)]
    Circmgr(#[from] garlic_circmgr::Error),
    /// The protocol engine failed on an already-established circuit.
    #[error(transparent)]
    Proto(#[from] garlic_proto::Error),
    /// The persisted network-status snapshot could not be saved or loaded.
    #[error(transparent)]
    Persist(#[from] persist::Error),
    /// A config file could not be parsed.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Netdir(e) => e.kind(),
            Error::Circmgr(e) => e.kind(),
            Error::Proto(e) => e.kind(),
            Error::Persist(_) => ErrorKind::TransportIo,
            Error::Config(_) => ErrorKind::BadResponse,
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
