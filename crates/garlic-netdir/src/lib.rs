//! The network-status registry: consensus fetch and
//! caching, router and descriptor tracking, time-period and
//! shared-random arithmetic, HSDir responsibility computation, and the
//! hidden-service descriptor fetch/decrypt pipeline.
//!
//! This crate is the only one in the workspace that talks to Tor
//! directory authorities and mirrors directly; `garlic-circmgr` asks it
//! for path material (fast routers, introduction points) but never
//! touches a socket itself outside the circuits it builds through
//! `garlic-proto`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod authorities;
pub mod dirclient;
pub mod fastselect;
pub mod hsdir;
pub mod hsdesc_fetch;
pub mod intro_cache;
pub mod registry;
pub mod retry;
pub mod router;
pub mod status;
pub mod timeperiod;

use garlic_error::{ErrorKind, HasKind};

/// Errors from the network-status registry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No directory authority or mirror could be reached.
    #[error("no directory authority was reachable")]
    DirectoryUnavailable,
    /// A directory server returned an unexpected status or body.
    #[error("directory server returned an unexpected response: {0}")]
    BadResponse(&'static str),
    /// A response body failed to decompress.
    #[error("failed to decompress directory response")]
    Compression,
    /// A consensus or descriptor document failed to parse.
    #[error(transparent)]
    Netdoc(#[from] garlic_netdoc::Error),
    /// An onion address failed validation, or an HS cryptographic
    /// operation failed.
    #[error(transparent)]
    Hscrypto(#[from] garlic_hscrypto::Error),
    /// No usable introduction points could be obtained for a domain.
    #[error("no introduction points are available for this domain")]
    IntroductionPointsUnavailable,
    /// The circuit engine failed while fetching a descriptor over a
    /// directory stream.
    #[error(transparent)]
    Circuit(#[from] garlic_proto::Error),
    /// The underlying transport failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// An internal invariant was violated.
    #[error(transparent)]
    Bug(#[from] garlic_error::Bug),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::DirectoryUnavailable => ErrorKind::DirectoryUnavailable,
            Error::BadResponse(_) => ErrorKind::BadResponse,
            Error::Compression => ErrorKind::Compression,
            Error::Netdoc(e) => e.kind(),
            Error::Hscrypto(e) => e.kind(),
            Error::IntroductionPointsUnavailable => ErrorKind::IntroductionPointsUnavailable,
            Error::Circuit(e) => e.kind(),
            Error::Io(_) => ErrorKind::TransportIo,
            Error::Bug(e) => e.kind(),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
