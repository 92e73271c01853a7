//! Hidden-service rendezvous machinery: INTRODUCE1
//! construction against the client side of the HS ntor handshake,
//! ESTABLISH_RENDEZVOUS/RENDEZVOUS2 cookie handling, and the
//! orchestration that ties a client circuit and an introduction
//! circuit together into one completed rendezvous.
//!
//! This crate only speaks the protocol; building the two circuits
//! involved (choosing routers, racing, pooling) is the job of
//! `garlic-circmgr`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connect;
pub mod introduce;
pub mod rendezvous;

use garlic_error::{ErrorKind, HasKind};

/// Errors from the rendezvous protocol.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A relay violated the expected ESTABLISH_RENDEZVOUS/INTRODUCE1/
    /// RENDEZVOUS2 message sequence.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    /// INTRODUCE1 was rejected by the introduction point or service;
    /// carries the INTRODUCE_ACK status byte.
    #[error("introduction rejected (status {0})")]
    Introduce(u8),
    /// The underlying circuit failed.
    #[error(transparent)]
    Circuit(#[from] garlic_proto::Error),
    /// A cryptographic operation (HS ntor handshake) failed.
    #[error(transparent)]
    Crypto(#[from] garlic_hscrypto::Error),
    /// An internal invariant was violated.
    #[error(transparent)]
    Bug(#[from] garlic_error::Bug),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) => ErrorKind::ProtocolError,
            Error::Introduce(_) => ErrorKind::Introduce,
            Error::Circuit(e) => e.kind(),
            Error::Crypto(e) => e.kind(),
            Error::Bug(e) => e.kind(),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
