//! Shared error-kind taxonomy threaded through every `garlic-*` crate.
//!
//! Individual crates define their own concrete `Error` enums with
//! [`thiserror::Error`]; each implements [`HasKind`] so that a caller
//! several layers up (the racer, the pool) can ask "is this worth
//! retrying" without matching on every concrete variant in every
//! downstream crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::fmt::Debug;

/// A coarse classification of failure, independent of which crate raised it.
///
/// New variants may be added over time; callers should not treat this as
/// exhaustive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A peer sent a cell or message that violates the link or relay protocol.
    ProtocolError,
    /// A well-formed cell whose command we don't recognize.
    UnknownCell,
    /// A relay cell failed layered-encryption verification.
    EncryptionError,
    /// The link-layer ntor handshake failed.
    NtorHandshake,
    /// The hidden-service ntor handshake failed.
    HsNtorHandshake,
    /// An INTRODUCE1 was rejected or could not be relayed.
    Introduce,
    /// No usable introduction points could be obtained for a domain.
    IntroductionPointsUnavailable,
    /// A descriptor or consensus document failed to parse.
    DescriptorFormat,
    /// A directory response failed to decompress.
    Compression,
    /// A directory server returned an unexpected status or body.
    BadResponse,
    /// An onion address failed checksum or version validation.
    InvalidOnionAddress,
    /// No directory authority or mirror could be reached.
    DirectoryUnavailable,
    /// Every lane of a circuit race failed before the deadline.
    AllLanesFailed,
    /// A pool worker was never successfully connected.
    NotConnected,
    /// A pool worker's circuit is no longer healthy.
    Unhealthy,
    /// A pool worker's latency history crossed the degraded threshold.
    Degraded,
    /// A pool worker has failed too many consecutive operations.
    TooManyFailures,
    /// The underlying transport (TCP/TLS) failed.
    TransportIo,
    /// A bug: an invariant this crate maintains internally was violated.
    Internal,
}

/// Trait implemented by every concrete `Error` type in this workspace.
pub trait HasKind: Debug {
    /// Return the coarse kind of this error.
    fn kind(&self) -> ErrorKind;
}

impl HasKind for std::io::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::TransportIo
    }
}

/// Shorthand for constructing an "internal error" with a message, for use at
/// call sites that hit a branch that should be unreachable given this
/// crate's own invariants.
#[macro_export]
macro_rules! internal {
    ($($arg:tt)*) => {
        $crate::Bug(format!($($arg)*))
    };
}

/// A boxed internal-invariant violation, carrying a human-readable message.
///
/// Crates that want a concrete type to wrap in their own `Error::Internal`
/// variant can use this instead of inventing their own.
#[derive(Debug, thiserror::Error)]
#[error("internal error (this is a bug): {0}")]
pub struct Bug(pub String);

impl HasKind for Bug {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}
