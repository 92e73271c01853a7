//! Low-level cryptography wrappers shared by the circuit engine and the
//! hidden-service machinery: running digests, AES-CTR keystreams, and
//! the client side of the link-level ntor handshake.
//!
//! Hidden-service-specific algebra (Ed25519 blinding, subcredentials,
//! HSDir indices, the HS variant of ntor) lives one layer up in
//! `garlic-hscrypto`, which depends on this crate for the shared
//! primitives.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher_stream;
pub mod digest;
pub mod ntor;

/// Errors from this crate's cryptographic operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The ntor handshake's authentication tag did not match.
    #[error("ntor handshake authentication failed")]
    NtorAuthMismatch,
    /// A peer's public key was not a valid curve point.
    #[error("invalid curve point")]
    BadPublicKey,
}

impl garlic_error::HasKind for Error {
    fn kind(&self) -> garlic_error::ErrorKind {
        garlic_error::ErrorKind::NtorHandshake
    }
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
