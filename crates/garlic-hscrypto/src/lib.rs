//! Onion-service v3 cryptography: Ed25519
//! public-key blinding, subcredentials, HSDir store/directory indices,
//! the disaster shared-random fallback, onion-address decoding, and the
//! client side of the HS ntor handshake.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blinding;
pub mod hs_ntor;
pub mod hsdir_index;
pub mod onion_address;

/// A 32-byte time-period-scoped subcredential binding a service's
/// long-term public key to its current blinded key.
pub type Subcredential = [u8; 32];

/// Errors from this crate.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// An onion address failed base32, checksum, or version validation.
    #[error("invalid onion address")]
    InvalidOnionAddress,
    /// A public key was not a valid point on the curve.
    #[error("public key is not a valid curve point")]
    BadPublicKey,
    /// The HS ntor handshake's MAC did not match.
    #[error("hidden-service ntor handshake authentication failed")]
    HsHandshakeMacMismatch,
}

impl garlic_error::HasKind for Error {
    fn kind(&self) -> garlic_error::ErrorKind {
        match self {
            Error::InvalidOnionAddress => garlic_error::ErrorKind::InvalidOnionAddress,
            Error::BadPublicKey => garlic_error::ErrorKind::InvalidOnionAddress,
            Error::HsHandshakeMacMismatch => garlic_error::ErrorKind::HsNtorHandshake,
        }
    }
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
