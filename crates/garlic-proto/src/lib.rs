//! The circuit protocol engine: TLS link bring-up,
//! CREATE2/EXTEND2 handshakes, layered relay-cell encryption, stream
//! multiplexing, and SENDME flow control.
//!
//! A [`circuit::Circuit`] owns exactly one TLS link and the onion-routed
//! tunnel built over it: a circuit and its link are 1:1 in this client,
//! with no link multiplexing of several circuits over one connection,
//! unlike a full Tor implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod circuit;
pub mod hop;
pub mod relayid;
pub mod stream;
pub mod tls;

use garlic_error::{ErrorKind, HasKind};

/// Errors from the circuit engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A peer's cell or handshake violated the link/relay protocol.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    /// A relay cell failed layered-decryption recognition at every hop.
    #[error("no hop recognized this relay cell")]
    Encryption,
    /// The link-level ntor handshake failed.
    #[error(transparent)]
    Ntor(#[from] garlic_llcrypto::Error),
    /// A DESTROY cell tore down the circuit; carries the reason byte.
    #[error("circuit destroyed by peer (reason {0})")]
    Destroyed(u8),
    /// The circuit received a well-formed cell it isn't prepared to
    /// accept while in its current state.
    #[error("unexpected cell in state {0}")]
    WrongState(&'static str),
    /// The cell/relay-cell codec rejected something.
    #[error(transparent)]
    Cell(#[from] garlic_cell::Error),
    /// A handshake reply's byte layout didn't parse.
    #[error(transparent)]
    Bytes(#[from] garlic_bytes::Error),
    /// The underlying transport failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A request to the circuit timed out.
    #[error("circuit request timed out")]
    Timeout,
    /// An internal invariant was violated.
    #[error(transparent)]
    Bug(#[from] garlic_error::Bug),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) | Error::WrongState(_) | Error::Destroyed(_) => ErrorKind::ProtocolError,
            Error::Encryption => ErrorKind::EncryptionError,
            Error::Ntor(e) => e.kind(),
            Error::Cell(e) => e.kind(),
            Error::Bytes(_) => ErrorKind::ProtocolError,
            Error::Io(_) | Error::Timeout => ErrorKind::TransportIo,
            Error::Bug(e) => e.kind(),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
