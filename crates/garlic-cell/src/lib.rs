//! Encode and decode Tor link cells (`ChanCell`) and the relay-cell
//! format carried inside them once a hop's encryption layer has been
//! peeled off.
//!
//! This is deliberately a thin, allocation-light codec: it knows
//! nothing about circuits, hops, or cryptography. [`garlic-proto`]
//! layers the encryption and circuit bookkeeping on top.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chancell;
pub mod relaycell;

mod int_enum;

pub use garlic_bytes::{Error as BytesError, Reader, Writer};

/// Errors from cell and relay-cell codecs.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer holds a complete frame whose command we don't recognize
    /// and whose shape we therefore can't validate further than framing.
    #[error("cell of unknown shape (command {0})")]
    UnknownCell(u8),
    /// A field was malformed once we knew the command.
    #[error("malformed cell body: {0}")]
    BadBody(&'static str),
    /// Propagated from the underlying byte cursor.
    #[error(transparent)]
    Bytes(#[from] garlic_bytes::Error),
}

impl garlic_error::HasKind for Error {
    fn kind(&self) -> garlic_error::ErrorKind {
        match self {
            Error::UnknownCell(_) => garlic_error::ErrorKind::UnknownCell,
            _ => garlic_error::ErrorKind::ProtocolError,
        }
    }
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
