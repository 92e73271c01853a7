//! Text-grammar parsing for the directory documents this client reads:
//! the consensus, router descriptors, and v3 hidden-service descriptors
//!. This crate knows only the document grammar; turning
//! parsed records into the richer domain types (`Router`,
//! `NetworkStatus`) and deciding what to do with them is `garlic-netdir`'s
//! job.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod consensus;
pub mod hsdesc;
pub mod routerdesc;
pub mod tokenize;

/// Errors from parsing a directory document.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required keyword was missing from the document.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// A field's arguments didn't match the expected shape.
    #[error("malformed field {0}")]
    MalformedField(&'static str),
    /// A line claimed to own a PEM object but none followed.
    #[error("expected a PEM object after this line")]
    MissingObject,
    /// A PEM object's `-----END` marker was never found.
    #[error("unterminated PEM object")]
    UnterminatedObject,
    /// Base64 decoding failed.
    #[error("invalid base64")]
    BadBase64,
    /// Hex decoding failed.
    #[error("invalid hex")]
    BadHex,
    /// An integer field didn't parse.
    #[error("invalid integer in field {0}")]
    BadInteger(&'static str),
}

impl garlic_error::HasKind for Error {
    fn kind(&self) -> garlic_error::ErrorKind {
        garlic_error::ErrorKind::DescriptorFormat
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
