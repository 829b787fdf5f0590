//! Error type for star database loading.
//!
//! Lookups never fail: a missing star, name or cross-index entry is `None`.
//! Everything that can go wrong while reading a source or applying a record
//! is an [`Error`], and [`Error::kind`] sorts it into one of the categories
//! callers usually branch on:
//!
//! | Kind | Variants | Effect |
//! |------|----------|--------|
//! | [`Format`](ErrorKind::Format) | bad magic/version, truncation, converter parse errors | the whole source is rejected |
//! | [`Validation`](ErrorKind::Validation) | duplicate/unknown numbers, malformed fields | the single record is rejected |
//! | [`UnresolvedReference`](ErrorKind::UnresolvedReference) | missing barycenter | the single star is dropped |
//! | [`Io`](ErrorKind::Io) | read/write failures | the whole source is rejected |

use thiserror::Error;

use crate::star::CatalogNumber;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {file_type} magic: expected {expected:?}, got {found:?}")]
    BadMagic {
        file_type: &'static str,
        expected: &'static [u8],
        found: Vec<u8>,
    },

    #[error("unsupported {file_type} version: expected {expected:#06x}, got {found:#06x}")]
    UnsupportedVersion {
        file_type: &'static str,
        expected: u16,
        found: u16,
    },

    #[error("truncated {file_type}: {message}")]
    Truncated {
        file_type: &'static str,
        message: String,
    },

    #[error("error parsing record #{record}: {message}")]
    RecordParse { record: usize, message: String },

    #[error("binary star data must be loaded before any text records")]
    LoadOrder,

    #[error("duplicate catalog number {0}")]
    DuplicateCatalogNumber(CatalogNumber),

    #[error("cannot {action} star {catalog_number}: no such star")]
    UnknownCatalogNumber {
        action: &'static str,
        catalog_number: CatalogNumber,
    },

    #[error("{action} record has no catalog number")]
    MissingCatalogNumber { action: &'static str },

    #[error("catalog number {0} is reserved")]
    ReservedCatalogNumber(CatalogNumber),

    #[error("automatic catalog numbers exhausted at {0}")]
    CatalogNumbersExhausted(CatalogNumber),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("malformed field {field}: {message}")]
    MalformedField { field: String, message: String },

    #[error("catalog reference {reference} resolves to {resolved}, record says {declared}")]
    CrossIndexMismatch {
        reference: String,
        resolved: CatalogNumber,
        declared: CatalogNumber,
    },

    #[error("star {star} references barycenter {barycenter}, which was never resolved")]
    UnresolvedBarycenter {
        star: CatalogNumber,
        barycenter: CatalogNumber,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad failure category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Validation,
    UnresolvedReference,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadMagic { .. }
            | Error::UnsupportedVersion { .. }
            | Error::Truncated { .. }
            | Error::RecordParse { .. } => ErrorKind::Format,
            Error::LoadOrder
            | Error::DuplicateCatalogNumber(_)
            | Error::UnknownCatalogNumber { .. }
            | Error::MissingCatalogNumber { .. }
            | Error::ReservedCatalogNumber(_)
            | Error::CatalogNumbersExhausted(_)
            | Error::MissingField(_)
            | Error::MalformedField { .. }
            | Error::CrossIndexMismatch { .. } => ErrorKind::Validation,
            Error::UnresolvedBarycenter { .. } => ErrorKind::UnresolvedReference,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn malformed(field: &str, message: impl Into<String>) -> Self {
        Error::MalformedField {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Maps an unexpected EOF onto [`Error::Truncated`], leaving other I/O errors alone.
    pub(crate) fn from_read(err: std::io::Error, file_type: &'static str, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Truncated {
                file_type,
                message: format!("stream ended inside {}", what),
            }
        } else {
            Error::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
