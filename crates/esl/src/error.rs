use datafile::DataFileError;
use thiserror::Error;

/// Failures surfaced to embedders.
///
/// Format-level failures ([`DataFileError`]) pass through transparently so
/// callers can distinguish a checksum mismatch from a plain I/O error.
#[derive(Debug, Error)]
pub enum Error {
    /// A `put` exceeded the configured key or value size limit.
    #[error("key or value is oversize")]
    KeyOrValueTooLong,

    /// A `put` with an empty value. A zero value length is the on-disk
    /// deletion marker, so empty values cannot be stored; use `delete`.
    #[error("value must not be empty")]
    EmptyValue,

    /// The key is absent, or its newest record is a tombstone.
    #[error("key not found")]
    KeyNotFound,

    /// Opening the store failed on an I/O operation.
    #[error("store open failed: {source}")]
    OpenFailed {
        #[source]
        source: DataFileError,
    },

    /// A format or file failure from the data-file layer.
    #[error(transparent)]
    Data(#[from] DataFileError),

    /// An I/O failure outside the data-file layer, annotated with the
    /// failing operation.
    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Classifies a recovery-time failure for `open`: plain I/O trouble is
    /// wrapped as [`Error::OpenFailed`], while data corruption (a failed
    /// checksum, a short header) keeps its own identity.
    pub(crate) fn open(source: DataFileError) -> Error {
        match source {
            DataFileError::Io { .. } => Error::OpenFailed { source },
            other => Error::Data(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
