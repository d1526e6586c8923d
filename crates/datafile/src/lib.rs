//! # Datafile — on-disk formats and file plumbing
//!
//! Everything that touches bytes on disk lives here: the entry record codec,
//! the hint (keydir sidecar) codec, the file-system capability trait with its
//! native and in-memory implementations, file naming and directory snapshots,
//! and the readers/writers the store builds on.
//!
//! ## Data file record format
//!
//! ```text
//! [crc: u32 BE][timestamp: u32 BE][key_len: u16 BE][value_len: u16 BE][key][value]
//! ```
//!
//! `crc` is CRC-32 (IEEE) over every byte after itself (offset 4 through the
//! end of the value). `value_len == 0` marks a tombstone.
//!
//! ## Hint file record format
//!
//! ```text
//! [file_id: u16][value_size: u16][entry_offset: u32][value_offset: u32][key_size: u16][key]
//! ```
//!
//! All big-endian. A hint file enumerates the live descriptors of its sibling
//! data file so the key directory can be rebuilt without scanning values.

mod entry;
mod fs;
mod hint;
mod paths;
mod reader;
mod writer;

pub use entry::{Entry, EntryHeader, ENTRY_HEADER_BYTES};
pub use fs::{FileSystem, FsFile, MemFs, OsFs};
pub use hint::{decode_descriptor, encode_descriptor_into, HintRecord, DESCRIPTOR_BYTES, HINT_FIXED_BYTES};
pub use paths::{
    backup_path, data_path, file_id_from_path, hint_path, Backup, PathSnapshot, BACKUP_FILE_SUFFIX,
    DATA_FILE_SUFFIX, HINT_FILE_SUFFIX,
};
pub use reader::{read_data_file, read_hint_file};
pub use writer::{ActiveFile, MergeOutput, MergeWriter};

use thiserror::Error;

/// Failures raised by the on-disk formats and file operations.
#[derive(Debug, Error)]
pub enum DataFileError {
    /// An entry header slice was shorter than the fixed 12 bytes.
    #[error("entry header too short")]
    InvalidEntryHeader,

    /// An entry failed CRC validation, or a record was truncated mid-body.
    #[error("entry corrupted (checksum mismatch or truncated record)")]
    EntryCorrupted,

    /// A keydir descriptor block was shorter than its fixed 12 bytes.
    #[error("invalid keydir data")]
    InvalidKeydirData,

    /// A hint record's fixed block or key bytes were truncated.
    #[error("invalid keydir file data")]
    InvalidKeydirFileData,

    /// A file name did not parse as a ten-digit id with a known extension.
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    /// An underlying file-system error, annotated with the failing operation.
    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl DataFileError {
    /// Maps an `io::Error` into [`DataFileError::Io`] tagged with `op`.
    pub fn io(op: &'static str) -> impl FnOnce(std::io::Error) -> DataFileError {
        move |source| DataFileError::Io { op, source }
    }
}

pub type Result<T> = std::result::Result<T, DataFileError>;
