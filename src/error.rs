use std::fmt::{self, Display};

/// Errors surfaced by the engine, the index backends, and the on-disk
/// record codec. Kept as a flat enum with hand-written `Display` rather
/// than pulling in a derive macro crate.
#[derive(Debug)]
pub enum Error {
    /// An empty key was passed to Put/Delete/Get/a write batch.
    KeyIsEmpty,
    /// No live record for the key, or the resolved record was a tombstone.
    KeyNotFound,
    /// The index backend rejected a Put/Delete after the log append
    /// already succeeded.
    IndexUpdateFailed,
    /// A `LogRecordPos` pointed at a fileId that isn't open.
    DataFileNotFound(u32),
    /// A `*.data` file name didn't parse as `%09d.data`.
    DataDirectoryCorrupted,
    /// A write batch's buffered entry count exceeded `MaxBatchNum`.
    ExceedMaxBatchNum,
    /// `Merge` was called while a merge was already running.
    MergeIsProgress,
    /// A decoded record's CRC didn't match the stored value.
    InvalidCrc,
    /// `Options`/`WriteBatchOptions` failed validation.
    ConfigInvalid(&'static str),
    /// An error surfaced by the on-disk index backend.
    Index(String),
    /// Any other filesystem failure.
    Io(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyIsEmpty => write!(f, "key is empty"),
            Error::KeyNotFound => write!(f, "key not found"),
            Error::IndexUpdateFailed => write!(f, "failed to update index"),
            Error::DataFileNotFound(id) => write!(f, "data file {id} not found"),
            Error::DataDirectoryCorrupted => write!(f, "data directory corrupted"),
            Error::ExceedMaxBatchNum => write!(f, "write batch exceeds max batch size"),
            Error::MergeIsProgress => write!(f, "a merge is already in progress"),
            Error::InvalidCrc => write!(f, "invalid crc, log record is corrupted"),
            Error::ConfigInvalid(reason) => write!(f, "invalid configuration: {reason}"),
            Error::Index(reason) => write!(f, "index error: {reason}"),
            Error::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        use Error::*;
        match (self, other) {
            (KeyIsEmpty, KeyIsEmpty)
            | (KeyNotFound, KeyNotFound)
            | (IndexUpdateFailed, IndexUpdateFailed)
            | (DataDirectoryCorrupted, DataDirectoryCorrupted)
            | (ExceedMaxBatchNum, ExceedMaxBatchNum)
            | (MergeIsProgress, MergeIsProgress)
            | (InvalidCrc, InvalidCrc) => true,
            (DataFileNotFound(a), DataFileNotFound(b)) => a == b,
            (ConfigInvalid(a), ConfigInvalid(b)) => a == b,
            (Index(a), Index(b)) => a == b,
            _ => false,
        }
    }
}
