use std::path::PathBuf;

use crate::error::{Error, Result};

/// Selects the backing structure for the in-memory key -> position index.
/// `BTree` is the default; `Art` and `BPlusTree` satisfy the same
/// `Indexer` contract with different durability/ordering tradeoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Ordered balanced tree, rebuilt from the log (or a hint file) on
    /// every open.
    BTree,
    /// Adaptive-radix-tree-contract variant; also rebuilt on open.
    Art,
    /// On-disk ordered map (`jammdb`-backed). Durable on its own, so
    /// `Engine::open` skips the data-file replay for it.
    BPlusTree,
}

/// Configuration for `Engine::open`.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory holding all data files, hint file, and markers.
    pub dir_path: PathBuf,
    /// Segment rotation threshold, in bytes. Must be > 0.
    pub data_file_size: u64,
    /// Fsync the active file after every append.
    pub sync_write: bool,
    /// Index backend to use.
    pub index_type: IndexType,
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid("dir_path must not be empty"));
        }
        if self.data_file_size == 0 {
            return Err(Error::ConfigInvalid("data_file_size must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dir_path: PathBuf::from("/tmp/caskdb"),
            data_file_size: 256 * 1024 * 1024,
            sync_write: false,
            index_type: IndexType::BTree,
        }
    }
}

/// Configuration for `Engine::new_write_batch`.
#[derive(Debug, Clone, Copy)]
pub struct WriteBatchOptions {
    /// Upper bound on buffered entries per commit.
    pub max_batch_num: usize,
    /// Fsync the active file at the end of `commit`.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        WriteBatchOptions { max_batch_num: 10_000, sync_writes: true }
    }
}

/// Configuration for `Engine::new_iterator`.
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only keys starting with this byte string are visited. Empty
    /// disables the filter.
    pub prefix: Vec<u8>,
    /// Iterate in descending key order.
    pub reverse: bool,
}

/// Point-in-time statistics returned by `Engine::stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Number of live keys in the index.
    pub key_num: usize,
    /// Number of data files currently open (active + sealed).
    pub data_file_num: usize,
    /// Total on-disk size of the data directory's segments, in bytes.
    pub disk_size: u64,
}
