mod art;
mod bptree;
mod btree;

use std::path::Path;

use crate::data::LogRecordPos;
use crate::error::Result;
use crate::options::IndexType;

pub use art::ArtIndex;
pub use bptree::BPlusTreeIndex;
pub use btree::BTreeIndex;

/// Ordered key -> position map. Every backend in `index/` implements this
/// contract identically; the engine never branches on which one is in
/// use except to decide whether it still needs to replay the log
/// (`Indexer::is_durable`).
pub trait Indexer: Send + Sync {
    /// Inserts or replaces the position for `key`. Returns `false` if the
    /// backend rejected the write.
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> bool;

    fn get(&self, key: &[u8]) -> Option<LogRecordPos>;

    /// Removes `key`. Returns `true` if an entry was present.
    fn delete(&self, key: &[u8]) -> bool;

    fn size(&self) -> usize;

    /// A snapshot-consistent iterator over the key set as of this call.
    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator>;

    /// Releases backend resources. A no-op for purely in-memory backends.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Whether this backend is durable on its own, so the engine can skip
    /// the data-file replay used to rebuild in-memory backends.
    fn is_durable(&self) -> bool {
        false
    }
}

/// Iterator over an `Indexer`'s key set, positioned by `rewind`/`seek`
/// and advanced by `next`.
pub trait IndexIterator: Send {
    fn rewind(&mut self);

    /// Forward iterators seek to the first key >= `key`; reverse
    /// iterators seek to the first key <= `key`.
    fn seek(&mut self, key: &[u8]);

    fn next(&mut self);

    fn valid(&self) -> bool;

    fn key(&self) -> &[u8];

    fn value(&self) -> LogRecordPos;
}

/// Constructs the configured index backend.
pub fn new_indexer(index_type: IndexType, dir_path: &Path, sync_writes: bool) -> Result<Box<dyn Indexer>> {
    Ok(match index_type {
        IndexType::BTree => Box::new(BTreeIndex::new()),
        IndexType::Art => Box::new(ArtIndex::new()),
        IndexType::BPlusTree => Box::new(BPlusTreeIndex::new(dir_path, sync_writes)?),
    })
}
