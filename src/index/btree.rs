use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::IndexIterator;
use crate::data::LogRecordPos;

/// Default index backend: an ordered balanced tree behind a single
/// reader-writer lock, mirroring the original `google/btree` wrapper in
/// `index/btree.go` (writes take the lock exclusively; the map itself
/// provides the ordering `Iterator` needs).
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        BTreeIndex { tree: RwLock::new(BTreeMap::new()) }
    }
}

impl super::Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> bool {
        self.tree.write().insert(key, pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.tree.write().remove(key).is_some()
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let mut items: Vec<(Vec<u8>, LogRecordPos)> =
            self.tree.read().iter().map(|(k, v)| (k.clone(), *v)).collect();
        if reverse {
            items.reverse();
        }
        Box::new(SortedIterator { items, reverse, index: 0 })
    }
}

/// Materialized-snapshot iterator shared by `BTreeIndex` and `ArtIndex`:
/// both keep their live data in an order that collects into a `Vec`
/// trivially, so seeking is a binary search over that snapshot.
pub(super) struct SortedIterator {
    pub(super) items: Vec<(Vec<u8>, LogRecordPos)>,
    pub(super) reverse: bool,
    pub(super) index: usize,
}

impl IndexIterator for SortedIterator {
    fn rewind(&mut self) {
        self.index = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        // Forward: first key >= target. Reverse: first key <= target,
        // i.e. the last key >= target in ascending order, scanned from
        // the already-reversed `items`.
        self.index = if self.reverse {
            self.items.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        self.index += 1;
    }

    fn valid(&self) -> bool {
        self.index < self.items.len()
    }

    fn key(&self) -> &[u8] {
        &self.items[self.index].0
    }

    fn value(&self) -> LogRecordPos {
        self.items[self.index].1
    }
}

#[cfg(test)]
mod tests {
    use super::super::Indexer;
    use super::*;

    fn pos(id: u32) -> LogRecordPos {
        LogRecordPos { file_id: id, offset: 0 }
    }

    #[test]
    fn put_get_delete() {
        let idx = BTreeIndex::new();
        assert!(idx.put(b"a".to_vec(), pos(1)));
        assert_eq!(idx.get(b"a"), Some(pos(1)));
        assert!(idx.put(b"a".to_vec(), pos(2)));
        assert_eq!(idx.get(b"a"), Some(pos(2)));
        assert!(idx.delete(b"a"));
        assert_eq!(idx.get(b"a"), None);
        assert!(!idx.delete(b"a"));
    }

    #[test]
    fn iterates_in_order() {
        let idx = BTreeIndex::new();
        for (k, id) in [("b", 2), ("a", 1), ("c", 3)] {
            idx.put(k.as_bytes().to_vec(), pos(id));
        }
        let mut it = idx.iterator(false);
        it.rewind();
        let mut keys = vec![];
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        let mut it = idx.iterator(true);
        it.rewind();
        let mut keys = vec![];
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn seek_forward_and_reverse() {
        let idx = BTreeIndex::new();
        for k in ["a", "ae", "b", "c", "d", "e"] {
            idx.put(k.as_bytes().to_vec(), pos(0));
        }
        let mut it = idx.iterator(false);
        it.seek(b"b");
        assert_eq!(it.key(), b"b");

        let mut it = idx.iterator(true);
        it.seek(b"b");
        assert_eq!(it.key(), b"b");
    }
}
