use std::path::Path;

use jammdb::{Data, DB};

use super::IndexIterator;
use crate::data::{log_record::decode_log_record_pos, log_record::encode_log_record_pos, LogRecordPos};
use crate::error::{Error, Result};

const BPLUS_TREE_INDEX_FILE_NAME: &str = "bptree-index";
const INDEX_BUCKET_NAME: &str = "caskdb-index";

/// On-disk index backend: an embedded B+-tree (`jammdb`), the same role
/// `index/bptree.go` gives `go.etcd.io/bbolt`. Durable on its own, so
/// `Engine::open` skips the data-file replay for it (§4.5).
pub struct BPlusTreeIndex {
    db: DB,
}

impl BPlusTreeIndex {
    pub fn new(dir_path: &Path, _sync_writes: bool) -> Result<Self> {
        let db = DB::open(dir_path.join(BPLUS_TREE_INDEX_FILE_NAME))
            .map_err(|err| Error::Index(err.to_string()))?;
        {
            let tx = db.tx(true).map_err(|err| Error::Index(err.to_string()))?;
            tx.get_or_create_bucket(INDEX_BUCKET_NAME).map_err(|err| Error::Index(err.to_string()))?;
            tx.commit().map_err(|err| Error::Index(err.to_string()))?;
        }
        Ok(BPlusTreeIndex { db })
    }
}

impl super::Indexer for BPlusTreeIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> bool {
        let result = (|| -> Result<()> {
            let tx = self.db.tx(true).map_err(|err| Error::Index(err.to_string()))?;
            let bucket = tx.get_bucket(INDEX_BUCKET_NAME).map_err(|err| Error::Index(err.to_string()))?;
            bucket.put(key, encode_log_record_pos(pos)).map_err(|err| Error::Index(err.to_string()))?;
            tx.commit().map_err(|err| Error::Index(err.to_string()))?;
            Ok(())
        })();
        result.is_ok()
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        let tx = self.db.tx(false).ok()?;
        let bucket = tx.get_bucket(INDEX_BUCKET_NAME).ok()?;
        let data = bucket.get(key)?;
        decode_log_record_pos(data.kv().value()).ok()
    }

    fn delete(&self, key: &[u8]) -> bool {
        let result = (|| -> Result<bool> {
            let tx = self.db.tx(true).map_err(|err| Error::Index(err.to_string()))?;
            let bucket = tx.get_bucket(INDEX_BUCKET_NAME).map_err(|err| Error::Index(err.to_string()))?;
            let existed = bucket.get(key).is_some();
            if existed {
                bucket.delete(key).map_err(|err| Error::Index(err.to_string()))?;
            }
            tx.commit().map_err(|err| Error::Index(err.to_string()))?;
            Ok(existed)
        })();
        result.unwrap_or(false)
    }

    fn size(&self) -> usize {
        let Ok(tx) = self.db.tx(false) else { return 0 };
        let Ok(bucket) = tx.get_bucket(INDEX_BUCKET_NAME) else { return 0 };
        bucket.cursor().count()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let mut items = vec![];
        if let Ok(tx) = self.db.tx(false) {
            if let Ok(bucket) = tx.get_bucket(INDEX_BUCKET_NAME) {
                for data in bucket.cursor() {
                    if let Data::KeyValue(kv) = data {
                        if let Ok(pos) = decode_log_record_pos(kv.value()) {
                            items.push((kv.key().to_vec(), pos));
                        }
                    }
                }
            }
        }
        if reverse {
            items.reverse();
        }
        Box::new(super::btree::SortedIterator { items, reverse, index: 0 })
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}
