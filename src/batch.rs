use std::collections::HashMap;

use parking_lot::Mutex;

use crate::data::log_record::{pack_key, LogRecord, LogRecordType, TXN_FIN_KEY};
use crate::db::Engine;
use crate::error::{Error, Result};
use crate::options::WriteBatchOptions;

enum PendingOp {
    Put(Vec<u8>),
    Delete,
}

/// Buffers `put`/`delete` calls and applies them atomically on `commit`:
/// either every buffered write becomes visible, or (on crash before the
/// terminator record is synced) none of them do.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    pending: Mutex<HashMap<Vec<u8>, PendingOp>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(engine: &'a Engine, options: WriteBatchOptions) -> Self {
        WriteBatch { engine, options, pending: Mutex::new(HashMap::new()) }
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        self.pending.lock().insert(key.to_vec(), PendingOp::Put(value.to_vec()));
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let mut pending = self.pending.lock();
        if self.engine.index.get(key).is_none() {
            pending.remove(key);
            return Ok(());
        }
        pending.insert(key.to_vec(), PendingOp::Delete);
        Ok(())
    }

    /// Appends every buffered write under a single sequence number,
    /// terminated by a `TxnFinished` marker, then applies the writes to
    /// the index. No key becomes visible until the terminator is durable.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num {
            return Err(Error::ExceedMaxBatchNum);
        }

        let mut state = self.engine.state.write();
        let seq_no = self.engine.next_seq_no();

        let mut positions = HashMap::with_capacity(pending.len());
        for (key, op) in pending.iter() {
            let (value, rec_type) = match op {
                PendingOp::Put(value) => (value.clone(), LogRecordType::Normal),
                PendingOp::Delete => (Vec::new(), LogRecordType::Deleted),
            };
            let record = LogRecord { key: pack_key(key, seq_no), value, rec_type };
            let pos = self.engine.append_log_record_locked(&mut state, &record)?;
            positions.insert(key.clone(), (rec_type, pos));
        }

        let finish_record =
            LogRecord { key: pack_key(TXN_FIN_KEY, seq_no), value: Vec::new(), rec_type: LogRecordType::TxnFinished };
        self.engine.append_log_record_locked(&mut state, &finish_record)?;

        if self.options.sync_writes {
            if let Some(active) = &state.active_file {
                active.sync()?;
            }
        }
        drop(state);

        for (key, (rec_type, pos)) in positions {
            match rec_type {
                LogRecordType::Deleted => {
                    self.engine.index.delete(&key);
                }
                _ => {
                    self.engine.index.put(key, pos);
                }
            }
        }

        pending.clear();
        Ok(())
    }
}
