use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fs4::fs_std::FileExt;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::batch::WriteBatch;
use crate::data::data_file::{parse_data_file_id, DataFile, DATA_FILE_NAME_SUFFIX, SEQ_NO_FILE_NAME};
use crate::data::log_record::{
    encode_log_record, pack_key, unpack_key, LogRecord, LogRecordType, NON_TRANSACTION_SEQ_NO,
    TXN_FIN_KEY,
};
use crate::error::{Error, Result};
use crate::index::{self, Indexer};
use crate::iterator::EngineIterator;
use crate::options::{IteratorOptions, Options, Stat, WriteBatchOptions};

const LOCK_FILE_NAME: &str = ".lock";

/// The mutable parts of the engine: the active file taking writes and the
/// sealed files kept open for reads. Guarded by a single reader-writer
/// lock so writers serialize file rotation/appends while readers proceed
/// concurrently with each other.
pub(crate) struct EngineState {
    pub(crate) active_file: Option<DataFile>,
    pub(crate) older_files: HashMap<u32, DataFile>,
}

/// An open Bitcask storage engine instance.
pub struct Engine {
    pub(crate) options: Options,
    pub(crate) state: RwLock<EngineState>,
    pub(crate) index: Box<dyn Indexer>,
    pub(crate) seq_no: AtomicU64,
    pub(crate) merging: AtomicBool,
    /// File ids discovered at open, ascending. Used only during the
    /// startup replay; stale afterwards.
    pub(crate) file_ids: Vec<u32>,
    _dir_lock: File,
}

impl Engine {
    /// Opens (creating if necessary) a Bitcask database rooted at
    /// `options.dir_path`.
    pub fn open(options: Options) -> Result<Self> {
        options.validate()?;

        let dir_path = options.dir_path.clone();
        log::info!("opening database {}", dir_path.display());
        if !dir_path.is_dir() {
            fs::create_dir_all(&dir_path)?;
        }

        let dir_lock = acquire_directory_lock(&dir_path)?;

        crate::merge::load_merge_files(&dir_path)?;

        let file_ids = load_data_file_ids(&dir_path)?;
        let (active_file, older_files) = open_data_files(&dir_path, &file_ids)?;

        let index = index::new_indexer(options.index_type, &dir_path, options.sync_write)?;

        let mut engine = Engine {
            options,
            state: RwLock::new(EngineState { active_file, older_files }),
            index,
            seq_no: AtomicU64::new(NON_TRANSACTION_SEQ_NO),
            merging: AtomicBool::new(false),
            file_ids,
            _dir_lock: dir_lock,
        };

        if engine.index.is_durable() {
            engine.load_seq_no()?;
            let state = engine.state.read();
            if let Some(active) = &state.active_file {
                active.set_write_off(active.size()?);
            }
        } else {
            crate::merge::load_index_from_hint_file(&engine)?;
            engine.load_index_from_data_files()?;
        }

        log::info!("indexed {} live keys in {}", engine.index.size(), dir_path.display());
        Ok(engine)
    }

    /// Writes `key`/`value`, overwriting any prior value for `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let record = LogRecord {
            key: pack_key(key, NON_TRANSACTION_SEQ_NO),
            value: value.to_vec(),
            rec_type: LogRecordType::Normal,
        };
        let pos = self.append_log_record(&record)?;
        if !self.index.put(key.to_vec(), pos) {
            return Err(Error::IndexUpdateFailed);
        }
        Ok(())
    }

    /// Removes `key`. A no-op (not an error) if `key` has no live record.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        if self.index.get(key).is_none() {
            return Ok(());
        }
        let record = LogRecord {
            key: pack_key(key, NON_TRANSACTION_SEQ_NO),
            value: Vec::new(),
            rec_type: LogRecordType::Deleted,
        };
        self.append_log_record(&record)?;
        if !self.index.delete(key) {
            return Err(Error::IndexUpdateFailed);
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let pos = self.index.get(key).ok_or(Error::KeyNotFound)?;
        let state = self.state.read();
        self.get_value_by_position(&state, pos)
    }

    pub(crate) fn get_value_by_position(
        &self,
        state: &RwLockReadGuard<'_, EngineState>,
        pos: crate::data::LogRecordPos,
    ) -> Result<Vec<u8>> {
        let record = self.read_record_at(state, pos)?;
        if record.rec_type == LogRecordType::Deleted {
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }

    fn read_record_at(
        &self,
        state: &RwLockReadGuard<'_, EngineState>,
        pos: crate::data::LogRecordPos,
    ) -> Result<LogRecord> {
        let active_id = state.active_file.as_ref().map(|f| f.file_id());
        let read = if Some(pos.file_id) == active_id {
            state.active_file.as_ref().unwrap().read_log_record(pos.offset)?
        } else {
            state
                .older_files
                .get(&pos.file_id)
                .ok_or(Error::DataFileNotFound(pos.file_id))?
                .read_log_record(pos.offset)?
        };
        read.map(|r| r.record).ok_or(Error::DataFileNotFound(pos.file_id))
    }

    /// Returns every live key, in ascending order.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        let mut iter = self.index.iterator(false);
        let mut keys = Vec::with_capacity(self.index.size());
        iter.rewind();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        keys
    }

    /// Visits every live key/value pair in ascending key order, stopping
    /// early if `f` returns `false`.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let state = self.state.read();
        let mut iter = self.index.iterator(false);
        iter.rewind();
        while iter.valid() {
            let value = self.get_value_by_position(&state, iter.value())?;
            if !f(iter.key(), &value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }

    pub fn new_iterator(&self, options: IteratorOptions) -> EngineIterator<'_> {
        EngineIterator::new(self, options)
    }

    pub fn new_write_batch(&self, options: WriteBatchOptions) -> WriteBatch<'_> {
        WriteBatch::new(self, options)
    }

    /// Best-effort fsync of the active file.
    pub fn sync(&self) -> Result<()> {
        let state = self.state.read();
        if let Some(active) = &state.active_file {
            active.sync()?;
        }
        Ok(())
    }

    pub fn stat(&self) -> Result<Stat> {
        let state = self.state.read();
        let mut disk_size = 0u64;
        let mut data_file_num = state.older_files.len();
        if let Some(active) = &state.active_file {
            data_file_num += 1;
            disk_size += active.size()?;
        }
        for file in state.older_files.values() {
            disk_size += file.size()?;
        }
        Ok(Stat { key_num: self.index.size(), data_file_num, disk_size })
    }

    /// Flushes the sequence counter, syncs, and closes every open file.
    /// Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        let state = self.state.read();
        if state.active_file.is_none() {
            return Ok(());
        }
        drop(state);

        if !self.index.is_durable() {
            let seq_no_file = DataFile::new_seq_no_file(&self.options.dir_path)?;
            let record = LogRecord {
                key: TXN_FIN_KEY.to_vec(),
                value: self.seq_no.load(Ordering::SeqCst).to_string().into_bytes(),
                rec_type: LogRecordType::Normal,
            };
            seq_no_file.write(&encode_log_record(&record))?;
            seq_no_file.sync()?;
            seq_no_file.close()?;
        }

        self.index.close()?;

        let mut state = self.state.write();
        if let Some(active) = state.active_file.take() {
            active.sync()?;
            active.close()?;
        }
        for (_, file) in state.older_files.drain() {
            file.close()?;
        }
        Ok(())
    }

    /// Appends `record` to the active file under the write lock, rotating
    /// the segment first if it would overflow `DataFileSize`.
    pub(crate) fn append_log_record(&self, record: &LogRecord) -> Result<crate::data::LogRecordPos> {
        let mut state = self.state.write();
        self.append_log_record_locked(&mut state, record)
    }

    pub(crate) fn append_log_record_locked(
        &self,
        state: &mut RwLockWriteGuard<'_, EngineState>,
        record: &LogRecord,
    ) -> Result<crate::data::LogRecordPos> {
        if state.active_file.is_none() {
            self.rotate_active_file(state, 0)?;
        }

        let encoded = encode_log_record(record);
        let size = encoded.len() as u64;

        let active_id = state.active_file.as_ref().unwrap().file_id();
        let write_off = state.active_file.as_ref().unwrap().write_off();
        if write_off + size > self.options.data_file_size {
            state.active_file.as_ref().unwrap().sync()?;
            self.rotate_active_file(state, active_id + 1)?;
        }

        let active = state.active_file.as_ref().unwrap();
        let offset = active.write(&encoded)?;

        if self.options.sync_write {
            active.sync()?;
        }

        Ok(crate::data::LogRecordPos { file_id: active.file_id(), offset })
    }

    fn rotate_active_file(&self, state: &mut RwLockWriteGuard<'_, EngineState>, new_id: u32) -> Result<()> {
        if let Some(old_active) = state.active_file.take() {
            let old_id = old_active.file_id();
            state.older_files.insert(old_id, old_active);
        }
        let new_file = DataFile::new(&self.options.dir_path, new_id)?;
        state.active_file = Some(new_file);
        Ok(())
    }

    /// Allocates and returns the next transaction sequence number.
    pub(crate) fn next_seq_no(&self) -> u64 {
        self.seq_no.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn load_seq_no(&self) -> Result<()> {
        let path = self.options.dir_path.join(SEQ_NO_FILE_NAME);
        if !path.is_file() {
            return Ok(());
        }
        let file = DataFile::new_seq_no_file(&self.options.dir_path)?;
        if let Some(read) = file.read_log_record(0)? {
            let text = String::from_utf8_lossy(&read.record.value);
            if let Ok(seq) = text.parse::<u64>() {
                self.seq_no.store(seq, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    /// Replays every non-skipped data file into the index, per spec
    /// section 4.5.3: transactional records are buffered by sequence
    /// number until their `TxnFinished` terminator is seen, and any
    /// buffer left over at the end of replay (a torn batch) is discarded.
    fn load_index_from_data_files(&mut self) -> Result<()> {
        if self.file_ids.is_empty() {
            return Ok(());
        }

        let boundary = crate::merge::non_merge_file_id(&self.options.dir_path)?;

        let state = self.state.read();
        let active_id = state.active_file.as_ref().map(|f| f.file_id());

        let mut max_seq = NON_TRANSACTION_SEQ_NO;
        let mut pending: BTreeMap<u64, Vec<(Vec<u8>, LogRecordType, crate::data::LogRecordPos)>> = BTreeMap::new();
        let mut last_offset_in_active = 0u64;

        for &file_id in &self.file_ids.clone() {
            if let Some(boundary) = boundary {
                if file_id < boundary {
                    continue;
                }
            }

            let file_ref_active;
            let file_ref_older;
            let file: &DataFile = if Some(file_id) == active_id {
                file_ref_active = state.active_file.as_ref().unwrap();
                file_ref_active
            } else {
                file_ref_older = state.older_files.get(&file_id).ok_or(Error::DataFileNotFound(file_id))?;
                file_ref_older
            };

            let mut offset = 0u64;
            loop {
                let Some(read) = file.read_log_record(offset)? else { break };
                let (real_key, seq) = unpack_key(&read.record.key);
                let pos = crate::data::LogRecordPos { file_id, offset };

                if seq == NON_TRANSACTION_SEQ_NO {
                    apply_record(self.index.as_ref(), &real_key, read.record.rec_type, pos);
                } else if read.record.rec_type == LogRecordType::TxnFinished {
                    if let Some(batch) = pending.remove(&seq) {
                        for (key, rec_type, pos) in batch {
                            apply_record(self.index.as_ref(), &key, rec_type, pos);
                        }
                    }
                } else {
                    pending.entry(seq).or_default().push((real_key, read.record.rec_type, pos));
                }

                max_seq = max_seq.max(seq);
                offset += read.size;
            }

            if Some(file_id) == active_id {
                last_offset_in_active = offset;
            }
        }

        if let Some(active) = &state.active_file {
            active.set_write_off(last_offset_in_active);
        }
        drop(state);

        self.seq_no.store(max_seq, Ordering::SeqCst);
        Ok(())
    }
}

fn apply_record(index: &dyn Indexer, key: &[u8], rec_type: LogRecordType, pos: crate::data::LogRecordPos) {
    match rec_type {
        LogRecordType::Deleted => {
            index.delete(key);
        }
        _ => {
            index.put(key.to_vec(), pos);
        }
    }
}

fn acquire_directory_lock(dir_path: &std::path::Path) -> Result<File> {
    let file = OpenOptions::new().create(true).write(true).open(dir_path.join(LOCK_FILE_NAME))?;
    file.try_lock_exclusive().map_err(|_| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "database directory is already locked by another engine instance",
        ))
    })?;
    Ok(file)
}

fn load_data_file_ids(dir_path: &std::path::Path) -> Result<Vec<u32>> {
    let mut file_ids = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(DATA_FILE_NAME_SUFFIX) {
            continue;
        }
        let id = parse_data_file_id(name).ok_or(Error::DataDirectoryCorrupted)?;
        file_ids.push(id);
    }
    file_ids.sort_unstable();
    Ok(file_ids)
}

fn open_data_files(
    dir_path: &std::path::Path,
    file_ids: &[u32],
) -> Result<(Option<DataFile>, HashMap<u32, DataFile>)> {
    let mut older_files = HashMap::new();
    let mut active_file = None;
    for (i, &id) in file_ids.iter().enumerate() {
        let file = DataFile::new(dir_path, id)?;
        if i == file_ids.len() - 1 {
            active_file = Some(file);
        } else {
            older_files.insert(id, file);
        }
    }
    Ok((active_file, older_files))
}

impl Drop for Engine {
    fn drop(&mut self) {
        let state = self.state.read();
        if let Some(active) = &state.active_file {
            if let Err(err) = active.sync() {
                log::warn!("failed to flush active data file on drop: {err}");
            }
        }
    }
}
