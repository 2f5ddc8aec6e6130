use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use crate::data::data_file::{
    parse_data_file_id, DataFile, DATA_FILE_NAME_SUFFIX, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME,
};
use crate::data::log_record::{pack_key, unpack_key, LogRecordType, NON_TRANSACTION_SEQ_NO};
use crate::db::Engine;
use crate::error::{Error, Result};
use crate::options::Options;

const MERGE_DIR_SUFFIX: &str = "-merge";
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

impl Engine {
    /// Compacts the database: rewrites every live record from the sealed
    /// data files into a fresh sibling directory, emits a hint file
    /// mapping keys to their rewritten positions, then marks the result
    /// complete so the next `Engine::open` can swap it in. Only one merge
    /// may run at a time.
    pub fn merge(&self) -> Result<()> {
        {
            let state = self.state.read();
            if state.active_file.is_none() {
                return Ok(());
            }
        }

        if self.merging.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            log::warn!("merge requested for {} while one is already running", self.options.dir_path.display());
            return Err(Error::MergeIsProgress);
        }
        log::info!("merging {}", self.options.dir_path.display());
        let result = self.do_merge();
        match &result {
            Ok(()) => log::info!("merge of {} finished", self.options.dir_path.display()),
            Err(err) => log::error!("merge of {} failed: {err}", self.options.dir_path.display()),
        }
        self.merging.store(false, Ordering::SeqCst);
        result
    }

    fn do_merge(&self) -> Result<()> {
        let mut merge_files = {
            let mut state = self.state.write();
            if let Some(active) = &state.active_file {
                active.sync()?;
            }
            let active_id = state.active_file.as_ref().unwrap().file_id();
            let old_active = state.active_file.take().unwrap();
            state.older_files.insert(active_id, old_active);
            let new_active = DataFile::new(&self.options.dir_path, active_id + 1)?;
            state.active_file = Some(new_active);

            state.older_files.values().map(|f| f.file_id()).collect::<Vec<_>>()
        };
        merge_files.sort_unstable();
        let non_merge_file_id = merge_files.last().map(|id| id + 1).unwrap_or(0);

        let merge_path = merge_dir_path(&self.options.dir_path);
        if merge_path.is_dir() {
            fs::remove_dir_all(&merge_path)?;
        }
        fs::create_dir_all(&merge_path)?;

        let merge_options =
            Options { dir_path: merge_path.clone(), sync_write: false, ..self.options.clone() };
        let merge_engine = Engine::open(merge_options)?;
        let hint_file = DataFile::new_hint_file(&merge_path)?;

        let state = self.state.read();
        for &file_id in &merge_files {
            let file = state.older_files.get(&file_id).ok_or(Error::DataFileNotFound(file_id))?;
            let mut offset = 0u64;
            loop {
                let Some(read) = file.read_log_record(offset)? else { break };
                let size = read.size;
                let (real_key, _seq) = unpack_key(&read.record.key);

                if let Some(pos) = self.index.get(&real_key) {
                    if pos.file_id == file_id && pos.offset == offset {
                        let record = crate::data::LogRecord {
                            key: pack_key(&real_key, NON_TRANSACTION_SEQ_NO),
                            value: read.record.value,
                            rec_type: LogRecordType::Normal,
                        };
                        let rewritten_pos = merge_engine.append_log_record(&record)?;
                        hint_file.write_hint_record(&real_key, rewritten_pos)?;
                    }
                }

                offset += size;
            }
        }
        drop(state);

        hint_file.sync()?;
        merge_engine.sync()?;

        let merge_finished_file = DataFile::new_merge_finished_file(&merge_path)?;
        let record = crate::data::LogRecord {
            key: MERGE_FINISHED_KEY.to_vec(),
            value: non_merge_file_id.to_string().into_bytes(),
            rec_type: LogRecordType::Normal,
        };
        merge_finished_file.write(&crate::data::log_record::encode_log_record(&record))?;
        merge_finished_file.sync()?;

        Ok(())
    }
}

fn merge_dir_path(dir_path: &Path) -> PathBuf {
    let parent = dir_path.parent().unwrap_or_else(|| Path::new("."));
    let name = dir_path.file_name().and_then(|n| n.to_str()).unwrap_or("db");
    parent.join(format!("{name}{MERGE_DIR_SUFFIX}"))
}

/// Swaps a completed merge directory into the main data directory before
/// the startup replay runs. Files with an id below the merge boundary are
/// superseded by the merge's rewritten files and hint file; anything else
/// (an incomplete merge directory left by a crash mid-merge) is discarded.
pub(crate) fn load_merge_files(dir_path: &Path) -> Result<()> {
    let merge_path = merge_dir_path(dir_path);
    if !merge_path.is_dir() {
        return Ok(());
    }

    let entries = fs::read_dir(&merge_path)?;
    let mut names = Vec::new();
    let mut finished = false;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == MERGE_FINISHED_FILE_NAME {
            finished = true;
        }
        names.push(name);
    }

    if !finished {
        fs::remove_dir_all(&merge_path)?;
        return Ok(());
    }

    let boundary = non_merge_file_id(&merge_path)?.ok_or(Error::DataDirectoryCorrupted)?;

    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(DATA_FILE_NAME_SUFFIX) {
            continue;
        }
        if let Some(id) = parse_data_file_id(name) {
            if id < boundary {
                fs::remove_file(entry.path())?;
            }
        }
    }

    for name in &names {
        if name == MERGE_FINISHED_FILE_NAME {
            continue;
        }
        let src = merge_path.join(name);
        let dst = dir_path.join(name);
        fs::rename(src, dst)?;
    }

    fs::remove_dir_all(&merge_path)?;
    Ok(())
}

/// Reads the merge boundary (the lowest file id *not* covered by the
/// merge) out of a directory's `merge-finished` marker, if one exists.
pub(crate) fn non_merge_file_id(dir_path: &Path) -> Result<Option<u32>> {
    let path = dir_path.join(MERGE_FINISHED_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }
    let file = DataFile::new_merge_finished_file(dir_path)?;
    let read = file.read_log_record(0)?.ok_or(Error::DataDirectoryCorrupted)?;
    let text = String::from_utf8_lossy(&read.record.value);
    let id = text.parse::<u32>().map_err(|_| Error::DataDirectoryCorrupted)?;
    Ok(Some(id))
}

/// Loads key positions straight from a hint file, skipping the slower
/// full-record replay for any file it covers.
pub(crate) fn load_index_from_hint_file(engine: &Engine) -> Result<()> {
    let hint_path = engine.options.dir_path.join(HINT_FILE_NAME);
    if !hint_path.is_file() {
        return Ok(());
    }
    let hint_file = DataFile::new_hint_file(&engine.options.dir_path)?;
    let mut offset = 0u64;
    loop {
        let Some(read) = hint_file.read_log_record(offset)? else { break };
        let pos = crate::data::log_record::decode_log_record_pos(&read.record.value)?;
        engine.index.put(read.record.key, pos);
        offset += read.size;
    }
    Ok(())
}
