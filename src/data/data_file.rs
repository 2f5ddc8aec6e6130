use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::log_record::{
    decode_log_record_header, encode_log_record, encode_log_record_pos, LogRecord, LogRecordPos,
    LogRecordType, ReadLogRecord, MAX_LOG_RECORD_HEADER_SIZE,
};
use crate::error::{Error, Result};
use crate::fio::{self, IoManager};

pub const DATA_FILE_NAME_SUFFIX: &str = ".data";
pub const HINT_FILE_NAME: &str = "hint-index";
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// A single append-only segment: either the one active file accepting
/// writes, or a sealed file kept open for reads.
pub struct DataFile {
    file_id: u32,
    write_off: RwLock<u64>,
    io_manager: Box<dyn IoManager>,
}

impl DataFile {
    pub fn new(dir_path: &Path, file_id: u32) -> Result<Self> {
        let file_name = data_file_name(dir_path, file_id);
        Self::open(&file_name, file_id)
    }

    pub fn new_hint_file(dir_path: &Path) -> Result<Self> {
        Self::open(&dir_path.join(HINT_FILE_NAME), 0)
    }

    pub fn new_merge_finished_file(dir_path: &Path) -> Result<Self> {
        Self::open(&dir_path.join(MERGE_FINISHED_FILE_NAME), 0)
    }

    pub fn new_seq_no_file(dir_path: &Path) -> Result<Self> {
        Self::open(&dir_path.join(SEQ_NO_FILE_NAME), 0)
    }

    fn open(path: &Path, file_id: u32) -> Result<Self> {
        let io_manager = fio::new_io_manager(path)?;
        let write_off = io_manager.size()?;
        Ok(DataFile { file_id, write_off: RwLock::new(write_off), io_manager })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn write_off(&self) -> u64 {
        *self.write_off.read()
    }

    pub fn set_write_off(&self, offset: u64) {
        *self.write_off.write() = offset;
    }

    pub fn size(&self) -> Result<u64> {
        self.io_manager.size()
    }

    /// Appends `buf`, advancing the write cursor, and returns the offset
    /// it was written at.
    pub fn write(&self, buf: &[u8]) -> Result<u64> {
        let mut write_off = self.write_off.write();
        let offset = *write_off;
        let n = self.io_manager.write(buf)?;
        *write_off += n as u64;
        Ok(offset)
    }

    pub fn write_hint_record(&self, real_key: &[u8], pos: LogRecordPos) -> Result<()> {
        let record = LogRecord {
            key: real_key.to_vec(),
            value: encode_log_record_pos(pos),
            rec_type: LogRecordType::Normal,
        };
        self.write(&encode_log_record(&record))?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.io_manager.sync()
    }

    pub fn close(&self) -> Result<()> {
        self.io_manager.close()
    }

    /// Reads and decodes the record starting at `offset`, or `None` at
    /// the normal end of the file.
    pub fn read_log_record(&self, offset: u64) -> Result<Option<ReadLogRecord>> {
        let file_size = self.io_manager.size()?;
        if offset >= file_size {
            return Ok(None);
        }
        let header_bytes = std::cmp::min(MAX_LOG_RECORD_HEADER_SIZE as u64, file_size - offset);
        let mut header_buf = vec![0u8; header_bytes as usize];
        let n = self.io_manager.read(&mut header_buf, offset)?;
        header_buf.truncate(n);

        let Some((header, header_len)) = decode_log_record_header(&header_buf) else {
            return Ok(None);
        };
        if header_len <= 4 || (header.crc == 0 && header.key_size == 0 && header.value_size == 0) {
            return Ok(None);
        }

        let kv_len = header.key_size + header.value_size;
        let mut kv_buf = vec![0u8; kv_len];
        if kv_len > 0 {
            self.io_manager.read(&mut kv_buf, offset + header_len as u64)?;
        }
        let key = kv_buf[..header.key_size].to_vec();
        let value = kv_buf[header.key_size..].to_vec();

        let mut crc_input = Vec::with_capacity(header_len - 4 + kv_len);
        crc_input.extend_from_slice(&header_buf[4..header_len]);
        crc_input.extend_from_slice(&kv_buf);
        let crc = crc32fast::hash(&crc_input);
        if crc != header.crc {
            return Err(Error::InvalidCrc);
        }

        let rec_type = LogRecordType::from_u8(header.rec_type)?;
        let size = (header_len + kv_len) as u64;
        Ok(Some(ReadLogRecord { record: LogRecord { key, value, rec_type }, size }))
    }
}

pub fn data_file_name(dir_path: &Path, file_id: u32) -> PathBuf {
    dir_path.join(format!("{file_id:09}{DATA_FILE_NAME_SUFFIX}"))
}

/// Parses a `%09d.data` file name back into its numeric id. Returns
/// `None` for anything else (including non-UTF8 names).
pub fn parse_data_file_id(file_name: &str) -> Option<u32> {
    file_name.strip_suffix(DATA_FILE_NAME_SUFFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let file = DataFile::new(dir.path(), 0).unwrap();
        let record = LogRecord {
            key: b"key".to_vec(),
            value: b"value".to_vec(),
            rec_type: LogRecordType::Normal,
        };
        let encoded = encode_log_record(&record);
        let offset = file.write(&encoded).unwrap();
        assert_eq!(offset, 0);

        let read = file.read_log_record(0).unwrap().unwrap();
        assert_eq!(read.record, record);
        assert_eq!(read.size, encoded.len() as u64);
    }

    #[test]
    fn eof_returns_none() {
        let dir = TempDir::new().unwrap();
        let file = DataFile::new(dir.path(), 0).unwrap();
        assert!(file.read_log_record(0).unwrap().is_none());
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = DataFile::new(dir.path(), 0).unwrap();
        let record =
            LogRecord { key: b"k".to_vec(), value: b"v".to_vec(), rec_type: LogRecordType::Normal };
        let mut encoded = encode_log_record(&record);
        // Flip a byte in the value region.
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;
        file.write(&encoded).unwrap();

        match file.read_log_record(0) {
            Err(Error::InvalidCrc) => {}
            other => panic!("expected InvalidCrc, got {other:?}"),
        }
    }

    #[test]
    fn file_id_name_roundtrip() {
        let dir = TempDir::new().unwrap();
        let name = data_file_name(dir.path(), 7);
        assert_eq!(name.file_name().unwrap().to_str().unwrap(), "000000007.data");
        assert_eq!(parse_data_file_id("000000007.data"), Some(7));
        assert_eq!(parse_data_file_id("not-a-number.data"), None);
        assert_eq!(parse_data_file_id("000000007.txt"), None);
    }
}
