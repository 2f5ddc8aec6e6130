use bytes::{Buf, BufMut, BytesMut};
use prost::encoding::{decode_varint, encode_varint, encoded_len_varint};

/// Header layout is `crc32(4) | type(1) | varint(keySize) | varint(valueSize)`;
/// with `keySize`/`valueSize` bounded to 32 bits the varints are at most 5
/// bytes each, giving a 15-byte worst case header.
pub const MAX_LOG_RECORD_HEADER_SIZE: usize = 4 + 1 + 5 + 5;

/// Sequence number marking a record as non-transactional.
pub const NON_TRANSACTION_SEQ_NO: u64 = 0;

/// The real key of the terminator record that closes a write batch.
pub const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// Tag byte stored in the record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    Normal = 0,
    Deleted = 1,
    TxnFinished = 2,
}

impl LogRecordType {
    pub fn from_u8(v: u8) -> crate::error::Result<Self> {
        match v {
            0 => Ok(LogRecordType::Normal),
            1 => Ok(LogRecordType::Deleted),
            2 => Ok(LogRecordType::TxnFinished),
            _ => Err(crate::error::Error::DataDirectoryCorrupted),
        }
    }
}

/// A single on-disk record: the unit appended to a data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// On-disk key, already `seq ++ real_key` packed via `pack_key`.
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: LogRecordType,
}

/// In-memory pointer to a record's location on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordPos {
    pub file_id: u32,
    pub offset: u64,
}

/// Result of a successful `DataFile::read_log_record` call.
#[derive(Debug)]
pub struct ReadLogRecord {
    pub record: LogRecord,
    /// Total bytes the record occupies on disk (header + key + value).
    pub size: u64,
}

/// Encodes `record` into its on-disk byte representation.
pub fn encode_log_record(record: &LogRecord) -> Vec<u8> {
    let key_len = record.key.len();
    let value_len = record.value.len();
    let header_len = 1 + encoded_len_varint(key_len as u64) + encoded_len_varint(value_len as u64);
    let total_len = 4 + header_len + key_len + value_len;

    let mut buf = BytesMut::with_capacity(total_len);
    buf.put_u32(0); // placeholder for the CRC, filled in below
    buf.put_u8(record.rec_type as u8);
    encode_varint(key_len as u64, &mut buf);
    encode_varint(value_len as u64, &mut buf);
    buf.extend_from_slice(&record.key);
    buf.extend_from_slice(&record.value);

    let crc = crc32fast::hash(&buf[4..]);
    buf[0..4].copy_from_slice(&crc.to_le_bytes());

    buf.to_vec()
}

/// A decoded record header, plus the number of bytes it occupied.
pub struct LogRecordHeader {
    pub crc: u32,
    pub rec_type: u8,
    pub key_size: usize,
    pub value_size: usize,
}

/// Decodes a record header from the front of `buf`. Returns `None` if
/// `buf` is too short to hold even the fixed-size prefix, mirroring the
/// "end of file" sentinel the data-file reader checks for.
pub fn decode_log_record_header(buf: &[u8]) -> Option<(LogRecordHeader, usize)> {
    if buf.len() <= 4 {
        return None;
    }
    let crc = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let rec_type = buf[4];
    let mut rest = &buf[5..];
    let key_size = decode_varint(&mut rest).ok()? as usize;
    let value_size = decode_varint(&mut rest).ok()? as usize;
    let consumed = buf.len() - rest.len();
    Some((LogRecordHeader { crc, rec_type, key_size, value_size }, consumed))
}

/// Packs `seq` and `real_key` into the on-disk key layout: `varuint(seq) ++ real_key`.
pub fn pack_key(real_key: &[u8], seq: u64) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(encoded_len_varint(seq) + real_key.len());
    encode_varint(seq, &mut buf);
    buf.extend_from_slice(real_key);
    buf.to_vec()
}

/// Splits a packed on-disk key back into `(real_key, seq)`.
pub fn unpack_key(key: &[u8]) -> (Vec<u8>, u64) {
    let mut rest = key;
    let seq = decode_varint(&mut rest).unwrap_or(0);
    (rest.to_vec(), seq)
}

/// Encodes a `LogRecordPos` for storage in a hint file: `varint(fileId) ++ varint(offset)`.
pub fn encode_log_record_pos(pos: LogRecordPos) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_varint(pos.file_id as u64, &mut buf);
    encode_varint(pos.offset, &mut buf);
    buf.to_vec()
}

/// Inverse of `encode_log_record_pos`.
pub fn decode_log_record_pos(buf: &[u8]) -> crate::error::Result<LogRecordPos> {
    let mut rest = buf;
    let file_id = decode_varint(&mut rest).map_err(|_| crate::error::Error::DataDirectoryCorrupted)?;
    let offset = decode_varint(&mut rest).map_err(|_| crate::error::Error::DataDirectoryCorrupted)?;
    Ok(LogRecordPos { file_id: file_id as u32, offset })
}
