use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;

use super::{IoManager, DATA_FILE_PERM};
use crate::error::Result;

/// `IoManager` backed by a plain `std::fs::File` opened for
/// append/read/create. Positioned reads use `pread` (via `FileExt`) so
/// they never disturb the file's append cursor and need no internal
/// locking; appends rely on `O_APPEND` for atomic placement at EOF.
pub struct FileIoManager {
    file: File,
}

impl FileIoManager {
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .append(true)
            .mode(DATA_FILE_PERM)
            .open(path)?;
        Ok(FileIoManager { file })
    }
}

impl IoManager for FileIoManager {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut total = 0;
        loop {
            match self.file.read_at(&mut buf[total..], offset + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
            if total == buf.len() {
                break;
            }
        }
        Ok(total)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        (&self.file).write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // `File` closes its descriptor on drop; nothing to do eagerly.
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000000000.data");
        let io = FileIoManager::new(&path).unwrap();

        assert_eq!(io.write(b"hello ").unwrap(), 6);
        assert_eq!(io.write(b"world").unwrap(), 5);
        assert_eq!(io.size().unwrap(), 11);

        let mut buf = [0u8; 5];
        let n = io.read(&mut buf, 6).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn short_read_past_eof_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000000000.data");
        let io = FileIoManager::new(&path).unwrap();
        io.write(b"ab").unwrap();

        let mut buf = [0u8; 10];
        let n = io.read(&mut buf, 0).unwrap();
        assert_eq!(n, 2);

        let mut buf = [0u8; 10];
        let n = io.read(&mut buf, 5).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn sync_and_close_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000000000.data");
        let io = FileIoManager::new(&path).unwrap();
        io.write(b"data").unwrap();
        io.sync().unwrap();
        io.close().unwrap();
        io.close().unwrap();
    }
}
