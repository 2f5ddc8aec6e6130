mod file_io;

pub use file_io::FileIoManager;

use std::path::Path;

use crate::error::Result;

/// Default permission bits for created data files (rw-r--r--).
pub const DATA_FILE_PERM: u32 = 0o644;

/// Abstracts positioned file I/O so the data-file layer doesn't depend on
/// a concrete filesystem backend. Only one backend (plain `File`) ships
/// today; the seam exists so a future `mmap`-backed manager can slot in
/// without touching `DataFile`.
pub trait IoManager: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`. Short reads at
    /// or past EOF are not errors.
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Appends `buf` to the file, returning the number of bytes written.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Flushes to durable media.
    fn sync(&self) -> Result<()>;

    /// Closes the underlying file handle.
    fn close(&self) -> Result<()>;

    /// Current file size in bytes.
    fn size(&self) -> Result<u64>;
}

/// Opens (or creates) the standard file-backed `IoManager` for `path`.
pub fn new_io_manager(path: &Path) -> Result<Box<dyn IoManager>> {
    Ok(Box::new(FileIoManager::new(path)?))
}
