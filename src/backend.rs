//! Backend Contract
//!
//! The operation set every storage backend offers to the path router. Calls
//! are synchronous and may block for the length of a medium transaction.
//! Operations a backend cannot support still exist and fail with
//! [`FsError::ReadOnly`], so callers see one uniform contract.

use crate::error::{FsError, Result};
use crate::types::{
    DirEntry, DirHandle, FileData, FileHandle, FormatStatus, OpenFlags, Stat, Whence,
};

/// Descriptor-based filesystem backend
pub trait Backend: Send + Sync {
    // ========================================================================
    // Files
    // ========================================================================

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle>;
    fn close(&self, fd: FileHandle) -> Result<()>;

    /// Read up to `buf.len()` bytes; 0 means end of file
    fn read(&self, fd: FileHandle, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf`, returning the number of bytes accepted
    fn write(&self, fd: FileHandle, buf: &[u8]) -> Result<usize>;

    fn fsync(&self, fd: FileHandle) -> Result<()>;

    /// Move the file offset, returning the new offset
    fn lseek(&self, fd: FileHandle, offset: i64, whence: Whence) -> Result<u64>;

    // ========================================================================
    // Namespace
    // ========================================================================

    fn stat(&self, path: &str) -> Result<Stat>;
    fn unlink(&self, path: &str) -> Result<()>;
    fn mkdir(&self, path: &str) -> Result<()>;
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Set the modification time (unix seconds)
    fn set_mtime(&self, path: &str, mtime: u32) -> Result<()>;

    // ========================================================================
    // Directories
    // ========================================================================

    fn opendir(&self, path: &str) -> Result<DirHandle>;

    /// Next entry, or `None` once the directory is exhausted
    fn readdir(&self, dir: DirHandle) -> Result<Option<DirEntry>>;

    fn closedir(&self, dir: DirHandle) -> Result<()>;

    // ========================================================================
    // Volume
    // ========================================================================

    /// Free space in bytes
    fn disk_free(&self, path: &str) -> Result<u64>;

    /// Total space in bytes
    fn disk_space(&self, path: &str) -> Result<u64>;

    /// True if [`format`](Self::format) can succeed on this backend
    fn supports_format(&self) -> bool;

    /// Request an asynchronous format; success means "accepted"
    fn format(&self) -> Result<()>;

    /// Progress of the last format request; never blocks
    fn format_status(&self) -> FormatStatus;

    // ========================================================================
    // Optional Operations
    // ========================================================================

    /// Bytes to write before the next fsync for best streaming behaviour;
    /// 0 means any amount
    fn bytes_until_fsync(&self, _fd: FileHandle) -> u32 {
        0
    }

    /// Re-initialize the medium and resume open files
    fn remount(&self) -> Result<()> {
        Ok(())
    }

    /// Stop the medium ahead of a reboot
    fn unmount(&self) {}

    /// Load a whole file, NUL-terminated
    fn load_file(&self, path: &str) -> Result<FileData> {
        let size = self.stat(path)?.size;
        let fd = self.open(path, OpenFlags::RDONLY)?;

        let mut contents = vec![0u8; size as usize];
        let mut filled = 0;
        let result = loop {
            if filled == contents.len() {
                break Ok(());
            }
            match self.read(fd, &mut contents[filled..]) {
                Ok(0) => break Err(FsError::Io),
                Ok(n) => filled += n,
                Err(e) => break Err(e),
            }
        };
        let closed = self.close(fd);

        result?;
        closed?;
        Ok(FileData::from_vec(contents))
    }
}
