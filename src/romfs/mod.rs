//! Read-Only Archive Backend
//!
//! Serves files straight out of decompressed archive buffers. Memory does not
//! fail the way a removable card does, so there is no retry or remount here;
//! a plain mutex guards the two descriptor tables.
//!
//! Every mutating operation exists and fails with `ReadOnly`.

mod archive;

pub use archive::{Archive, MemoryArchive, MemoryArchiveBuilder, IMAGE_VERSION};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{FsError, Result};
use crate::table::HandleTable;
use crate::types::{
    mode, DirEntry, DirHandle, FileData, FileHandle, FileType, FormatStatus, OpenFlags, Stat,
    Whence,
};

/// Open file: the decompressed buffer and a read offset in `[0, size]`
struct RomFile {
    /// Contents plus the trailing NUL
    data: Bytes,
    size: u64,
    offset: u64,
}

struct RomDir {
    path: String,
    cursor: usize,
}

struct RomTables {
    files: HandleTable<RomFile>,
    dirs: HandleTable<RomDir>,
}

/// Backend serving a read-only archive
pub struct RomfsBackend<A: Archive> {
    archive: A,
    tables: Mutex<RomTables>,
}

impl<A: Archive> RomfsBackend<A> {
    pub fn new(archive: A, config: &Config) -> Self {
        Self {
            archive,
            tables: Mutex::new(RomTables {
                files: HandleTable::new(config.romfs_max_open_files),
                dirs: HandleTable::new(config.romfs_max_open_dirs),
            }),
        }
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    /// True if the listing has at least one name below `dir`
    fn has_children(&self, dir: &str) -> bool {
        let mut cursor = 0;
        self.archive.dir_list(dir, &mut cursor).is_some()
    }
}

impl<A: Archive> Backend for RomfsBackend<A> {
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        if flags.has_write_intent() {
            return Err(FsError::ReadOnly);
        }

        let data = self
            .archive
            .find_decompress(archive_name(path))
            .ok_or(FsError::NotFound)?;
        let size = data.len().saturating_sub(1) as u64;
        let slot = self.tables.lock().files.allocate(RomFile {
            data,
            size,
            offset: 0,
        })?;
        debug!(path, fd = slot, size, "romfs open");
        Ok(FileHandle::new(slot))
    }

    fn close(&self, fd: FileHandle) -> Result<()> {
        self.tables.lock().files.release(fd.index())?;
        Ok(())
    }

    fn read(&self, fd: FileHandle, buf: &mut [u8]) -> Result<usize> {
        let mut tables = self.tables.lock();
        let file = tables.files.get_mut(fd.index())?;

        let start = file.offset as usize;
        let count = buf.len().min((file.size - file.offset) as usize);
        buf[..count].copy_from_slice(&file.data[start..start + count]);
        file.offset += count as u64;
        Ok(count)
    }

    fn write(&self, _fd: FileHandle, _buf: &[u8]) -> Result<usize> {
        Err(FsError::ReadOnly)
    }

    fn fsync(&self, fd: FileHandle) -> Result<()> {
        self.tables.lock().files.get(fd.index())?;
        Ok(())
    }

    fn lseek(&self, fd: FileHandle, offset: i64, whence: Whence) -> Result<u64> {
        let mut tables = self.tables.lock();
        let file = tables.files.get_mut(fd.index())?;

        let target = match whence {
            Whence::Set if offset < 0 => return Err(FsError::InvalidArgument),
            Whence::Set => offset,
            Whence::Cur => (file.offset as i64).saturating_add(offset),
            Whence::End => (file.size as i64).saturating_add(offset),
        };
        file.offset = target.clamp(0, file.size as i64) as u64;
        Ok(file.offset)
    }

    fn stat(&self, path: &str) -> Result<Stat> {
        let name = archive_name(path);
        if let Some(size) = self.archive.find_size(name) {
            return Ok(Stat {
                size,
                mode: mode::S_IFREG | mode::ALL_R,
                ..Stat::default()
            });
        }
        if name.is_empty() || self.has_children(name) {
            return Ok(Stat {
                mode: mode::S_IFDIR | mode::ALL_R | mode::ALL_X,
                ..Stat::default()
            });
        }
        Err(FsError::NotFound)
    }

    fn unlink(&self, _path: &str) -> Result<()> {
        Err(FsError::ReadOnly)
    }

    fn mkdir(&self, _path: &str) -> Result<()> {
        Err(FsError::ReadOnly)
    }

    fn rename(&self, _from: &str, _to: &str) -> Result<()> {
        Err(FsError::ReadOnly)
    }

    fn set_mtime(&self, _path: &str, _mtime: u32) -> Result<()> {
        Err(FsError::ReadOnly)
    }

    fn opendir(&self, path: &str) -> Result<DirHandle> {
        let name = archive_name(path);
        // Peek once so a missing directory fails here, then start over
        if !self.has_children(name) {
            return Err(FsError::NotFound);
        }
        let slot = self.tables.lock().dirs.allocate(RomDir {
            path: name.to_string(),
            cursor: 0,
        })?;
        Ok(DirHandle::new(slot))
    }

    fn readdir(&self, dir: DirHandle) -> Result<Option<DirEntry>> {
        let mut tables = self.tables.lock();
        let open = tables.dirs.get_mut(dir.index())?;

        let Some(full) = self.archive.dir_list(&open.path, &mut open.cursor) else {
            return Ok(None);
        };
        let rest = if open.path.is_empty() {
            full
        } else {
            full.get(open.path.len() + 1..).unwrap_or_default()
        };
        let (name, kind) = match rest.split_once('/') {
            Some((child, _)) => (child, FileType::Directory),
            None => (rest, FileType::Regular),
        };
        Ok(Some(DirEntry {
            name: name.to_string(),
            kind,
        }))
    }

    fn closedir(&self, dir: DirHandle) -> Result<()> {
        self.tables.lock().dirs.release(dir.index())?;
        Ok(())
    }

    fn disk_free(&self, _path: &str) -> Result<u64> {
        Ok(0)
    }

    fn disk_space(&self, _path: &str) -> Result<u64> {
        Ok(0)
    }

    fn supports_format(&self) -> bool {
        false
    }

    fn format(&self) -> Result<()> {
        Err(FsError::ReadOnly)
    }

    fn format_status(&self) -> FormatStatus {
        FormatStatus::Idle
    }

    /// Hands out the decoder's buffer itself; it is already NUL-terminated
    fn load_file(&self, path: &str) -> Result<FileData> {
        self.archive
            .find_decompress(archive_name(path))
            .map(FileData::from_terminated)
            .ok_or(FsError::NotFound)
    }
}

/// Archive names carry no leading separator; "." names the root
fn archive_name(path: &str) -> &str {
    match path.trim_matches('/') {
        "." => "",
        name => name,
    }
}
