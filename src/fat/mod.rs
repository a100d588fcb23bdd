//! Block-Device Backend
//!
//! FAT volume on a removable, occasionally unreliable card.
//!
//! ## Call Shape
//! Every entry point that touches the medium:
//! 1. Checks the real-time entry guard
//! 2. Takes the re-entrant backend lock
//! 3. Runs a pending remount, failing fast with `Io` if it does not succeed
//! 4. Performs the medium operation
//! 5. On a disk error, if blocking is allowed, pauses, remounts and retries once
//! 6. Translates any remaining failure to the POSIX taxonomy
//!
//! ## Concurrency
//! - `state`: `ReentrantMutex<RefCell<..>>`; re-entrant because a failed
//!   operation remounts while its caller still holds the lock
//! - `format_status`: atomic, so polling never waits on a running format
//! - No `RefCell` borrow is held across a call that can remount

mod format;
mod remount;

use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::debug;

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{FsError, Result};
use crate::medium::time::{fat_time_to_unix, unix_time_to_fat};
use crate::medium::{attr, translate, AccessMode, FatError, FatResult, FileInfo, FileObject, Medium};
use crate::rt::RealTime;
use crate::table::HandleTable;
use crate::types::{
    mode, Access, DirEntry, DirHandle, FileHandle, FileType, FormatStatus, OpenFlags, Stat,
    Whence,
};

/// Owner id reported for entries without the system attribute
const DEFAULT_OWNER: u32 = 1000;

type Guard<'a, M> = ReentrantMutexGuard<'a, RefCell<FatState<M>>>;

/// FAT-backed filesystem backend with remount-and-resume recovery
pub struct FatBackend<M: Medium + 'static> {
    shared: Arc<Shared<M>>,
}

/// State shared with the asynchronous format task
struct Shared<M: Medium> {
    config: Config,
    rt: Arc<dyn RealTime>,
    state: ReentrantMutex<RefCell<FatState<M>>>,
    format_status: AtomicU8,
}

/// Everything guarded by the backend lock
struct FatState<M: Medium> {
    medium: M,
    files: HandleTable<OpenFile<M::File>>,
    dirs: HandleTable<OpenDir<M::Dir>>,
    /// Set when a fault could not be repaired; cleared by a successful remount
    remount_needed: bool,
}

/// One file slot: the driver object plus what is needed to reopen it
struct OpenFile<F> {
    obj: F,
    path: String,
    /// Read/write bits requested at open
    access: AccessMode,
    /// Offset to resume at; set while the object is dead after a failed reopen
    lost_offset: Option<u64>,
}

impl<F> OpenFile<F> {
    fn is_stale(&self) -> bool {
        self.lost_offset.is_some()
    }
}

/// One directory slot
struct OpenDir<D> {
    obj: D,
    path: String,
}

impl<M: Medium> FatState<M> {
    /// Run `op` against the driver and a file slot
    fn with_file<T>(
        &mut self,
        index: usize,
        op: impl FnOnce(&mut M, &mut OpenFile<M::File>) -> FatResult<T>,
    ) -> FatResult<T> {
        let file = self
            .files
            .get_mut(index)
            .map_err(|_| FatError::InvalidObject)?;
        op(&mut self.medium, file)
    }
}

impl<M: Medium> Drop for FatState<M> {
    fn drop(&mut self) {
        for mut file in self.files.drain() {
            if !file.is_stale() {
                let _ = self.medium.close(&mut file.obj);
            }
        }
        for mut dir in self.dirs.drain() {
            let _ = self.medium.closedir(&mut dir.obj);
        }
    }
}

impl<M: Medium + 'static> FatBackend<M> {
    /// Wrap a mounted medium
    pub fn new(medium: M, rt: Arc<dyn RealTime>, mut config: Config) -> Self {
        // Chunking and fsync hints divide by this
        config.max_io_size = config.max_io_size.max(1);
        let state = FatState {
            medium,
            files: HandleTable::new(config.max_open_files),
            dirs: HandleTable::new(config.max_open_dirs),
            remount_needed: false,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                rt,
                state: ReentrantMutex::new(RefCell::new(state)),
                format_status: AtomicU8::new(FormatStatus::Idle as u8),
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// True while a detected fault is waiting for a successful remount
    pub fn remount_needed(&self) -> bool {
        self.shared.state.lock().borrow().remount_needed
    }

    /// Number of occupied file slots
    pub fn open_files(&self) -> usize {
        self.shared.state.lock().borrow().files.len()
    }

    /// Number of occupied directory slots
    pub fn open_dirs(&self) -> usize {
        self.shared.state.lock().borrow().dirs.len()
    }

    // =========================================================================
    // Call Shape Helpers
    // =========================================================================

    /// Entry guard plus backend lock
    fn enter(&self) -> Result<Guard<'_, M>> {
        if !self.shared.rt.fs_allowed() {
            return Err(FsError::PermissionDenied);
        }
        Ok(self.shared.state.lock())
    }

    /// Run a pending remount before touching the medium
    fn check_remount(&self, guard: &Guard<'_, M>) -> Result<()> {
        let needed = guard.borrow().remount_needed;
        if needed && !self.remount_file_system() {
            return Err(FsError::Io);
        }
        Ok(())
    }

    /// Run a medium operation, retrying once after a remount on disk error
    ///
    /// `may_retry` is the caller's retry budget; it is spent by a retry.
    fn medium_op<T>(
        &self,
        guard: &Guard<'_, M>,
        may_retry: &mut bool,
        mut op: impl FnMut(&mut FatState<M>) -> FatResult<T>,
    ) -> FatResult<T> {
        let result = op(&mut *guard.borrow_mut());
        match result {
            Err(FatError::DiskErr) if *may_retry && self.shared.rt.retry_allowed() => {
                *may_retry = false;
                self.shared.rt.delay(self.shared.config.retry_delay);
                if self.remount_file_system() {
                    op(&mut *guard.borrow_mut())
                } else {
                    Err(FatError::DiskErr)
                }
            }
            other => other,
        }
    }

    /// Reject handles that are unknown or lost their object in a remount
    fn live_file(&self, guard: &Guard<'_, M>, fd: FileHandle) -> Result<()> {
        let state = guard.borrow();
        if state.files.get(fd.index())?.is_stale() {
            return Err(FsError::BadHandle);
        }
        Ok(())
    }

    /// Translate a failure on a file, reporting dead handles as `BadHandle`
    fn file_error(&self, guard: &Guard<'_, M>, fd: FileHandle, err: FatError) -> FsError {
        match guard.borrow().files.get(fd.index()) {
            Ok(file) if !file.is_stale() => translate(err),
            _ => FsError::BadHandle,
        }
    }
}

impl<M: Medium + 'static> Backend for FatBackend<M> {
    // =========================================================================
    // Files
    // =========================================================================

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;

        let mode = access_mode(flags);
        debug!(path, ?flags, mode = mode.bits(), "open");

        let slot = guard.borrow().files.vacant()?;
        let mut obj = M::File::default();
        self.medium_op(&guard, &mut true, |state| {
            state.medium.open(&mut obj, path, mode)
        })?;

        if flags.contains(OpenFlags::APPEND) {
            let mut state = guard.borrow_mut();
            let end = obj.size();
            if let Err(e) = state.medium.lseek(&mut obj, end) {
                let _ = state.medium.close(&mut obj);
                return Err(translate(e));
            }
        }

        guard.borrow_mut().files.fill(
            slot,
            OpenFile {
                obj,
                path: path.to_string(),
                access: mode.access_bits(),
                lost_offset: None,
            },
        )?;
        debug!(path, fd = slot, "opened");
        Ok(FileHandle::new(slot))
    }

    fn close(&self, fd: FileHandle) -> Result<()> {
        let guard = self.enter()?;
        let mut state = guard.borrow_mut();
        let mut file = state.files.release(fd.index())?;
        if file.is_stale() {
            return Ok(());
        }
        state.medium.close(&mut file.obj)?;
        Ok(())
    }

    fn read(&self, fd: FileHandle, buf: &mut [u8]) -> Result<usize> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        self.live_file(&guard, fd)?;

        let max_io = self.shared.config.max_io_size;
        let mut may_retry = true;
        let mut total = 0;
        while total < buf.len() {
            let remaining = &mut buf[total..];
            let (requested, got) = self
                .medium_op(&guard, &mut may_retry, |state| {
                    state.with_file(fd.index(), |medium, file| {
                        let n = chunk_len(medium, remaining, max_io);
                        medium
                            .read(&mut file.obj, &mut remaining[..n])
                            .map(|got| (n, got))
                    })
                })
                .map_err(|e| self.file_error(&guard, fd, e))?;

            if got == 0 {
                break;
            }
            if got > requested {
                return Err(FsError::Io);
            }
            total += got;
            if got < requested {
                break;
            }
        }
        Ok(total)
    }

    fn write(&self, fd: FileHandle, buf: &[u8]) -> Result<usize> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        self.live_file(&guard, fd)?;

        let max_io = self.shared.config.max_io_size;
        let mut total = 0;
        while total < buf.len() {
            let remaining = &buf[total..];
            // Retry budget is per chunk on the write path
            let (requested, written) = self
                .medium_op(&guard, &mut true, |state| {
                    state.with_file(fd.index(), |medium, file| {
                        let n = chunk_len(medium, remaining, max_io);
                        medium
                            .write(&mut file.obj, &remaining[..n])
                            .map(|written| (n, written))
                    })
                })
                .map_err(|e| self.file_error(&guard, fd, e))?;

            // A medium that accepts nothing without an error is not end-of-file
            if written == 0 || written > requested {
                return Err(FsError::Io);
            }
            total += written;
            if written < requested {
                break;
            }
        }
        Ok(total)
    }

    fn fsync(&self, fd: FileHandle) -> Result<()> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        self.live_file(&guard, fd)?;

        let result = guard
            .borrow_mut()
            .with_file(fd.index(), |medium, file| medium.sync(&mut file.obj));
        result.map_err(|e| self.file_error(&guard, fd, e))
    }

    fn lseek(&self, fd: FileHandle, offset: i64, whence: Whence) -> Result<u64> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        self.live_file(&guard, fd)?;

        let result = guard.borrow_mut().with_file(fd.index(), |medium, file| {
            let base = match whence {
                Whence::Set => 0,
                Whence::Cur => file.obj.position() as i64,
                Whence::End => file.obj.size() as i64,
            };
            let target = base
                .checked_add(offset)
                .filter(|target| *target >= 0)
                .ok_or(FatError::InvalidParameter)?;
            medium.lseek(&mut file.obj, target as u64)?;
            Ok(file.obj.position())
        });
        result.map_err(|e| self.file_error(&guard, fd, e))
    }

    // =========================================================================
    // Namespace
    // =========================================================================

    fn stat(&self, path: &str) -> Result<Stat> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;

        // The driver's stat does not accept the root directory
        if is_root(path) {
            return Ok(Stat {
                mode: mode::S_IFDIR,
                ..Stat::default()
            });
        }

        let info = self.medium_op(&guard, &mut true, |state| state.medium.stat(path))?;
        Ok(stat_from_info(&info))
    }

    fn unlink(&self, path: &str) -> Result<()> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        guard.borrow_mut().medium.unlink(path)?;
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        guard.borrow_mut().medium.mkdir(path)?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        guard.borrow_mut().medium.rename(from, to)?;
        Ok(())
    }

    fn set_mtime(&self, path: &str, mtime: u32) -> Result<()> {
        let (date, time) = unix_time_to_fat(i64::from(mtime));
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        guard.borrow_mut().medium.utime(path, date, time)?;
        Ok(())
    }

    // =========================================================================
    // Directories
    // =========================================================================

    fn opendir(&self, path: &str) -> Result<DirHandle> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;

        let slot = guard.borrow().dirs.vacant()?;
        let mut obj = M::Dir::default();
        // Opening validates the path, so a missing directory fails here
        // rather than on the first readdir
        self.medium_op(&guard, &mut true, |state| {
            state.medium.opendir(&mut obj, path)
        })?;

        guard.borrow_mut().dirs.fill(
            slot,
            OpenDir {
                obj,
                path: path.to_string(),
            },
        )?;
        debug!(path, dir = slot, "opendir");
        Ok(DirHandle::new(slot))
    }

    fn readdir(&self, dir: DirHandle) -> Result<Option<DirEntry>> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;

        let mut state = guard.borrow_mut();
        let FatState { medium, dirs, .. } = &mut *state;
        let open = dirs.get_mut(dir.index())?;
        match medium.readdir(&mut open.obj)? {
            Some(info) if !info.name.is_empty() => {
                let kind = if info.is_dir() {
                    FileType::Directory
                } else {
                    FileType::Regular
                };
                Ok(Some(DirEntry {
                    name: info.name,
                    kind,
                }))
            }
            _ => Ok(None),
        }
    }

    fn closedir(&self, dir: DirHandle) -> Result<()> {
        let guard = self.enter()?;
        let mut state = guard.borrow_mut();
        let mut open = state.dirs.release(dir.index())?;
        debug!(path = %open.path, "closedir");
        state.medium.closedir(&mut open.obj)?;
        Ok(())
    }

    // =========================================================================
    // Volume
    // =========================================================================

    fn disk_free(&self, _path: &str) -> Result<u64> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        let info = guard.borrow_mut().medium.getfree()?;
        Ok(u64::from(info.free_clusters)
            * u64::from(info.sectors_per_cluster)
            * self.shared.config.sector_size)
    }

    fn disk_space(&self, _path: &str) -> Result<u64> {
        let guard = self.enter()?;
        self.check_remount(&guard)?;
        let info = guard.borrow_mut().medium.getfree()?;
        Ok(u64::from(info.fat_entries.saturating_sub(2))
            * u64::from(info.sectors_per_cluster)
            * self.shared.config.sector_size)
    }

    fn supports_format(&self) -> bool {
        true
    }

    fn format(&self) -> Result<()> {
        let _guard = self.enter()?;
        if matches!(
            self.format_status(),
            FormatStatus::Pending | FormatStatus::InProgress
        ) {
            return Err(FsError::Busy);
        }

        self.shared
            .format_status
            .store(FormatStatus::Pending as u8, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        self.shared
            .rt
            .spawn_io(Box::new(move || shared.run_format()));
        Ok(())
    }

    fn format_status(&self) -> FormatStatus {
        self.shared.format_status()
    }

    // =========================================================================
    // Optional Operations
    // =========================================================================

    fn bytes_until_fsync(&self, fd: FileHandle) -> u32 {
        let Ok(guard) = self.enter() else {
            return 0;
        };
        let state = guard.borrow();
        match state.files.get(fd.index()) {
            Ok(file) if !file.is_stale() => {
                let block = self.shared.config.max_io_size as u64;
                (block - file.obj.position() % block) as u32
            }
            _ => 0,
        }
    }

    fn remount(&self) -> Result<()> {
        let _guard = self.enter()?;
        if self.remount_file_system() {
            Ok(())
        } else {
            Err(FsError::Io)
        }
    }

    fn unmount(&self) {
        let guard = self.shared.state.lock();
        guard.borrow_mut().medium.stop();
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Map POSIX open flags to driver mode bits
fn access_mode(flags: OpenFlags) -> AccessMode {
    let mut mode = match flags.access() {
        Access::ReadWrite => AccessMode::READ | AccessMode::WRITE,
        Access::ReadOnly => AccessMode::READ,
        Access::WriteOnly => AccessMode::WRITE,
    };
    if flags.contains(OpenFlags::CREAT) {
        mode |= if flags.contains(OpenFlags::TRUNC) {
            AccessMode::CREATE_ALWAYS
        } else {
            AccessMode::OPEN_ALWAYS
        };
    }
    mode
}

/// Transfer size for the next chunk of `buf`
fn chunk_len<M: Medium>(medium: &M, buf: &[u8], max_io: usize) -> usize {
    if medium.is_dma_safe(buf) {
        buf.len()
    } else {
        buf.len().min(max_io)
    }
}

fn is_root(path: &str) -> bool {
    matches!(path.trim_matches('/'), "" | ".")
}

fn stat_from_info(info: &FileInfo) -> Stat {
    let epoch = fat_time_to_unix(info.date, info.time);

    let mut bits = mode::ALL_R | mode::ALL_X;
    if info.attrib & attr::RDO == 0 {
        bits |= mode::ALL_W;
    }
    bits |= if info.is_dir() {
        mode::S_IFDIR
    } else {
        mode::S_IFREG
    };

    let owner = if info.attrib & attr::SYS != 0 {
        0
    } else {
        DEFAULT_OWNER
    };

    Stat {
        size: info.size,
        mode: bits,
        uid: owner,
        gid: owner,
        atime: epoch,
        mtime: epoch,
        ctime: epoch,
    }
}
