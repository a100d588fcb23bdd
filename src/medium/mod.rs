//! Medium Module
//!
//! Interface to the block-device FAT driver that sits below the
//! [`FatBackend`](crate::fat::FatBackend).
//!
//! ## Responsibilities of an implementation
//! - Transaction-style file, directory and volume primitives returning
//!   native [`FatError`] codes
//! - A stop/remount pair used to recover from a removed or flaky card
//! - A DMA-safety predicate over caller buffers and a DMA-safe allocator
//!
//! File and directory objects are owned by the caller (the backend's
//! descriptor table) and mutated in place by the driver, the way FAT drivers
//! hand out `FIL`/`DIR` structures. `Default` yields an invalid, closed object.

mod result;
mod sim;
pub mod time;

pub use result::{translate, FatError, FatResult};
pub use sim::{SimControl, SimMedium};

use std::ops::{BitOr, BitOrAssign};

// =============================================================================
// Access Modes
// =============================================================================

/// Native open mode bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessMode(u8);

impl AccessMode {
    pub const READ: Self = Self(0x01);
    pub const WRITE: Self = Self(0x02);
    pub const OPEN_EXISTING: Self = Self(0x00);
    pub const CREATE_NEW: Self = Self(0x04);
    pub const CREATE_ALWAYS: Self = Self(0x08);
    pub const OPEN_ALWAYS: Self = Self(0x10);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Only the read/write bits
    pub fn access_bits(self) -> Self {
        Self(self.0 & (Self::READ.0 | Self::WRITE.0))
    }
}

impl BitOr for AccessMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// Native Records
// =============================================================================

/// Attribute bits of a directory entry
pub mod attr {
    pub const RDO: u8 = 0x01;
    pub const HID: u8 = 0x02;
    pub const SYS: u8 = 0x04;
    pub const DIR: u8 = 0x10;
    pub const ARC: u8 = 0x20;
}

/// Native stat / directory record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// Packed date: year-1980 (7 bits), month (4 bits), day (5 bits)
    pub date: u16,
    /// Packed time: hour (5 bits), minute (6 bits), second/2 (5 bits)
    pub time: u16,
    /// Attribute bits (see [`attr`])
    pub attrib: u8,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.attrib & attr::DIR != 0
    }
}

/// Cluster accounting of the mounted volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub free_clusters: u32,
    /// Number of FAT entries; the first two are reserved
    pub fat_entries: u32,
    pub sectors_per_cluster: u32,
}

/// State the driver keeps in an open file object
pub trait FileObject: Default + Send {
    /// Current read/write pointer
    fn position(&self) -> u64;

    /// File size as seen through this object
    fn size(&self) -> u64;
}

// =============================================================================
// Driver Interface
// =============================================================================

/// Block-device FAT driver
pub trait Medium: Send {
    type File: FileObject;
    type Dir: Default + Send;

    // -------------------------------------------------------------------------
    // Files
    // -------------------------------------------------------------------------
    fn open(&mut self, file: &mut Self::File, path: &str, mode: AccessMode) -> FatResult<()>;
    fn close(&mut self, file: &mut Self::File) -> FatResult<()>;
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> FatResult<usize>;
    fn write(&mut self, file: &mut Self::File, buf: &[u8]) -> FatResult<usize>;
    fn lseek(&mut self, file: &mut Self::File, position: u64) -> FatResult<()>;
    fn sync(&mut self, file: &mut Self::File) -> FatResult<()>;

    // -------------------------------------------------------------------------
    // Namespace
    // -------------------------------------------------------------------------
    fn stat(&mut self, path: &str) -> FatResult<FileInfo>;
    fn unlink(&mut self, path: &str) -> FatResult<()>;
    fn mkdir(&mut self, path: &str) -> FatResult<()>;
    fn rename(&mut self, from: &str, to: &str) -> FatResult<()>;
    fn utime(&mut self, path: &str, date: u16, time: u16) -> FatResult<()>;

    // -------------------------------------------------------------------------
    // Directories
    // -------------------------------------------------------------------------
    fn opendir(&mut self, dir: &mut Self::Dir, path: &str) -> FatResult<()>;
    /// Next entry, or `None` at the end of the directory
    fn readdir(&mut self, dir: &mut Self::Dir) -> FatResult<Option<FileInfo>>;
    fn closedir(&mut self, dir: &mut Self::Dir) -> FatResult<()>;

    // -------------------------------------------------------------------------
    // Volume
    // -------------------------------------------------------------------------
    fn getfree(&mut self) -> FatResult<VolumeInfo>;
    /// Destructively create a fresh filesystem using `work` as scratch
    fn mkfs(&mut self, work: &mut [u8]) -> FatResult<()>;
    /// Stop the card and unmount the volume
    fn stop(&mut self);
    /// Reinitialize the card and mount the volume; false on failure
    fn remount(&mut self) -> bool;

    // -------------------------------------------------------------------------
    // Memory
    // -------------------------------------------------------------------------
    /// True if `buf` may be handed to the hardware for a direct transfer
    fn is_dma_safe(&self, buf: &[u8]) -> bool;
    /// Allocate a zeroed buffer from DMA-capable memory
    fn dma_alloc(&mut self, len: usize) -> Option<Vec<u8>>;
}
