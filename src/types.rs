//! Shared types of the backend contract
//!
//! POSIX-shaped open flags, seek origins, `stat` records and directory
//! entries, plus the handle newtypes callers hold between calls.

use std::fmt;
use std::ops::BitOr;

use bytes::Bytes;

// =============================================================================
// Handles
// =============================================================================

/// Handle of an open file within one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

impl FileHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Slot index in the backend's descriptor table
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle of an open directory within one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirHandle(usize);

impl DirHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Slot index in the backend's directory table
    pub fn index(self) -> usize {
        self.0
    }
}

// =============================================================================
// Open Flags
// =============================================================================

/// POSIX `open(2)` flags
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(u32);

/// Access part of [`OpenFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenFlags {
    pub const RDONLY: Self = Self(0o0);
    pub const WRONLY: Self = Self(0o1);
    pub const RDWR: Self = Self(0o2);
    pub const CREAT: Self = Self(0o100);
    pub const TRUNC: Self = Self(0o1000);
    pub const APPEND: Self = Self(0o2000);

    const ACCMODE: u32 = 0o3;

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set (the access mode is compared as a whole)
    pub fn contains(self, other: Self) -> bool {
        let modifiers = other.0 & !Self::ACCMODE;
        (self.0 & modifiers) == modifiers
            && (other.0 & Self::ACCMODE == 0 || self.0 & Self::ACCMODE == other.0 & Self::ACCMODE)
    }

    /// Access mode; any value other than RDONLY or RDWR counts as write-only
    pub fn access(self) -> Access {
        match self.0 & Self::ACCMODE {
            0 => Access::ReadOnly,
            2 => Access::ReadWrite,
            _ => Access::WriteOnly,
        }
    }

    /// True if the flags ask for anything beyond plain reading
    pub fn has_write_intent(self) -> bool {
        self.access() != Access::ReadOnly
            || self.contains(Self::CREAT)
            || self.contains(Self::TRUNC)
            || self.contains(Self::APPEND)
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpenFlags({:#o})", self.0)
    }
}

/// Origin of an `lseek`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// SEEK_SET
    Set,
    /// SEEK_CUR
    Cur,
    /// SEEK_END
    End,
}

// =============================================================================
// Metadata
// =============================================================================

/// `st_mode` bits
pub mod mode {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;

    pub const S_IRUSR: u32 = 0o400;
    pub const S_IWUSR: u32 = 0o200;
    pub const S_IXUSR: u32 = 0o100;
    pub const S_IRGRP: u32 = 0o040;
    pub const S_IWGRP: u32 = 0o020;
    pub const S_IXGRP: u32 = 0o010;
    pub const S_IROTH: u32 = 0o004;
    pub const S_IWOTH: u32 = 0o002;
    pub const S_IXOTH: u32 = 0o001;

    /// Read permission for everyone
    pub const ALL_R: u32 = S_IRUSR | S_IRGRP | S_IROTH;
    /// Write permission for everyone
    pub const ALL_W: u32 = S_IWUSR | S_IWGRP | S_IWOTH;
    /// Execute permission for everyone
    pub const ALL_X: u32 = S_IXUSR | S_IXGRP | S_IXOTH;
}

/// `stat(2)`-compatible record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    /// Size in bytes
    pub size: u64,
    /// Type and permission bits (see [`mode`])
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Access time (unix seconds)
    pub atime: i64,
    /// Modification time (unix seconds)
    pub mtime: i64,
    /// Change time (unix seconds)
    pub ctime: i64,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFREG
    }
}

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    #[default]
    Regular,
    Directory,
}

/// One step of a directory enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileType,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Directory
    }
}

// =============================================================================
// Format Job
// =============================================================================

/// Progress of an asynchronous format request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FormatStatus {
    Idle = 0,
    Pending = 1,
    InProgress = 2,
    Success = 3,
    Failure = 4,
}

impl FormatStatus {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => FormatStatus::Pending,
            2 => FormatStatus::InProgress,
            3 => FormatStatus::Success,
            4 => FormatStatus::Failure,
            _ => FormatStatus::Idle,
        }
    }

    /// True once the job has reached a final outcome
    pub fn is_finished(self) -> bool {
        matches!(self, FormatStatus::Success | FormatStatus::Failure)
    }
}

// =============================================================================
// Whole-file Loads
// =============================================================================

/// Contents of a whole file, always followed by a NUL byte so the buffer can
/// be handed on as a C string
#[derive(Clone)]
pub struct FileData {
    /// Contents plus the trailing NUL
    data: Bytes,
}

impl FileData {
    /// Take ownership of `contents`, appending the terminator
    pub fn from_vec(mut contents: Vec<u8>) -> Self {
        contents.push(0);
        Self {
            data: Bytes::from(contents),
        }
    }

    /// Wrap a buffer that already ends in a NUL byte without copying it
    pub(crate) fn from_terminated(data: Bytes) -> Self {
        debug_assert_eq!(data.last(), Some(&0));
        Self { data }
    }

    /// File contents without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// File contents including the terminator
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.data
    }

    /// Contents as text, if they are valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn len(&self) -> usize {
        self.data.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for FileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileData").field("len", &self.len()).finish()
    }
}
